//! Snapshot diffing against stored sections.

use std::collections::BTreeMap;

use crate::models::course::{ActivityRef, AssignmentDetails, Section};

/// Activity that was not present in its section before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    /// Section the activity appeared in.
    pub section: String,
    /// The activity.
    pub activity: ActivityRef,
}

/// Known deadline-bearing activity whose details may have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedItem {
    /// Section the activity is listed in.
    pub section: String,
    /// The activity.
    pub activity: ActivityRef,
    /// Details stored before this cycle.
    pub old_details: AssignmentDetails,
}

/// Result of one diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    /// Activities not seen before, in page order.
    pub new_items: Vec<NewItem>,
    /// Activities to re-check for date or attachment changes.
    pub updated_items: Vec<UpdatedItem>,
}

impl Changes {
    /// Whether anything new appeared.
    #[must_use]
    pub fn has_new(&self) -> bool {
        !self.new_items.is_empty()
    }
}

/// Compare fresh sections against stored ones.
///
/// Matching is scoped to the same-named section: an activity only counts as
/// known if an exact `(name, url)` match exists in the old section with the
/// same heading. Renaming a section therefore reports all its activities as
/// new.
#[must_use]
pub fn detect(
    old_sections: &[Section],
    new_sections: &[Section],
    stored_details: &BTreeMap<String, AssignmentDetails>,
) -> Changes {
    let mut changes = Changes::default();

    for section in new_sections {
        let old_activities = old_sections
            .iter()
            .find(|old| old.name == section.name)
            .map_or(&[][..], |old| old.activities.as_slice());

        for activity in &section.activities {
            let known = old_activities
                .iter()
                .any(|old| old.same_identity(activity));

            if !known {
                changes.new_items.push(NewItem {
                    section: section.name.clone(),
                    activity: activity.clone(),
                });
                continue;
            }

            if !activity.kind.is_deadline_bearing() {
                continue;
            }

            if let Some(old_details) = stored_details.get(&activity.url) {
                changes.updated_items.push(UpdatedItem {
                    section: section.name.clone(),
                    activity: activity.clone(),
                    old_details: old_details.clone(),
                });
            }
        }
    }

    changes
}
