//! Course records, activities, and assignment details.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel the portal (and the extractor) uses for a date it could not read.
pub const UNKNOWN_DATE: &str = "نامشخص";

/// Opaque portal date string.
///
/// The unknown sentinel is a distinct value from an absent field: an
/// assignment may have `deadline = Some(unknown)` while a quiz has
/// `deadline = None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DateText(String);

impl DateText {
    /// Wrap a raw portal string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The unknown sentinel.
    #[must_use]
    pub fn unknown() -> Self {
        Self(UNKNOWN_DATE.to_owned())
    }

    /// Whether this is the unknown sentinel.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.0.trim() == UNKNOWN_DATE
    }

    /// Raw text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw text, or `None` for the unknown sentinel.
    #[must_use]
    pub fn known(&self) -> Option<&str> {
        if self.is_unknown() {
            None
        } else {
            Some(&self.0)
        }
    }
}

impl Display for DateText {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Activity type as reported by the portal.
///
/// Serialized as the portal's type string so unknown types survive a
/// round trip through the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum ActivityKind {
    /// Assignment with a submission deadline.
    Assignment,
    /// Quiz with a closing time.
    Quiz,
    /// Downloadable file.
    Resource,
    /// Discussion forum.
    Forum,
    /// Static page.
    Page,
    /// Folder of files.
    Folder,
    /// Inline label.
    Label,
    /// External link.
    Url,
    /// Any other module type.
    Other(String),
}

impl ActivityKind {
    /// Whether this kind carries dates that drive notifications and reminders.
    #[must_use]
    pub fn is_deadline_bearing(&self) -> bool {
        matches!(self, Self::Assignment | Self::Quiz)
    }

    /// Icon shown next to the activity in overviews.
    #[must_use]
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Assignment => "📝",
            Self::Resource => "📁",
            Self::Url => "🔗",
            Self::Forum => "💬",
            Self::Quiz => "❓",
            Self::Page => "📄",
            Self::Folder => "📂",
            Self::Label => "🏷️",
            Self::Other(_) => "📌",
        }
    }
}

impl From<String> for ActivityKind {
    fn from(raw: String) -> Self {
        match raw.strip_prefix("mod_").unwrap_or(&raw) {
            "assign" => Self::Assignment,
            "quiz" => Self::Quiz,
            "resource" => Self::Resource,
            "forum" => Self::Forum,
            "page" => Self::Page,
            "folder" => Self::Folder,
            "label" => Self::Label,
            "url" => Self::Url,
            _ => Self::Other(raw),
        }
    }
}

impl From<ActivityKind> for String {
    fn from(kind: ActivityKind) -> Self {
        match kind {
            ActivityKind::Assignment => "assign".into(),
            ActivityKind::Quiz => "quiz".into(),
            ActivityKind::Resource => "resource".into(),
            ActivityKind::Forum => "forum".into(),
            ActivityKind::Page => "page".into(),
            ActivityKind::Folder => "folder".into(),
            ActivityKind::Label => "label".into(),
            ActivityKind::Url => "url".into(),
            ActivityKind::Other(raw) => raw,
        }
    }
}

/// One activity listed in a course section. Identity is `(name, url)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ActivityRef {
    /// Display name.
    pub name: String,
    /// Portal module type.
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    /// Activity page URL.
    pub url: String,
}

impl ActivityRef {
    /// Whether `other` is the same activity.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name && self.url == other.url
    }
}

/// Named course section in page order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Section {
    /// Section heading.
    pub name: String,
    /// Activities in page order.
    #[serde(default)]
    pub activities: Vec<ActivityRef>,
}

/// Fresh extraction of a course page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CourseSnapshot {
    /// Course title.
    pub name: String,
    /// Sections in page order.
    #[serde(default)]
    pub sections: Vec<Section>,
}

/// File attached to an assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Attachment {
    /// Download URL.
    pub url: String,
    /// File name as shown on the portal.
    pub file_name: String,
}

fn default_true() -> bool {
    true
}

/// Dates and attachments of a deadline-bearing activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AssignmentDetails {
    /// When the activity opened.
    #[serde(default)]
    pub opened: Option<DateText>,
    /// Assignment submission deadline.
    #[serde(default)]
    pub deadline: Option<DateText>,
    /// Quiz closing time.
    #[serde(default)]
    pub closed: Option<DateText>,
    /// Attached files (assignments only).
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Whether the detail page could be read.
    #[serde(default = "default_true")]
    pub fetch_succeeded: bool,
}

impl AssignmentDetails {
    /// Placeholder for a detail page that could not be read.
    #[must_use]
    pub fn failed(kind: &ActivityKind) -> Self {
        let unknown = Some(DateText::unknown());
        Self {
            opened: unknown.clone(),
            deadline: if matches!(kind, ActivityKind::Quiz) {
                None
            } else {
                unknown.clone()
            },
            closed: if matches!(kind, ActivityKind::Quiz) {
                unknown
            } else {
                None
            },
            attachments: Vec::new(),
            fetch_succeeded: false,
        }
    }

    /// The date that ends the activity: deadline for assignments, closing
    /// time for quizzes.
    #[must_use]
    pub fn due(&self) -> Option<&DateText> {
        self.deadline.as_ref().or(self.closed.as_ref())
    }

    /// Whether any date is missing or unreadable, so details should be
    /// fetched again.
    #[must_use]
    pub fn needs_backfill(&self) -> bool {
        let missing = |date: Option<&DateText>| date.map_or(true, DateText::is_unknown);
        missing(self.opened.as_ref()) || missing(self.due())
    }
}

/// Record that a new-activity notice was delivered. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NotificationRecord {
    /// Always `true` once written.
    pub sent: bool,
    /// Delivery time.
    pub sent_at: DateTime<Utc>,
    /// Activity name at delivery time.
    pub activity_name: String,
}

/// Record that an attachment was delivered. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FileSentRecord {
    /// Always `true` once written.
    pub sent: bool,
    /// Normalized file name.
    pub file_name: String,
    /// Where the file was saved locally.
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// SHA-256 of the downloaded bytes.
    #[serde(default)]
    pub sha256: Option<String>,
    /// Delivery time.
    pub sent_at: DateTime<Utc>,
}

/// Persisted state of one monitored course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CourseRecord {
    /// Course identifier (the `id` query parameter of the course URL).
    pub id: String,
    /// Course title.
    #[serde(default)]
    pub name: String,
    /// Course page URL.
    pub url: String,
    /// Sections as of the last successful check.
    #[serde(default)]
    pub sections: Vec<Section>,
    /// Details of deadline-bearing activities, keyed by activity URL.
    #[serde(default)]
    pub assignments: BTreeMap<String, AssignmentDetails>,
    /// Delivered attachments, keyed by file URL.
    #[serde(default)]
    pub sent_files: BTreeMap<String, FileSentRecord>,
    /// Delivered new-activity notices, keyed by activity URL.
    #[serde(default)]
    pub sent_notifications: BTreeMap<String, NotificationRecord>,
    /// Last successful check.
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
}

impl CourseRecord {
    /// Empty record for a course seen for the first time.
    #[must_use]
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            url: url.into(),
            sections: Vec::new(),
            assignments: BTreeMap::new(),
            sent_files: BTreeMap::new(),
            sent_notifications: BTreeMap::new(),
            last_checked: None,
        }
    }

    /// Deadline-bearing activities from the stored sections, with their
    /// section names.
    pub fn deadline_activities(&self) -> impl Iterator<Item = (&str, &ActivityRef)> {
        self.sections.iter().flat_map(|section| {
            section
                .activities
                .iter()
                .filter(|activity| activity.kind.is_deadline_bearing())
                .map(move |activity| (section.name.as_str(), activity))
        })
    }
}

/// Extract the course identifier from a course page URL.
///
/// Falls back to the whole URL when it has no `id` query parameter.
#[must_use]
pub fn course_id_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "id")
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_else(|| url.to_owned())
}
