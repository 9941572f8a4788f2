//! Handles of messages that are edited in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identity of a delivered message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct MessageHandle {
    /// Chat the message lives in.
    pub chat_id: String,
    /// Transport-assigned message id.
    pub message_id: i64,
}

/// Course overview message per course id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MessageIdentityMap(BTreeMap<String, MessageHandle>);

impl MessageIdentityMap {
    /// Overview message for a course.
    #[must_use]
    pub fn get(&self, course_id: &str) -> Option<&MessageHandle> {
        self.0.get(course_id)
    }

    /// Remember the overview message for a course.
    pub fn insert(&mut self, course_id: impl Into<String>, handle: MessageHandle) {
        self.0.insert(course_id.into(), handle);
    }

    /// Forget a course's overview message.
    pub fn remove(&mut self, course_id: &str) -> Option<MessageHandle> {
        self.0.remove(course_id)
    }
}
