//! Messaging gateway abstraction and Telegram adapter.
//!
//! The [`MessagingGateway`] trait decouples reconciliation and the captcha
//! hand-off from the transport. Delivery is at-least-once from the
//! caller's point of view: a send that fails is reported, never retried by
//! the caller.

pub mod telegram;
pub mod templates;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::models::message::MessageHandle;
use crate::Result;

/// Who receives a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// The subscriber chat (and topic, when configured).
    Subscribers,
    /// The admin chat.
    Admin,
}

/// Inline button opening a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    /// Button label.
    pub text: String,
    /// Target URL.
    pub url: String,
}

/// HTML-formatted text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Recipient.
    pub audience: Audience,
    /// HTML body.
    pub text: String,
    /// Optional button under the message.
    pub link_button: Option<LinkButton>,
}

impl OutboundMessage {
    /// Message to the subscriber chat.
    #[must_use]
    pub fn subscribers(text: impl Into<String>) -> Self {
        Self {
            audience: Audience::Subscribers,
            text: text.into(),
            link_button: None,
        }
    }

    /// Message to the admin chat.
    #[must_use]
    pub fn admin(text: impl Into<String>) -> Self {
        Self {
            audience: Audience::Admin,
            text: text.into(),
            link_button: None,
        }
    }

    /// Attach a link button.
    #[must_use]
    pub fn with_button(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.link_button = Some(LinkButton {
            text: text.into(),
            url: url.into(),
        });
        self
    }
}

/// Latest message seen in the admin conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReply {
    /// Monotonic transport update id.
    pub update_id: i64,
    /// Chat the message came from.
    pub chat_id: String,
    /// Message text, absent for non-text messages.
    pub text: Option<String>,
    /// When the message was sent.
    pub date: DateTime<Utc>,
}

/// Outbound messaging and admin-reply polling.
pub trait MessagingGateway: Send + Sync {
    /// Send a text message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Messaging` if the transport rejects the message.
    fn send_message(
        &self,
        message: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<MessageHandle>> + Send + '_>>;

    /// Replace the text of a previously sent message.
    ///
    /// Editing with identical text succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the message no longer exists and
    /// `AppError::Messaging` for other transport failures.
    fn edit_message(
        &self,
        handle: &MessageHandle,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Upload a local file to the subscriber chat.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Messaging` if the upload fails and `AppError::Io`
    /// if the file cannot be read.
    fn send_document(
        &self,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageHandle>> + Send + '_>>;

    /// Send an image.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Messaging` if the upload fails.
    fn send_photo(
        &self,
        audience: Audience,
        image: Vec<u8>,
        caption: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageHandle>> + Send + '_>>;

    /// Most recent message in the admin conversation, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Messaging` if polling fails.
    fn poll_admin_reply(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AdminReply>>> + Send + '_>>;
}
