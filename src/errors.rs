//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Messaging transport (Telegram Bot API) failure.
    Messaging(String),
    /// Browsing context crashed, disconnected, or failed to launch.
    Browser(String),
    /// Page navigation failed or timed out inside the browsing context.
    Navigation(String),
    /// Content extraction returned malformed or missing data.
    Extraction(String),
    /// The portal redirected to its login page; the session has expired.
    LoginRequired(String),
    /// Login attempts were exhausted.
    LoginFailed(String),
    /// The captcha hand-off failed or timed out.
    Captcha(String),
    /// Attachment download failed or returned an unusable body.
    Download(String),
    /// An operation exceeded its deadline.
    Timeout(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the failure points at a broken browsing context.
    ///
    /// Transient failures abandon the current course and force a relaunch
    /// and re-login before the next course is processed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Browser(_) | Self::Navigation(_) | Self::Timeout(_)
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Messaging(msg) => write!(f, "messaging: {msg}"),
            Self::Browser(msg) => write!(f, "browser: {msg}"),
            Self::Navigation(msg) => write!(f, "navigation: {msg}"),
            Self::Extraction(msg) => write!(f, "extraction: {msg}"),
            Self::LoginRequired(msg) => write!(f, "login required: {msg}"),
            Self::LoginFailed(msg) => write!(f, "login failed: {msg}"),
            Self::Captcha(msg) => write!(f, "captcha: {msg}"),
            Self::Download(msg) => write!(f, "download: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Db(format!("invalid document: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Messaging(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
