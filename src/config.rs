//! Global configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Keyring service name under which secrets are stored.
pub const KEYRING_SERVICE: &str = "course-sentinel";

/// Portal endpoints used for login and session-validity probing.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PortalConfig {
    /// Page that starts the single sign-on flow.
    pub login_url: String,
    /// Host of the course portal; a location on this host means authenticated.
    pub portal_host: String,
    /// Hosts of the identity provider; a location on one of these means expired.
    #[serde(default)]
    pub login_hosts: Vec<String>,
}

/// Headless-browser helper process settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BrowserConfig {
    /// Helper binary speaking the NDJSON protocol on stdio.
    #[serde(default = "default_helper_command")]
    pub helper_command: String,
    /// Arguments passed to the helper binary.
    #[serde(default)]
    pub helper_args: Vec<String>,
    /// Override for the browser executable the helper drives.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// HTTP proxy used by the browser, downloads, and the messaging client.
    #[serde(default)]
    pub proxy: Option<String>,
    /// Maximum wait for the helper's ready line.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_seconds: u64,
    /// Maximum wait for a single helper request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            helper_command: default_helper_command(),
            helper_args: Vec::new(),
            executable: None,
            proxy: None,
            startup_timeout_seconds: default_startup_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_helper_command() -> String {
    "portal-helper".into()
}

fn default_startup_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    60
}

/// Telegram destination settings.
///
/// The bot token is loaded at runtime via OS keychain or environment
/// variables, not from the TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TelegramConfig {
    /// Subscriber chat that receives notifications.
    pub chat_id: String,
    /// Admin chat that receives captchas and failure alerts.
    pub admin_chat_id: String,
    /// Forum topic inside the subscriber chat.
    #[serde(default)]
    pub topic_id: Option<i64>,
    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Bot token (populated at runtime).
    #[serde(skip)]
    pub bot_token: String,
}

fn default_api_base() -> String {
    "https://api.telegram.org".into()
}

/// Login retry and captcha hand-off tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Login attempts before the cycle is abandoned.
    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,
    /// Delay between login attempts.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,
    /// Interval between admin-reply polls while a captcha is pending.
    #[serde(default = "default_captcha_poll")]
    pub captcha_poll_seconds: u64,
    /// Maximum age of an admin reply for it to count as fresh.
    #[serde(default = "default_captcha_window")]
    pub captcha_reply_window_seconds: u64,
    /// Captcha wait limit; 0 means wait indefinitely.
    #[serde(default)]
    pub captcha_timeout_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_attempts: default_login_attempts(),
            retry_backoff_seconds: default_retry_backoff(),
            captcha_poll_seconds: default_captcha_poll(),
            captcha_reply_window_seconds: default_captcha_window(),
            captcha_timeout_seconds: 0,
        }
    }
}

fn default_login_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    10
}

fn default_captcha_poll() -> u64 {
    2
}

fn default_captcha_window() -> u64 {
    30
}

/// Trigger gating.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleConfig {
    /// Start of the nightly quiet window, local `HH:MM`.
    #[serde(default = "default_quiet_start")]
    pub quiet_start: String,
    /// End of the nightly quiet window, local `HH:MM` (exclusive).
    #[serde(default = "default_quiet_end")]
    pub quiet_end: String,
    /// Hard limit for processing one course.
    #[serde(default = "default_course_timeout")]
    pub course_timeout_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            quiet_start: default_quiet_start(),
            quiet_end: default_quiet_end(),
            course_timeout_seconds: default_course_timeout(),
        }
    }
}

fn default_quiet_start() -> String {
    "00:30".into()
}

fn default_quiet_end() -> String {
    "07:30".into()
}

fn default_course_timeout() -> u64 {
    120
}

/// Attachment delivery limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DeliveryConfig {
    /// Largest file sent as a document; bigger files get a link-only notice.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Download timeout.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            download_timeout_seconds: default_download_timeout(),
        }
    }
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_download_timeout() -> u64 {
    120
}

/// Portal account credentials (populated at runtime).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Portal user name.
    pub username: String,
    /// Portal password.
    pub password: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/course-sentinel.db")
}

fn default_files_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_check_interval() -> u64 {
    5
}

fn default_utc_offset_minutes() -> i32 {
    210
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory where downloaded attachments are kept.
    #[serde(default = "default_files_dir")]
    pub files_dir: PathBuf,
    /// Minutes between check cycles.
    #[serde(default = "default_check_interval")]
    pub check_interval_minutes: u64,
    /// Verbose logging.
    #[serde(default)]
    pub debug: bool,
    /// Operating time zone as an offset from UTC in minutes.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Course page URLs, processed in this order.
    pub courses: Vec<String>,
    /// Portal endpoints.
    pub portal: PortalConfig,
    /// Browser helper settings.
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Telegram destinations.
    pub telegram: TelegramConfig,
    /// Login and captcha tuning.
    #[serde(default)]
    pub session: SessionConfig,
    /// Trigger gating.
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Attachment delivery limits.
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Portal account (populated at runtime).
    #[serde(skip)]
    pub credentials: Credentials,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load portal and Telegram secrets from OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env vars provide
    /// a required secret.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.credentials.username = load_credential("vu_username", "VU_USERNAME").await?;
        self.credentials.password = load_credential("vu_password", "VU_PASSWORD").await?;
        self.telegram.bot_token =
            load_credential("telegram_bot_token", "TELEGRAM_BOT_TOKEN").await?;
        Ok(())
    }

    /// Operating time zone.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the offset is out of range.
    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            AppError::Config(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }

    /// Quiet window bounds as local times.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if either bound is not `HH:MM`.
    pub fn quiet_hours(&self) -> Result<(NaiveTime, NaiveTime)> {
        Ok((
            parse_clock(&self.schedule.quiet_start)?,
            parse_clock(&self.schedule.quiet_end)?,
        ))
    }

    /// Interval between check cycles.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }

    /// Course used to probe whether the session is still valid.
    #[must_use]
    pub fn probe_url(&self) -> Option<&str> {
        self.courses.first().map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        if self.courses.is_empty() {
            return Err(AppError::Config("courses must not be empty".into()));
        }

        if self.check_interval_minutes == 0 {
            return Err(AppError::Config(
                "check_interval_minutes must be greater than zero".into(),
            ));
        }

        if self.session.login_attempts == 0 {
            return Err(AppError::Config(
                "session.login_attempts must be greater than zero".into(),
            ));
        }

        if self.session.captcha_poll_seconds == 0 {
            return Err(AppError::Config(
                "session.captcha_poll_seconds must be greater than zero".into(),
            ));
        }

        if self.portal.portal_host.is_empty() {
            return Err(AppError::Config("portal.portal_host must not be empty".into()));
        }

        self.utc_offset()?;
        self.quiet_hours()?;

        Ok(())
    }
}

fn parse_clock(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|err| AppError::Config(format!("invalid time of day {raw:?}: {err}")))
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // Try OS keychain first via spawn_blocking (keyring is synchronous I/O).
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    // Fallback to environment variable.
    env::var(env_key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::Config(format!(
                "credential {keyring_key} not found in keychain or {env_key} env var"
            ))
        })
}
