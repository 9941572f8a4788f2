//! Portal helper process spawner.
//!
//! The helper is launched with:
//! - `kill_on_drop(true)` so a dropped connection never leaves a browser
//!   running.
//! - `env_clear()` plus a small allowlist, so the bot token and portal
//!   password in our environment never reach the helper.
//! - A startup timeout: the helper must print its ready line within the
//!   window or it is killed.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::FramedRead;
use tracing::info;

use crate::config::BrowserConfig;
use crate::{AppError, Result};

use super::codec::HelperCodec;

/// Environment variables inherited by the helper process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    "DISPLAY",
    "XDG_RUNTIME_DIR",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "LOCALAPPDATA",
];

/// Variable carrying the browser executable override.
pub const EXECUTABLE_ENV: &str = "PORTAL_BROWSER_EXECUTABLE";

/// Variable carrying the outbound proxy.
pub const PROXY_ENV: &str = "PORTAL_PROXY";

/// How to start the helper.
#[derive(Debug, Clone)]
pub struct HelperConfig {
    /// Helper binary.
    pub command: String,
    /// Arguments passed to the helper.
    pub args: Vec<String>,
    /// Browser executable override.
    pub executable: Option<PathBuf>,
    /// Proxy endpoint for the browser.
    pub proxy: Option<String>,
    /// Maximum wait for the ready line.
    pub startup_timeout: Duration,
}

impl From<&BrowserConfig> for HelperConfig {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            command: config.helper_command.clone(),
            args: config.helper_args.clone(),
            executable: config.executable.clone(),
            proxy: config.proxy.clone(),
            startup_timeout: Duration::from_secs(config.startup_timeout_seconds),
        }
    }
}

/// Live stdio connection to a helper.
#[derive(Debug)]
pub struct HelperConnection {
    /// Child handle; kept so `kill_on_drop` applies.
    pub child: Child,
    /// Request sink.
    pub stdin: ChildStdin,
    /// Framed response stream.
    pub stdout: FramedRead<ChildStdout, HelperCodec>,
}

/// Spawn the helper and wait for its ready line.
///
/// # Errors
///
/// - `AppError::Browser("failed to spawn portal helper: …")` on OS failure.
/// - `AppError::Browser("startup timeout …")` when no ready line arrives.
/// - `AppError::Browser("portal helper exited before ready signal")` on
///   early EOF.
pub async fn spawn_helper(config: &HelperConfig) -> Result<HelperConnection> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    if let Some(executable) = &config.executable {
        cmd.env(EXECUTABLE_ENV, executable);
    }
    if let Some(proxy) = &config.proxy {
        cmd.env(PROXY_ENV, proxy);
    }

    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Browser(format!("failed to spawn portal helper: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Browser("failed to capture helper stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Browser("failed to capture helper stdout".into()))?;

    let mut reader = FramedRead::new(stdout, HelperCodec::new());

    match tokio::time::timeout(config.startup_timeout, reader.next()).await {
        Ok(Some(Ok(line))) => {
            info!(ready_line = line.trim(), "portal helper ready");
        }
        Ok(Some(Err(err))) => {
            child.kill().await.ok();
            return Err(AppError::Browser(format!(
                "failed to read helper ready signal: {err}"
            )));
        }
        Ok(None) => {
            return Err(AppError::Browser(
                "portal helper exited before ready signal".into(),
            ));
        }
        Err(_elapsed) => {
            child.kill().await.ok();
            return Err(AppError::Browser(format!(
                "startup timeout: portal helper did not emit ready signal within {:?}",
                config.startup_timeout
            )));
        }
    }

    Ok(HelperConnection {
        child,
        stdin,
        stdout: reader,
    })
}
