//! Request/response client for the portal helper.
//!
//! Requests are `{"id", "method", "params"}` lines on stdin; the helper
//! answers with `{"id", "result"}` or `{"id", "error": {"kind",
//! "message"}}`. Responses with an id other than the outstanding one are
//! leftovers from a timed-out request and are skipped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdout;
use tokio::sync::Mutex;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::extract::ContentExtractor;
use crate::models::course::{AssignmentDetails, CourseSnapshot};
use crate::session::{BrowsingContext, SessionCookies};
use crate::{AppError, Result};

use super::codec::HelperCodec;
use super::process::{spawn_helper, HelperConfig, HelperConnection};

#[derive(Debug, Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<HelperError>,
}

#[derive(Debug, Deserialize)]
struct HelperError {
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LocationResult {
    location: String,
}

#[derive(Debug, Deserialize)]
struct PingResult {
    alive: bool,
}

#[derive(Debug, Deserialize)]
struct CredentialsResult {
    #[serde(default)]
    captcha_png: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cookie {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct CookiesResult {
    cookies: Vec<Cookie>,
    #[serde(default)]
    user_agent: String,
}

fn map_helper_error(error: HelperError) -> AppError {
    let HelperError { kind, message } = error;
    match kind.as_str() {
        "login_required" => AppError::LoginRequired(message),
        "navigation" => AppError::Navigation(message),
        "timeout" => AppError::Timeout(message),
        "extraction" => AppError::Extraction(message),
        "not_found" => AppError::NotFound(message),
        _ => AppError::Browser(format!("{kind}: {message}")),
    }
}

async fn read_response(
    reader: &mut FramedRead<ChildStdout, HelperCodec>,
    id: u64,
) -> Result<Value> {
    loop {
        let Some(frame) = reader.next().await else {
            return Err(AppError::Browser("portal helper closed its output".into()));
        };
        let line = frame?;
        let response: Response = match serde_json::from_str(&line) {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "skipping malformed helper line");
                continue;
            }
        };
        if response.id != id {
            debug!(expected = id, received = response.id, "skipping stale helper response");
            continue;
        }
        if let Some(error) = response.error {
            return Err(map_helper_error(error));
        }
        return Ok(response.result.unwrap_or(Value::Null));
    }
}

/// Browsing context and content extractor backed by the helper process.
///
/// All calls go through one mutex, so at most one request is in flight.
pub struct PortalHelper {
    config: HelperConfig,
    request_timeout: Duration,
    connection: Mutex<Option<HelperConnection>>,
    next_id: AtomicU64,
}

impl PortalHelper {
    /// Helper client; the process is started by [`BrowsingContext::launch`].
    #[must_use]
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            config: HelperConfig::from(config),
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let mut guard = self.connection.lock().await;
        let connection = guard
            .as_mut()
            .ok_or_else(|| AppError::Browser("browsing context is not running".into()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut bytes = serde_json::to_vec(&Request { id, method, params })
            .map_err(|err| AppError::Browser(format!("failed to encode request: {err}")))?;
        bytes.push(b'\n');
        connection
            .stdin
            .write_all(&bytes)
            .await
            .map_err(|err| AppError::Browser(format!("write to helper failed: {err}")))?;

        let value = tokio::time::timeout(
            self.request_timeout,
            read_response(&mut connection.stdout, id),
        )
        .await
        .map_err(|_elapsed| {
            AppError::Timeout(format!(
                "{method} did not complete within {:?}",
                self.request_timeout
            ))
        })??;

        serde_json::from_value(value)
            .map_err(|err| AppError::Extraction(format!("{method}: unexpected result: {err}")))
    }

    async fn close(&self) -> Result<()> {
        let Some(mut connection) = self.connection.lock().await.take() else {
            return Ok(());
        };
        let line = format!("{}\n", json!({ "id": 0, "method": "shutdown", "params": {} }));
        if let Err(err) = connection.stdin.write_all(line.as_bytes()).await {
            debug!(%err, "helper already gone");
        }
        match tokio::time::timeout(Duration::from_secs(5), connection.child.wait()).await {
            Ok(_) => Ok(()),
            Err(_elapsed) => connection
                .child
                .kill()
                .await
                .map_err(|err| AppError::Browser(format!("failed to kill helper: {err}"))),
        }
    }
}

impl BrowsingContext for PortalHelper {
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.close().await?;
            let connection = spawn_helper(&self.config).await?;
            *self.connection.lock().await = Some(connection);
            Ok(())
        })
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move {
            {
                let mut guard = self.connection.lock().await;
                let Some(connection) = guard.as_mut() else {
                    return Ok(false);
                };
                if connection.child.try_wait()?.is_some() {
                    return Ok(false);
                }
            }
            match self.call::<PingResult>("ping", json!({})).await {
                Ok(result) => Ok(result.alive),
                Err(err) if err.is_transient() => {
                    debug!(%err, "helper ping failed");
                    Ok(false)
                }
                Err(err) => Err(err),
            }
        })
    }

    fn navigate(&self, url: &str) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        let params = json!({ "url": url });
        Box::pin(async move {
            let result: LocationResult = self.call("navigate", params).await?;
            Ok(result.location)
        })
    }

    fn open_login_form(
        &self,
        login_url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let params = json!({ "url": login_url });
        Box::pin(async move {
            let _: Value = self.call("open_login_form", params).await?;
            Ok(())
        })
    }

    fn enter_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + '_>> {
        let params = json!({ "username": username, "password": password });
        Box::pin(async move {
            let result: CredentialsResult = self.call("enter_credentials", params).await?;
            result
                .captcha_png
                .map(|encoded| {
                    STANDARD
                        .decode(encoded)
                        .map_err(|err| AppError::Browser(format!("invalid captcha image: {err}")))
                })
                .transpose()
        })
    }

    fn enter_captcha(&self, code: &str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let params = json!({ "code": code });
        Box::pin(async move {
            let _: Value = self.call("enter_captcha", params).await?;
            Ok(())
        })
    }

    fn submit_login(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let result: LocationResult = self.call("submit_login", json!({})).await?;
            Ok(result.location)
        })
    }

    fn session_cookies(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<SessionCookies>> + Send + '_>> {
        Box::pin(async move {
            let result: CookiesResult = self.call("session_cookies", json!({})).await?;
            let cookie_header = result
                .cookies
                .iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value))
                .collect::<Vec<_>>()
                .join("; ");
            Ok(SessionCookies {
                cookie_header,
                user_agent: result.user_agent,
            })
        })
    }

    fn clear_cache(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let _: Value = self.call("clear_cache", json!({})).await?;
            Ok(())
        })
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.close())
    }
}

impl ContentExtractor for PortalHelper {
    fn extract_sections(
        &self,
        course_url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<CourseSnapshot>> + Send + '_>> {
        let params = json!({ "url": course_url });
        Box::pin(async move { self.call("extract_sections", params).await })
    }

    fn extract_assignment_details(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AssignmentDetails>> + Send + '_>> {
        let params = json!({ "url": url });
        Box::pin(async move { self.call("extract_assignment_details", params).await })
    }

    fn extract_quiz_details(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<AssignmentDetails>> + Send + '_>> {
        let params = json!({ "url": url });
        Box::pin(async move { self.call("extract_quiz_details", params).await })
    }
}
