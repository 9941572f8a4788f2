//! Attachment download and delivery.

use std::future::Future;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Client;
use sha2::{Digest, Sha256};
use tracing::{info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::messaging::templates;
use crate::messaging::OutboundMessage;
use crate::models::course::{Attachment, FileSentRecord};
use crate::persistence::state::MonitorState;
use crate::session::SessionCookies;
use crate::{AppError, Result};

use super::Collaborators;

/// Smallest body accepted as a real file.
pub const MIN_FILE_BYTES: usize = 100;

/// Downloaded body and its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Response body.
    pub bytes: Vec<u8>,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
}

/// Authenticated attachment download.
pub trait FileFetcher: Send + Sync {
    /// Download `url` with the session's cookies and user agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Download` on transport or HTTP status failure.
    fn fetch(
        &self,
        url: &str,
        cookies: &SessionCookies,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedFile>> + Send + '_>>;
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFileFetcher {
    http: Client,
}

impl HttpFileFetcher {
    /// Build a fetcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the client or proxy cannot be built.
    pub fn new(config: &GlobalConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.delivery.download_timeout_seconds));
        if let Some(proxy) = &config.browser.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|err| AppError::Config(format!("invalid proxy: {err}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self { http })
    }
}

impl FileFetcher for HttpFileFetcher {
    fn fetch(
        &self,
        url: &str,
        cookies: &SessionCookies,
    ) -> Pin<Box<dyn Future<Output = Result<FetchedFile>> + Send + '_>> {
        let url = url.to_owned();
        let cookies = cookies.clone();
        Box::pin(async move {
            let mut request = self.http.get(&url).header(COOKIE, cookies.cookie_header);
            if !cookies.user_agent.is_empty() {
                request = request.header(USER_AGENT, cookies.user_agent);
            }
            let response = request
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| AppError::Download(format!("{url}: {err}")))?;

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let bytes = response
                .bytes()
                .await
                .map_err(|err| AppError::Download(format!("{url}: {err}")))?;

            Ok(FetchedFile {
                bytes: bytes.to_vec(),
                content_type,
            })
        })
    }
}

/// Reject bodies that cannot be the requested file.
///
/// # Errors
///
/// Returns `AppError::Download` for HTML pages (usually the login page of
/// an expired session) and for bodies under [`MIN_FILE_BYTES`].
pub fn validate_download(file: &FetchedFile) -> Result<()> {
    if file
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    {
        return Err(AppError::Download(
            "received an HTML page; the session may have expired".into(),
        ));
    }
    if file.bytes.len() < MIN_FILE_BYTES {
        return Err(AppError::Download(format!(
            "response too small ({} bytes)",
            file.bytes.len()
        )));
    }
    Ok(())
}

const RESERVED: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Make a portal file name safe to store and send.
///
/// Zero-width characters are dropped, reserved characters become `_`,
/// whitespace around dots and repeated dots collapse, and a copy of the
/// extension repeated inside the name is removed.
#[must_use]
pub fn normalize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .map(|c| {
            if RESERVED.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let mut parts: Vec<&str> = cleaned
        .split('.')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    if parts.len() > 2 {
        let ext = parts[parts.len() - 1];
        let last = parts.len() - 1;
        let mut index = 0;
        parts.retain(|part| {
            let keep = index == 0 || index == last || !part.eq_ignore_ascii_case(ext);
            index += 1;
            keep
        });
    }

    let joined = parts.join(".");
    let trimmed = joined.trim_end_matches(['.', ' ']).trim();
    if trimmed.is_empty() {
        "file".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// How an attachment was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Already delivered earlier.
    AlreadySent,
    /// Uploaded as a document.
    Sent,
    /// Too large; a link was sent instead.
    LinkOnly,
    /// Download or upload failed; a fallback notice was attempted.
    Failed,
}

/// Write `bytes` to `path` via a temporary file in the same directory.
async fn write_atomically(path: PathBuf, bytes: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| AppError::Io(format!("no parent directory: {}", path.display())))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|err| AppError::Io(err.to_string()))?;
        Ok(())
    })
    .await
    .map_err(|err| AppError::Io(format!("file write task failed: {err}")))?
}

fn local_path(files_dir: &Path, course_id: &str, file_name: &str) -> PathBuf {
    files_dir
        .join(normalize_file_name(course_id))
        .join(file_name)
}

/// Download and send one attachment, recording it on success.
///
/// Download and upload failures are logged and answered with a fallback
/// notice; they do not fail the caller.
///
/// # Errors
///
/// Returns `AppError::Db` if recording the delivery fails.
pub async fn deliver_file(
    deps: &Collaborators,
    state: &mut MonitorState,
    course_id: &str,
    attachment: &Attachment,
) -> Result<DeliveryOutcome> {
    let already = state
        .courses
        .get(course_id)
        .is_some_and(|course| course.sent_files.contains_key(&attachment.url));
    if already {
        return Ok(DeliveryOutcome::AlreadySent);
    }

    let span = info_span!("deliver_file", course_id, file_url = %attachment.url);
    async move {
        let file_name = normalize_file_name(&attachment.file_name);
        match transfer(deps, course_id, attachment, &file_name).await {
            Ok((outcome, local_path, sha256)) => {
                let record = FileSentRecord {
                    sent: true,
                    file_name,
                    local_path,
                    sha256: Some(sha256),
                    sent_at: deps.now(),
                };
                if let Some(course) = state.courses.get_mut(course_id) {
                    course
                        .sent_files
                        .entry(attachment.url.clone())
                        .or_insert(record);
                }
                deps.flush(state).await?;
                info!(?outcome, "attachment delivered");
                Ok(outcome)
            }
            Err(err) => {
                warn!(%err, "attachment delivery failed");
                let notice = OutboundMessage::subscribers(templates::file_failed(
                    &file_name,
                    &attachment.url,
                ));
                if let Err(send_err) = deps.gateway.send_message(notice).await {
                    warn!(%send_err, "failed to send delivery fallback notice");
                }
                Ok(DeliveryOutcome::Failed)
            }
        }
    }
    .instrument(span)
    .await
}

async fn transfer(
    deps: &Collaborators,
    course_id: &str,
    attachment: &Attachment,
    file_name: &str,
) -> Result<(DeliveryOutcome, Option<PathBuf>, String)> {
    let cookies = deps.browser.session_cookies().await?;
    let fetched = deps.fetcher.fetch(&attachment.url, &cookies).await?;
    validate_download(&fetched)?;

    let sha256 = sha256_hex(&fetched.bytes);
    let size = u64::try_from(fetched.bytes.len()).unwrap_or(u64::MAX);

    if size > deps.config.delivery.max_upload_bytes {
        deps.gateway
            .send_message(OutboundMessage::subscribers(templates::file_too_large(
                file_name,
                &attachment.url,
                size,
            )))
            .await?;
        return Ok((DeliveryOutcome::LinkOnly, None, sha256));
    }

    let path = local_path(&deps.config.files_dir, course_id, file_name);
    write_atomically(path.clone(), fetched.bytes).await?;
    deps.gateway
        .send_document(&path, file_name, &templates::file_caption(file_name))
        .await?;
    Ok((DeliveryOutcome::Sent, Some(path), sha256))
}
