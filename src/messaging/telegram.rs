//! Telegram Bot API gateway over `reqwest`.
//!
//! Text calls are JSON POSTs; documents and photos are multipart uploads.
//! Rate-limited calls are retried honoring `retry_after`, with a bounded
//! exponential backoff otherwise.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;
use crate::models::message::MessageHandle;
use crate::{AppError, Result};

use super::{AdminReply, Audience, MessagingGateway, OutboundMessage};

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<IncomingMessage>,
}

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramGateway {
    http: Client,
    base_url: String,
    chat_id: String,
    admin_chat_id: String,
    topic_id: Option<i64>,
}

impl TelegramGateway {
    /// Build a gateway from configuration. The bot token must already be
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the token is missing or the HTTP
    /// client (or proxy) cannot be built.
    pub fn new(config: &TelegramConfig, proxy: Option<&str>) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(AppError::Config("telegram bot token not loaded".into()));
        }

        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|err| AppError::Config(format!("invalid proxy: {err}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: format!(
                "{}/bot{}",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
            admin_chat_id: config.admin_chat_id.clone(),
            topic_id: config.topic_id,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    fn chat_for(&self, audience: Audience) -> &str {
        match audience {
            Audience::Subscribers => &self.chat_id,
            Audience::Admin => &self.admin_chat_id,
        }
    }

    fn topic_for(&self, audience: Audience) -> Option<i64> {
        match audience {
            Audience::Subscribers => self.topic_id,
            Audience::Admin => None,
        }
    }

    /// Run one Bot API call, retrying when rate limited.
    async fn execute<T, F>(&self, method: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = INITIAL_RETRY_DELAY;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = match build().send().await {
                Ok(response) => response,
                Err(err) if attempt < MAX_ATTEMPTS && (err.is_connect() || err.is_timeout()) => {
                    warn!(method, %err, delay = ?backoff, "telegram request failed; retrying");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_RETRY_DELAY);
                    continue;
                }
                Err(err) => {
                    return Err(AppError::Messaging(format!("{method}: {err}")));
                }
            };

            let body: ApiResponse<T> = response
                .json()
                .await
                .map_err(|err| AppError::Messaging(format!("{method}: invalid response: {err}")))?;

            if body.ok {
                return body
                    .result
                    .ok_or_else(|| AppError::Messaging(format!("{method}: missing result")));
            }

            let description = body.description.unwrap_or_default();
            if body.error_code == Some(429) && attempt < MAX_ATTEMPTS {
                let delay = body
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map_or(backoff, Duration::from_secs);
                warn!(method, delay = ?delay, "telegram rate limited; retrying");
                sleep(delay).await;
                backoff = (backoff * 2).min(MAX_RETRY_DELAY);
                continue;
            }

            return Err(classify_error(method, body.error_code, &description));
        }
    }

    async fn upload(
        &self,
        method: &'static str,
        field: &'static str,
        audience: Audience,
        bytes: Vec<u8>,
        file_name: String,
        caption: String,
    ) -> Result<MessageHandle> {
        let chat_id = self.chat_for(audience).to_owned();
        let topic = self.topic_for(audience);
        let url = self.endpoint(method);

        let sent: SentMessage = self
            .execute(method, || {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                let mut form = Form::new()
                    .text("chat_id", chat_id.clone())
                    .text("caption", caption.clone())
                    .part(field, part);
                if let Some(topic) = topic {
                    form = form.text("message_thread_id", topic.to_string());
                }
                self.http.post(&url).multipart(form)
            })
            .await?;

        info!(method, message_id = sent.message_id, "telegram upload sent");
        Ok(MessageHandle {
            chat_id: sent.chat.id.to_string(),
            message_id: sent.message_id,
        })
    }
}

/// Map a Bot API error description to an `AppError`.
fn classify_error(method: &str, code: Option<i64>, description: &str) -> AppError {
    let lowered = description.to_ascii_lowercase();
    if lowered.contains("message to edit not found") || lowered.contains("message_id_invalid") {
        AppError::NotFound(format!("{method}: {description}"))
    } else {
        AppError::Messaging(format!(
            "{method} failed ({}): {description}",
            code.unwrap_or_default()
        ))
    }
}

impl MessagingGateway for TelegramGateway {
    fn send_message(
        &self,
        message: OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<MessageHandle>> + Send + '_>> {
        Box::pin(async move {
            let mut body = json!({
                "chat_id": self.chat_for(message.audience),
                "text": message.text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            });
            if let Some(topic) = self.topic_for(message.audience) {
                body["message_thread_id"] = json!(topic);
            }
            if let Some(button) = &message.link_button {
                body["reply_markup"] = json!({
                    "inline_keyboard": [[{ "text": button.text, "url": button.url }]]
                });
            }

            let url = self.endpoint("sendMessage");
            let sent: SentMessage = self
                .execute("sendMessage", || self.http.post(&url).json(&body))
                .await?;
            debug!(message_id = sent.message_id, "telegram message sent");
            Ok(MessageHandle {
                chat_id: sent.chat.id.to_string(),
                message_id: sent.message_id,
            })
        })
    }

    fn edit_message(
        &self,
        handle: &MessageHandle,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let body = json!({
            "chat_id": handle.chat_id,
            "message_id": handle.message_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        Box::pin(async move {
            let url = self.endpoint("editMessageText");
            match self
                .execute::<Value, _>("editMessageText", || self.http.post(&url).json(&body))
                .await
            {
                Ok(_) => Ok(()),
                Err(AppError::Messaging(msg)) if msg.contains("message is not modified") => {
                    debug!("telegram message unchanged");
                    Ok(())
                }
                Err(err) => Err(err),
            }
        })
    }

    fn send_document(
        &self,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageHandle>> + Send + '_>> {
        let path = path.to_path_buf();
        let file_name = file_name.to_owned();
        let caption = caption.to_owned();
        Box::pin(async move {
            let bytes = tokio::fs::read(&path).await?;
            self.upload(
                "sendDocument",
                "document",
                Audience::Subscribers,
                bytes,
                file_name,
                caption,
            )
            .await
        })
    }

    fn send_photo(
        &self,
        audience: Audience,
        image: Vec<u8>,
        caption: &str,
    ) -> Pin<Box<dyn Future<Output = Result<MessageHandle>> + Send + '_>> {
        let caption = caption.to_owned();
        Box::pin(async move {
            self.upload(
                "sendPhoto",
                "photo",
                audience,
                image,
                "captcha.png".to_owned(),
                caption,
            )
            .await
        })
    }

    fn poll_admin_reply(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Option<AdminReply>>> + Send + '_>> {
        Box::pin(async move {
            let body = json!({ "offset": -1, "limit": 1, "allowed_updates": ["message"] });
            let url = self.endpoint("getUpdates");
            let updates: Vec<Update> = self
                .execute("getUpdates", || self.http.post(&url).json(&body))
                .await?;

            Ok(updates.into_iter().last().and_then(|update| {
                let message = update.message?;
                Some(AdminReply {
                    update_id: update.update_id,
                    chat_id: message.chat.id.to_string(),
                    text: message.text,
                    date: DateTime::<Utc>::from_timestamp(message.date, 0)?,
                })
            }))
        })
    }
}
