//! Human-in-the-loop captcha hand-off.
//!
//! The captcha image goes to the admin chat with a correlation id; the
//! broker then polls the admin conversation until a fresh reply arrives.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::messaging::templates;
use crate::messaging::{AdminReply, Audience, MessagingGateway, OutboundMessage};
use crate::{AppError, Result};

/// Whether `reply` answers a pending captcha.
///
/// A reply counts when it comes from the admin chat, carries non-empty
/// text, is younger than `window`, and is newer than the last consumed
/// update. Returns the trimmed code.
#[must_use]
pub fn accepts_reply(
    reply: &AdminReply,
    admin_chat_id: &str,
    now: DateTime<Utc>,
    window: chrono::Duration,
    last_consumed: Option<i64>,
) -> Option<String> {
    if reply.chat_id != admin_chat_id {
        return None;
    }
    if last_consumed.is_some_and(|id| reply.update_id <= id) {
        return None;
    }
    if now - reply.date >= window {
        return None;
    }
    let code = reply.text.as_deref()?.trim();
    if code.is_empty() {
        return None;
    }
    Some(code.to_owned())
}

/// Relays captcha challenges to the admin and collects the answer.
pub struct CaptchaBroker {
    gateway: Arc<dyn MessagingGateway>,
    admin_chat_id: String,
    poll_interval: Duration,
    reply_window: chrono::Duration,
    timeout: Option<Duration>,
    last_consumed: Mutex<Option<i64>>,
    clock: Clock,
}

impl CaptchaBroker {
    /// Create a broker. A `timeout` of `None` waits indefinitely.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn MessagingGateway>,
        admin_chat_id: String,
        poll_interval: Duration,
        reply_window: Duration,
        timeout: Option<Duration>,
        clock: Clock,
    ) -> Self {
        Self {
            gateway,
            admin_chat_id,
            poll_interval,
            reply_window: chrono::Duration::from_std(reply_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(30)),
            timeout,
            last_consumed: Mutex::new(None),
            clock,
        }
    }

    /// Send `image` to the admin and wait for the code.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Captcha` on timeout, or the gateway error if the
    /// image cannot be sent.
    pub async fn solve(&self, image: Vec<u8>) -> Result<String> {
        let correlation_id = Uuid::new_v4();
        let span = info_span!("captcha", %correlation_id);

        async move {
            self.gateway
                .send_photo(
                    Audience::Admin,
                    image,
                    &templates::captcha_prompt(&correlation_id.to_string()),
                )
                .await?;
            info!("captcha sent to admin, waiting for reply");

            let code = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, self.wait_for_reply())
                    .await
                    .map_err(|_| {
                        AppError::Captcha(format!(
                            "no reply for challenge {correlation_id} within {limit:?}"
                        ))
                    })??,
                None => self.wait_for_reply().await?,
            };

            if let Err(err) = self
                .gateway
                .send_message(OutboundMessage::admin(templates::captcha_ack()))
                .await
            {
                warn!(%err, "failed to acknowledge captcha reply");
            }
            info!("captcha reply received");
            Ok(code)
        }
        .instrument(span)
        .await
    }

    async fn wait_for_reply(&self) -> Result<String> {
        loop {
            match self.gateway.poll_admin_reply().await {
                Ok(Some(reply)) => {
                    let mut last = self.last_consumed.lock().await;
                    if let Some(code) = accepts_reply(
                        &reply,
                        &self.admin_chat_id,
                        (self.clock)(),
                        self.reply_window,
                        *last,
                    ) {
                        *last = Some(reply.update_id);
                        return Ok(code);
                    }
                    debug!(update_id = reply.update_id, "ignoring admin message");
                }
                Ok(None) => {}
                Err(err) => warn!(%err, "admin reply poll failed"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
