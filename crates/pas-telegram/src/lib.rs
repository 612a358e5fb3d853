//! Telegram adapter (Bot API `sendMessage` over reqwest).
//!
//! This crate implements the `pas-core` Notifier port.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_retry::Retry;
use tracing::{error, info};

use pas_core::{
    config::NotificationConfig,
    errors::Error,
    formatting::{format_error_notification, ErrorReport},
    ports::Notifier,
    utils::{hostname, truncate_text},
    Result,
};

/// Characters of message text echoed into the log.
const LOG_TEXT_MAX: usize = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseMode {
    #[default]
    Html,
    Plain,
}

impl ParseMode {
    fn as_api(self) -> Option<&'static str> {
        match self {
            ParseMode::Html => Some("HTML"),
            ParseMode::Plain => None,
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatIdValue<'a> {
    Id(i64),
    Name(&'a str),
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: ChatIdValue<'a>,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_notification: bool,
}

#[derive(Clone, Debug)]
pub struct TelegramNotifier {
    cfg: NotificationConfig,
    http: reqwest::Client,
    api_url: String,
    hostname: String,
}

impl TelegramNotifier {
    pub fn new(cfg: NotificationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| Error::External(format!("telegram client build failed: {e}")))?;
        let api_url = format!("{}/bot{}", cfg.api_base.trim_end_matches('/'), cfg.token);
        Ok(Self {
            cfg,
            http,
            api_url,
            hostname: hostname(),
        })
    }

    fn chat_id(&self) -> ChatIdValue<'_> {
        match self.cfg.chat_id.parse::<i64>() {
            Ok(id) => ChatIdValue::Id(id),
            Err(_) => ChatIdValue::Name(&self.cfg.chat_id),
        }
    }

    /// One `sendMessage` call. Any transport error, timeout or non-2xx status
    /// is logged and reported as `false`.
    pub async fn send_message(&self, text: &str, parse_mode: ParseMode) -> bool {
        info!(text = %truncate_text(text, LOG_TEXT_MAX), "sending Telegram message");

        let body = SendMessage {
            chat_id: self.chat_id(),
            text,
            parse_mode: parse_mode.as_api(),
            disable_notification: self.cfg.disable_notification,
        };

        let resp = match self
            .http
            .post(format!("{}/sendMessage", self.api_url))
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                error!(timeout_secs = self.cfg.timeout.as_secs_f64(), "telegram request timed out");
                return false;
            }
            Err(e) => {
                // reqwest errors carry the URL, which carries the token.
                error!(error = %e.without_url(), "telegram request failed");
                return false;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(
                status = status.as_u16(),
                body = %truncate_text(&body, 200),
                "telegram rejected message"
            );
            return false;
        }

        info!("telegram message sent");
        true
    }

    /// One initial attempt plus up to `max_retries` retries, sleeping
    /// `base * 2^k` before retry `k`.
    pub async fn send_with_retry(&self, text: &str, max_retries: u32, base: Duration) -> bool {
        let total = max_retries + 1;
        let mut attempt = 0u32;
        let sent = Retry::spawn(retry_delays(max_retries, base), move || {
            attempt += 1;
            if attempt > 1 {
                info!(attempt, total, "retrying Telegram message");
            }
            async move {
                if self.send_message(text, ParseMode::Html).await {
                    Ok(())
                } else {
                    Err(())
                }
            }
        })
        .await;

        if sent.is_err() {
            error!(attempts = total, "telegram message not delivered");
        }
        sent.is_ok()
    }
}

/// Sleeps before each retry: `base * 2^k` for retry `k` (1-based).
fn retry_delays(max_retries: u32, base: Duration) -> impl Iterator<Item = Duration> {
    (1..=max_retries).map(move |k| base.saturating_mul(1u32 << k.min(16)))
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        self.send_with_retry(text, self.cfg.retry_count, self.cfg.retry_delay)
            .await
    }

    async fn send_error_notification(&self, error: &Error, context: &[(&str, &str)]) -> bool {
        let text = {
            let report = ErrorReport {
                kind: error.kind(),
                error,
                context,
                hostname: &self.hostname,
                now: chrono::Local::now().fixed_offset(),
            };
            format_error_notification(&report)
        };
        self.send(&text).await
    }
}
