use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::config::{TelegramConfig, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::notify::AlertDispatcher;
use crate::types::Alert;

/// Telegram Bot API `sendMessage` acknowledgment.
#[derive(Debug, Deserialize)]
struct SendAck {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramDispatcher {
    client: reqwest::Client,
    cfg: TelegramConfig,
}

impl TelegramDispatcher {
    pub fn new(cfg: TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, cfg })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.cfg.api_base.trim_end_matches('/'),
            self.cfg.bot_token
        )
    }
}

#[async_trait]
impl AlertDispatcher for TelegramDispatcher {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let text = alert.to_string();
        info!(link = %alert.link, ratio = alert.ratio, "Sending Telegram alert");

        let resp = self
            .client
            .get(self.send_url())
            .query(&[("chat_id", self.cfg.chat_id.as_str()), ("text", text.as_str())])
            .send()
            .await
            .map_err(|e| AppError::Dispatch(format!("request failed: {}", e.without_url())))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        check_ack(status, &body)?;
        info!(link = %alert.link, "Telegram alert delivered");
        Ok(())
    }
}

/// A send counts as delivered only on a 2xx status with `ok: true`.
fn check_ack(status: reqwest::StatusCode, body: &str) -> Result<()> {
    let ack: Option<SendAck> = serde_json::from_str(body).ok();
    match (status.is_success(), ack) {
        (true, Some(SendAck { ok: true, .. })) => Ok(()),
        (_, Some(SendAck { description, .. })) => Err(AppError::Dispatch(format!(
            "channel rejected message ({status}): {}",
            description.unwrap_or_else(|| "no description".to_string())
        ))),
        (_, None) => Err(AppError::Dispatch(format!("unexpected response ({status})"))),
    }
}
