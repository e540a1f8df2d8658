//! WeCom (WeChat Work) group-robot webhook.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::DeliveryError;
use crate::notify::PushChannel;
use crate::types::NotificationMessage;

/// WeCom rejects text messages longer than this many characters.
pub const MAX_CONTENT_CHARS: usize = 4096;

#[derive(Clone)]
pub struct WeComChannel {
    webhook_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct WeComResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl WeComChannel {
    pub fn new(webhook_url: String, http: Client) -> Self {
        Self { webhook_url, http }
    }
}

/// Cut `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl PushChannel for WeComChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        let payload = json!({
            "msgtype": "text",
            "text": { "content": truncate_chars(&message.body, MAX_CONTENT_CHARS) },
        });

        let response = self.http.post(&self.webhook_url).json(&payload).send().await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Status {
                status: response.status().as_u16(),
            });
        }

        let body: WeComResponse = response.json().await?;
        if body.errcode != 0 {
            return Err(DeliveryError::Rejected {
                code: body.errcode,
                message: body.errmsg,
            });
        }

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "wecom"
    }
}
