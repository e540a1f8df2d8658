//! ServerChan (Server酱) push.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::DeliveryError;
use crate::notify::PushChannel;
use crate::types::NotificationMessage;

pub const DEFAULT_BASE_URL: &str = "https://sctapi.ftqq.com";

#[derive(Clone)]
pub struct ServerChanChannel {
    base_url: String,
    sendkey: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ServerChanResponse {
    code: i64,
    #[serde(default)]
    message: String,
}

impl ServerChanChannel {
    pub fn new(sendkey: String, http: Client) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), sendkey, http)
    }

    pub fn with_base_url(base_url: String, sendkey: String, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            sendkey,
            http,
        }
    }

    fn send_url(&self) -> String {
        format!("{}/{}.send", self.base_url, self.sendkey)
    }
}

#[async_trait]
impl PushChannel for ServerChanChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        let desp = format!("{}\n\n{}", message.body, message.link);
        let form = [("title", message.title.as_str()), ("desp", desp.as_str())];

        let response = self.http.post(self.send_url()).form(&form).send().await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Status {
                status: response.status().as_u16(),
            });
        }

        let body: ServerChanResponse = response.json().await?;
        if body.code != 0 {
            return Err(DeliveryError::Rejected {
                code: body.code,
                message: body.message,
            });
        }

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "serverchan"
    }
}
