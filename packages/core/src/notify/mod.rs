//! Notification formatting and push channel delivery.
//!
//! [`Notifier`] renders one [`NotificationMessage`] per post and hands it to
//! a [`PushChannel`]. Channels are black boxes: a message is either
//! delivered or fails with a [`DeliveryError`].

pub mod serverchan;
pub mod wecom;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::types::{Account, NotificationMessage, PostRecord};

pub use serverchan::ServerChanChannel;
pub use wecom::WeComChannel;

/// Label placed before the original text in bilingual messages.
pub const ORIGINAL_LABEL: &str = "原文";

/// A push-notification transport.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError>;

    fn channel_name(&self) -> &str;
}

/// Render the fixed notification template.
///
/// When `translated` is blank or identical to the original, the message
/// carries the original text only; there is no translated line.
pub fn format_message(account: &Account, post: &PostRecord, translated: &str) -> NotificationMessage {
    let original = post.text.trim();
    let translated = translated.trim();

    let body = if !translated.is_empty() && translated != original {
        format!(
            "@{account}:\n{translated}\n\n{ORIGINAL_LABEL}: {original}\n{url}",
            url = post.url
        )
    } else {
        format!("@{account}: {original}\n{url}", url = post.url)
    };

    NotificationMessage {
        title: format!("@{account} 最新推文"),
        body,
        link: post.url.clone(),
    }
}

/// Formats posts and delivers them through a push channel, one message per
/// post.
#[derive(Clone)]
pub struct Notifier {
    channel: Arc<dyn PushChannel>,
}

impl Notifier {
    pub fn new(channel: Arc<dyn PushChannel>) -> Self {
        Self { channel }
    }

    pub fn channel_name(&self) -> &str {
        self.channel.channel_name()
    }

    pub async fn notify(
        &self,
        account: &Account,
        post: &PostRecord,
        translated: &str,
    ) -> Result<(), DeliveryError> {
        let message = format_message(account, post, translated);
        self.channel.send(&message).await
    }
}
