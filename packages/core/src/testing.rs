//! Test doubles and fixtures shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{DeliveryError, FetchError, MirrorError, TranslationError};
use crate::notify::PushChannel;
use crate::sources::{FeedSource, FetchedFeed};
use crate::translate::Translator;
use crate::types::{Account, NotificationMessage, PostRecord};

// ---- Feed fixtures ----------------------------------------------------------

pub struct FixtureItem {
    pub id: u64,
    pub text: String,
    pub published: DateTime<Utc>,
    pub author: Option<String>,
}

impl FixtureItem {
    pub fn new(id: u64, text: &str, published: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.to_string(),
            published,
            author: None,
        }
    }

    pub fn by(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Nitter-shaped RSS document for `account`.
pub fn rss_feed(account: &str, items: &[FixtureItem]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:atom="http://www.w3.org/2005/Atom" xmlns:dc="http://purl.org/dc/elements/1.1/" version="2.0">
<channel>
<title>{account} / @{account}</title>
<link>https://nitter.example/{account}</link>
<description>Twitter feed for: @{account}.</description>
"#
    );

    for item in items {
        let author = item.author.as_deref().unwrap_or(account);
        let link = format!("https://nitter.example/{}/status/{}#m", author, item.id);
        xml.push_str(&format!(
            "<item>\n<title>{title}</title>\n<dc:creator>@{author}</dc:creator>\n\
             <pubDate>{date}</pubDate>\n<guid>{link}</guid>\n<link>{link}</link>\n</item>\n",
            title = xml_escape(&item.text),
            date = item.published.to_rfc2822(),
        ));
    }

    xml.push_str("</channel>\n</rss>\n");
    xml
}

// ---- Feed source -------------------------------------------------------------

/// Serves canned posts per account; accounts without an entry fail.
#[derive(Default)]
pub struct StaticSource {
    feeds: Mutex<HashMap<Account, Vec<PostRecord>>>,
}

impl StaticSource {
    pub fn with_feed(self, account: &Account, posts: Vec<PostRecord>) -> Self {
        self.set_feed(account, posts);
        self
    }

    pub fn set_feed(&self, account: &Account, posts: Vec<PostRecord>) {
        self.feeds.lock().unwrap().insert(account.clone(), posts);
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch(&self, account: &Account) -> Result<FetchedFeed, FetchError> {
        match self.feeds.lock().unwrap().get(account) {
            Some(posts) => Ok(FetchedFeed {
                mirror: "static".to_string(),
                posts: posts.clone(),
                skipped: Vec::new(),
            }),
            None => Err(FetchError::AllMirrorsFailed {
                account: account.handle().to_string(),
                attempts: vec![("static".to_string(), MirrorError::Status { status: 503 })],
            }),
        }
    }

    fn source_name(&self) -> &str {
        "static"
    }
}

// ---- Push channel ------------------------------------------------------------

/// Records delivered messages; rejects messages whose link is listed.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<NotificationMessage>>,
    fail_links: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn failing_on(links: &[&str]) -> Self {
        let channel = Self::default();
        channel.fail_on(links);
        channel
    }

    pub fn fail_on(&self, links: &[&str]) {
        *self.fail_links.lock().unwrap() = links.iter().map(|l| l.to_string()).collect();
    }

    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_links(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.link).collect()
    }
}

#[async_trait]
impl PushChannel for RecordingChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<(), DeliveryError> {
        if self.fail_links.lock().unwrap().contains(&message.link) {
            return Err(DeliveryError::Rejected {
                code: 45009,
                message: "rate limited".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}

// ---- Translators -------------------------------------------------------------

pub struct FailingTranslator;

#[async_trait]
impl Translator for FailingTranslator {
    async fn translate(&self, _text: &str) -> Result<String, TranslationError> {
        Err(TranslationError::Status { status: 500 })
    }

    fn backend_name(&self) -> &str {
        "failing"
    }
}

pub struct SlowTranslator(pub Duration);

#[async_trait]
impl Translator for SlowTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        tokio::time::sleep(self.0).await;
        Ok(text.to_uppercase())
    }

    fn backend_name(&self) -> &str {
        "slow"
    }
}
