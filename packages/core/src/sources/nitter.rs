//! Mirror-fallback feed source for Nitter-style RSS endpoints.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{FetchError, MirrorError};
use crate::sources::{feed, FeedSource, FetchedFeed};
use crate::types::{Account, PostRecord};

/// Queries an ordered list of mirrors until one serves a parseable feed.
#[derive(Clone)]
pub struct NitterSource {
    mirrors: Vec<String>,
    http: Client,
}

impl NitterSource {
    /// `mirrors` are base URLs in priority order (first = preferred).
    pub fn new(mirrors: Vec<String>, http: Client) -> Self {
        let mirrors = mirrors
            .into_iter()
            .map(|m| m.trim().trim_end_matches('/').to_string())
            .filter(|m| !m.is_empty())
            .collect();

        Self { mirrors, http }
    }

    pub fn mirrors(&self) -> &[String] {
        &self.mirrors
    }

    pub fn feed_url(mirror: &str, account: &Account) -> String {
        format!("{}/{}/rss", mirror.trim_end_matches('/'), account.handle())
    }

    async fn fetch_from_mirror(
        &self,
        mirror: &str,
        account: &Account,
    ) -> Result<Vec<PostRecord>, MirrorError> {
        let url = Self::feed_url(mirror, account);

        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(MirrorError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(MirrorError::EmptyBody);
        }

        feed::parse_feed(account, &body)
    }
}

#[async_trait]
impl FeedSource for NitterSource {
    async fn fetch(&self, account: &Account) -> Result<FetchedFeed, FetchError> {
        if self.mirrors.is_empty() {
            return Err(FetchError::NoMirrors);
        }

        let mut skipped = Vec::new();

        for mirror in &self.mirrors {
            match self.fetch_from_mirror(mirror, account).await {
                Ok(posts) => {
                    tracing::debug!(
                        "@{}: {} posts from {} ({} mirrors skipped)",
                        account,
                        posts.len(),
                        mirror,
                        skipped.len()
                    );
                    return Ok(FetchedFeed {
                        mirror: mirror.clone(),
                        posts,
                        skipped,
                    });
                }
                Err(err) => {
                    tracing::warn!("@{}: mirror {} skipped: {}", account, mirror, err);
                    skipped.push((mirror.clone(), err));
                }
            }
        }

        Err(FetchError::AllMirrorsFailed {
            account: account.handle().to_string(),
            attempts: skipped,
        })
    }

    fn source_name(&self) -> &str {
        "nitter"
    }
}
