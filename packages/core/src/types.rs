//! Core data types shared by every pipeline stage.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A monitored account handle, stored without the leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Account(String);

impl Account {
    /// Validate and normalise a handle such as `@example` or `example`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let handle = raw.trim().trim_start_matches('@');

        if handle.is_empty() {
            return Err(ConfigError::invalid("accounts", "empty account handle"));
        }

        if handle
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#'))
        {
            return Err(ConfigError::invalid(
                "accounts",
                format!("'{raw}' is not a valid account handle"),
            ));
        }

        // Upstream handles are case-insensitive.
        Ok(Self(handle.to_ascii_lowercase()))
    }

    pub fn handle(&self) -> &str {
        &self.0
    }
}

impl FromStr for Account {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable per-account post identifier.
///
/// Upstream ids are decimal snowflakes, so two all-digit ids can be ordered
/// by recency. Anything else is treated as an opaque token with no order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn digits(&self) -> Option<&str> {
        if !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit()) {
            Some(self.0.trim_start_matches('0'))
        } else {
            None
        }
    }

    /// Recency order between two ids, when both are numeric.
    pub fn recency_cmp(&self, other: &PostId) -> Option<Ordering> {
        let (a, b) = (self.digits()?, other.digits()?);
        Some(a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
    }

    /// `true` only when both ids are numeric and `self` is strictly newer.
    pub fn is_newer_than(&self, other: &PostId) -> bool {
        self.recency_cmp(other) == Some(Ordering::Greater)
    }

    /// `true` when `self` is known to be the same as or older than `other`.
    pub fn is_seen_by(&self, other: &PostId) -> bool {
        self == other
            || matches!(
                self.recency_cmp(other),
                Some(Ordering::Less | Ordering::Equal)
            )
    }

    /// The numeric id immediately before this one. `None` for opaque ids
    /// and for zero.
    pub fn predecessor(&self) -> Option<PostId> {
        let value: u128 = self.digits()?.parse().ok()?;
        value.checked_sub(1).map(|v| PostId::new(v.to_string()))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One normalised post, as produced by a feed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub account: Account,
    pub post_id: PostId,
    pub text: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
}

/// Durable per-account progress marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub account: Account,
    pub last_seen_post_id: PostId,
    pub last_checked_at: DateTime<Utc>,
}

/// A formatted message ready for a push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub link: String,
}
