//! RSS/Atom normalisation.
//!
//! Turns a raw mirror response into [`PostRecord`]s. A document that does
//! not parse is a [`MirrorError::Malformed`]; a parseable document with
//! broken entries is accepted and the broken entries are dropped.

use std::cmp::Ordering;
use std::collections::HashSet;

use thiserror::Error;

use crate::error::MirrorError;
use crate::types::{Account, PostId, PostRecord};

/// Why a single feed entry was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedEntry {
    #[error("entry {entry_id} has no link")]
    MissingLink { entry_id: String },

    #[error("entry {entry_id} has no post id in its link or guid")]
    MissingPostId { entry_id: String },

    #[error("entry {entry_id} has no title")]
    MissingText { entry_id: String },

    #[error("entry {entry_id} has no publish timestamp")]
    MissingTimestamp { entry_id: String },
}

/// A parsed `/{author}/status/{id}` permalink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLink {
    pub author: Option<String>,
    pub id: PostId,
}

/// Path segments that precede `/status/` without naming a user,
/// as in `/i/web/status/123`.
const NON_USER_SEGMENTS: &[&str] = &["i", "web"];

/// Extract the status id (and author, when present) from a permalink such
/// as `https://nitter.net/example/status/123#m`.
pub fn parse_status_link(link: &str) -> Option<StatusLink> {
    let (before, after) = link.split_once("/status/")?;

    let id: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    if id.is_empty() {
        return None;
    }

    let author = before
        .rsplit('/')
        .next()
        .filter(|seg| {
            !seg.is_empty()
                && !NON_USER_SEGMENTS.contains(seg)
                && !seg.contains(|c: char| c == '.' || c == ':')
        })
        .map(str::to_string);

    Some(StatusLink {
        author,
        id: PostId::new(id),
    })
}

/// Canonical permalink on the upstream site.
pub fn canonical_url(author: &str, id: &PostId) -> String {
    format!("https://x.com/{}/status/{}", author, id)
}

/// Decode entities that survive XML unescaping in mirror titles.
pub fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Parse a feed document into posts for `account`, newest first and
/// unique by post id.
pub fn parse_feed(account: &Account, body: &[u8]) -> Result<Vec<PostRecord>, MirrorError> {
    let feed = feed_rs::parser::parse(body).map_err(|err| MirrorError::Malformed {
        message: err.to_string(),
    })?;

    let mut posts = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        match normalize_entry(account, entry) {
            Ok(post) => posts.push(post),
            Err(err) => tracing::warn!("@{}: skipping malformed entry: {}", account, err),
        }
    }

    // Dedup in document order so the first occurrence wins.
    let mut seen = HashSet::new();
    posts.retain(|post| seen.insert(post.post_id.clone()));

    posts.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| b.post_id.recency_cmp(&a.post_id).unwrap_or(Ordering::Equal))
    });

    Ok(posts)
}

fn normalize_entry(
    account: &Account,
    entry: feed_rs::model::Entry,
) -> Result<PostRecord, MalformedEntry> {
    let entry_id = entry.id.clone();

    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
        .ok_or_else(|| MalformedEntry::MissingLink {
            entry_id: entry_id.clone(),
        })?;

    let status = parse_status_link(&link)
        .or_else(|| parse_status_link(&entry.id))
        .ok_or_else(|| MalformedEntry::MissingPostId {
            entry_id: entry_id.clone(),
        })?;

    let text = entry
        .title
        .map(|t| decode_entities(t.content.trim()))
        .ok_or_else(|| MalformedEntry::MissingText {
            entry_id: entry_id.clone(),
        })?;

    let published_at = entry
        .published
        .or(entry.updated)
        .ok_or(MalformedEntry::MissingTimestamp { entry_id })?;

    let author = status.author.as_deref().unwrap_or(account.handle());

    Ok(PostRecord {
        account: account.clone(),
        url: canonical_url(author, &status.id),
        post_id: status.id,
        text,
        published_at,
    })
}
