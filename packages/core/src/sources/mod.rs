//! Feed sources.
//!
//! Provides the abstraction the run coordinator fetches posts through, so
//! the mirror-fallback client can be swapped for a stub in tests.

pub mod feed;
pub mod nitter;

use async_trait::async_trait;

use crate::error::{FetchError, MirrorError};
use crate::types::{Account, PostRecord};

pub use nitter::NitterSource;

/// Result of a successful fetch.
#[derive(Debug)]
pub struct FetchedFeed {
    /// Mirror base URL that served the feed.
    pub mirror: String,
    /// Newest first, unique by post id.
    pub posts: Vec<PostRecord>,
    /// Mirrors tried and skipped before `mirror` answered.
    pub skipped: Vec<(String, MirrorError)>,
}

/// Trait for post sources, keeping the coordinator independent of the
/// upstream service.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the latest posts for `account`.
    ///
    /// Fails only when no mirror produced a parseable feed; an empty feed
    /// is a success.
    async fn fetch(&self, account: &Account) -> Result<FetchedFeed, FetchError>;

    /// Name of this source for logging.
    fn source_name(&self) -> &str;
}
