//! Change detection between a fresh fetch and the stored last-seen id.
//!
//! Input is newest-first (as returned by a feed source); output is
//! oldest-first so delivery preserves chronological order.

use crate::types::{AccountState, PostRecord};

/// Number of posts emitted for an account with no prior state.
pub const FIRST_RUN_LIMIT: usize = 1;

/// Default cap when the last-seen id is missing from the fetched window.
pub const DEFAULT_BACKLOG_CAP: usize = 10;

/// Bounds applied by [`diff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffPolicy {
    pub first_run_limit: usize,
    pub backlog_cap: usize,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            first_run_limit: FIRST_RUN_LIMIT,
            backlog_cap: DEFAULT_BACKLOG_CAP,
        }
    }
}

impl DiffPolicy {
    pub fn with_backlog_cap(backlog_cap: usize) -> Self {
        Self {
            backlog_cap,
            ..Self::default()
        }
    }
}

/// Compute the posts that have not been delivered yet, oldest first.
///
/// - No prior state: only the newest `first_run_limit` posts.
/// - Last-seen id present in the fetch: every post before it, minus any
///   post whose id is known to be the same or older.
/// - Last-seen id absent (feed churn): posts not known to be seen, capped
///   to the newest `backlog_cap`.
pub fn diff(
    fetched: &[PostRecord],
    prior: Option<&AccountState>,
    policy: &DiffPolicy,
) -> Vec<PostRecord> {
    let mut fresh: Vec<PostRecord> = match prior {
        None => fetched
            .iter()
            .take(policy.first_run_limit)
            .cloned()
            .collect(),
        Some(state) => {
            let last_seen = &state.last_seen_post_id;
            let unseen = |post: &&PostRecord| !post.post_id.is_seen_by(last_seen);

            match fetched.iter().position(|p| &p.post_id == last_seen) {
                Some(idx) => fetched[..idx].iter().filter(unseen).cloned().collect(),
                None => {
                    let candidates: Vec<PostRecord> =
                        fetched.iter().filter(unseen).cloned().collect();
                    if candidates.len() > policy.backlog_cap {
                        tracing::warn!(
                            "@{}: last seen id {} not in feed, capping backlog of {} posts to {}",
                            state.account,
                            last_seen,
                            candidates.len(),
                            policy.backlog_cap
                        );
                    }
                    candidates.into_iter().take(policy.backlog_cap).collect()
                }
            }
        }
    };

    fresh.reverse();
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;

    use crate::types::{Account, PostId};

    fn account() -> Account {
        Account::parse("example").unwrap()
    }

    fn post(id: u64) -> PostRecord {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        PostRecord {
            account: account(),
            post_id: PostId::new(id.to_string()),
            text: format!("post {id}"),
            url: format!("https://x.com/example/status/{id}"),
            published_at: base + Duration::minutes(id as i64),
        }
    }

    /// Newest-first feed built from ascending ids.
    fn feed(ids: &[u64]) -> Vec<PostRecord> {
        let mut ids = ids.to_vec();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.into_iter().map(post).collect()
    }

    fn state(last_seen: &str) -> AccountState {
        AccountState {
            account: account(),
            last_seen_post_id: PostId::new(last_seen),
            last_checked_at: Utc::now(),
        }
    }

    fn ids(posts: &[PostRecord]) -> Vec<&str> {
        posts.iter().map(|p| p.post_id.as_str()).collect()
    }

    #[test]
    fn posts_newer_than_last_seen_come_back_oldest_first() {
        let fetched = feed(&[100, 101, 102, 103]);
        let prior = state("100");

        let fresh = diff(&fetched, Some(&prior), &DiffPolicy::default());

        assert_eq!(ids(&fresh), vec!["101", "102", "103"]);
    }

    #[test]
    fn nothing_new_when_last_seen_is_newest() {
        let fetched = feed(&[98, 99, 100]);
        let prior = state("100");

        assert!(diff(&fetched, Some(&prior), &DiffPolicy::default()).is_empty());
    }

    #[test]
    fn first_run_emits_only_newest_post() {
        let fetched = feed(&(1..=50).collect::<Vec<_>>());

        let fresh = diff(&fetched, None, &DiffPolicy::default());

        assert_eq!(ids(&fresh), vec!["50"]);
    }

    #[test]
    fn first_run_on_empty_feed_is_empty() {
        assert!(diff(&[], None, &DiffPolicy::default()).is_empty());
    }

    #[test]
    fn missing_last_seen_caps_backlog_to_newest() {
        let fetched = feed(&(200..230).collect::<Vec<_>>());
        let prior = state("100");

        let fresh = diff(&fetched, Some(&prior), &DiffPolicy::with_backlog_cap(3));

        assert_eq!(ids(&fresh), vec!["227", "228", "229"]);
    }

    #[test]
    fn missing_last_seen_never_resurfaces_older_posts() {
        // Lagging mirror: last seen 105 is newer than everything it serves.
        let fetched = feed(&[101, 102, 103]);
        let prior = state("105");

        assert!(diff(&fetched, Some(&prior), &DiffPolicy::default()).is_empty());
    }

    #[test]
    fn stale_posts_ahead_of_last_seen_are_dropped() {
        // Out-of-order mirror places an old post before the last-seen id.
        let mut fetched = feed(&[100, 101]);
        fetched.insert(0, post(90));
        let prior = state("100");

        let fresh = diff(&fetched, Some(&prior), &DiffPolicy::default());

        assert_eq!(ids(&fresh), vec!["101"]);
    }

    #[test]
    fn opaque_ids_fall_back_to_position() {
        let mut fetched = feed(&[1, 2, 3]);
        for (p, id) in fetched.iter_mut().zip(["c", "b", "a"]) {
            p.post_id = PostId::new(id);
        }
        let prior = state("a");

        let fresh = diff(&fetched, Some(&prior), &DiffPolicy::default());

        assert_eq!(ids(&fresh), vec!["b", "c"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// A post at or below the last-seen id is never reported as new.
        #[test]
        fn prop_seen_posts_are_never_new(
            raw_ids in prop::collection::btree_set(1u64..10_000, 0..60),
            last_seen in 1u64..10_000,
            cap in 1usize..20,
        ) {
            let fetched = feed(&raw_ids.into_iter().collect::<Vec<_>>());
            let prior = state(&last_seen.to_string());

            let fresh = diff(&fetched, Some(&prior), &DiffPolicy::with_backlog_cap(cap));

            for p in &fresh {
                let id: u64 = p.post_id.as_str().parse().unwrap();
                prop_assert!(id > last_seen);
            }
            prop_assert!(fresh.windows(2).all(|w| w[0].published_at < w[1].published_at));
        }

        /// A second diff after advancing to the newest delivered id is empty.
        #[test]
        fn prop_diff_is_idempotent_after_advance(
            raw_ids in prop::collection::btree_set(1u64..10_000, 1..60),
            last_seen in 1u64..10_000,
        ) {
            let fetched = feed(&raw_ids.into_iter().collect::<Vec<_>>());
            let policy = DiffPolicy::default();
            let first = diff(&fetched, Some(&state(&last_seen.to_string())), &policy);

            if let Some(newest) = first.last() {
                let advanced = state(newest.post_id.as_str());
                let second = diff(&fetched, Some(&advanced), &policy);
                prop_assert!(second.is_empty());
            }
        }
    }
}
