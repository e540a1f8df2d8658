//! Run coordinator.
//!
//! Drives one pass over every monitored account:
//! 1. Load prior state (unreadable state counts as a first run)
//! 2. Fetch posts through the feed source
//! 3. Diff against the last-seen id
//! 4. Translate and notify each new post, oldest first
//! 5. Advance the last-seen id to the newest contiguously delivered post
//!
//! A failure in one account never stops the others.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{Config, PushMethod, TranslatorBackend};
use crate::diff::{diff, DiffPolicy};
use crate::error::{AccountError, AppError, ConfigError, FetchError};
use crate::metrics::AppMetrics;
use crate::notify::{Notifier, PushChannel, ServerChanChannel, WeComChannel};
use crate::services::http::build_client;
use crate::sources::{FeedSource, NitterSource};
use crate::store::StateStore;
use crate::translate::{
    DictionaryTranslator, LibreTranslator, NoopTranslator, Translation, Translator,
    TranslatorAdapter,
};
use crate::types::{Account, PostId, PostRecord};

/// What happened to one account during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountOutcome {
    pub mirror: String,
    pub fetched: usize,
    pub new_posts: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Last-seen id recorded by this run, if it advanced.
    pub advanced_to: Option<PostId>,
}

#[derive(Debug)]
pub struct AccountReport {
    pub account: Account,
    pub result: Result<AccountOutcome, AccountError>,
}

/// Per-account results of one run, in configuration order.
#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub accounts: Vec<AccountReport>,
}

impl RunSummary {
    pub fn report(&self, account: &Account) -> Option<&AccountReport> {
        self.accounts.iter().find(|r| &r.account == account)
    }

    pub fn delivered(&self) -> usize {
        self.outcomes().map(|o| o.delivered).sum()
    }

    pub fn failed_deliveries(&self) -> usize {
        self.outcomes().map(|o| o.failed).sum()
    }

    pub fn failed_accounts(&self) -> Vec<&Account> {
        self.accounts
            .iter()
            .filter(|r| r.result.is_err())
            .map(|r| &r.account)
            .collect()
    }

    fn outcomes(&self) -> impl Iterator<Item = &AccountOutcome> {
        self.accounts.iter().filter_map(|r| r.result.as_ref().ok())
    }
}

/// The relay pipeline with all of its collaborators.
pub struct Pipeline {
    source: Arc<dyn FeedSource>,
    store: Arc<StateStore>,
    translator: TranslatorAdapter,
    notifier: Notifier,
    metrics: Arc<AppMetrics>,
    policy: DiffPolicy,
    max_concurrent_accounts: usize,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn FeedSource>,
        store: Arc<StateStore>,
        translator: TranslatorAdapter,
        notifier: Notifier,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            source,
            store,
            translator,
            notifier,
            metrics,
            policy: DiffPolicy::default(),
            max_concurrent_accounts: 1,
        }
    }

    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: &Config, metrics: Arc<AppMetrics>) -> Result<Self, AppError> {
        let http = build_client(config.http)?;

        let source = Arc::new(NitterSource::new(config.mirrors.clone(), http.clone()));

        let channel: Arc<dyn PushChannel> = match &config.push {
            PushMethod::WeCom { webhook } => {
                Arc::new(WeComChannel::new(webhook.clone(), http.clone()))
            }
            PushMethod::ServerChan { sendkey } => {
                Arc::new(ServerChanChannel::new(sendkey.clone(), http.clone()))
            }
        };

        let backend: Arc<dyn Translator> = match &config.translator {
            TranslatorBackend::Dictionary => Arc::new(
                DictionaryTranslator::new()
                    .map_err(|err| ConfigError::invalid("translation.backend", err.to_string()))?,
            ),
            TranslatorBackend::LibreTranslate {
                url,
                target,
                api_key,
            } => Arc::new(LibreTranslator::new(
                url.clone(),
                target.clone(),
                api_key.clone(),
                http.clone(),
            )),
            TranslatorBackend::Disabled => Arc::new(NoopTranslator),
        };

        Ok(Self::new(
            source,
            Arc::new(StateStore::new(&config.state_file)),
            TranslatorAdapter::new(backend, config.http.timeout),
            Notifier::new(channel),
            metrics,
        )
        .with_policy(DiffPolicy::with_backlog_cap(config.backlog_cap))
        .with_max_concurrent_accounts(config.max_concurrent_accounts))
    }

    pub fn with_policy(mut self, policy: DiffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_max_concurrent_accounts(mut self, limit: usize) -> Self {
        self.max_concurrent_accounts = limit.max(1);
        self
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    /// Process every account once.
    ///
    /// With a concurrency limit of 1 accounts run strictly in order;
    /// otherwise up to `max_concurrent_accounts` run at a time.
    pub async fn run_once(self: &Arc<Self>, accounts: &[Account]) -> RunSummary {
        let started_at = Utc::now();
        tracing::info!(
            "Run started: {} accounts via {}, delivering through {}",
            accounts.len(),
            self.source.source_name(),
            self.notifier.channel_name()
        );

        let reports = if self.max_concurrent_accounts <= 1 {
            let mut reports = Vec::with_capacity(accounts.len());
            for account in accounts {
                reports.push(AccountReport {
                    account: account.clone(),
                    result: self.process_account(account).await,
                });
            }
            reports
        } else {
            self.run_concurrently(accounts).await
        };

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            accounts: reports,
        };

        self.metrics.runs_total.inc();
        self.metrics
            .last_run_timestamp
            .set(summary.finished_at.timestamp() as f64);

        tracing::info!(
            "Run finished: {} delivered, {} failed deliveries, {} accounts skipped",
            summary.delivered(),
            summary.failed_deliveries(),
            summary.failed_accounts().len()
        );

        summary
    }

    async fn run_concurrently(self: &Arc<Self>, accounts: &[Account]) -> Vec<AccountReport> {
        let limit = Arc::new(Semaphore::new(self.max_concurrent_accounts));
        let mut tasks = JoinSet::new();

        for (idx, account) in accounts.iter().cloned().enumerate() {
            let pipeline = Arc::clone(self);
            let limit = Arc::clone(&limit);
            tasks.spawn(async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = limit.acquire_owned().await.ok();
                let result = pipeline.process_account(&account).await;
                (idx, AccountReport { account, result })
            });
        }

        let mut indexed = Vec::with_capacity(accounts.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => indexed.push(entry),
                Err(err) => tracing::error!("Account task aborted: {}", err),
            }
        }

        indexed.sort_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, report)| report).collect()
    }

    /// Run the full pipeline for a single account.
    pub async fn process_account(&self, account: &Account) -> Result<AccountOutcome, AccountError> {
        let prior = match self.store.load(account).await {
            Ok(state) => state,
            Err(err) => {
                self.metrics.state_read_failures_total.inc();
                tracing::warn!(
                    "@{}: state unreadable, treating as first run: {}",
                    account,
                    err
                );
                None
            }
        };

        let fetched = match self.source.fetch(account).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.metrics.fetch_failures_total.inc();
                if let FetchError::AllMirrorsFailed { attempts, .. } = &err {
                    for (mirror, _) in attempts {
                        self.metrics
                            .mirror_failures_total
                            .with_label_values(&[mirror.as_str()])
                            .inc();
                    }
                }
                tracing::error!("@{}: fetch failed, skipping this run: {}", account, err);
                return Err(err.into());
            }
        };

        for (mirror, _) in &fetched.skipped {
            self.metrics
                .mirror_failures_total
                .with_label_values(&[mirror.as_str()])
                .inc();
        }

        let fresh = diff(&fetched.posts, prior.as_ref(), &self.policy);
        self.metrics.new_posts_total.inc_by(fresh.len() as f64);

        let baseline = match prior {
            None => first_run_baseline(&fetched.posts, &fresh),
            Some(_) => None,
        };

        let mut outcome = AccountOutcome {
            mirror: fetched.mirror,
            fetched: fetched.posts.len(),
            new_posts: fresh.len(),
            delivered: 0,
            failed: 0,
            advanced_to: None,
        };

        if fresh.is_empty() {
            tracing::info!("@{}: no new posts ({} fetched)", account, outcome.fetched);
            if prior.is_some() {
                if let Err(err) = self.store.touch(account, Utc::now()).await {
                    tracing::warn!("@{}: could not record check time: {}", account, err);
                }
            }
            return Ok(outcome);
        }

        // Only a gap-free prefix of delivered posts may be marked seen.
        let mut contiguous = true;

        for post in &fresh {
            let translation = self.translator.translate(&post.text).await;
            if translation == Translation::Fallback {
                self.metrics.translation_fallbacks_total.inc();
            }

            match self
                .notifier
                .notify(account, post, translation.text_or(&post.text))
                .await
            {
                Ok(()) => {
                    outcome.delivered += 1;
                    self.metrics.notifications_sent_total.inc();
                    tracing::info!("[sent] @{} {}", account, post.post_id);
                    if contiguous {
                        outcome.advanced_to = Some(post.post_id.clone());
                    }
                }
                Err(err) => {
                    outcome.failed += 1;
                    contiguous = false;
                    self.metrics.notification_failures_total.inc();
                    tracing::warn!("[fail] @{} {}: {}", account, post.post_id, err);
                }
            }
        }

        // A first run that delivered nothing still anchors the account so
        // the next run retries the failed posts.
        let to_save = match (&outcome.advanced_to, baseline) {
            (Some(last_seen), _) => Some(last_seen.clone()),
            (None, Some(baseline)) => {
                tracing::info!("@{}: recording baseline {} for retry", account, baseline);
                Some(baseline)
            }
            (None, None) => None,
        };

        if let Some(last_seen) = &to_save {
            if let Err(err) = self.store.save(account, last_seen, Utc::now()).await {
                self.metrics.state_write_failures_total.inc();
                tracing::error!(
                    "@{}: state not saved at {}; posts may repeat next run: {}",
                    account,
                    last_seen,
                    err
                );
                return Err(err.into());
            }
        }

        Ok(outcome)
    }
}

/// The id just older than the first-run window: the fetched post after the
/// oldest new one, or its numeric predecessor when the feed ends there.
fn first_run_baseline(fetched: &[PostRecord], fresh: &[PostRecord]) -> Option<PostId> {
    let oldest = fresh.first()?;
    let idx = fetched.iter().position(|p| p.post_id == oldest.post_id)?;

    fetched
        .get(idx + 1)
        .map(|p| p.post_id.clone())
        .or_else(|| oldest.post_id.predecessor())
}
