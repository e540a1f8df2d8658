//! Run scheduling.
//!
//! `run_once` performs a single relay pass; `run_daemon` repeats it on a
//! fixed interval until Ctrl+C. Per-account failures are reported in the
//! [`RunSummary`] and never stop the loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::time::{self, MissedTickBehavior};

use crate::coordinator::{Pipeline, RunSummary};
use crate::types::Account;

/// Daemon mode never polls more often than this.
pub const MIN_POLL_INTERVAL_SECONDS: u64 = 60;

/// Everything a pass needs besides the pipeline itself.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub accounts: Vec<Account>,
    pub metrics_textfile: Option<PathBuf>,
}

/// Execute one pass and export metrics if a textfile path is configured.
pub async fn run_once(pipeline: &Arc<Pipeline>, plan: &RunPlan) -> RunSummary {
    let summary = pipeline.run_once(&plan.accounts).await;

    if let Some(path) = &plan.metrics_textfile {
        if let Err(err) = pipeline.metrics().write_textfile(path).await {
            tracing::warn!("Could not write metrics to {}: {}", path.display(), err);
        }
    }

    summary
}

/// Clamp the configured interval to the daemon minimum.
pub fn effective_interval(poll_interval_seconds: u64) -> Duration {
    Duration::from_secs(poll_interval_seconds.max(MIN_POLL_INTERVAL_SECONDS))
}

/// Run passes every `poll_interval_seconds` until Ctrl+C (SIGINT).
/// Returns the number of completed passes.
pub async fn run_daemon(pipeline: Arc<Pipeline>, plan: RunPlan, poll_interval_seconds: u64) -> u64 {
    run_until(pipeline, plan, poll_interval_seconds, async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Could not listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Loop body of [`run_daemon`], stopping when `shutdown` resolves.
/// Returns the number of completed passes.
pub async fn run_until<F>(
    pipeline: Arc<Pipeline>,
    plan: RunPlan,
    poll_interval_seconds: u64,
    shutdown: F,
) -> u64
where
    F: Future<Output = ()>,
{
    let period = effective_interval(poll_interval_seconds);
    if period.as_secs() != poll_interval_seconds {
        tracing::warn!(
            "Poll interval {}s is below the minimum; using {}s",
            poll_interval_seconds,
            period.as_secs()
        );
    }

    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!(
        "Relay daemon started (interval: {}s, accounts: {})",
        period.as_secs(),
        plan.accounts.len()
    );

    let mut passes = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_once(&pipeline, &plan).await;
                passes += 1;
            }

            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received. Stopping relay.");
                break;
            }
        }
    }

    tracing::info!("Relay daemon stopped cleanly after {} passes", passes);
    passes
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::metrics::AppMetrics;
    use crate::notify::Notifier;
    use crate::store::StateStore;
    use crate::testing::{RecordingChannel, StaticSource};
    use crate::translate::{NoopTranslator, TranslatorAdapter};
    use crate::types::{PostId, PostRecord};
    use chrono::Utc;

    fn account() -> Account {
        Account::parse("example").unwrap()
    }

    fn setup(dir: &tempfile::TempDir) -> (Arc<Pipeline>, Arc<RecordingChannel>) {
        let example = account();
        let source = Arc::new(StaticSource::default().with_feed(
            &example,
            vec![PostRecord {
                account: example.clone(),
                post_id: PostId::new("42"),
                text: "hello".into(),
                url: "https://x.com/example/status/42".into(),
                published_at: Utc::now(),
            }],
        ));
        let channel = Arc::new(RecordingChannel::default());
        let pipeline = Pipeline::new(
            source,
            Arc::new(StateStore::new(dir.path().join("state.json"))),
            TranslatorAdapter::new(Arc::new(NoopTranslator), Duration::from_secs(1)),
            Notifier::new(channel.clone()),
            Arc::new(AppMetrics::new().unwrap()),
        );
        (Arc::new(pipeline), channel)
    }

    #[test]
    fn interval_is_clamped_to_minimum() {
        assert_eq!(effective_interval(10), Duration::from_secs(60));
        assert_eq!(effective_interval(600), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn run_once_writes_metrics_textfile() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, channel) = setup(&dir);
        let plan = RunPlan {
            accounts: vec![account()],
            metrics_textfile: Some(dir.path().join("relay.prom")),
        };

        let summary = run_once(&pipeline, &plan).await;

        assert_eq!(summary.delivered(), 1);
        assert_eq!(channel.sent().len(), 1);
        let exported = std::fs::read_to_string(dir.path().join("relay.prom")).unwrap();
        assert!(exported.contains("tweet_relay_runs_total 1"));
        assert!(exported.contains("tweet_relay_notifications_sent_total 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn daemon_repeats_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, channel) = setup(&dir);
        let plan = RunPlan {
            accounts: vec![account()],
            metrics_textfile: None,
        };

        // Ticks at 0s, 60s and 120s fire before shutdown at 150s.
        let passes = run_until(
            pipeline.clone(),
            plan,
            60,
            time::sleep(Duration::from_secs(150)),
        )
        .await;

        assert_eq!(passes, 3);
        assert!((pipeline.metrics().runs_total.get() - 3.0).abs() < f64::EPSILON);
        // Only the first pass finds the post new.
        assert_eq!(channel.sent().len(), 1);
    }
}
