//! Prometheus metrics for relay runs.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it to
//! the run coordinator.
//!
//! There is no HTTP endpoint: after each run the text exposition can be
//! written to a file for the node-exporter textfile collector.

use std::path::Path;

use prometheus::{Counter, CounterVec, Gauge, Opts, Registry};

use crate::error::AppError;

/// All relay-level Prometheus metrics.
pub struct AppMetrics {
    /// Completed pipeline runs.
    pub runs_total: Counter,
    /// Mirrors skipped during a fetch, labelled by mirror base URL.
    pub mirror_failures_total: CounterVec,
    /// Accounts skipped because every mirror failed.
    pub fetch_failures_total: Counter,
    /// Posts classified as new by the diff engine.
    pub new_posts_total: Counter,
    /// Notifications accepted by the push channel.
    pub notifications_sent_total: Counter,
    /// Notifications the push channel failed to deliver.
    pub notification_failures_total: Counter,
    /// Translations that fell back to the original text.
    pub translation_fallbacks_total: Counter,
    /// State reads that failed and were treated as a first run.
    pub state_read_failures_total: Counter,
    /// State writes that failed after delivery.
    pub state_write_failures_total: Counter,
    /// Unix timestamp of the last completed run.
    pub last_run_timestamp: Gauge,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs_total = Counter::with_opts(Opts::new(
            "tweet_relay_runs_total",
            "Completed relay runs",
        ))?;

        let mirror_failures_total = CounterVec::new(
            Opts::new(
                "tweet_relay_mirror_failures_total",
                "Mirrors skipped during a fetch",
            ),
            &["mirror"],
        )?;

        let fetch_failures_total = Counter::with_opts(Opts::new(
            "tweet_relay_fetch_failures_total",
            "Accounts skipped because every mirror failed",
        ))?;

        let new_posts_total = Counter::with_opts(Opts::new(
            "tweet_relay_new_posts_total",
            "Posts detected as new",
        ))?;

        let notifications_sent_total = Counter::with_opts(Opts::new(
            "tweet_relay_notifications_sent_total",
            "Notifications delivered",
        ))?;

        let notification_failures_total = Counter::with_opts(Opts::new(
            "tweet_relay_notification_failures_total",
            "Notifications that failed delivery",
        ))?;

        let translation_fallbacks_total = Counter::with_opts(Opts::new(
            "tweet_relay_translation_fallbacks_total",
            "Translations that fell back to the original text",
        ))?;

        let state_read_failures_total = Counter::with_opts(Opts::new(
            "tweet_relay_state_read_failures_total",
            "State reads treated as a first run",
        ))?;

        let state_write_failures_total = Counter::with_opts(Opts::new(
            "tweet_relay_state_write_failures_total",
            "State writes that failed after delivery",
        ))?;

        let last_run_timestamp = Gauge::with_opts(Opts::new(
            "tweet_relay_last_run_timestamp_seconds",
            "Unix time of the last completed run",
        ))?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(mirror_failures_total.clone()))?;
        registry.register(Box::new(fetch_failures_total.clone()))?;
        registry.register(Box::new(new_posts_total.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;
        registry.register(Box::new(notification_failures_total.clone()))?;
        registry.register(Box::new(translation_fallbacks_total.clone()))?;
        registry.register(Box::new(state_read_failures_total.clone()))?;
        registry.register(Box::new(state_write_failures_total.clone()))?;
        registry.register(Box::new(last_run_timestamp.clone()))?;

        Ok(Self {
            runs_total,
            mirror_failures_total,
            fetch_failures_total,
            new_posts_total,
            notifications_sent_total,
            notification_failures_total,
            translation_fallbacks_total,
            state_read_failures_total,
            state_write_failures_total,
            last_run_timestamp,
            registry,
        })
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }

    /// Atomically write the rendered metrics to `path` (temp file + rename).
    pub async fn write_textfile(&self, path: &Path) -> Result<(), AppError> {
        let rendered = self.render()?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");

        tokio::fs::write(&tmp, rendered).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metrics_register_without_error() {
        let metrics = AppMetrics::new();
        assert!(metrics.is_ok(), "AppMetrics::new() failed: {:?}", metrics.err());
    }

    #[test]
    fn render_produces_non_empty_output_after_increment() {
        let metrics = AppMetrics::new().unwrap();
        metrics.runs_total.inc();
        let output = metrics.render().unwrap();
        assert!(output.contains("tweet_relay_runs_total"));
    }

    #[test]
    fn counters_increment_correctly() {
        let metrics = AppMetrics::new().unwrap();
        metrics.notifications_sent_total.inc_by(3.0);
        metrics.notification_failures_total.inc();
        assert!((metrics.notifications_sent_total.get() - 3.0).abs() < f64::EPSILON);
        assert!((metrics.notification_failures_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mirror_failures_are_labelled_by_mirror() {
        let metrics = AppMetrics::new().unwrap();
        metrics
            .mirror_failures_total
            .with_label_values(&["https://nitter.net"])
            .inc();
        let val = metrics
            .mirror_failures_total
            .with_label_values(&["https://nitter.net"])
            .get();
        assert!((val - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn write_textfile_writes_exposition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.prom");
        let metrics = AppMetrics::new().unwrap();
        metrics.runs_total.inc_by(5.0);

        metrics.write_textfile(&path).await.unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("tweet_relay_runs_total 5"));
        assert!(!dir.path().join("relay.prom.tmp").exists());
    }
}
