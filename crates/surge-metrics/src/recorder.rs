//! Metrics recorder — persists observed snapshots as time-series history.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use surge_state::{MetricSample, StateResult, StateStore, SystemMetrics};

use crate::source::{MetricsFuture, MetricsSource};

/// Writes snapshots into the time-series store and enforces retention.
#[derive(Clone)]
pub struct MetricsRecorder {
    state: StateStore,
    /// How long raw samples are kept.
    retention: Duration,
}

impl MetricsRecorder {
    pub fn new(state: StateStore, retention: Duration) -> Self {
        Self { state, retention }
    }

    /// Record one sample per metric at `at`.
    pub fn record(&self, metrics: &SystemMetrics, at: DateTime<Utc>) -> StateResult<()> {
        let timestamp_ms = at.timestamp_millis();
        for (name, value) in metrics.entries() {
            self.state
                .put_sample(name, &MetricSample { timestamp_ms, value })?;
        }
        debug!(timestamp_ms, "metrics snapshot recorded");
        Ok(())
    }

    /// Drop samples older than the retention window and purge expired cache entries.
    ///
    /// Returns the number of samples removed.
    pub fn prune(&self, now: DateTime<Utc>) -> StateResult<u32> {
        let retention_ms = i64::try_from(self.retention.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now.timestamp_millis().saturating_sub(retention_ms);
        let mut removed = 0;
        for name in SystemMetrics::METRIC_NAMES {
            removed += self.state.prune_samples_before(name, cutoff)?;
        }
        let purged = self.state.purge_expired()?;
        if removed > 0 || purged > 0 {
            debug!(removed, purged, "retention pass complete");
        }
        Ok(removed)
    }

    /// Run the retention loop until shutdown signal.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "metrics retention started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.prune(Utc::now()) {
                        warn!(error = %e, "metrics retention pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("metrics retention shutting down");
                    break;
                }
            }
        }
    }
}

/// Decorates a source so every successful fetch is also recorded as history.
///
/// Recording failures are logged and do not fail the fetch.
pub struct RecordingSource {
    inner: Arc<dyn MetricsSource>,
    recorder: MetricsRecorder,
}

impl RecordingSource {
    pub fn new(inner: Arc<dyn MetricsSource>, recorder: MetricsRecorder) -> Self {
        Self { inner, recorder }
    }
}

impl MetricsSource for RecordingSource {
    fn current_metrics(&self) -> MetricsFuture<'_> {
        Box::pin(async move {
            let metrics = self.inner.current_metrics().await?;
            if let Err(e) = self.recorder.record(&metrics, Utc::now()) {
                warn!(error = %e, "failed to record metrics history");
            }
            Ok(metrics)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticMetricsSource;
    use chrono::TimeZone;

    fn test_state() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    fn snapshot(cpu: f64) -> SystemMetrics {
        SystemMetrics {
            system_cpu_usage: cpu,
            system_memory_usage: 50.0,
            current_instances: 3,
            ..Default::default()
        }
    }

    #[test]
    fn record_writes_every_metric() {
        let state = test_state();
        let recorder = MetricsRecorder::new(state.clone(), Duration::from_secs(3600));
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        recorder.record(&snapshot(70.0), at).unwrap();

        for name in SystemMetrics::METRIC_NAMES {
            let latest = state.latest_sample(name).unwrap().unwrap();
            assert_eq!(latest.timestamp_ms, 1_700_000_000_000);
        }
        let cpu = state.latest_sample("system_cpu_usage").unwrap().unwrap();
        assert_eq!(cpu.value, 70.0);
    }

    #[test]
    fn prune_respects_retention() {
        let state = test_state();
        let recorder = MetricsRecorder::new(state.clone(), Duration::from_secs(3600));
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        recorder
            .record(&snapshot(10.0), now - chrono::Duration::hours(2))
            .unwrap();
        recorder.record(&snapshot(20.0), now).unwrap();

        let removed = recorder.prune(now).unwrap();
        assert_eq!(removed as usize, SystemMetrics::METRIC_NAMES.len());

        let left = state.range_by_score("system_cpu_usage", 0, i64::MAX).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].value, 20.0);
    }

    #[tokio::test]
    async fn recording_source_records_on_fetch() {
        let state = test_state();
        let inner = Arc::new(StaticMetricsSource::new(snapshot(65.0)));
        let source = RecordingSource::new(
            inner,
            MetricsRecorder::new(state.clone(), Duration::from_secs(3600)),
        );

        let metrics = source.current_metrics().await.unwrap();
        assert_eq!(metrics.system_cpu_usage, 65.0);

        let history = state.range_by_score("system_cpu_usage", 0, i64::MAX).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn recording_source_propagates_outage() {
        let state = test_state();
        let inner = Arc::new(StaticMetricsSource::default());
        inner.set_unavailable(true);
        let source = RecordingSource::new(
            inner,
            MetricsRecorder::new(state.clone(), Duration::from_secs(3600)),
        );

        assert!(source.current_metrics().await.is_err());
        assert!(state.latest_sample("system_cpu_usage").unwrap().is_none());
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let recorder = MetricsRecorder::new(test_state(), Duration::from_secs(3600));
        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move {
            recorder.run(Duration::from_secs(3600), rx).await;
        });
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
