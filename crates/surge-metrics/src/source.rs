//! Metrics sources.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tokio::sync::RwLock;

use surge_fleet::FleetController;
use surge_state::SystemMetrics;

/// Boxed future alias for metrics fetches.
pub type MetricsFuture<'a> =
    Pin<Box<dyn Future<Output = anyhow::Result<SystemMetrics>> + Send + 'a>>;

/// Current aggregate system metrics, as reported by the telemetry source.
pub trait MetricsSource: Send + Sync {
    fn current_metrics(&self) -> MetricsFuture<'_>;
}

/// Reads a JSON `SystemMetrics` snapshot from disk on every fetch.
///
/// An external agent keeps the file current. Instance counts come from the
/// fleet controller, not the file, since the fleet is the source of truth.
pub struct FileMetricsSource {
    path: PathBuf,
    fleet: Arc<dyn FleetController>,
}

impl FileMetricsSource {
    pub fn new(path: PathBuf, fleet: Arc<dyn FleetController>) -> Self {
        Self { path, fleet }
    }
}

impl MetricsSource for FileMetricsSource {
    fn current_metrics(&self) -> MetricsFuture<'_> {
        Box::pin(async move {
            let raw = tokio::fs::read(&self.path)
                .await
                .with_context(|| format!("read telemetry file {}", self.path.display()))?;
            let mut metrics: SystemMetrics = serde_json::from_slice(&raw)
                .with_context(|| format!("parse telemetry file {}", self.path.display()))?;

            let size = self.fleet.fleet_size().await?;
            metrics.current_instances = size;
            metrics.healthy_instances = metrics.healthy_instances.min(size);
            if metrics.healthy_instances == 0 {
                metrics.healthy_instances = size;
            }
            Ok(metrics)
        })
    }
}

/// A source that returns whatever snapshot was last set.
#[derive(Default)]
pub struct StaticMetricsSource {
    metrics: RwLock<SystemMetrics>,
    unavailable: AtomicBool,
}

impl StaticMetricsSource {
    pub fn new(metrics: SystemMetrics) -> Self {
        Self {
            metrics: RwLock::new(metrics),
            unavailable: AtomicBool::new(false),
        }
    }

    pub async fn set(&self, metrics: SystemMetrics) {
        *self.metrics.write().await = metrics;
    }

    /// Simulate a telemetry outage: fetches fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl MetricsSource for StaticMetricsSource {
    fn current_metrics(&self) -> MetricsFuture<'_> {
        Box::pin(async move {
            if self.unavailable.load(Ordering::SeqCst) {
                anyhow::bail!("telemetry source unavailable");
            }
            Ok(self.metrics.read().await.clone())
        })
    }
}
