//! `surged run` — wires the subsystems and drives the background loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use surge_autoscale::ScalingEngine;
use surge_core::SurgeConfig;
use surge_fleet::{FleetController, RetryPolicy, SimulatedFleet};
use surge_forecast::ForecastEngine;
use surge_metrics::{FileMetricsSource, MetricsRecorder, MetricsSource, RecordingSource};
use surge_policy::PolicyRegistry;

/// How often expired history and cache entries are purged.
const RETENTION_INTERVAL: Duration = Duration::from_secs(600);

pub async fn run(config: SurgeConfig) -> anyhow::Result<()> {
    info!("surge daemon starting");

    let state = crate::open_state(&config.store.data_dir)?;

    // ── Initialize subsystems ──────────────────────────────────

    let registry = PolicyRegistry::open(state.clone())?;
    info!(policies = registry.len().await, "policy registry loaded");

    let fleet: Arc<dyn FleetController> = Arc::new(SimulatedFleet::from_config(&config)?);
    info!(initial_size = config.fleet.initial_size, "simulated fleet initialized");

    let recorder = MetricsRecorder::new(state.clone(), config.retention()?);
    let telemetry: Arc<dyn MetricsSource> = Arc::new(FileMetricsSource::new(
        config.metrics.telemetry_file.clone(),
        fleet.clone(),
    ));
    let metrics: Arc<dyn MetricsSource> =
        Arc::new(RecordingSource::new(telemetry, recorder.clone()));
    info!(path = ?config.metrics.telemetry_file, "metrics source initialized");

    let forecast = Arc::new(ForecastEngine::from_config(state.clone(), &config)?);

    let engine = Arc::new(
        ScalingEngine::new(registry, forecast, metrics, fleet)
            .with_retry(RetryPolicy::from_config(&config)?),
    );
    let interval = config.evaluation_interval()?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_shutdown = shutdown_rx.clone();
    let retention_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let engine_handle = tokio::spawn({
        let engine = engine.clone();
        async move {
            engine.run(interval, engine_shutdown).await;
        }
    });

    let retention_handle = tokio::spawn(async move {
        recorder.run(RETENTION_INTERVAL, retention_shutdown).await;
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => error!(error = %e, "failed to listen for ctrl-c, shutting down"),
    }
    let _ = shutdown_tx.send(true);

    let _ = engine_handle.await;
    let _ = retention_handle.await;

    let stats = engine.stats().await;
    info!(
        total_events = stats.total_events,
        success_rate = stats.success_rate,
        "surge daemon stopped"
    );
    Ok(())
}
