//! Simulated fleet — stands in for a provider backend.
//!
//! Scale-up waits a fixed launch delay, scale-down a fixed graceful-drain
//! delay, then the in-memory size is updated. Provider failures can be
//! injected to exercise the engine's failure path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use surge_core::{ConfigResult, SurgeConfig};

use crate::controller::{FleetController, FleetError, FleetFuture};

pub struct SimulatedFleet {
    size: AtomicU32,
    launch_delay: Duration,
    drain_delay: Duration,
    /// Number of upcoming resize calls that should fail.
    pending_failures: AtomicU32,
    resize_calls: AtomicU32,
}

impl SimulatedFleet {
    /// A fleet of `initial_size` instances with no launch or drain delay.
    pub fn new(initial_size: u32) -> Self {
        Self::with_delays(initial_size, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_delays(initial_size: u32, launch_delay: Duration, drain_delay: Duration) -> Self {
        Self {
            size: AtomicU32::new(initial_size),
            launch_delay,
            drain_delay,
            pending_failures: AtomicU32::new(0),
            resize_calls: AtomicU32::new(0),
        }
    }

    /// Build from the `[fleet]` section of `surge.toml`.
    pub fn from_config(config: &SurgeConfig) -> ConfigResult<Self> {
        Ok(Self::with_delays(
            config.fleet.initial_size,
            config.launch_delay()?,
            config.drain_delay()?,
        ))
    }

    /// Make the next `count` resize calls fail with a provider error.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Current instance count (synchronous, for diagnostics).
    pub fn size(&self) -> u32 {
        self.size.load(Ordering::SeqCst)
    }

    /// Total resize calls received, including failed ones.
    pub fn resize_calls(&self) -> u32 {
        self.resize_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl FleetController for SimulatedFleet {
    fn fleet_size(&self) -> FleetFuture<'_, u32> {
        let size = self.size();
        Box::pin(async move { Ok(size) })
    }

    fn resize(&self, target: u32) -> FleetFuture<'_, ()> {
        Box::pin(async move {
            self.resize_calls.fetch_add(1, Ordering::SeqCst);
            let current = self.size();
            let delay = if target >= current {
                self.launch_delay
            } else {
                self.drain_delay
            };

            if !delay.is_zero() {
                debug!(from = current, to = target, ?delay, "simulating fleet resize");
                tokio::time::sleep(delay).await;
            }

            if self.take_failure() {
                return Err(FleetError::Provider(format!(
                    "simulated provider failure resizing {current} -> {target}"
                )));
            }

            self.size.store(target, Ordering::SeqCst);
            info!(from = current, to = target, "fleet resized");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resize_updates_size() {
        let fleet = SimulatedFleet::new(3);
        assert_eq!(fleet.fleet_size().await.unwrap(), 3);

        fleet.resize(5).await.unwrap();
        assert_eq!(fleet.fleet_size().await.unwrap(), 5);

        fleet.resize(2).await.unwrap();
        assert_eq!(fleet.size(), 2);
        assert_eq!(fleet.resize_calls(), 2);
    }

    #[tokio::test]
    async fn injected_failures_leave_size_unchanged() {
        let fleet = SimulatedFleet::new(3);
        fleet.fail_next(1);

        let err = fleet.resize(6).await.unwrap_err();
        assert!(matches!(err, FleetError::Provider(_)));
        assert_eq!(fleet.size(), 3);

        // Only one failure was armed.
        fleet.resize(6).await.unwrap();
        assert_eq!(fleet.size(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn scale_up_waits_for_launch_delay() {
        let fleet = SimulatedFleet::with_delays(
            2,
            Duration::from_secs(30),
            Duration::from_secs(10),
        );
        let started = tokio::time::Instant::now();
        fleet.resize(4).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(30));

        let started = tokio::time::Instant::now();
        fleet.resize(3).await.unwrap();
        let drained = started.elapsed();
        assert!(drained >= Duration::from_secs(10) && drained < Duration::from_secs(30));
    }

    #[test]
    fn from_config_reads_fleet_section() {
        let config = SurgeConfig::from_toml_str(
            "[fleet]\ninitial_size = 7\nlaunch_delay = \"1s\"\ndrain_delay = \"500ms\"\n",
        )
        .unwrap();
        let fleet = SimulatedFleet::from_config(&config).unwrap();
        assert_eq!(fleet.size(), 7);
        assert_eq!(fleet.launch_delay, Duration::from_secs(1));
        assert_eq!(fleet.drain_delay, Duration::from_millis(500));
    }
}
