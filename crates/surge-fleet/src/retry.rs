//! Bounded, timed resize retries.
//!
//! Each attempt is capped by `attempt_timeout`; a timed-out attempt counts as
//! a failure. Between attempts the backoff doubles up to `max_backoff`. This
//! is independent of policy cooldowns.

use std::time::Duration;

use tracing::{debug, warn};

use surge_core::{ConfigResult, SurgeConfig};

use crate::controller::{FleetController, FleetError, FleetResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// A single attempt with the given timeout.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Build from the `[engine]` section of `surge.toml`.
    pub fn from_config(config: &SurgeConfig) -> ConfigResult<Self> {
        Ok(Self {
            max_attempts: config.engine.retry.max_attempts.max(1),
            initial_backoff: config.initial_backoff()?,
            max_backoff: config.max_backoff()?,
            attempt_timeout: config.resize_timeout()?,
        })
    }

    /// Backoff to wait after the given (1-based) failed attempt.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Resize `fleet` to `target`, retrying per `policy`.
///
/// Returns the number of attempts used on success, or the last error.
pub async fn resize_with_retry(
    fleet: &dyn FleetController,
    target: u32,
    policy: &RetryPolicy,
) -> FleetResult<u32> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = FleetError::Provider("resize not attempted".to_string());

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(policy.attempt_timeout, fleet.resize(target)).await
        {
            Ok(result) => result,
            Err(_) => Err(FleetError::Timeout(policy.attempt_timeout)),
        };

        match result {
            Ok(()) => {
                debug!(target, attempt, "resize completed");
                return Ok(attempt);
            }
            Err(e) => {
                if attempt < attempts {
                    let backoff = policy.backoff_after(attempt);
                    warn!(
                        target,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "resize failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                } else {
                    warn!(target, attempt, error = %e, "resize failed, giving up");
                }
                last_error = e;
            }
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedFleet;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_after(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_after(4), Duration::from_secs(5));
        assert_eq!(policy.backoff_after(40), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let fleet = SimulatedFleet::new(2);
        let attempts = resize_with_retry(&fleet, 4, &fast_policy(3)).await.unwrap();
        assert_eq!(attempts, 1);
        assert_eq!(fleet.size(), 4);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let fleet = SimulatedFleet::new(2);
        fleet.fail_next(2);

        let attempts = resize_with_retry(&fleet, 4, &fast_policy(3)).await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(fleet.size(), 4);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let fleet = SimulatedFleet::new(2);
        fleet.fail_next(5);

        let err = resize_with_retry(&fleet, 4, &fast_policy(2)).await.unwrap_err();
        assert!(matches!(err, FleetError::Provider(_)));
        assert_eq!(fleet.resize_calls(), 2);
        assert_eq!(fleet.size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_resize_times_out() {
        let fleet = SimulatedFleet::with_delays(2, Duration::from_secs(60), Duration::ZERO);
        let policy = RetryPolicy::no_retry(Duration::from_secs(1));

        let err = resize_with_retry(&fleet, 4, &policy).await.unwrap_err();
        assert_eq!(err, FleetError::Timeout(Duration::from_secs(1)));
        assert_eq!(fleet.size(), 2);
    }

    #[test]
    fn from_config_reads_engine_section() {
        let config = SurgeConfig::from_toml_str(
            "[engine]\nresize_timeout = \"90s\"\n[engine.retry]\nmax_attempts = 4\n",
        )
        .unwrap();
        let policy = RetryPolicy::from_config(&config).unwrap();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(90));
        assert_eq!(policy.initial_backoff, Duration::from_secs(1));
    }
}
