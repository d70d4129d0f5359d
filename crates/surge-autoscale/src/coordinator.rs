//! Global exclusivity and cooldown bookkeeping.
//!
//! At most one resize runs at a time across manual and policy-driven
//! scaling. The last-action timestamp is shared by every policy, so a
//! policy's cooldown is measured from the most recent scaling action of
//! any policy.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

const NO_ACTION: i64 = i64::MIN;

pub struct ScalingCoordinator {
    in_flight: AtomicBool,
    /// Milliseconds since the epoch, or `NO_ACTION`.
    last_action_ms: AtomicI64,
}

impl Default for ScalingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalingCoordinator {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            last_action_ms: AtomicI64::new(NO_ACTION),
        }
    }

    pub fn is_scaling(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn last_action(&self) -> Option<DateTime<Utc>> {
        match self.last_action_ms.load(Ordering::SeqCst) {
            NO_ACTION => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    /// Whether `cooldown` has not yet elapsed since the last scaling action.
    pub fn in_cooldown(&self, cooldown: Duration, now: DateTime<Utc>) -> bool {
        let last = self.last_action_ms.load(Ordering::SeqCst);
        if last == NO_ACTION {
            return false;
        }
        let cooldown_ms = i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX);
        now.timestamp_millis().saturating_sub(last) < cooldown_ms
    }

    /// Claim the in-flight flag and stamp the last-action time.
    ///
    /// Returns `None` when another resize already holds the flag. The flag is
    /// released when the returned lease is dropped.
    pub fn try_begin(&self, now: DateTime<Utc>) -> Option<ScalingLease<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        self.last_action_ms
            .store(now.timestamp_millis(), Ordering::SeqCst);
        Some(ScalingLease { coordinator: self })
    }
}

/// Holds the in-flight flag for the duration of one scaling execution.
pub struct ScalingLease<'a> {
    coordinator: &'a ScalingCoordinator,
}

impl Drop for ScalingLease<'_> {
    fn drop(&mut self) {
        self.coordinator.in_flight.store(false, Ordering::SeqCst);
    }
}
