//! Bounded, append-only record of executed scaling events.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use surge_state::{EventStatus, ScalingEvent};

/// Events retained before the oldest are evicted.
pub const JOURNAL_CAPACITY: usize = 1000;

pub struct EventJournal {
    events: Mutex<VecDeque<ScalingEvent>>,
    capacity: usize,
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::with_capacity(JOURNAL_CAPACITY)
    }
}

impl EventJournal {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub async fn append(&self, event: ScalingEvent) {
        let mut events = self.events.lock().await;
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// The newest `limit` events, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<ScalingEvent> {
        let events = self.events.lock().await;
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Percentage of retained events that succeeded; 0 when empty.
    pub async fn success_rate(&self) -> f64 {
        let events = self.events.lock().await;
        if events.is_empty() {
            return 0.0;
        }
        let ok = events
            .iter()
            .filter(|e| e.status == EventStatus::Success)
            .count();
        ok as f64 / events.len() as f64 * 100.0
    }
}
