//! StateStore — redb-backed persistence for Surge.
//!
//! Provides the time-series operations the forecasting engine consumes
//! (`range_by_score`, `set_with_ttl`), sample retention, and typed storage
//! for the policy registry. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// A cached value with its absolute expiry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    expires_at_ms: i64,
    value: String,
}

/// A policy with its position in the registry's iteration order.
#[derive(Debug, Serialize, Deserialize)]
struct StoredPolicy {
    position: u64,
    policy: ScalingPolicy,
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        txn.open_table(CACHE).map_err(map_err!(Table))?;
        txn.open_table(POLICIES).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Samples ────────────────────────────────────────────────────

    /// Append one sample to a metric's history.
    pub fn put_sample(&self, metric: &str, sample: &MetricSample) -> StateResult<()> {
        self.put_samples(metric, std::slice::from_ref(sample))
    }

    /// Append a batch of samples to a metric's history in one transaction.
    pub fn put_samples(&self, metric: &str, samples: &[MetricSample]) -> StateResult<()> {
        validate_metric(metric)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            for sample in samples {
                let key = MetricSample::table_key(metric, sample.timestamp_ms);
                let value = serde_json::to_vec(sample).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Samples for `metric` with `from_ms <= timestamp <= to_ms`, ascending.
    pub fn range_by_score(
        &self,
        metric: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> StateResult<Vec<MetricSample>> {
        validate_metric(metric)?;
        if to_ms < from_ms {
            return Ok(Vec::new());
        }
        let from = MetricSample::table_key(metric, from_ms);
        let to = MetricSample::table_key(metric, to_ms);

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range::<&str>(from.as_str()..=to.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let sample: MetricSample =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(sample);
        }
        Ok(results)
    }

    /// The most recent sample recorded for `metric`.
    pub fn latest_sample(&self, metric: &str) -> StateResult<Option<MetricSample>> {
        validate_metric(metric)?;
        let from = MetricSample::table_key(metric, 0);
        let to = MetricSample::table_key(metric, i64::MAX);

        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
        let mut range = table
            .range::<&str>(from.as_str()..=to.as_str())
            .map_err(map_err!(Read))?;
        match range.next_back() {
            Some(entry) => {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let sample: MetricSample =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(sample))
            }
            None => Ok(None),
        }
    }

    /// Delete samples for `metric` older than `before_ms`. Returns number deleted.
    pub fn prune_samples_before(&self, metric: &str, before_ms: i64) -> StateResult<u32> {
        validate_metric(metric)?;
        let from = MetricSample::table_key(metric, 0);
        let to = MetricSample::table_key(metric, before_ms);
        // Collect keys in a read transaction first.
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            table
                .range::<&str>(from.as_str()..to.as_str())
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    Some(key.value().to_string())
                })
                .collect()
        };
        if keys.is_empty() {
            return Ok(0);
        }
        // Delete in a write transaction.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(SAMPLES).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%metric, count, "samples pruned");
        Ok(count)
    }

    // ── TTL cache ──────────────────────────────────────────────────

    /// Store `value` under `key`, expiring `ttl_secs` from now.
    pub fn set_with_ttl(&self, key: &str, ttl_secs: u64, value: &str) -> StateResult<()> {
        let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            expires_at_ms: now_ms().saturating_add(ttl_ms),
            value: value.to_string(),
        };
        let bytes = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CACHE).map_err(map_err!(Table))?;
            table
                .insert(key, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a cached value if it has not expired.
    pub fn get_cached(&self, key: &str) -> StateResult<Option<String>> {
        self.get_cached_at(key, now_ms())
    }

    /// Get a cached value as seen at `at_ms`.
    pub fn get_cached_at(&self, key: &str, at_ms: i64) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CACHE).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let entry: CacheEntry =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok((entry.expires_at_ms > at_ms).then_some(entry.value))
            }
            None => Ok(None),
        }
    }

    /// Remove every expired cache entry. Returns number removed.
    pub fn purge_expired(&self) -> StateResult<u32> {
        let now = now_ms();
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(CACHE).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let cached: CacheEntry =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if cached.expires_at_ms <= now {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };
        if keys.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let count = keys.len() as u32;
        {
            let mut table = txn.open_table(CACHE).map_err(map_err!(Table))?;
            for key in &keys {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count, "expired cache entries purged");
        Ok(count)
    }

    // ── Policies ───────────────────────────────────────────────────

    /// Insert or update a policy at the given registry position.
    pub fn put_policy(&self, position: u64, policy: &ScalingPolicy) -> StateResult<()> {
        let stored = StoredPolicy {
            position,
            policy: policy.clone(),
        };
        let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            table
                .insert(policy.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(policy = %policy.id, position, "policy stored");
        Ok(())
    }

    /// List all policies in registry order.
    pub fn list_policies(&self) -> StateResult<Vec<ScalingPolicy>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        let mut stored = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let s: StoredPolicy =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            stored.push(s);
        }
        stored.sort_by_key(|s| s.position);
        Ok(stored.into_iter().map(|s| s.policy).collect())
    }

    /// Delete a policy by ID. Returns true if it existed.
    pub fn delete_policy(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(policy = %id, existed, "policy deleted");
        Ok(existed)
    }

    /// Whether the default policy set has ever been written to this store.
    pub fn policies_seeded(&self) -> StateResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(META).map_err(map_err!(Table))?;
        match table.get(POLICIES_SEEDED).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))
            }
            None => Ok(false),
        }
    }

    /// Record that the registry has been seeded. An emptied registry then
    /// stays empty across restarts.
    pub fn mark_policies_seeded(&self) -> StateResult<()> {
        let bytes = serde_json::to_vec(&true).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(META).map_err(map_err!(Table))?;
            table
                .insert(POLICIES_SEEDED, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }
}

const POLICIES_SEEDED: &str = "policies_seeded";

/// Metric names become key prefixes, so the separator is reserved.
fn validate_metric(metric: &str) -> StateResult<()> {
    if metric.is_empty() || metric.contains(':') {
        return Err(StateError::InvalidKey(metric.to_string()));
    }
    Ok(())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
