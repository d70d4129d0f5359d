//! Policy registry — ordered, validated, optionally durable.

use tokio::sync::RwLock;
use tracing::{debug, info};

use surge_state::{ScalingPolicy, StateStore};

use crate::defaults::default_policies;
use crate::error::{PolicyError, PolicyResult};
use crate::validate::validate_policy;

struct Entry {
    /// Persisted ordering key. Gaps are fine; only relative order matters.
    position: u64,
    policy: ScalingPolicy,
}

struct Inner {
    entries: Vec<Entry>,
    next_position: u64,
}

/// The set of policies the evaluator sweeps, in registration order.
pub struct PolicyRegistry {
    inner: RwLock<Inner>,
    state: Option<StateStore>,
}

impl PolicyRegistry {
    /// Open the registry persisted in `state`, seeding the default set the
    /// first time a store is opened. A registry emptied later stays empty.
    pub fn open(state: StateStore) -> PolicyResult<Self> {
        let mut policies = state.list_policies()?;
        if !state.policies_seeded()? {
            if policies.is_empty() {
                policies = default_policies();
                info!(count = policies.len(), "seeding default scaling policies");
            }
            state.mark_policies_seeded()?;
        }

        // Renumber so positions are dense after a restart.
        let mut entries = Vec::with_capacity(policies.len());
        for (position, policy) in policies.into_iter().enumerate() {
            let position = position as u64;
            state.put_policy(position, &policy)?;
            entries.push(Entry { position, policy });
        }
        debug!(count = entries.len(), "policy registry opened");

        Ok(Self {
            inner: RwLock::new(Inner {
                next_position: entries.len() as u64,
                entries,
            }),
            state: Some(state),
        })
    }

    /// A non-durable registry holding `policies`.
    pub fn in_memory(policies: Vec<ScalingPolicy>) -> PolicyResult<Self> {
        let mut entries = Vec::with_capacity(policies.len());
        for policy in policies {
            validate_policy(&policy)?;
            if entries.iter().any(|e: &Entry| e.policy.id == policy.id) {
                return Err(PolicyError::Duplicate(policy.id));
            }
            entries.push(Entry {
                position: entries.len() as u64,
                policy,
            });
        }
        Ok(Self {
            inner: RwLock::new(Inner {
                next_position: entries.len() as u64,
                entries,
            }),
            state: None,
        })
    }

    /// A non-durable registry holding the default set.
    pub fn in_memory_with_defaults() -> PolicyResult<Self> {
        Self::in_memory(default_policies())
    }

    /// Snapshot of every policy, in evaluation order.
    pub async fn list(&self) -> Vec<ScalingPolicy> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .map(|e| e.policy.clone())
            .collect()
    }

    /// Snapshot of the enabled policies, in evaluation order.
    pub async fn enabled(&self) -> Vec<ScalingPolicy> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .filter(|e| e.policy.enabled)
            .map(|e| e.policy.clone())
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<ScalingPolicy> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .find(|e| e.policy.id == id)
            .map(|e| e.policy.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Validate and append a policy. Ids must be unique.
    pub async fn add(&self, policy: ScalingPolicy) -> PolicyResult<()> {
        validate_policy(&policy)?;

        let mut inner = self.inner.write().await;
        if inner.entries.iter().any(|e| e.policy.id == policy.id) {
            return Err(PolicyError::Duplicate(policy.id));
        }

        let position = inner.next_position;
        if let Some(state) = &self.state {
            state.put_policy(position, &policy)?;
        }
        inner.next_position += 1;
        info!(policy = %policy.id, position, "policy registered");
        inner.entries.push(Entry { position, policy });
        Ok(())
    }

    /// Remove a policy, returning it.
    pub async fn remove(&self, id: &str) -> PolicyResult<ScalingPolicy> {
        let mut inner = self.inner.write().await;
        let index = inner
            .entries
            .iter()
            .position(|e| e.policy.id == id)
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))?;

        if let Some(state) = &self.state {
            state.delete_policy(id)?;
        }
        let entry = inner.entries.remove(index);
        info!(policy = %id, "policy removed");
        Ok(entry.policy)
    }

    /// Enable or disable a policy.
    pub async fn toggle(&self, id: &str, enabled: bool) -> PolicyResult<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .entries
            .iter_mut()
            .find(|e| e.policy.id == id)
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))?;

        if entry.policy.enabled == enabled {
            return Ok(());
        }
        let mut updated = entry.policy.clone();
        updated.enabled = enabled;
        if let Some(state) = &self.state {
            state.put_policy(entry.position, &updated)?;
        }
        entry.policy = updated;
        info!(policy = %id, enabled, "policy toggled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(id: &str) -> ScalingPolicy {
        let mut p = default_policies().remove(0);
        p.id = id.to_string();
        p.name = format!("custom {id}");
        p
    }

    #[tokio::test]
    async fn open_seeds_defaults_once() {
        let state = StateStore::open_in_memory().unwrap();
        let registry = PolicyRegistry::open(state.clone()).unwrap();
        assert_eq!(registry.len().await, 6);

        registry.remove("high-memory").await.unwrap();
        drop(registry);

        let reopened = PolicyRegistry::open(state).unwrap();
        assert_eq!(reopened.len().await, 5);
        assert!(reopened.get("high-memory").await.is_none());
    }

    #[tokio::test]
    async fn emptied_registry_stays_empty_after_reopen() {
        let state = StateStore::open_in_memory().unwrap();
        let registry = PolicyRegistry::open(state.clone()).unwrap();
        let ids: Vec<String> = registry.list().await.into_iter().map(|p| p.id).collect();
        for id in &ids {
            registry.remove(id).await.unwrap();
        }
        assert!(registry.is_empty().await);
        drop(registry);

        let reopened = PolicyRegistry::open(state).unwrap();
        assert_eq!(reopened.len().await, 0);
    }

    #[tokio::test]
    async fn existing_policies_are_kept_without_seeding() {
        let state = StateStore::open_in_memory().unwrap();
        state.put_policy(0, &custom("burst")).unwrap();

        let registry = PolicyRegistry::open(state.clone()).unwrap();
        let ids: Vec<String> = registry.list().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["burst"]);
        assert!(state.policies_seeded().unwrap());
    }

    #[tokio::test]
    async fn add_appends_in_order_and_persists() {
        let state = StateStore::open_in_memory().unwrap();
        let registry = PolicyRegistry::open(state.clone()).unwrap();
        registry.remove("high-cpu").await.unwrap();
        registry.add(custom("burst")).await.unwrap();

        let ids: Vec<String> = registry.list().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids.last().map(String::as_str), Some("burst"));

        let reopened = PolicyRegistry::open(state).unwrap();
        let reopened_ids: Vec<String> =
            reopened.list().await.into_iter().map(|p| p.id).collect();
        assert_eq!(reopened_ids, ids);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let registry = PolicyRegistry::in_memory_with_defaults().unwrap();
        let err = registry.add(custom("high-cpu")).await.unwrap_err();
        assert!(matches!(err, PolicyError::Duplicate(id) if id == "high-cpu"));
    }

    #[tokio::test]
    async fn invalid_policy_is_rejected_at_registration() {
        let registry = PolicyRegistry::in_memory(Vec::new()).unwrap();
        let mut bad = custom("bad");
        bad.min_instances = 9;
        bad.max_instances = 3;
        assert!(matches!(
            registry.add(bad).await,
            Err(PolicyError::Invalid { .. })
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn toggle_filters_enabled_and_persists() {
        let state = StateStore::open_in_memory().unwrap();
        let registry = PolicyRegistry::open(state.clone()).unwrap();
        registry.toggle("low-usage", false).await.unwrap();

        assert!(!registry.enabled().await.iter().any(|p| p.id == "low-usage"));
        assert_eq!(registry.list().await.len(), 6);

        let reopened = PolicyRegistry::open(state).unwrap();
        assert!(!reopened.get("low-usage").await.unwrap().enabled);
        // Order is kept across the toggle.
        assert_eq!(reopened.list().await[3].id, "low-usage");
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let registry = PolicyRegistry::in_memory_with_defaults().unwrap();
        assert!(matches!(
            registry.toggle("nope", true).await,
            Err(PolicyError::NotFound(_))
        ));
        assert!(matches!(
            registry.remove("nope").await,
            Err(PolicyError::NotFound(_))
        ));
    }
}
