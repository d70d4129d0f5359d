//! Registration-time policy validation.

use surge_state::{PolicyType, ScalingPolicy};

use crate::error::{PolicyError, PolicyResult};

/// Reject policies the evaluator could not act on.
pub fn validate_policy(policy: &ScalingPolicy) -> PolicyResult<()> {
    let invalid = |reason: &str| PolicyError::Invalid {
        id: policy.id.clone(),
        reason: reason.to_string(),
    };

    if policy.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if policy.min_instances > policy.max_instances {
        return Err(PolicyError::Invalid {
            id: policy.id.clone(),
            reason: format!(
                "min_instances ({}) exceeds max_instances ({})",
                policy.min_instances, policy.max_instances
            ),
        });
    }
    if policy.actions.is_empty() {
        return Err(invalid("at least one action is required"));
    }

    match policy.policy_type {
        PolicyType::Reactive | PolicyType::Predictive if policy.triggers.is_empty() => {
            return Err(invalid("at least one trigger is required"));
        }
        _ => {}
    }

    for trigger in &policy.triggers {
        if trigger.metric.is_empty() {
            return Err(invalid("trigger metric must not be empty"));
        }
        if !trigger.threshold.is_finite() {
            return Err(PolicyError::Invalid {
                id: policy.id.clone(),
                reason: format!("trigger on {} has a non-finite threshold", trigger.metric),
            });
        }
    }

    Ok(())
}
