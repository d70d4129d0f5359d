//! Trigger evaluation and action planning.
//!
//! Everything here is synchronous and side-effect free apart from logging.
//! Predictive policies need the forecast engine and are handled by the
//! scaling engine itself.

use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, warn};

use surge_state::{ActionType, ScalingAction, ScalingPolicy, SystemMetrics};

/// Combine a reactive policy's triggers left to right.
///
/// A met `or` trigger fires the policy immediately. Any other trigger that is
/// not met stops evaluation for this tick. Returns a description of the met
/// triggers when the policy fires.
pub fn reactive_triggered(policy: &ScalingPolicy, metrics: &SystemMetrics) -> Option<String> {
    let mut met = Vec::new();

    for trigger in &policy.triggers {
        let observed = metrics.get(&trigger.metric);
        if observed.is_none() {
            warn!(policy = %policy.id, metric = %trigger.metric, "unknown trigger metric");
        }
        let is_met = observed.is_some_and(|v| trigger.is_met(v));
        let describe = || format!("{trigger} (observed {})", observed.unwrap_or_default());

        if trigger.is_or() {
            if is_met {
                return Some(describe());
            }
            continue;
        }
        if !is_met {
            debug!(policy = %policy.id, trigger = %trigger, "trigger not met");
            return None;
        }
        met.push(describe());
    }

    if met.is_empty() {
        None
    } else {
        Some(met.join(" and "))
    }
}

/// Whether `now` falls in one of a scheduled policy's trigger hours (UTC).
pub fn scheduled_triggered(policy: &ScalingPolicy, now: DateTime<Utc>) -> Option<String> {
    let hour = now.hour();
    policy
        .schedule_hours()
        .contains(&hour)
        .then(|| format!("schedule {hour:02}:00 UTC"))
}

/// Result of applying a policy's actions to the current fleet size.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlan {
    pub target: u32,
    /// Type of the first action in execution order.
    pub event_type: ActionType,
    /// Notify actions to emit, in execution order.
    pub notifications: Vec<ScalingAction>,
}

/// Apply `policy`'s actions, in ascending priority, starting from `current`.
///
/// Returns `None` for a policy without actions.
pub fn plan_actions(policy: &ScalingPolicy, current: u32) -> Option<ActionPlan> {
    let mut actions: Vec<&ScalingAction> = policy.actions.iter().collect();
    actions.sort_by_key(|a| a.priority);
    let event_type = actions.first()?.action_type;

    let mut target = current;
    let mut resizes = false;
    let mut notifications = Vec::new();
    for action in actions {
        match action.action_type {
            ActionType::ScaleUp => {
                target = target.saturating_add(action.value).min(policy.max_instances);
                resizes = true;
            }
            ActionType::ScaleDown => {
                target = target.saturating_sub(action.value).max(policy.min_instances);
                resizes = true;
            }
            ActionType::ScaleTo => {
                target = policy.clamp_instances(action.value);
                resizes = true;
            }
            ActionType::Notify => notifications.push(action.clone()),
        }
    }
    if resizes {
        target = policy.clamp_instances(target);
    }

    Some(ActionPlan {
        target,
        event_type,
        notifications,
    })
}
