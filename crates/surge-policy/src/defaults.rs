//! The built-in policy set seeded into a fresh registry.

use std::collections::BTreeMap;

use serde_json::json;

use surge_state::{
    ActionType, Aggregation, ComparisonOperator, META_LOOK_AHEAD_MINUTES, META_SCHEDULE,
    PolicyType, ScalingAction, ScalingPolicy, ScalingTrigger, TriggerCondition,
};

/// High CPU, high memory, high latency, low usage, predictive CPU and
/// scheduled peak, in evaluation order.
pub fn default_policies() -> Vec<ScalingPolicy> {
    vec![
        ScalingPolicy {
            id: "high-cpu".to_string(),
            name: "High CPU usage".to_string(),
            policy_type: PolicyType::Reactive,
            enabled: true,
            triggers: vec![trigger(
                "system_cpu_usage",
                ComparisonOperator::GreaterThan,
                75.0,
                300,
                Aggregation::Avg,
                None,
            )],
            actions: vec![action(ActionType::ScaleUp, 2)],
            cooldown_secs: 600,
            min_instances: 2,
            max_instances: 20,
            metadata: BTreeMap::new(),
        },
        ScalingPolicy {
            id: "high-memory".to_string(),
            name: "High memory usage".to_string(),
            policy_type: PolicyType::Reactive,
            enabled: true,
            triggers: vec![trigger(
                "system_memory_usage",
                ComparisonOperator::GreaterThan,
                85.0,
                180,
                Aggregation::Avg,
                None,
            )],
            actions: vec![action(ActionType::ScaleUp, 1)],
            cooldown_secs: 600,
            min_instances: 2,
            max_instances: 20,
            metadata: BTreeMap::new(),
        },
        ScalingPolicy {
            id: "high-latency".to_string(),
            name: "High response time".to_string(),
            policy_type: PolicyType::Reactive,
            enabled: true,
            triggers: vec![trigger(
                "response_time_p95",
                ComparisonOperator::GreaterThan,
                2000.0,
                240,
                Aggregation::P95,
                None,
            )],
            actions: vec![action(ActionType::ScaleUp, 1)],
            cooldown_secs: 480,
            min_instances: 2,
            max_instances: 15,
            metadata: BTreeMap::new(),
        },
        ScalingPolicy {
            id: "low-usage".to_string(),
            name: "Low resource usage".to_string(),
            policy_type: PolicyType::Reactive,
            enabled: true,
            triggers: vec![
                trigger(
                    "system_cpu_usage",
                    ComparisonOperator::LessThan,
                    20.0,
                    900,
                    Aggregation::Avg,
                    Some(TriggerCondition::And),
                ),
                trigger(
                    "system_memory_usage",
                    ComparisonOperator::LessThan,
                    40.0,
                    900,
                    Aggregation::Avg,
                    Some(TriggerCondition::And),
                ),
            ],
            actions: vec![action(ActionType::ScaleDown, 1)],
            cooldown_secs: 1200,
            min_instances: 2,
            max_instances: 20,
            metadata: BTreeMap::new(),
        },
        ScalingPolicy {
            id: "predictive-cpu".to_string(),
            name: "Predictive CPU scaling".to_string(),
            policy_type: PolicyType::Predictive,
            enabled: true,
            triggers: vec![trigger(
                "system_cpu_usage",
                ComparisonOperator::GreaterThan,
                70.0,
                0,
                Aggregation::Avg,
                None,
            )],
            actions: vec![action(ActionType::ScaleUp, 1)],
            cooldown_secs: 900,
            min_instances: 2,
            max_instances: 15,
            metadata: BTreeMap::from([(META_LOOK_AHEAD_MINUTES.to_string(), json!(15))]),
        },
        ScalingPolicy {
            id: "scheduled-peak".to_string(),
            name: "Scheduled peak hours".to_string(),
            policy_type: PolicyType::Scheduled,
            enabled: true,
            triggers: Vec::new(),
            actions: vec![action(ActionType::ScaleTo, 6)],
            cooldown_secs: 3600,
            min_instances: 2,
            max_instances: 20,
            metadata: BTreeMap::from([(META_SCHEDULE.to_string(), json!("0 8,18 * * *"))]),
        },
    ]
}

fn trigger(
    metric: &str,
    operator: ComparisonOperator,
    threshold: f64,
    duration_secs: u64,
    aggregation: Aggregation,
    condition: Option<TriggerCondition>,
) -> ScalingTrigger {
    ScalingTrigger {
        metric: metric.to_string(),
        operator,
        threshold,
        duration_secs,
        aggregation,
        condition,
    }
}

fn action(action_type: ActionType, value: u32) -> ScalingAction {
    ScalingAction {
        action_type,
        value,
        priority: 1,
        parameters: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_ordered() {
        let ids: Vec<String> = default_policies().into_iter().map(|p| p.id).collect();
        assert_eq!(
            ids,
            [
                "high-cpu",
                "high-memory",
                "high-latency",
                "low-usage",
                "predictive-cpu",
                "scheduled-peak"
            ]
        );
    }

    #[test]
    fn predictive_default_looks_ahead_fifteen_minutes() {
        let p = default_policies()
            .into_iter()
            .find(|p| p.policy_type == PolicyType::Predictive)
            .unwrap();
        assert_eq!(p.look_ahead_minutes(), 15);
        assert_eq!(p.max_instances, 15);
    }

    #[test]
    fn scheduled_default_fires_at_peak_hours() {
        let p = default_policies().pop().unwrap();
        assert_eq!(p.schedule_hours(), vec![8, 18]);
        assert_eq!(p.actions[0].action_type, ActionType::ScaleTo);
        assert_eq!(p.actions[0].value, 6);
    }
}
