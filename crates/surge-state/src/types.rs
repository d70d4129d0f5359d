//! Domain types for the Surge control loop.
//!
//! These types represent scaling policies, the audit events produced when
//! policies fire, forecasting output, and the telemetry snapshot policies are
//! evaluated against. All types are serializable to/from JSON for storage in
//! redb tables and for the daemon's command output.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a scaling policy.
pub type PolicyId = String;

/// Metadata key holding the predictive look-ahead window in minutes.
pub const META_LOOK_AHEAD_MINUTES: &str = "look_ahead_minutes";

/// Metadata key holding the (unparsed) schedule expression.
pub const META_SCHEDULE: &str = "schedule";

/// Metadata key holding explicit UTC trigger hours for scheduled policies.
pub const META_SCHEDULE_HOURS: &str = "schedule_hours";

/// Look-ahead used by predictive policies without explicit metadata.
pub const DEFAULT_LOOK_AHEAD_MINUTES: u32 = 15;

/// UTC hours a scheduled policy fires at when no `schedule_hours` are set.
pub const DEFAULT_SCHEDULE_HOURS: [u32; 2] = [8, 18];

// ── Policy ─────────────────────────────────────────────────────────

/// A named rule mapping observed or forecast conditions to fleet actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingPolicy {
    pub id: PolicyId,
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub enabled: bool,
    /// Conditions, combined left to right.
    pub triggers: Vec<ScalingTrigger>,
    /// Actions, executed in ascending `priority` order.
    pub actions: Vec<ScalingAction>,
    /// Minimum seconds since the last scaling action (of any policy).
    pub cooldown_secs: u64,
    pub min_instances: u32,
    pub max_instances: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Reactive,
    Predictive,
    Scheduled,
}

impl ScalingPolicy {
    /// Predictive look-ahead window, falling back to 15 minutes.
    pub fn look_ahead_minutes(&self) -> u32 {
        self.metadata
            .get(META_LOOK_AHEAD_MINUTES)
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_LOOK_AHEAD_MINUTES)
    }

    /// UTC hours at which a scheduled policy triggers.
    ///
    /// The `schedule` expression is not parsed; only an explicit
    /// `schedule_hours` array overrides the 08:00/18:00 default.
    pub fn schedule_hours(&self) -> Vec<u32> {
        match self.metadata.get(META_SCHEDULE_HOURS).and_then(|v| v.as_array()) {
            Some(hours) => hours
                .iter()
                .filter_map(|h| h.as_u64())
                .filter(|h| *h < 24)
                .map(|h| h as u32)
                .collect(),
            None => DEFAULT_SCHEDULE_HOURS.to_vec(),
        }
    }

    /// Clamp a target instance count into this policy's bounds.
    pub fn clamp_instances(&self, target: u32) -> u32 {
        target.max(self.min_instances).min(self.max_instances)
    }
}

// ── Trigger ────────────────────────────────────────────────────────

/// A single metric/threshold/operator condition within a policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingTrigger {
    pub metric: String,
    pub operator: ComparisonOperator,
    pub threshold: f64,
    /// Sustained-condition window in seconds (informational).
    pub duration_secs: u64,
    pub aggregation: Aggregation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<TriggerCondition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "=")]
    Equal,
}

/// How the sample was aggregated upstream (descriptive only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Avg,
    Max,
    Min,
    Sum,
    P95,
    P99,
}

/// How a trigger combines with its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    And,
    Or,
}

impl ComparisonOperator {
    pub fn compare(self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::GreaterOrEqual => value >= threshold,
            Self::LessThan => value < threshold,
            Self::LessOrEqual => value <= threshold,
            Self::Equal => (value - threshold).abs() < f64::EPSILON,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::Equal => "=",
        }
    }
}

impl ScalingTrigger {
    /// Whether `value` satisfies this trigger's comparison.
    pub fn is_met(&self, value: f64) -> bool {
        self.operator.compare(value, self.threshold)
    }

    pub fn is_or(&self) -> bool {
        self.condition == Some(TriggerCondition::Or)
    }
}

impl fmt::Display for ScalingTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.metric, self.operator.symbol(), self.threshold)
    }
}

// ── Action ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingAction {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Instance delta, or the absolute target for `scale_to`.
    pub value: u32,
    pub priority: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ScaleUp,
    ScaleDown,
    ScaleTo,
    Notify,
}

impl ActionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScaleUp => "scale_up",
            Self::ScaleDown => "scale_down",
            Self::ScaleTo => "scale_to",
            Self::Notify => "notify",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Event ──────────────────────────────────────────────────────────

/// Immutable audit record of one executed policy action set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingEvent {
    pub id: String,
    pub policy_id: PolicyId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: ActionType,
    /// Human-readable description of what caused the event.
    pub trigger: String,
    pub from_instances: u32,
    pub to_instances: u32,
    /// Wall-clock cost of the resize in milliseconds.
    pub duration_ms: u64,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metrics: SystemMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Failed,
}

// ── Forecasting ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Linear,
    Seasonal,
    Polynomial,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Seasonal => "seasonal",
            Self::Polynomial => "polynomial",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A forecasting model entry in the engine's model table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionModel {
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    /// Static quality hint (0.0–1.0).
    pub accuracy: f64,
    pub last_trained: DateTime<Utc>,
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
}

/// One predicted point in a forecast run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceForecast {
    pub timestamp: DateTime<Utc>,
    pub metric: String,
    pub predicted: f64,
    /// Heuristic confidence (0.0–1.0).
    pub confidence: f64,
    /// Minutes ahead of the forecast run.
    pub horizon: u32,
    /// Name of the model that produced this point.
    pub model: String,
}

// ── Metrics ────────────────────────────────────────────────────────

/// Point-in-time aggregate system metrics from the telemetry source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SystemMetrics {
    /// CPU usage (0–100).
    pub system_cpu_usage: f64,
    /// Memory usage (0–100).
    pub system_memory_usage: f64,
    /// Response time average in milliseconds.
    pub response_time_avg: f64,
    /// Response time P95 in milliseconds.
    pub response_time_p95: f64,
    /// Response time P99 in milliseconds.
    pub response_time_p99: f64,
    /// Error rate (percentage).
    pub error_rate: f64,
    /// Requests per second.
    pub request_rate: f64,
    pub current_instances: u32,
    pub healthy_instances: u32,
}

impl SystemMetrics {
    /// Names accepted by [`SystemMetrics::get`], in field order.
    pub const METRIC_NAMES: [&'static str; 9] = [
        "system_cpu_usage",
        "system_memory_usage",
        "response_time_avg",
        "response_time_p95",
        "response_time_p99",
        "error_rate",
        "request_rate",
        "current_instances",
        "healthy_instances",
    ];

    /// Look up a metric by name. Returns `None` for unknown names.
    pub fn get(&self, metric: &str) -> Option<f64> {
        let value = match metric {
            "system_cpu_usage" => self.system_cpu_usage,
            "system_memory_usage" => self.system_memory_usage,
            "response_time_avg" => self.response_time_avg,
            "response_time_p95" => self.response_time_p95,
            "response_time_p99" => self.response_time_p99,
            "error_rate" => self.error_rate,
            "request_rate" => self.request_rate,
            "current_instances" => self.current_instances as f64,
            "healthy_instances" => self.healthy_instances as f64,
            _ => return None,
        };
        Some(value)
    }

    /// All `(name, value)` pairs, for recording into the time-series store.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        Self::METRIC_NAMES
            .iter()
            .filter_map(|name| self.get(name).map(|v| (*name, v)))
            .collect()
    }
}

/// A single historical sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    /// Unix timestamp in milliseconds (the range-scan score).
    pub timestamp_ms: i64,
    pub value: f64,
}

impl MetricSample {
    /// Build the key for the samples table.
    ///
    /// The timestamp is zero-padded so lexicographic order matches time order.
    pub fn table_key(metric: &str, timestamp_ms: i64) -> String {
        format!("{metric}:{:020}", timestamp_ms.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(op: ComparisonOperator, threshold: f64) -> ScalingTrigger {
        ScalingTrigger {
            metric: "system_cpu_usage".to_string(),
            operator: op,
            threshold,
            duration_secs: 300,
            aggregation: Aggregation::Avg,
            condition: None,
        }
    }

    #[test]
    fn operators_compare() {
        assert!(trigger(ComparisonOperator::GreaterThan, 75.0).is_met(80.0));
        assert!(!trigger(ComparisonOperator::GreaterThan, 75.0).is_met(75.0));
        assert!(trigger(ComparisonOperator::GreaterOrEqual, 75.0).is_met(75.0));
        assert!(trigger(ComparisonOperator::LessThan, 20.0).is_met(10.0));
        assert!(trigger(ComparisonOperator::LessOrEqual, 20.0).is_met(20.0));
        assert!(trigger(ComparisonOperator::Equal, 3.0).is_met(3.0));
        assert!(!trigger(ComparisonOperator::Equal, 3.0).is_met(3.5));
    }

    #[test]
    fn operator_wire_names() {
        let t = trigger(ComparisonOperator::GreaterOrEqual, 1.0);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["operator"], ">=");
        assert_eq!(json["aggregation"], "avg");
        assert!(json.get("condition").is_none());
    }

    #[test]
    fn trigger_display() {
        let t = trigger(ComparisonOperator::GreaterThan, 75.0);
        assert_eq!(t.to_string(), "system_cpu_usage > 75");
    }

    #[test]
    fn metrics_lookup_by_name() {
        let m = SystemMetrics {
            system_cpu_usage: 80.0,
            response_time_p95: 2100.0,
            current_instances: 3,
            ..Default::default()
        };
        assert_eq!(m.get("system_cpu_usage"), Some(80.0));
        assert_eq!(m.get("response_time_p95"), Some(2100.0));
        assert_eq!(m.get("current_instances"), Some(3.0));
        assert_eq!(m.get("disk_usage"), None);
        assert_eq!(m.entries().len(), SystemMetrics::METRIC_NAMES.len());
    }

    #[test]
    fn metrics_deserialize_partial() {
        let m: SystemMetrics = serde_json::from_str(r#"{"system_cpu_usage": 42.5}"#).unwrap();
        assert_eq!(m.system_cpu_usage, 42.5);
        assert_eq!(m.current_instances, 0);
    }

    #[test]
    fn sample_keys_sort_by_time() {
        let a = MetricSample::table_key("cpu", 999);
        let b = MetricSample::table_key("cpu", 1_000);
        assert!(a < b);
        assert_eq!(b, "cpu:00000000000000001000");
    }

    #[test]
    fn policy_metadata_defaults() {
        let mut policy = ScalingPolicy {
            id: "p".to_string(),
            name: "p".to_string(),
            policy_type: PolicyType::Scheduled,
            enabled: true,
            triggers: vec![],
            actions: vec![],
            cooldown_secs: 0,
            min_instances: 2,
            max_instances: 20,
            metadata: BTreeMap::new(),
        };
        assert_eq!(policy.look_ahead_minutes(), 15);
        assert_eq!(policy.schedule_hours(), vec![8, 18]);

        policy
            .metadata
            .insert(META_LOOK_AHEAD_MINUTES.to_string(), serde_json::json!(30));
        policy
            .metadata
            .insert(META_SCHEDULE_HOURS.to_string(), serde_json::json!([6, 25, 21]));
        assert_eq!(policy.look_ahead_minutes(), 30);
        assert_eq!(policy.schedule_hours(), vec![6, 21]);

        assert_eq!(policy.clamp_instances(1), 2);
        assert_eq!(policy.clamp_instances(50), 20);
    }
}
