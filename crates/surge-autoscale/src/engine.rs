//! Scaling engine — sweeps policies and executes fleet resizes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use surge_fleet::{FleetController, RetryPolicy, resize_with_retry};
use surge_forecast::{CONFIDENCE_GATE, ForecastEngine};
use surge_metrics::MetricsSource;
use surge_policy::{PolicyError, PolicyRegistry};
use surge_state::{
    ActionType, EventStatus, PolicyType, ResourceForecast, ScalingAction, ScalingEvent,
    ScalingPolicy, SystemMetrics,
};

use crate::coordinator::ScalingCoordinator;
use crate::error::{EngineError, EngineResult};
use crate::evaluator::{plan_actions, reactive_triggered, scheduled_triggered};
use crate::journal::EventJournal;

/// Events returned by `stats()`.
const RECENT_EVENTS: usize = 50;

/// Metrics and thresholds reported by `predictive_recommendations()`.
const RECOMMENDATION_TARGETS: [(&str, f64); 3] = [
    ("system_cpu_usage", 70.0),
    ("system_memory_usage", 80.0),
    ("response_time_p95", 2000.0),
];
const RECOMMENDATION_HORIZON_MINUTES: u32 = 60;
const RECOMMENDATION_LOOK_AHEAD_MINUTES: u32 = 15;
const RECOMMENDATION_FORECAST_POINTS: usize = 15;

/// Outcome of one policy sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationReport {
    /// Policies that reached trigger evaluation.
    pub evaluated_policies: u32,
    /// Policies whose actions were executed.
    pub triggered_actions: u32,
    pub new_events: Vec<ScalingEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub policies: Vec<ScalingPolicy>,
    pub recent_events: Vec<ScalingEvent>,
    pub is_scaling: bool,
    pub last_scaling_action: Option<DateTime<Utc>>,
    pub total_events: usize,
    /// Percentage of journaled events that succeeded.
    pub success_rate: f64,
}

/// Predictive advice for one metric.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub metric: String,
    pub threshold: f64,
    pub should_scale: bool,
    pub confidence: f64,
    pub time_to_threshold: Option<u32>,
    pub recommended_instances: u32,
    pub forecast: Vec<ResourceForecast>,
}

pub struct ScalingEngine {
    registry: PolicyRegistry,
    forecast: Arc<ForecastEngine>,
    metrics: Arc<dyn MetricsSource>,
    fleet: Arc<dyn FleetController>,
    retry: RetryPolicy,
    coordinator: ScalingCoordinator,
    journal: EventJournal,
}

impl ScalingEngine {
    pub fn new(
        registry: PolicyRegistry,
        forecast: Arc<ForecastEngine>,
        metrics: Arc<dyn MetricsSource>,
        fleet: Arc<dyn FleetController>,
    ) -> Self {
        Self {
            registry,
            forecast,
            metrics,
            fleet,
            retry: RetryPolicy::default(),
            coordinator: ScalingCoordinator::new(),
            journal: EventJournal::default(),
        }
    }

    /// Set the retry policy used for fleet resizes.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_scaling(&self) -> bool {
        self.coordinator.is_scaling()
    }

    pub async fn evaluate_policies(&self) -> EvaluationReport {
        self.evaluate_policies_at(Utc::now()).await
    }

    /// Run one sweep over the enabled policies as of `now`.
    pub async fn evaluate_policies_at(&self, now: DateTime<Utc>) -> EvaluationReport {
        let mut report = EvaluationReport::default();

        if self.coordinator.is_scaling() {
            debug!("resize in flight, skipping sweep");
            return report;
        }

        let mut metrics = match self.metrics.current_metrics().await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "metrics unavailable, no policies evaluated");
                return report;
            }
        };

        for policy in self.registry.enabled().await {
            if self.coordinator.is_scaling() {
                debug!(policy = %policy.id, "resize in flight, skipping policy");
                continue;
            }
            if self
                .coordinator
                .in_cooldown(Duration::from_secs(policy.cooldown_secs), now)
            {
                debug!(policy = %policy.id, cooldown_secs = policy.cooldown_secs, "policy in cooldown");
                continue;
            }

            report.evaluated_policies += 1;

            let trigger = match policy.policy_type {
                PolicyType::Reactive => reactive_triggered(&policy, &metrics),
                PolicyType::Predictive => self.predictive_triggered(&policy, &metrics, now).await,
                PolicyType::Scheduled => scheduled_triggered(&policy, now),
            };
            let Some(trigger) = trigger else {
                continue;
            };

            match self.execute(&policy, trigger, &metrics, now).await {
                Ok(event) => {
                    report.triggered_actions += 1;
                    metrics.current_instances = event.to_instances;
                    report.new_events.push(event);
                }
                Err(e) => {
                    warn!(policy = %policy.id, error = %e, "policy execution skipped");
                }
            }
        }

        report
    }

    /// Apply a single action immediately, bypassing cooldowns and policy
    /// bounds.
    pub async fn manual_scale(
        &self,
        action_type: ActionType,
        value: u32,
        reason: &str,
    ) -> EngineResult<ScalingEvent> {
        self.manual_scale_at(action_type, value, reason, Utc::now())
            .await
    }

    pub async fn manual_scale_at(
        &self,
        action_type: ActionType,
        value: u32,
        reason: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ScalingEvent> {
        if self.coordinator.is_scaling() {
            return Err(EngineError::Busy);
        }
        let metrics = self
            .metrics
            .current_metrics()
            .await
            .map_err(|e| EngineError::Metrics(e.to_string()))?;

        let policy = ScalingPolicy {
            id: "manual".to_string(),
            name: "Manual override".to_string(),
            policy_type: PolicyType::Reactive,
            enabled: true,
            triggers: Vec::new(),
            actions: vec![ScalingAction {
                action_type,
                value,
                priority: 1,
                parameters: BTreeMap::new(),
            }],
            cooldown_secs: 0,
            min_instances: 0,
            max_instances: u32::MAX,
            metadata: BTreeMap::new(),
        };

        self.execute(&policy, format!("manual: {reason}"), &metrics, now)
            .await
    }

    pub async fn predictive_recommendations(&self) -> Vec<Recommendation> {
        self.predictive_recommendations_at(Utc::now()).await
    }

    /// Forecast each tracked metric and report whether scaling is advised.
    pub async fn predictive_recommendations_at(&self, now: DateTime<Utc>) -> Vec<Recommendation> {
        let current_instances = self.current_instances().await;

        let mut recommendations = Vec::with_capacity(RECOMMENDATION_TARGETS.len());
        for (metric, threshold) in RECOMMENDATION_TARGETS {
            let mut forecast = self
                .forecast
                .generate_forecast_at(metric, RECOMMENDATION_HORIZON_MINUTES, now)
                .await;
            let decision = self
                .forecast
                .should_predictive_scale(
                    metric,
                    threshold,
                    RECOMMENDATION_LOOK_AHEAD_MINUTES,
                    current_instances,
                )
                .await;
            forecast.truncate(RECOMMENDATION_FORECAST_POINTS);

            recommendations.push(Recommendation {
                metric: metric.to_string(),
                threshold,
                should_scale: decision.should_scale,
                confidence: decision.confidence,
                time_to_threshold: decision.time_to_threshold,
                recommended_instances: decision.recommended_instances,
                forecast,
            });
        }
        recommendations
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            policies: self.registry.list().await,
            recent_events: self.journal.recent(RECENT_EVENTS).await,
            is_scaling: self.coordinator.is_scaling(),
            last_scaling_action: self.coordinator.last_action(),
            total_events: self.journal.len().await,
            success_rate: self.journal.success_rate().await,
        }
    }

    pub async fn add_policy(&self, policy: ScalingPolicy) -> EngineResult<()> {
        Ok(self.registry.add(policy).await?)
    }

    pub async fn remove_policy(&self, id: &str) -> EngineResult<ScalingPolicy> {
        Ok(self.registry.remove(id).await?)
    }

    pub async fn toggle_policy(&self, id: &str, enabled: bool) -> EngineResult<()> {
        Ok(self.registry.toggle(id, enabled).await?)
    }

    /// Run the evaluation loop until shutdown signal.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "scaling engine started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let report = self.evaluate_policies().await;
                    debug!(
                        evaluated = report.evaluated_policies,
                        triggered = report.triggered_actions,
                        "policy sweep complete"
                    );
                    for event in report.new_events.iter().filter(|e| e.status == EventStatus::Failed) {
                        error!(
                            policy = %event.policy_id,
                            error = event.error.as_deref().unwrap_or_default(),
                            "scaling action failed"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("scaling engine shutting down");
                    break;
                }
            }
        }
    }

    async fn predictive_triggered(
        &self,
        policy: &ScalingPolicy,
        metrics: &SystemMetrics,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let trigger = policy.triggers.first()?;
        let look_ahead = policy.look_ahead_minutes();

        self.forecast
            .generate_forecast_at(&trigger.metric, look_ahead, now)
            .await;
        let decision = self
            .forecast
            .should_predictive_scale(
                &trigger.metric,
                trigger.threshold,
                look_ahead,
                metrics.current_instances,
            )
            .await;

        debug!(
            policy = %policy.id,
            metric = %trigger.metric,
            should_scale = decision.should_scale,
            confidence = decision.confidence,
            "predictive decision"
        );

        (decision.should_scale && decision.confidence > CONFIDENCE_GATE).then(|| {
            format!(
                "predicted {} > {} in {} min (confidence {:.2})",
                trigger.metric,
                trigger.threshold,
                decision.time_to_threshold.unwrap_or_default(),
                decision.confidence
            )
        })
    }

    /// Execute `policy`'s actions starting from the observed fleet size and
    /// journal the outcome.
    async fn execute(
        &self,
        policy: &ScalingPolicy,
        trigger: String,
        metrics: &SystemMetrics,
        now: DateTime<Utc>,
    ) -> EngineResult<ScalingEvent> {
        let _lease = self.coordinator.try_begin(now).ok_or(EngineError::Busy)?;

        let from = metrics.current_instances;
        let Some(plan) = plan_actions(policy, from) else {
            return Err(EngineError::Policy(PolicyError::Invalid {
                id: policy.id.clone(),
                reason: "no actions to execute".to_string(),
            }));
        };

        for action in &plan.notifications {
            let message = action
                .parameters
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or(trigger.as_str());
            warn!(policy = %policy.id, instances = from, %message, "scaling alert");
        }

        let mut event = ScalingEvent {
            id: uuid::Uuid::new_v4().to_string(),
            policy_id: policy.id.clone(),
            timestamp: now,
            event_type: plan.event_type,
            trigger,
            from_instances: from,
            to_instances: plan.target,
            duration_ms: 0,
            status: EventStatus::Success,
            error: None,
            metrics: metrics.clone(),
        };

        if plan.target != from {
            info!(policy = %policy.id, from, to = plan.target, trigger = %event.trigger, "scaling fleet");
            let started = tokio::time::Instant::now();
            let result = resize_with_retry(self.fleet.as_ref(), plan.target, &self.retry).await;
            event.duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(attempts) => {
                    info!(
                        policy = %policy.id,
                        from,
                        to = plan.target,
                        attempts,
                        duration_ms = event.duration_ms,
                        "scaling complete"
                    );
                }
                Err(e) => {
                    warn!(policy = %policy.id, from, to = plan.target, error = %e, "scaling failed");
                    event.status = EventStatus::Failed;
                    event.error = Some(e.to_string());
                    event.to_instances = from;
                }
            }
        } else {
            debug!(policy = %policy.id, instances = from, "target equals current size");
        }

        self.journal.append(event.clone()).await;
        Ok(event)
    }

    async fn current_instances(&self) -> u32 {
        match self.metrics.current_metrics().await {
            Ok(m) => m.current_instances,
            Err(e) => {
                warn!(error = %e, "metrics unavailable, reading fleet size");
                self.fleet.fleet_size().await.unwrap_or_default()
            }
        }
    }
}
