//! Forecast engine — runs forecasts and turns them into scale decisions.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use surge_core::{ConfigResult, SurgeConfig};
use surge_state::{ModelType, PredictionModel, ResourceForecast, StateStore};

use crate::models::{
    Prediction, predict_linear, predict_polynomial, predict_seasonal, select_model, values_of,
};

/// Average confidence a forecast must exceed before it is acted on.
pub const CONFIDENCE_GATE: f64 = 0.7;

const DEFAULT_HISTORY_WINDOW: Duration = Duration::from_secs(7 * 24 * 3600);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Stable,
}

/// Outcome of checking a forecast against a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveDecision {
    pub should_scale: bool,
    pub direction: ScaleDirection,
    /// Average confidence over the look-ahead window.
    pub confidence: f64,
    /// Minutes until the first predicted breach.
    pub time_to_threshold: Option<u32>,
    pub recommended_instances: u32,
}

impl PredictiveDecision {
    fn hold(confidence: f64, current_instances: u32) -> Self {
        Self {
            should_scale: false,
            direction: ScaleDirection::Stable,
            confidence,
            time_to_threshold: None,
            recommended_instances: current_instances,
        }
    }
}

pub struct ForecastEngine {
    state: StateStore,
    models: HashMap<ModelType, PredictionModel>,
    /// Latest forecast run per metric.
    latest: RwLock<HashMap<String, Vec<ResourceForecast>>>,
    history_window: Duration,
    cache_ttl: Duration,
}

impl ForecastEngine {
    pub fn new(state: StateStore) -> Self {
        Self::with_settings(state, DEFAULT_HISTORY_WINDOW, DEFAULT_CACHE_TTL)
    }

    pub fn with_settings(state: StateStore, history_window: Duration, cache_ttl: Duration) -> Self {
        Self {
            state,
            models: default_models(Utc::now()),
            latest: RwLock::new(HashMap::new()),
            history_window,
            cache_ttl,
        }
    }

    /// Build from the `[forecast]` section of `surge.toml`.
    pub fn from_config(state: StateStore, config: &SurgeConfig) -> ConfigResult<Self> {
        Ok(Self::with_settings(
            state,
            config.history_window()?,
            config.cache_ttl()?,
        ))
    }

    /// The model table, ordered by model type.
    pub fn models(&self) -> Vec<PredictionModel> {
        let mut models: Vec<PredictionModel> = self.models.values().cloned().collect();
        models.sort_by_key(|m| m.model_type.as_str());
        models
    }

    pub async fn generate_forecast(&self, metric: &str, horizon_minutes: u32) -> Vec<ResourceForecast> {
        self.generate_forecast_at(metric, horizon_minutes, Utc::now()).await
    }

    /// Forecast `metric` for `horizon_minutes` minutes after `now`.
    ///
    /// Returns an empty sequence when history is unavailable or empty.
    pub async fn generate_forecast_at(
        &self,
        metric: &str,
        horizon_minutes: u32,
        now: DateTime<Utc>,
    ) -> Vec<ResourceForecast> {
        let window_ms = i64::try_from(self.history_window.as_millis()).unwrap_or(i64::MAX);
        let to = now.timestamp_millis();
        let from = to.saturating_sub(window_ms);

        let samples = match self.state.range_by_score(metric, from, to) {
            Ok(samples) => samples,
            Err(e) => {
                warn!(%metric, error = %e, "forecast history unavailable");
                Vec::new()
            }
        };

        if samples.is_empty() || horizon_minutes == 0 {
            debug!(%metric, "no history to forecast from");
            self.latest.write().await.insert(metric.to_string(), Vec::new());
            return Vec::new();
        }

        let model_type = select_model(&samples);
        let predictions: Vec<Prediction> = match model_type {
            ModelType::Linear => predict_linear(&values_of(&samples), horizon_minutes),
            ModelType::Seasonal => predict_seasonal(&samples, horizon_minutes, now),
            ModelType::Polynomial => predict_polynomial(&values_of(&samples), horizon_minutes),
        };
        let model_name = self
            .models
            .get(&model_type)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| model_type.to_string());

        let forecast: Vec<ResourceForecast> = predictions
            .into_iter()
            .zip(1..=horizon_minutes)
            .map(|(p, horizon)| ResourceForecast {
                timestamp: now + chrono::Duration::minutes(horizon as i64),
                metric: metric.to_string(),
                predicted: p.value,
                confidence: p.confidence,
                horizon,
                model: model_name.clone(),
            })
            .collect();

        debug!(
            %metric,
            model = %model_type,
            samples = samples.len(),
            horizon = horizon_minutes,
            "forecast generated"
        );

        self.cache_forecast(metric, &forecast);
        self.latest
            .write()
            .await
            .insert(metric.to_string(), forecast.clone());
        forecast
    }

    /// The most recent forecast for `metric`, from memory or the shared cache.
    pub async fn latest_forecast(&self, metric: &str) -> Option<Vec<ResourceForecast>> {
        if let Some(forecast) = self.latest.read().await.get(metric) {
            return Some(forecast.clone());
        }
        match self.state.get_cached(&cache_key(metric)) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(forecast) => Some(forecast),
                Err(e) => {
                    warn!(%metric, error = %e, "discarding unreadable cached forecast");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(%metric, error = %e, "forecast cache read failed");
                None
            }
        }
    }

    /// Decide whether the latest forecast for `metric` warrants scaling up.
    pub async fn should_predictive_scale(
        &self,
        metric: &str,
        threshold: f64,
        look_ahead_minutes: u32,
        current_instances: u32,
    ) -> PredictiveDecision {
        let forecast = self.latest_forecast(metric).await.unwrap_or_default();
        evaluate_forecast(&forecast, threshold, look_ahead_minutes, current_instances)
    }

    fn cache_forecast(&self, metric: &str, forecast: &[ResourceForecast]) {
        let payload = match serde_json::to_string(forecast) {
            Ok(p) => p,
            Err(e) => {
                warn!(%metric, error = %e, "failed to serialize forecast");
                return;
            }
        };
        if let Err(e) = self
            .state
            .set_with_ttl(&cache_key(metric), self.cache_ttl.as_secs(), &payload)
        {
            warn!(%metric, error = %e, "failed to cache forecast");
        }
    }
}

/// Check a forecast against a threshold within the look-ahead window.
pub fn evaluate_forecast(
    forecast: &[ResourceForecast],
    threshold: f64,
    look_ahead_minutes: u32,
    current_instances: u32,
) -> PredictiveDecision {
    let window: Vec<&ResourceForecast> = forecast
        .iter()
        .filter(|f| f.horizon <= look_ahead_minutes)
        .collect();
    if window.is_empty() {
        return PredictiveDecision::hold(0.0, current_instances);
    }

    let confidence = window.iter().map(|f| f.confidence).sum::<f64>() / window.len() as f64;

    let Some(breach) = window.iter().find(|f| f.predicted > threshold) else {
        return PredictiveDecision::hold(confidence, current_instances);
    };

    let peak = window
        .iter()
        .map(|f| f.predicted)
        .fold(f64::NEG_INFINITY, f64::max);
    let recommended_instances = if threshold > 0.0 {
        let ratio = peak / threshold;
        ((current_instances as f64) * ratio).ceil() as u32
    } else {
        current_instances
    };

    PredictiveDecision {
        should_scale: confidence > CONFIDENCE_GATE,
        direction: ScaleDirection::Up,
        confidence,
        time_to_threshold: Some(breach.horizon),
        recommended_instances,
    }
}

fn cache_key(metric: &str) -> String {
    format!("forecast:{metric}")
}

fn default_models(trained_at: DateTime<Utc>) -> HashMap<ModelType, PredictionModel> {
    let entry = |model_type: ModelType, accuracy: f64, params: &[(&str, f64)]| {
        (
            model_type,
            PredictionModel {
                name: model_type.to_string(),
                model_type,
                accuracy,
                last_trained: trained_at,
                parameters: params
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect::<BTreeMap<_, _>>(),
            },
        )
    };
    HashMap::from([
        entry(
            ModelType::Linear,
            0.75,
            &[("confidence_min", 0.3), ("confidence_max", 0.9)],
        ),
        entry(
            ModelType::Seasonal,
            0.82,
            &[("period_hours", 24.0), ("trend_points", 10.0), ("confidence", 0.75)],
        ),
        entry(
            ModelType::Polynomial,
            0.68,
            &[("degree", 2.0), ("confidence", 0.6)],
        ),
    ])
}
