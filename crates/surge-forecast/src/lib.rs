//! surge-forecast — near-future resource demand forecasting.
//!
//! Reads up to a week of history for a metric from the time-series store,
//! picks a model from the shape of the data, and produces one point estimate
//! per minute out to the requested horizon. The latest run per metric is kept
//! in memory and mirrored into the store's TTL cache.
//!
//! # Model selection
//!
//! ```text
//! samples < 100                          → linear
//! var(detrended hourly means)
//!     > 0.1 * mean(hourly means)         → seasonal
//! 0.7 * mse(linear) < 0.8 * mse(linear)  → polynomial   (heuristic, see models.rs)
//! otherwise                              → linear
//! ```
//!
//! Predictions are floored at zero. Only forecasts whose average confidence
//! exceeds 0.7 produce a scale recommendation.

pub mod engine;
pub mod models;

pub use engine::{CONFIDENCE_GATE, ForecastEngine, PredictiveDecision, ScaleDirection, evaluate_forecast};
pub use models::{Prediction, select_model};
