//! Forecasting models.
//!
//! Pure functions over a sample history. The engine decides which one runs
//! and turns the raw predictions into `ResourceForecast` points.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};

use surge_state::{MetricSample, ModelType};

/// Below this many samples the linear model is always used.
pub const MIN_SAMPLES_FOR_SELECTION: usize = 100;

/// Variance of the detrended hourly means above this fraction of the mean
/// level means daily seasonality.
pub const SEASONALITY_VARIANCE_RATIO: f64 = 0.1;

/// Estimated polynomial MSE as a fraction of the linear MSE.
///
/// No second regression is fitted; the estimate only decides selection.
pub const POLYNOMIAL_MSE_FACTOR: f64 = 0.7;

/// The polynomial estimate must be below this fraction of the linear MSE.
pub const POLYNOMIAL_SELECTION_MARGIN: f64 = 0.8;

/// A linear MSE at or below this is a perfect fit.
const MSE_EPSILON: f64 = 1e-9;

/// Number of trailing points the seasonal model's trend is fitted on.
const SEASONAL_TREND_POINTS: usize = 10;

const SEASONAL_CONFIDENCE: f64 = 0.75;
const POLYNOMIAL_CONFIDENCE: f64 = 0.6;
const LINEAR_CONFIDENCE_MIN: f64 = 0.3;
const LINEAR_CONFIDENCE_MAX: f64 = 0.9;

/// One predicted step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub value: f64,
    pub confidence: f64,
}

/// Ordinary least-squares fit of value against sample index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn fit(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self {
                slope: 0.0,
                intercept: 0.0,
            };
        }
        let n_f = n as f64;
        let mean_x = (n_f - 1.0) / 2.0;
        let mean_y = values.iter().sum::<f64>() / n_f;

        let mut num = 0.0;
        let mut den = 0.0;
        for (i, y) in values.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (y - mean_y);
            den += dx * dx;
        }
        let slope = if den == 0.0 { 0.0 } else { num / den };
        Self {
            slope,
            intercept: mean_y - slope * mean_x,
        }
    }

    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Mean squared error of this fit over `values`.
    pub fn mse(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let total: f64 = values
            .iter()
            .enumerate()
            .map(|(i, y)| (y - self.at(i as f64)).powi(2))
            .sum();
        total / values.len() as f64
    }
}

/// Average value per UTC hour of day. `None` for hours with no samples.
pub fn hourly_profile(samples: &[MetricSample]) -> [Option<f64>; 24] {
    let mut sums = [0.0f64; 24];
    let mut counts = [0u32; 24];
    for sample in samples {
        if let Some(hour) = hour_of(sample.timestamp_ms) {
            sums[hour] += sample.value;
            counts[hour] += 1;
        }
    }
    let mut profile = [None; 24];
    for hour in 0..24 {
        if counts[hour] > 0 {
            profile[hour] = Some(sums[hour] / counts[hour] as f64);
        }
    }
    profile
}

/// Pick a model for the given (ascending) history.
pub fn select_model(samples: &[MetricSample]) -> ModelType {
    if samples.len() < MIN_SAMPLES_FOR_SELECTION {
        return ModelType::Linear;
    }

    let values = values_of(samples);
    let fit = LinearFit::fit(&values);

    // Bucket the detrended residuals so a steady trend across hours does not
    // read as hour-of-day variance. The level is the mean of the raw hourly
    // averages.
    let level = mean_of(&hourly_profile(samples).into_iter().flatten().collect::<Vec<_>>());
    let residuals: Vec<MetricSample> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| MetricSample {
            timestamp_ms: s.timestamp_ms,
            value: s.value - fit.at(i as f64),
        })
        .collect();
    let buckets: Vec<f64> = hourly_profile(&residuals).into_iter().flatten().collect();
    let center = mean_of(&buckets);
    let variance = mean_of(&buckets.iter().map(|b| (b - center).powi(2)).collect::<Vec<_>>());
    if variance > level * SEASONALITY_VARIANCE_RATIO {
        return ModelType::Seasonal;
    }

    let linear_mse = fit.mse(&values);
    let polynomial_mse = linear_mse * POLYNOMIAL_MSE_FACTOR;
    if linear_mse > MSE_EPSILON && polynomial_mse < linear_mse * POLYNOMIAL_SELECTION_MARGIN {
        return ModelType::Polynomial;
    }

    ModelType::Linear
}

/// Linear extrapolation: `slope * (n + s - 1) + intercept` for `s = 1..=horizon`.
pub fn predict_linear(values: &[f64], horizon: u32) -> Vec<Prediction> {
    let fit = LinearFit::fit(values);
    let n = values.len() as f64;
    let confidence =
        (1.0 - fit.slope.abs() / 100.0).clamp(LINEAR_CONFIDENCE_MIN, LINEAR_CONFIDENCE_MAX);
    (1..=horizon)
        .map(|s| Prediction {
            value: floor_zero(fit.at(n + s as f64 - 1.0)),
            confidence,
        })
        .collect()
}

/// Hour-of-day profile plus the short-term trend of the last ten points.
pub fn predict_seasonal(samples: &[MetricSample], horizon: u32, now: DateTime<Utc>) -> Vec<Prediction> {
    let values = values_of(samples);
    let profile = hourly_profile(samples);
    let overall = if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    };
    let tail = &values[values.len().saturating_sub(SEASONAL_TREND_POINTS)..];
    let trend = LinearFit::fit(tail).slope;

    (1..=horizon)
        .map(|s| {
            let at = now + Duration::minutes(s as i64);
            let base = profile[at.hour() as usize].unwrap_or(overall);
            Prediction {
                value: floor_zero(base + trend * s as f64),
                confidence: SEASONAL_CONFIDENCE,
            }
        })
        .collect()
}

/// Quadratic extrapolation from the last three points.
///
/// Uses Newton forward differences: `c + s*d1 + s(s+1)/2 * d2`.
pub fn predict_polynomial(values: &[f64], horizon: u32) -> Vec<Prediction> {
    let [a, b, c] = match values {
        [.., a, b, c] => [*a, *b, *c],
        _ => {
            return predict_linear(values, horizon)
                .into_iter()
                .map(|p| Prediction {
                    confidence: POLYNOMIAL_CONFIDENCE,
                    ..p
                })
                .collect();
        }
    };
    let d1 = c - b;
    let d2 = (c - b) - (b - a);

    (1..=horizon)
        .map(|s| {
            let s = s as f64;
            Prediction {
                value: floor_zero(c + d1 * s + d2 * s * (s + 1.0) / 2.0),
                confidence: POLYNOMIAL_CONFIDENCE,
            }
        })
        .collect()
}

pub fn values_of(samples: &[MetricSample]) -> Vec<f64> {
    samples.iter().map(|s| s.value).collect()
}

fn hour_of(timestamp_ms: i64) -> Option<usize> {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.hour() as usize)
}

fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn floor_zero(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;
    /// 2023-11-14 22:00:00 UTC, on an hour boundary.
    const BASE_MS: i64 = 1_700_000_000_000 - (1_700_000_000_000 % HOUR_MS);

    fn samples(values: &[f64], step_ms: i64) -> Vec<MetricSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| MetricSample {
                timestamp_ms: BASE_MS + i as i64 * step_ms,
                value: *v,
            })
            .collect()
    }

    #[test]
    fn linear_fit_recovers_line() {
        let values: Vec<f64> = (0..10).map(|i| 3.0 * i as f64 + 5.0).collect();
        let fit = LinearFit::fit(&values);
        assert!((fit.slope - 3.0).abs() < 1e-9);
        assert!((fit.intercept - 5.0).abs() < 1e-9);
        assert!(fit.mse(&values) < 1e-12);
    }

    #[test]
    fn linear_fit_degenerate_inputs() {
        assert_eq!(LinearFit::fit(&[]).slope, 0.0);
        let single = LinearFit::fit(&[42.0]);
        assert_eq!(single.slope, 0.0);
        assert_eq!(single.intercept, 42.0);
    }

    #[test]
    fn few_samples_select_linear() {
        let s = samples(&[1.0, 50.0, 2.0, 80.0], 60_000);
        assert_eq!(select_model(&s), ModelType::Linear);
    }

    #[test]
    fn daily_pattern_selects_seasonal() {
        // 48 hours of hourly samples: quiet nights, busy days.
        let values: Vec<f64> = (0..200)
            .map(|i| if (i / 12) % 2 == 0 { 10.0 } else { 90.0 })
            .collect();
        let s = samples(&values, HOUR_MS / 4);
        assert_eq!(select_model(&s), ModelType::Seasonal);
    }

    #[test]
    fn steady_growth_over_hours_selects_linear() {
        // 200 one-minute samples span four hour buckets.
        let values: Vec<f64> = (0..200).map(|i| 20.0 + 0.1 * i as f64).collect();
        let s = samples(&values, 60_000);
        assert_eq!(select_model(&s), ModelType::Linear);
    }

    #[test]
    fn daily_pattern_on_a_trend_selects_seasonal() {
        let values: Vec<f64> = (0..200)
            .map(|i| i as f64 * 0.2 + if (i / 12) % 2 == 0 { 10.0 } else { 90.0 })
            .collect();
        let s = samples(&values, HOUR_MS / 4);
        assert_eq!(select_model(&s), ModelType::Seasonal);
    }

    #[test]
    fn flat_noisy_single_hour_selects_polynomial() {
        // All within one hour bucket, so no seasonal variance; noise makes
        // the linear MSE non-zero, which the heuristic always undercuts.
        let values: Vec<f64> = (0..120).map(|i| 50.0 + if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let s = samples(&values, 1_000);
        assert_eq!(select_model(&s), ModelType::Polynomial);
    }

    #[test]
    fn perfect_line_single_hour_selects_linear() {
        let values: Vec<f64> = (0..120).map(|i| 10.0 + i as f64 * 0.5).collect();
        let s = samples(&values, 1_000);
        assert_eq!(select_model(&s), ModelType::Linear);
    }

    #[test]
    fn linear_prediction_continues_trend() {
        let values = [10.0, 11.0, 12.0, 13.0];
        let p = predict_linear(&values, 3);
        let got: Vec<f64> = p.iter().map(|p| (p.value * 1e6).round() / 1e6).collect();
        assert_eq!(got, vec![14.0, 15.0, 16.0]);
        // slope 1 → 0.99, clamped to 0.9.
        assert!(p.iter().all(|p| (p.confidence - 0.9).abs() < 1e-12));
    }

    #[test]
    fn linear_confidence_drops_with_steep_slope() {
        let values: Vec<f64> = (0..10).map(|i| i as f64 * 50.0).collect();
        let p = predict_linear(&values, 1);
        assert!((p[0].confidence - 0.5).abs() < 1e-9);

        let values: Vec<f64> = (0..10).map(|i| i as f64 * 500.0).collect();
        assert!((predict_linear(&values, 1)[0].confidence - 0.3).abs() < 1e-12);
    }

    #[test]
    fn predictions_floored_at_zero() {
        let values = [30.0, 20.0, 10.0];
        let p = predict_linear(&values, 5);
        assert!(p.iter().all(|p| p.value >= 0.0));
        assert_eq!(p[4].value, 0.0);
    }

    #[test]
    fn polynomial_extrapolates_quadratic() {
        // y = x^2 at x = 1, 2, 3 → next are 16, 25.
        let p = predict_polynomial(&[1.0, 4.0, 9.0], 2);
        assert!((p[0].value - 16.0).abs() < 1e-9);
        assert!((p[1].value - 25.0).abs() < 1e-9);
        assert!(p.iter().all(|p| p.confidence == 0.6));
    }

    #[test]
    fn polynomial_short_history_falls_back() {
        let p = predict_polynomial(&[5.0, 6.0], 2);
        assert_eq!(p.len(), 2);
        assert!(p.iter().all(|p| p.confidence == 0.6));
    }

    #[test]
    fn seasonal_uses_hour_profile() {
        // Hour 22 averages 10, hour 23 averages 90.
        let mut s = Vec::new();
        for i in 0..60 {
            s.push(MetricSample {
                timestamp_ms: BASE_MS + i * 60_000,
                value: 10.0,
            });
        }
        for i in 0..60 {
            s.push(MetricSample {
                timestamp_ms: BASE_MS + HOUR_MS + i * 60_000,
                value: 90.0,
            });
        }
        // "now" is 22:30; the tail is flat so the trend is zero.
        let now = Utc.timestamp_millis_opt(BASE_MS + HOUR_MS / 2).unwrap();
        let p = predict_seasonal(&s, 45, now);
        assert!((p[0].value - 10.0).abs() < 1e-9);
        assert!((p[44].value - 90.0).abs() < 1e-9);
        assert!(p.iter().all(|p| p.confidence == 0.75));
    }
}
