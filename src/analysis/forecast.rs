//! Short-horizon metric forecasting via exponential smoothing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ForecastConfig;
use crate::event::MetricSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub at: DateTime<Utc>,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub id: Uuid,
    pub service: String,
    pub metric_name: String,
    pub points: Vec<ForecastPoint>,
    pub trend_direction: TrendDirection,
    pub generated_at: DateTime<Utc>,
    pub peak_value: f64,
    pub peak_at: DateTime<Utc>,
}

/// Forecaster using simple exponential smoothing:
/// `level[t] = α·x[t] + (1−α)·level[t−1]`. The h-step point forecast is the
/// final level; interval width grows with `√step` of the in-sample one-step
/// residual deviation, so later steps are strictly no more certain than
/// earlier ones.
pub struct TimeSeriesForecaster {
    config: ForecastConfig,
}

impl TimeSeriesForecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// Forecast over the configured horizon. Fewer than four samples is not
    /// enough history; the caller gets `None` and proceeds without.
    pub fn forecast(
        &self,
        service: &str,
        metric_name: &str,
        series: &[MetricSample],
        now: DateTime<Utc>,
    ) -> Option<Forecast> {
        if series.len() < 4 {
            return None;
        }

        let alpha = self.config.alpha;
        let values: Vec<f64> = series.iter().map(|s| s.value).collect();

        let mut level = values[0];
        let mut smoothed = Vec::with_capacity(values.len());
        smoothed.push(level);
        let mut residuals = Vec::with_capacity(values.len() - 1);
        for x in &values[1..] {
            residuals.push(x - level);
            level = alpha * x + (1.0 - alpha) * level;
            smoothed.push(level);
        }

        let residual_std = {
            let mean = residuals.iter().sum::<f64>() / residuals.len() as f64;
            let variance = residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
                / residuals.len() as f64;
            variance.sqrt()
        };

        let step = Duration::seconds(self.config.step_secs);
        let points: Vec<ForecastPoint> = (1..=self.config.horizon_steps)
            .map(|h| {
                let width = self.config.ci_z * residual_std * (h as f64).sqrt();
                ForecastPoint {
                    at: now + step * h as i32,
                    value: level,
                    lower: level - width,
                    upper: level + width,
                }
            })
            .collect();

        let peak = points
            .iter()
            .max_by(|a, b| {
                a.value
                    .partial_cmp(&b.value)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .copied()?;

        Some(Forecast {
            id: Uuid::new_v4(),
            service: service.to_string(),
            metric_name: metric_name.to_string(),
            trend_direction: trend_direction(&smoothed),
            generated_at: now,
            peak_value: peak.value,
            peak_at: peak.at,
            points,
        })
    }
}

/// Sign of the smoothed series' first difference over the most recent steps.
fn trend_direction(smoothed: &[f64]) -> TrendDirection {
    let recent = &smoothed[smoothed.len().saturating_sub(4)..];
    if recent.len() < 2 {
        return TrendDirection::Flat;
    }
    let delta: f64 = recent.windows(2).map(|w| w[1] - w[0]).sum();
    let scale = recent.last().copied().unwrap_or(0.0).abs().max(1e-9);
    if delta > 0.01 * scale {
        TrendDirection::Up
    } else if delta < -0.01 * scale {
        TrendDirection::Down
    } else {
        TrendDirection::Flat
    }
}
