//! Feature extraction from error-event history.
//!
//! Produces the per-service feature vector the predictor consumes: temporal
//! signals (hour of day, day of week, trend slope of per-minute error
//! counts), error-type distribution ratios, and system-level signals
//! (response-time percentiles). Extraction is deterministic for a fixed
//! `(events, now)` input.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::event::{ErrorEvent, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub service: String,
    pub extracted_at: DateTime<Utc>,
    pub lookback_minutes: i64,
    /// Events inside the lookback window that backed this vector.
    pub sample_count: usize,

    // Temporal features
    pub hour_of_day: u32,
    pub day_of_week: u32,
    /// Least-squares slope of per-minute error counts (events/min per minute).
    pub trend_slope: f64,
    /// Events per minute over the most recent hour.
    pub error_rate_per_min: f64,

    // Error-type distribution
    pub dominant_error_type: Option<String>,
    /// Share of the window held by the dominant type (0.0–1.0).
    pub dominant_ratio: f64,
    /// Base rate of the dominant type over the window (events/min).
    pub dominant_rate_per_min: f64,
    pub critical_ratio: f64,

    // System features
    pub response_time_p95: Option<f64>,
    pub response_time_p99: Option<f64>,
}

pub struct FeatureExtractor {
    lookback_minutes: i64,
}

impl FeatureExtractor {
    pub fn new(lookback_minutes: i64) -> Self {
        Self {
            lookback_minutes: lookback_minutes.max(1),
        }
    }

    pub fn extract(&self, service: &str, events: &[ErrorEvent], now: DateTime<Utc>) -> FeatureVector {
        let window_start = now - Duration::minutes(self.lookback_minutes);
        let recent: Vec<&ErrorEvent> = events
            .iter()
            .filter(|e| e.service == service && e.occurred_at >= window_start && e.occurred_at <= now)
            .collect();

        let minute_counts = self.minute_counts(&recent, window_start);
        let trend_slope = least_squares_slope(&minute_counts);

        let hour_ago = now - Duration::minutes(60);
        let last_hour = recent.iter().filter(|e| e.occurred_at >= hour_ago).count();
        let error_rate_per_min = last_hour as f64 / 60.0;

        let mut type_counts: HashMap<&str, usize> = HashMap::new();
        for event in &recent {
            *type_counts.entry(event.error_type.as_str()).or_default() += 1;
        }
        // Deterministic tie-break: highest count, then lexicographic.
        let dominant = type_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(t, c)| (t.to_string(), *c));

        let total = recent.len();
        let (dominant_error_type, dominant_ratio, dominant_rate_per_min) = match dominant {
            Some((t, c)) if total > 0 => (
                Some(t),
                c as f64 / total as f64,
                c as f64 / self.lookback_minutes as f64,
            ),
            _ => (None, 0.0, 0.0),
        };

        let critical = recent
            .iter()
            .filter(|e| e.severity == Severity::Critical)
            .count();
        let critical_ratio = if total > 0 {
            critical as f64 / total as f64
        } else {
            0.0
        };

        let mut response_times: Vec<f64> = recent
            .iter()
            .filter_map(|e| e.response_time_ms.map(|ms| ms as f64))
            .collect();
        response_times.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        FeatureVector {
            service: service.to_string(),
            extracted_at: now,
            lookback_minutes: self.lookback_minutes,
            sample_count: total,
            hour_of_day: now.hour(),
            day_of_week: now.weekday().num_days_from_monday(),
            trend_slope,
            error_rate_per_min,
            dominant_error_type,
            dominant_ratio,
            dominant_rate_per_min,
            critical_ratio,
            response_time_p95: percentile(&response_times, 95.0),
            response_time_p99: percentile(&response_times, 99.0),
        }
    }

    fn minute_counts(&self, events: &[&ErrorEvent], window_start: DateTime<Utc>) -> Vec<f64> {
        let mut counts = vec![0.0; self.lookback_minutes as usize];
        for event in events {
            let offset = (event.occurred_at - window_start).num_minutes();
            if offset >= 0 && (offset as usize) < counts.len() {
                counts[offset as usize] += 1.0;
            }
        }
        counts
    }
}

/// Least-squares slope of `y` against index. Zero for fewer than two points.
pub(crate) fn least_squares_slope(y: &[f64]) -> f64 {
    let n = y.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let x_mean = (n_f - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / n_f;

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, value) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (value - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Nearest-rank percentile over sorted data. None for empty input.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.clamp(1, sorted.len()) - 1;
    Some(sorted[index])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events_with_rising_rate(service: &str, now: DateTime<Utc>) -> Vec<ErrorEvent> {
        // 0 events in the oldest minutes, ramping up toward now.
        let mut events = Vec::new();
        for minute in 0..60i64 {
            let per_minute = minute / 10; // 0..=5 events per minute
            for _ in 0..per_minute {
                events.push(
                    ErrorEvent::new(service, "DatabaseTimeout", "query timed out")
                        .with_occurred_at(now - Duration::minutes(60 - minute)),
                );
            }
        }
        events
    }

    #[test]
    fn test_slope_positive_for_rising_counts() {
        let y: Vec<f64> = (0..20).map(|i| i as f64).collect();
        assert!((least_squares_slope(&y) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_slope_zero_for_flat_counts() {
        let y = vec![3.0; 30];
        assert_eq!(least_squares_slope(&y), 0.0);
        assert_eq!(least_squares_slope(&[1.0]), 0.0);
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let data: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        assert_eq!(percentile(&data, 95.0), Some(95.0));
        assert_eq!(percentile(&data, 99.0), Some(99.0));
        assert_eq!(percentile(&data, 100.0), Some(100.0));
        assert_eq!(percentile(&[], 95.0), None);
    }

    #[test]
    fn test_extract_finds_rising_trend_and_dominant_type() {
        let now = Utc::now();
        let events = events_with_rising_rate("checkout", now);
        let extractor = FeatureExtractor::new(60);

        let features = extractor.extract("checkout", &events, now);

        assert!(features.trend_slope > 0.0);
        assert_eq!(
            features.dominant_error_type.as_deref(),
            Some("DatabaseTimeout")
        );
        assert!((features.dominant_ratio - 1.0).abs() < 1e-9);
        assert!(features.sample_count > 0);
    }

    #[test]
    fn test_extract_ignores_other_services_and_old_events() {
        let now = Utc::now();
        let mut events = vec![
            ErrorEvent::new("checkout", "APIError", "bad gateway")
                .with_occurred_at(now - Duration::minutes(5)),
            ErrorEvent::new("search", "APIError", "bad gateway")
                .with_occurred_at(now - Duration::minutes(5)),
            ErrorEvent::new("checkout", "APIError", "ancient")
                .with_occurred_at(now - Duration::minutes(500)),
        ];
        events.push(
            ErrorEvent::new("checkout", "APIError", "recent")
                .with_occurred_at(now - Duration::minutes(1)),
        );

        let features = FeatureExtractor::new(240).extract("checkout", &events, now);
        assert_eq!(features.sample_count, 2);
    }

    #[test]
    fn test_extract_empty_window_is_quiet_not_an_error() {
        let features = FeatureExtractor::new(60).extract("checkout", &[], Utc::now());
        assert_eq!(features.sample_count, 0);
        assert_eq!(features.trend_slope, 0.0);
        assert!(features.dominant_error_type.is_none());
        assert!(features.response_time_p95.is_none());
    }

    #[test]
    fn test_response_time_percentiles() {
        let now = Utc::now();
        let events: Vec<ErrorEvent> = (1..=20)
            .map(|i| {
                ErrorEvent::new("api", "TimeoutError", "slow")
                    .with_occurred_at(now - Duration::minutes(i as i64 % 30))
                    .with_response_time(i * 100)
            })
            .collect();

        let features = FeatureExtractor::new(60).extract("api", &events, now);
        assert_eq!(features.response_time_p95, Some(1900.0));
        assert_eq!(features.response_time_p99, Some(2000.0));
    }
}
