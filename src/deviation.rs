//! Deviation monitoring and response capture
//!
//! Standardizes each sample against the rolling baseline and records the
//! compact behavioral response that accompanies it.

use crate::baseline::BehavioralBaseline;
use crate::types::{BehavioralResponse, BehavioralSignals, DeviationVector};
use std::time::Instant;
use tracing::warn;

/// Default |delta| above which a deviation is significant
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 1.5;

/// Default soft budget for one deviation computation
pub const DEFAULT_DEVIATION_BUDGET_MS: f64 = 50.0;

/// Computes standardized deviations against a baseline
#[derive(Debug, Clone)]
pub struct DeviationMonitor {
    significance_threshold: f64,
    budget_ms: f64,
}

impl Default for DeviationMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNIFICANCE_THRESHOLD, DEFAULT_DEVIATION_BUDGET_MS)
    }
}

impl DeviationMonitor {
    pub fn new(significance_threshold: f64, budget_ms: f64) -> Self {
        Self {
            significance_threshold,
            budget_ms,
        }
    }

    /// `(x - mean) / std` per tracked feature
    pub fn compute(
        &self,
        signals: &BehavioralSignals,
        baseline: &BehavioralBaseline,
    ) -> DeviationVector {
        let started = Instant::now();

        let delta_latency =
            standardize(signals.interaction_latency, baseline.latency_mean, baseline.latency_std);
        let delta_smoothness = standardize(
            signals.motion_smoothness,
            baseline.smoothness_mean,
            baseline.smoothness_std,
        );
        let delta_engagement = standardize(
            signals.engagement_duration,
            baseline.engagement_mean,
            baseline.engagement_std,
        );

        let is_significant = [delta_latency, delta_smoothness, delta_engagement]
            .iter()
            .any(|d| d.abs() > self.significance_threshold);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        if elapsed_ms > self.budget_ms {
            warn!(elapsed_ms, budget_ms = self.budget_ms, "deviation monitoring over budget");
        }

        DeviationVector {
            delta_latency,
            delta_smoothness,
            delta_engagement,
            is_significant,
            timestamp: signals.timestamp,
        }
    }
}

/// Baseline std values are floored, but a snapshot loaded from elsewhere may
/// not be; the same floor is applied here.
fn standardize(x: f64, mean: f64, std: f64) -> f64 {
    if !x.is_finite() {
        return 0.0;
    }
    (x - mean) / std.max(0.01)
}

/// Record the behavioral response for a sample
pub fn capture_response(signals: &BehavioralSignals) -> BehavioralResponse {
    BehavioralResponse {
        jitter: signals.jitter_magnitude,
        corrections: signals.correction_count,
        abandonment: signals.is_abandoned(),
        response_latency: signals.interaction_latency,
        timestamp: signals.timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn baseline() -> BehavioralBaseline {
        BehavioralBaseline::new(Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap())
    }

    fn signals(latency: f64, smoothness: f64, engagement: f64) -> BehavioralSignals {
        let mut s = BehavioralSignals::neutral(Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 1).unwrap());
        s.interaction_latency = latency;
        s.motion_smoothness = smoothness;
        s.engagement_duration = engagement;
        s
    }

    #[test]
    fn test_standardized_deltas() {
        let monitor = DeviationMonitor::default();
        let deviation = monitor.compute(&signals(1500.0, 0.7, 9000.0), &baseline());

        assert!((deviation.delta_latency - 1.0).abs() < 1e-9);
        assert!((deviation.delta_smoothness + 1.0).abs() < 1e-9);
        assert!((deviation.delta_engagement - 2.0).abs() < 1e-9);
        assert!(deviation.is_significant);
    }

    #[test]
    fn test_at_baseline_not_significant() {
        let monitor = DeviationMonitor::default();
        let deviation = monitor.compute(&signals(1000.0, 0.8, 5000.0), &baseline());
        assert!(deviation.magnitude() < 1e-9);
        assert!(!deviation.is_significant);
    }

    #[test]
    fn test_threshold_is_strict() {
        let monitor = DeviationMonitor::default();
        // exactly 1.5 sigma on latency
        let deviation = monitor.compute(&signals(1750.0, 0.8, 5000.0), &baseline());
        assert!(!deviation.is_significant);
    }

    #[test]
    fn test_zero_std_snapshot_is_floored() {
        let monitor = DeviationMonitor::default();
        let mut b = baseline();
        b.smoothness_std = 0.0;
        let deviation = monitor.compute(&signals(1000.0, 0.81, 5000.0), &b);
        assert!(deviation.delta_smoothness.is_finite());
        assert!((deviation.delta_smoothness - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_capture_response() {
        let mut s = signals(420.0, 0.6, 0.0);
        s.jitter_magnitude = 0.4;
        s.correction_count = 3;
        s.abandonment_timing = Some(Utc.with_ymd_and_hms(2024, 1, 15, 13, 59, 50).unwrap());

        let response = capture_response(&s);
        assert_eq!(response.jitter, 0.4);
        assert_eq!(response.corrections, 3);
        assert!(response.abandonment);
        assert_eq!(response.response_latency, 420.0);
        assert_eq!(response.timestamp, s.timestamp);
    }
}
