//! Dimensional affect estimation
//!
//! Maps one behavioral sample onto arousal, valence and control with fixed
//! linear weightings. Every input feature is first normalized to [0, 1]
//! against an empirical range.

use crate::types::{clamp_finite, BehavioralSignals, ThreeDimensionalState, UncertaintyLevel};

/// Empirical ceiling for pointer speed (px/ms)
const SPEED_MAX: f64 = 2.0;
/// Empirical ceiling for the deviation magnitude (sigma units)
const DEVIATION_MAX: f64 = 3.0;
/// Engagement run (ms) treated as fully engaged
const ENGAGEMENT_MAX_MS: f64 = 30_000.0;
/// Corrections per window treated as maximal
const CORRECTIONS_MAX: f64 = 10.0;
/// Hesitation (ms) treated as maximal
const HESITATION_MAX_MS: f64 = 5000.0;

/// Center and half-range used to rescale raw valence to [-1, 1]
const VALENCE_CENTER: f64 = 0.2;
const VALENCE_HALF_RANGE: f64 = 0.5;

/// Linear normalization of `value` from `[min, max]` to `[0, 1]`, clamped
pub fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return 0.0;
    }
    clamp_finite((value - min) / (max - min), 0.0, 1.0)
}

/// Behavioral dimension estimator
pub struct DimensionalEstimator;

impl DimensionalEstimator {
    /// Estimate the three dimensions for a sample at the given uncertainty level
    pub fn estimate(signals: &BehavioralSignals, level: UncertaintyLevel) -> ThreeDimensionalState {
        ThreeDimensionalState::new(
            compute_arousal(signals),
            compute_valence(signals),
            compute_control(signals),
            compute_confidence(signals, level),
            level,
        )
    }
}

/// Compute arousal
///
/// Formula: `0.4 * jitter + 0.3 * norm(speed, 0, 2) + 0.3 * norm(deviation, 0, 3)`
pub fn compute_arousal(signals: &BehavioralSignals) -> f64 {
    let jitter = normalize(signals.jitter_magnitude, 0.0, 1.0);
    let speed = normalize(signals.motion_speed, 0.0, SPEED_MAX);
    let deviation = normalize(signals.deviation_from_baseline, 0.0, DEVIATION_MAX);
    clamp_finite(0.4 * jitter + 0.3 * speed + 0.3 * deviation, 0.0, 1.0)
}

/// Compute valence
///
/// Formula: `raw = 0.5 * norm(engagement, 0, 30000) - 0.3 * abandoned + 0.2 * smoothness`,
/// rescaled as `(raw - 0.2) / 0.5`.
///
/// Raw values span [-0.3, 0.7]; the rescale centers them so that an engaged,
/// smooth, non-abandoning user reads positive.
pub fn compute_valence(signals: &BehavioralSignals) -> f64 {
    let engagement = normalize(signals.engagement_duration, 0.0, ENGAGEMENT_MAX_MS);
    let abandonment_penalty = if signals.is_abandoned() { 1.0 } else { 0.0 };
    let smoothness = normalize(signals.motion_smoothness, 0.0, 1.0);

    let raw = 0.5 * engagement - 0.3 * abandonment_penalty + 0.2 * smoothness;
    clamp_finite((raw - VALENCE_CENTER) / VALENCE_HALF_RANGE, -1.0, 1.0)
}

/// Compute control
///
/// Formula: `0.4 * (1 - norm(corrections, 0, 10)) + 0.35 * (1 - norm(hesitation, 0, 5000)) + 0.25 * path_efficiency`
pub fn compute_control(signals: &BehavioralSignals) -> f64 {
    let corrections = normalize(signals.correction_count as f64, 0.0, CORRECTIONS_MAX);
    let hesitation = normalize(signals.hesitation_duration, 0.0, HESITATION_MAX_MS);
    let efficiency = normalize(signals.path_efficiency, 0.0, 1.0);

    clamp_finite(
        0.4 * (1.0 - corrections) + 0.35 * (1.0 - hesitation) + 0.25 * efficiency,
        0.0,
        1.0,
    )
}

/// Signal quality scaled into the confidence band of `level`
///
/// Quality: `(smoothness + path_efficiency + (1 - jitter)) / 3`
pub fn compute_confidence(signals: &BehavioralSignals, level: UncertaintyLevel) -> f64 {
    let quality = (normalize(signals.motion_smoothness, 0.0, 1.0)
        + normalize(signals.path_efficiency, 0.0, 1.0)
        + (1.0 - normalize(signals.jitter_magnitude, 0.0, 1.0)))
        / 3.0;
    let (low, high) = level.confidence_band();
    low + quality * (high - low)
}
