//! Core types for the Synheart Affect pipeline
//!
//! This module defines the data structures that flow through each tick of the
//! pipeline: sampled behavioral signals, deviation and response snapshots,
//! reliability metrics, and the dimensional affect estimate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lower bound of the "low uncertainty" band
pub const LOW_UNCERTAINTY_THRESHOLD: f64 = 0.6;

/// Lower bound of the "medium uncertainty" band
pub const MEDIUM_UNCERTAINTY_THRESHOLD: f64 = 0.3;

/// Three-tier classification of how far an estimate can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UncertaintyLevel {
    Low,
    Medium,
    High,
}

impl UncertaintyLevel {
    /// Classify a reliability score (higher = more reliable).
    ///
    /// `>= 0.6` is low uncertainty, `[0.3, 0.6)` medium, `< 0.3` high.
    pub fn from_score(score: f64) -> Self {
        if score >= LOW_UNCERTAINTY_THRESHOLD {
            UncertaintyLevel::Low
        } else if score >= MEDIUM_UNCERTAINTY_THRESHOLD {
            UncertaintyLevel::Medium
        } else {
            UncertaintyLevel::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UncertaintyLevel::Low => "low",
            UncertaintyLevel::Medium => "medium",
            UncertaintyLevel::High => "high",
        }
    }

    /// Confidence band an estimate is scaled into at this level
    pub fn confidence_band(&self) -> (f64, f64) {
        match self {
            UncertaintyLevel::Low => (0.8, 1.0),
            UncertaintyLevel::Medium => (0.4, 0.7),
            UncertaintyLevel::High => (0.1, 0.3),
        }
    }
}

/// One sampled behavioral feature vector (one per tick)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralSignals {
    /// Milliseconds between the two most recent discrete interactions
    pub interaction_latency: f64,
    /// Milliseconds between the last pointer motion and the next interaction
    pub hesitation_duration: f64,
    /// 1 - jitter, in [0, 1]
    pub motion_smoothness: f64,
    /// Normalized spread of inter-point distances, in [0, 1]
    pub jitter_magnitude: f64,
    /// Direction reversals in the analysis window
    pub correction_count: u32,
    /// Straight-line distance over path length, in [0, 1]
    pub path_efficiency: f64,
    /// Pixels per millisecond over the analysis window
    pub motion_speed: f64,
    /// Milliseconds of the current uninterrupted engagement run
    pub engagement_duration: f64,
    /// Onset of the interaction gap that ended engagement, if engagement lapsed
    pub abandonment_timing: Option<DateTime<Utc>>,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the previous sample
    pub delta_time: f64,
    /// Magnitude of the standardized deviation from baseline
    pub deviation_from_baseline: f64,
}

impl BehavioralSignals {
    /// A sample with neutral motion features and no interaction history
    pub fn neutral(timestamp: DateTime<Utc>) -> Self {
        Self {
            interaction_latency: 0.0,
            hesitation_duration: 0.0,
            motion_smoothness: 1.0,
            jitter_magnitude: 0.0,
            correction_count: 0,
            path_efficiency: 1.0,
            motion_speed: 0.0,
            engagement_duration: 0.0,
            abandonment_timing: None,
            timestamp,
            delta_time: 0.0,
            deviation_from_baseline: 0.0,
        }
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandonment_timing.is_some()
    }
}

/// Standardized deviation of a sample from the rolling baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationVector {
    pub delta_latency: f64,
    pub delta_smoothness: f64,
    pub delta_engagement: f64,
    /// Any |delta| exceeded the significance threshold
    pub is_significant: bool,
    pub timestamp: DateTime<Utc>,
}

impl DeviationVector {
    /// Euclidean norm of the three deltas
    pub fn magnitude(&self) -> f64 {
        (self.delta_latency.powi(2) + self.delta_smoothness.powi(2) + self.delta_engagement.powi(2))
            .sqrt()
    }
}

/// Compact behavioral response snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralResponse {
    pub jitter: f64,
    pub corrections: u32,
    pub abandonment: bool,
    pub response_latency: f64,
    pub timestamp: DateTime<Utc>,
}

impl BehavioralResponse {
    /// `(jitter + 0.1 * corrections + abandonment) / 2`
    pub fn magnitude(&self) -> f64 {
        let abandonment = if self.abandonment { 1.0 } else { 0.0 };
        (self.jitter + 0.1 * self.corrections as f64 + abandonment) / 2.0
    }
}

/// Canonical affect estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeDimensionalState {
    /// Activation, 0 (calm) to 1 (excited)
    pub arousal: f64,
    /// Pleasantness, -1 (negative) to 1 (positive)
    pub valence: f64,
    /// Perceived behavioral control, 0 (low) to 1 (high)
    pub control: f64,
    pub confidence: f64,
    pub uncertainty: UncertaintyLevel,
}

impl ThreeDimensionalState {
    /// Build a state with every value clamped to its declared range
    pub fn new(
        arousal: f64,
        valence: f64,
        control: f64,
        confidence: f64,
        uncertainty: UncertaintyLevel,
    ) -> Self {
        Self {
            arousal: clamp_finite(arousal, 0.0, 1.0),
            valence: clamp_finite(valence, -1.0, 1.0),
            control: clamp_finite(control, 0.0, 1.0),
            confidence: clamp_finite(confidence, 0.0, 1.0),
            uncertainty,
        }
    }
}

impl Default for ThreeDimensionalState {
    fn default() -> Self {
        Self::new(0.5, 0.0, 0.5, 0.5, UncertaintyLevel::Medium)
    }
}

/// Reliability of the current estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyMetrics {
    /// Deviation/response coupling, in [0, 1]
    pub coupling: f64,
    /// Stability of recent estimates, in [0, 1]
    pub stability: f64,
    /// Fraction of expected signal sources present
    pub signal_density: f64,
    /// Weighted combination of the above
    pub overall_uncertainty: f64,
    pub level: UncertaintyLevel,
}

/// Contribution of each source to a fused estimate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceContributions {
    pub face: f64,
    pub behavioral: f64,
    pub hand: f64,
}

/// Result of combining behavioral, face and hand signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEmotionalState {
    pub dimensions: ThreeDimensionalState,
    pub source_contributions: SourceContributions,
    pub fusion_confidence: f64,
    pub has_face: bool,
    pub has_hand: bool,
}

/// Compact timestamped snapshot of the estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub arousal: f64,
    pub valence: f64,
    pub control: f64,
    pub uncertainty: UncertaintyLevel,
    pub timestamp: DateTime<Utc>,
}

impl TrajectoryPoint {
    pub fn from_state(state: &ThreeDimensionalState, timestamp: DateTime<Utc>) -> Self {
        Self {
            arousal: state.arousal,
            valence: state.valence,
            control: state.control,
            uncertainty: state.uncertainty,
            timestamp,
        }
    }
}

/// Aggregated output of one pipeline tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Final estimate after fusion and context weighting
    pub dimensions: ThreeDimensionalState,
    /// Behavioral-only estimate before fusion
    pub behavioral: ThreeDimensionalState,
    pub fused: FusedEmotionalState,
    pub uncertainty: UncertaintyMetrics,
    pub deviation: DeviationVector,
    pub response: BehavioralResponse,
    /// Multiplicative confidence factor applied by context weighting
    pub context_factor: f64,
    /// Always true: the caller updates the baseline before each tick
    pub baseline_updated: bool,
    pub trajectory_point: TrajectoryPoint,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

/// Clamp, mapping NaN to the lower bound
pub(crate) fn clamp_finite(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_uncertainty_boundaries() {
        assert_eq!(UncertaintyLevel::from_score(0.6), UncertaintyLevel::Low);
        assert_eq!(UncertaintyLevel::from_score(0.59999), UncertaintyLevel::Medium);
        assert_eq!(UncertaintyLevel::from_score(0.3), UncertaintyLevel::Medium);
        assert_eq!(UncertaintyLevel::from_score(0.29999), UncertaintyLevel::High);
        assert_eq!(UncertaintyLevel::from_score(1.0), UncertaintyLevel::Low);
        assert_eq!(UncertaintyLevel::from_score(0.0), UncertaintyLevel::High);
    }

    #[test]
    fn test_state_clamps_out_of_range() {
        let state = ThreeDimensionalState::new(1.7, -3.0, -0.2, f64::NAN, UncertaintyLevel::Low);
        assert_eq!(state.arousal, 1.0);
        assert_eq!(state.valence, -1.0);
        assert_eq!(state.control, 0.0);
        assert_eq!(state.confidence, 0.0);
    }

    #[test]
    fn test_deviation_magnitude() {
        let deviation = DeviationVector {
            delta_latency: 3.0,
            delta_smoothness: 4.0,
            delta_engagement: 0.0,
            is_significant: true,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
        };
        assert!((deviation.magnitude() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_response_magnitude() {
        let response = BehavioralResponse {
            jitter: 0.4,
            corrections: 2,
            abandonment: true,
            response_latency: 300.0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
        };
        // (0.4 + 0.2 + 1.0) / 2
        assert!((response.magnitude() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_uncertainty_serializes_lowercase() {
        let json = serde_json::to_string(&UncertaintyLevel::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }
}
