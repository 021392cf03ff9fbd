//! Pattern reliability metrics
//!
//! Two signals describe how far the current estimate can be trusted:
//!
//! - **Coupling**: how strongly behavioral responses track deviations from
//!   baseline. A user whose responses move with the stimulus gives a readable
//!   signal.
//! - **Stability**: how consistent the recent dimensional estimates are.
//!
//! Both fall back to a neutral 0.5 when history is too short.

use crate::types::{BehavioralResponse, DeviationVector, ThreeDimensionalState};

/// Neutral value when there is not enough history
pub const NEUTRAL_RELIABILITY: f64 = 0.5;

/// Minimum number of entries before a metric is computed
pub const MIN_RELIABILITY_SAMPLES: usize = 3;

/// Default number of recent entries examined
pub const DEFAULT_RELIABILITY_WINDOW: usize = 10;

/// Mean magnitude below which the coefficient of variation is not defined
const MEAN_EPSILON: f64 = 1e-6;

/// Deviation/response coupling
#[derive(Debug, Clone)]
pub struct ConsistencyAnalyzer {
    window: usize,
}

impl Default for ConsistencyAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_RELIABILITY_WINDOW)
    }
}

impl ConsistencyAnalyzer {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Pearson correlation between deviation and response magnitudes over the
    /// last `window` pairs, rescaled from [-1, 1] to [0, 1].
    ///
    /// Both slices are aligned from their newest entries.
    pub fn coupling(
        &self,
        deviations: &[DeviationVector],
        responses: &[BehavioralResponse],
    ) -> f64 {
        let n = deviations.len().min(responses.len()).min(self.window);
        if n < MIN_RELIABILITY_SAMPLES {
            return NEUTRAL_RELIABILITY;
        }

        let xs: Vec<f64> = deviations[deviations.len() - n..]
            .iter()
            .map(DeviationVector::magnitude)
            .collect();
        let ys: Vec<f64> = responses[responses.len() - n..]
            .iter()
            .map(BehavioralResponse::magnitude)
            .collect();

        match pearson(&xs, &ys) {
            Some(r) => ((r + 1.0) / 2.0).clamp(0.0, 1.0),
            None => NEUTRAL_RELIABILITY,
        }
    }
}

/// Stability of recent dimensional estimates
#[derive(Debug, Clone)]
pub struct StabilityAnalyzer {
    window: usize,
}

impl Default for StabilityAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_RELIABILITY_WINDOW)
    }
}

impl StabilityAnalyzer {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// `exp(-mean CV)` over arousal, valence and control.
    ///
    /// Valence is signed, so the CV uses the magnitude of the mean. A
    /// dimension whose mean is ~0 contributes its standard deviation instead.
    pub fn stability(&self, history: &[ThreeDimensionalState]) -> f64 {
        let n = history.len().min(self.window);
        if n < MIN_RELIABILITY_SAMPLES {
            return NEUTRAL_RELIABILITY;
        }
        let recent = &history[history.len() - n..];

        let arousal: Vec<f64> = recent.iter().map(|s| s.arousal).collect();
        let valence: Vec<f64> = recent.iter().map(|s| s.valence).collect();
        let control: Vec<f64> = recent.iter().map(|s| s.control).collect();

        let avg_cv = (coefficient_of_variation(&arousal)
            + coefficient_of_variation(&valence)
            + coefficient_of_variation(&control))
            / 3.0;

        (-avg_cv).exp().clamp(0.0, 1.0)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
fn std_dev(values: &[f64], mean: f64) -> f64 {
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    let sd = std_dev(values, m);
    if m.abs() < MEAN_EPSILON {
        sd
    } else {
        sd / m.abs()
    }
}

/// Pearson correlation; `None` when either series has zero variance
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let mx = mean(xs);
    let my = mean(ys);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mx;
        let dy = y - my;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom <= f64::EPSILON || !denom.is_finite() {
        return None;
    }
    Some((cov / denom).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UncertaintyLevel;
    use chrono::{TimeZone, Utc};

    fn deviation(latency: f64) -> DeviationVector {
        DeviationVector {
            delta_latency: latency,
            delta_smoothness: 0.0,
            delta_engagement: 0.0,
            is_significant: latency.abs() > 1.5,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
        }
    }

    fn response(jitter: f64) -> BehavioralResponse {
        BehavioralResponse {
            jitter,
            corrections: 0,
            abandonment: false,
            response_latency: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
        }
    }

    fn state(arousal: f64, valence: f64, control: f64) -> ThreeDimensionalState {
        ThreeDimensionalState::new(arousal, valence, control, 0.5, UncertaintyLevel::Medium)
    }

    #[test]
    fn test_coupling_neutral_with_short_history() {
        let analyzer = ConsistencyAnalyzer::default();
        let deviations = vec![deviation(1.0), deviation(2.0)];
        let responses = vec![response(0.1), response(0.2)];
        assert_eq!(analyzer.coupling(&deviations, &responses), 0.5);
        assert_eq!(analyzer.coupling(&[], &[]), 0.5);
    }

    #[test]
    fn test_coupling_perfect_positive() {
        let analyzer = ConsistencyAnalyzer::default();
        let deviations: Vec<_> = (1..=5).map(|i| deviation(i as f64)).collect();
        let responses: Vec<_> = (1..=5).map(|i| response(i as f64 * 0.1)).collect();
        assert!((analyzer.coupling(&deviations, &responses) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_coupling_perfect_negative() {
        let analyzer = ConsistencyAnalyzer::default();
        let deviations: Vec<_> = (1..=5).map(|i| deviation(i as f64)).collect();
        let responses: Vec<_> = (1..=5).map(|i| response(1.0 - i as f64 * 0.1)).collect();
        assert!(analyzer.coupling(&deviations, &responses).abs() < 1e-9);
    }

    #[test]
    fn test_coupling_zero_variance_is_neutral() {
        let analyzer = ConsistencyAnalyzer::default();
        let deviations: Vec<_> = (1..=5).map(|i| deviation(i as f64)).collect();
        let responses: Vec<_> = (0..5).map(|_| response(0.3)).collect();
        assert_eq!(analyzer.coupling(&deviations, &responses), 0.5);
    }

    #[test]
    fn test_coupling_uses_only_recent_window() {
        let analyzer = ConsistencyAnalyzer::new(3);
        // Older anti-correlated pairs are outside the window
        let mut deviations: Vec<_> = (1..=5).map(|i| deviation(i as f64)).collect();
        let mut responses: Vec<_> = (1..=5).map(|i| response(1.0 - i as f64 * 0.1)).collect();
        deviations.extend((1..=3).map(|i| deviation(i as f64)));
        responses.extend((1..=3).map(|i| response(i as f64 * 0.1)));
        assert!((analyzer.coupling(&deviations, &responses) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_stability_neutral_with_short_history() {
        let analyzer = StabilityAnalyzer::default();
        assert_eq!(analyzer.stability(&[state(0.5, 0.2, 0.5)]), 0.5);
    }

    #[test]
    fn test_constant_history_is_fully_stable() {
        let analyzer = StabilityAnalyzer::default();
        let history = vec![state(0.4, 0.2, 0.7); 6];
        assert!((analyzer.stability(&history) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_volatile_history_is_less_stable() {
        let analyzer = StabilityAnalyzer::default();
        let calm = vec![state(0.5, 0.3, 0.6), state(0.52, 0.31, 0.61), state(0.49, 0.29, 0.6)];
        let volatile = vec![state(0.1, -0.8, 0.2), state(0.9, 0.7, 0.9), state(0.2, -0.5, 0.1)];

        let calm_score = analyzer.stability(&calm);
        let volatile_score = analyzer.stability(&volatile);
        assert!(calm_score > volatile_score);
        assert!((0.0..=1.0).contains(&volatile_score));
    }

    #[test]
    fn test_zero_mean_valence_is_guarded() {
        let analyzer = StabilityAnalyzer::default();
        let history = vec![state(0.5, -0.1, 0.5), state(0.5, 0.1, 0.5), state(0.5, 0.0, 0.5)];
        let score = analyzer.stability(&history);
        assert!(score.is_finite());
        assert!(score > 0.9);
    }
}
