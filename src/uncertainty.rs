//! Uncertainty quantification
//!
//! Combines coupling, stability and signal density into one reliability score
//! and classifies it with the fixed three-tier thresholds.

use crate::types::{UncertaintyLevel, UncertaintyMetrics};

const COUPLING_WEIGHT: f64 = 0.4;
const STABILITY_WEIGHT: f64 = 0.4;
const DENSITY_WEIGHT: f64 = 0.2;

/// Default number of signal sources (behavior, face, hand)
pub const DEFAULT_MAX_SIGNAL_SOURCES: usize = 3;

#[derive(Debug, Clone)]
pub struct UncertaintyQuantifier {
    max_signal_sources: usize,
}

impl Default for UncertaintyQuantifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIGNAL_SOURCES)
    }
}

impl UncertaintyQuantifier {
    pub fn new(max_signal_sources: usize) -> Self {
        Self { max_signal_sources }
    }

    /// `min(1, available / max)`
    pub fn signal_density(&self, available_sources: usize) -> f64 {
        if self.max_signal_sources == 0 {
            return 0.0;
        }
        (available_sources as f64 / self.max_signal_sources as f64).min(1.0)
    }

    /// `0.4 * coupling + 0.4 * stability + 0.2 * density`
    pub fn quantify(&self, coupling: f64, stability: f64, available_sources: usize) -> UncertaintyMetrics {
        let signal_density = self.signal_density(available_sources);
        let overall_uncertainty = combine(coupling, stability, signal_density);
        UncertaintyMetrics {
            coupling,
            stability,
            signal_density,
            overall_uncertainty,
            level: UncertaintyLevel::from_score(overall_uncertainty),
        }
    }
}

fn combine(coupling: f64, stability: f64, signal_density: f64) -> f64 {
    (COUPLING_WEIGHT * coupling + STABILITY_WEIGHT * stability + DENSITY_WEIGHT * signal_density)
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_combination() {
        let quantifier = UncertaintyQuantifier::default();
        let metrics = quantifier.quantify(0.5, 0.5, 1);
        // 0.2 + 0.2 + 0.2 / 3
        assert!((metrics.overall_uncertainty - (0.4 + 0.2 / 3.0)).abs() < 1e-12);
        assert_eq!(metrics.level, UncertaintyLevel::Medium);
    }

    #[test]
    fn test_full_reliability_is_low_uncertainty() {
        let quantifier = UncertaintyQuantifier::default();
        let metrics = quantifier.quantify(1.0, 1.0, 3);
        assert!((metrics.overall_uncertainty - 1.0).abs() < 1e-12);
        assert_eq!(metrics.level, UncertaintyLevel::Low);
    }

    #[test]
    fn test_poor_reliability_is_high_uncertainty() {
        let quantifier = UncertaintyQuantifier::default();
        let metrics = quantifier.quantify(0.1, 0.2, 1);
        assert_eq!(metrics.level, UncertaintyLevel::High);
    }

    #[test]
    fn test_signal_density_caps_at_one() {
        let quantifier = UncertaintyQuantifier::default();
        assert_eq!(quantifier.signal_density(5), 1.0);
        assert!((quantifier.signal_density(2) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(UncertaintyQuantifier::new(0).signal_density(2), 0.0);
    }
}
