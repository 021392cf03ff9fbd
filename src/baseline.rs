//! Rolling behavioral baseline
//!
//! Maintains exponentially weighted mean and standard deviation for interaction
//! latency, motion smoothness and engagement duration. Samples arrive every
//! ~100 ms, so with alpha = 0.1 the effective memory is a few seconds of recent
//! behavior within the 60-second horizon.

use crate::config::BaselineConfig;
use crate::types::BehavioralSignals;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default latency mean (ms) before any sample is seen
pub const DEFAULT_LATENCY_MEAN: f64 = 1000.0;
pub const DEFAULT_LATENCY_STD: f64 = 500.0;
pub const DEFAULT_SMOOTHNESS_MEAN: f64 = 0.8;
pub const DEFAULT_SMOOTHNESS_STD: f64 = 0.1;
/// Default engagement mean (ms)
pub const DEFAULT_ENGAGEMENT_MEAN: f64 = 5000.0;
pub const DEFAULT_ENGAGEMENT_STD: f64 = 2000.0;

/// Rolling statistics of behavioral signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralBaseline {
    pub latency_mean: f64,
    pub latency_std: f64,
    pub smoothness_mean: f64,
    pub smoothness_std: f64,
    pub engagement_mean: f64,
    pub engagement_std: f64,
    pub sample_count: u32,
    pub last_updated: DateTime<Utc>,
    pub session_start: DateTime<Utc>,
}

impl BehavioralBaseline {
    /// A fresh baseline carrying the documented defaults
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            latency_mean: DEFAULT_LATENCY_MEAN,
            latency_std: DEFAULT_LATENCY_STD,
            smoothness_mean: DEFAULT_SMOOTHNESS_MEAN,
            smoothness_std: DEFAULT_SMOOTHNESS_STD,
            engagement_mean: DEFAULT_ENGAGEMENT_MEAN,
            engagement_std: DEFAULT_ENGAGEMENT_STD,
            sample_count: 0,
            last_updated: session_start,
            session_start,
        }
    }
}

/// One EMA step: returns `(mean', std')` with std floored
fn ema_step(mean: f64, std: f64, x: f64, alpha: f64, floor: f64) -> (f64, f64) {
    if !x.is_finite() {
        return (mean, std);
    }
    let new_mean = (1.0 - alpha) * mean + alpha * x;
    let variance = (1.0 - alpha) * std.powi(2) + alpha * (x - new_mean).powi(2);
    (new_mean, variance.sqrt().max(floor))
}

/// Maintains the live baseline for a session
#[derive(Debug, Clone)]
pub struct BaselineEstimator {
    config: BaselineConfig,
    baseline: BehavioralBaseline,
}

impl BaselineEstimator {
    pub fn new(config: BaselineConfig, session_start: DateTime<Utc>) -> Self {
        Self {
            config,
            baseline: BehavioralBaseline::new(session_start),
        }
    }

    /// Resume from a persisted snapshot
    pub fn from_baseline(config: BaselineConfig, baseline: BehavioralBaseline) -> Self {
        Self { config, baseline }
    }

    /// Fold a sample into the baseline
    pub fn update(&mut self, signals: &BehavioralSignals) -> &BehavioralBaseline {
        let alpha = self.config.alpha;
        let floor = self.config.std_floor;
        let b = &mut self.baseline;

        (b.latency_mean, b.latency_std) =
            ema_step(b.latency_mean, b.latency_std, signals.interaction_latency, alpha, floor);
        (b.smoothness_mean, b.smoothness_std) =
            ema_step(b.smoothness_mean, b.smoothness_std, signals.motion_smoothness, alpha, floor);
        (b.engagement_mean, b.engagement_std) =
            ema_step(b.engagement_mean, b.engagement_std, signals.engagement_duration, alpha, floor);

        b.sample_count = b.sample_count.saturating_add(1);
        b.last_updated = signals.timestamp;
        &self.baseline
    }

    pub fn baseline(&self) -> &BehavioralBaseline {
        &self.baseline
    }

    /// True once enough samples have been folded in
    pub fn is_ready(&self) -> bool {
        self.baseline.sample_count >= self.config.ready_after
    }

    /// Start over with defaults for a new session
    pub fn reset(&mut self, session_start: DateTime<Utc>) {
        self.baseline = BehavioralBaseline::new(session_start);
    }

    /// Serialize the baseline to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.baseline)
    }

    /// Load a baseline from JSON
    pub fn from_json(config: BaselineConfig, json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::from_baseline(config, serde_json::from_str(json)?))
    }
}
