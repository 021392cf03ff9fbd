//! Runtime configuration
//!
//! Every tunable of the pipeline lives here with its production default. A
//! configuration can be loaded from JSON and then overridden from the
//! environment:
//!
//! | Variable             | Default | Description                              |
//! |----------------------|---------|------------------------------------------|
//! | `AFFECT_DB_PATH`     | unset   | SQLite file for sessions and trajectories |
//! | `AFFECT_LOG_LEVEL`   | `info`  | tracing filter for the CLI                |
//! | `AFFECT_HISTORY_CAP` | `100`   | cap for the in-memory pipeline histories  |

use crate::error::AffectError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Signal collection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Maximum number of pointer samples kept in the trajectory buffer
    pub trajectory_capacity: usize,
    /// Base sampling window in milliseconds
    pub base_window_ms: f64,
    /// Analysis window = base window * multiplier
    pub window_multiplier: f64,
    /// Interaction gap that ends an engagement run
    pub engagement_gap_ms: f64,
    /// Minimum spacing between pointer moves counted as interactions
    pub move_throttle_ms: f64,
    /// Turns sharper than (180 - tolerance) degrees count as corrections
    pub correction_tolerance_deg: f64,
    /// Empirical ceiling for inter-point distance spread, in pixels
    pub jitter_ceiling_px: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            trajectory_capacity: 50,
            base_window_ms: 100.0,
            window_multiplier: 5.0,
            engagement_gap_ms: 5000.0,
            move_throttle_ms: 100.0,
            correction_tolerance_deg: 15.0,
            jitter_ceiling_px: 50.0,
        }
    }
}

impl CollectorConfig {
    /// Sliding analysis window length in milliseconds
    pub fn analysis_window_ms(&self) -> f64 {
        self.base_window_ms * self.window_multiplier
    }
}

/// Rolling baseline parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    /// EMA decay
    pub alpha: f64,
    /// Samples required before the baseline is considered ready
    pub ready_after: u32,
    /// Floor for every standard deviation
    pub std_floor: f64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            ready_after: 10,
            std_floor: 0.01,
        }
    }
}

/// Pipeline orchestration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cap for deviation, response and dimension histories
    pub history_capacity: usize,
    /// Number of recent entries used for coupling and stability
    pub reliability_window: usize,
    /// |delta| above which a deviation is significant
    pub significance_threshold: f64,
    /// Number of signal sources a fully instrumented tick can have
    pub max_signal_sources: usize,
    /// Soft budget for deviation monitoring
    pub deviation_budget_ms: f64,
    /// Soft budget for estimation and fusion
    pub estimation_budget_ms: f64,
    /// Soft budget for a whole tick
    pub tick_budget_ms: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            reliability_window: 10,
            significance_threshold: 1.5,
            max_signal_sources: 3,
            deviation_budget_ms: 50.0,
            estimation_budget_ms: 150.0,
            tick_budget_ms: 300.0,
        }
    }
}

/// Multi-source fusion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub behavioral_weight: f64,
    pub face_weight: f64,
    pub hand_weight: f64,
    /// Face readings below this confidence are discarded
    pub face_min_confidence: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            behavioral_weight: 0.5,
            face_weight: 0.3,
            hand_weight: 0.2,
            face_min_confidence: 0.3,
        }
    }
}

/// Durable storage parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; `None` keeps everything in memory
    pub db_path: Option<PathBuf>,
    pub max_sessions: usize,
    pub max_baselines: usize,
    pub max_trajectory_points: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_sessions: 100,
            max_baselines: 50,
            max_trajectory_points: 1000,
        }
    }
}

/// Master configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffectConfig {
    pub collector: CollectorConfig,
    pub baseline: BaselineConfig,
    pub pipeline: PipelineConfig,
    pub fusion: FusionConfig,
    pub storage: StorageConfig,
    /// tracing filter string, e.g. `"synheart_affect=debug,info"`
    pub log_level: String,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            baseline: BaselineConfig::default(),
            pipeline: PipelineConfig::default(),
            fusion: FusionConfig::default(),
            storage: StorageConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AffectConfig {
    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, AffectError> {
        serde_json::from_str(json).map_err(|e| AffectError::ConfigError(e.to_string()))
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self, AffectError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, AffectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply `AFFECT_*` environment overrides. Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("AFFECT_DB_PATH") {
            if !path.trim().is_empty() {
                self.storage.db_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(level) = std::env::var("AFFECT_LOG_LEVEL") {
            if !level.trim().is_empty() {
                self.log_level = level;
            }
        }
        if let Some(cap) = std::env::var("AFFECT_HISTORY_CAP")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            self.pipeline.history_capacity = cap;
        }
        self
    }

    /// Check the configuration and return human-readable warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !(self.baseline.alpha > 0.0 && self.baseline.alpha < 1.0) {
            warnings.push(format!(
                "Baseline alpha {} is outside (0, 1); the baseline will not converge",
                self.baseline.alpha
            ));
        }
        if self.pipeline.history_capacity == 0 {
            warnings.push("History capacity of 0 disables coupling and stability".to_string());
        }
        if self.pipeline.reliability_window < 3 {
            warnings.push(
                "Reliability window below 3 always yields neutral coupling and stability"
                    .to_string(),
            );
        }
        if self.fusion.face_min_confidence < 0.1 {
            warnings.push("Low face confidence gate may admit spurious classifications".to_string());
        }
        if self.collector.trajectory_capacity < 3 {
            warnings.push("Trajectory capacity below 3 disables motion analysis".to_string());
        }
        let weight_sum =
            self.fusion.behavioral_weight + self.fusion.face_weight + self.fusion.hand_weight;
        if weight_sum <= 0.0 {
            warnings.push("Fusion source weights sum to zero".to_string());
        }
        if self.storage.max_trajectory_points == 0 || self.storage.max_sessions == 0 {
            warnings.push("Zero retention cap discards every persisted record".to_string());
        }

        warnings
    }
}
