//! Pipeline orchestration
//!
//! One tick sequences every analysis stage over the current sample, in strict
//! order:
//!
//! 1. Append deviation and response to their bounded histories
//! 2. Coupling (deviation/response correlation)
//! 3. Stability (recent dimensional estimates)
//! 4. Uncertainty
//! 5. Context weights
//! 6. Dimensional estimate
//! 7. Fusion with face and hand readings
//! 8. Context factor applied to confidence
//! 9. Append to dimension history and trajectory log
//!
//! Each tick is atomic; the orchestrator keeps no running state between ticks
//! besides its histories.

use crate::config::{AffectConfig, FusionConfig, PipelineConfig};
use crate::context::{apply_context, ContextWeighter};
use crate::dimensions::DimensionalEstimator;
use crate::external::{FaceEmotionResult, HandGestureResult};
use crate::fusion::SignalFusionEngine;
use crate::history::BoundedHistory;
use crate::reliability::{ConsistencyAnalyzer, StabilityAnalyzer};
use crate::types::{
    BehavioralResponse, BehavioralSignals, DeviationVector, PipelineState, ThreeDimensionalState,
    TrajectoryPoint,
};
use crate::uncertainty::UncertaintyQuantifier;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Where the orchestrator is in its per-tick cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickPhase {
    Idle,
    Sampling,
    Updated,
}

/// Everything one tick consumes
#[derive(Debug, Clone)]
pub struct TickInput<'a> {
    /// Sample with `deviation_from_baseline` already filled in
    pub signals: &'a BehavioralSignals,
    pub deviation: DeviationVector,
    pub response: BehavioralResponse,
    pub face: Option<&'a FaceEmotionResult>,
    pub hand: Option<&'a HandGestureResult>,
}

/// Owns the bounded histories and runs the per-tick analysis
#[derive(Debug, Clone)]
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    fusion_config: FusionConfig,
    consistency: ConsistencyAnalyzer,
    stability: StabilityAnalyzer,
    quantifier: UncertaintyQuantifier,
    fusion: SignalFusionEngine,

    deviations: BoundedHistory<DeviationVector>,
    responses: BoundedHistory<BehavioralResponse>,
    dimensions: BoundedHistory<ThreeDimensionalState>,
    trajectory: BoundedHistory<TrajectoryPoint>,

    phase: TickPhase,
    ticks: u64,
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new(&AffectConfig::default())
    }
}

impl PipelineOrchestrator {
    pub fn new(config: &AffectConfig) -> Self {
        let pipeline = config.pipeline.clone();
        let history = pipeline.history_capacity;
        Self {
            consistency: ConsistencyAnalyzer::new(pipeline.reliability_window),
            stability: StabilityAnalyzer::new(pipeline.reliability_window),
            quantifier: UncertaintyQuantifier::new(pipeline.max_signal_sources),
            fusion: SignalFusionEngine::new(config.fusion.clone()),
            fusion_config: config.fusion.clone(),
            deviations: BoundedHistory::new(history),
            responses: BoundedHistory::new(history),
            dimensions: BoundedHistory::new(history),
            trajectory: BoundedHistory::new(config.storage.max_trajectory_points),
            config: pipeline,
            phase: TickPhase::Idle,
            ticks: 0,
        }
    }

    /// Run one tick and return the aggregated state
    pub fn tick(&mut self, input: TickInput<'_>, context: &ContextWeighter) -> PipelineState {
        let started = Instant::now();
        self.phase = TickPhase::Sampling;
        let now = input.signals.timestamp;

        self.deviations.push(input.deviation.clone());
        self.responses.push(input.response.clone());

        let window = self.config.reliability_window;
        let recent_deviations: Vec<DeviationVector> =
            self.deviations.recent(window).cloned().collect();
        let recent_responses: Vec<BehavioralResponse> =
            self.responses.recent(window).cloned().collect();
        let coupling = self.consistency.coupling(&recent_deviations, &recent_responses);

        let recent_dimensions: Vec<ThreeDimensionalState> =
            self.dimensions.recent(window).cloned().collect();
        let stability = self.stability.stability(&recent_dimensions);

        let uncertainty = self.quantifier.quantify(coupling, stability, self.available_sources(&input));

        let weights = context.weights(now);

        let estimation_started = Instant::now();
        let behavioral = DimensionalEstimator::estimate(input.signals, uncertainty.level);
        let fused = self.fusion.fuse(&behavioral, input.face, input.hand);
        let estimation_ms = elapsed_since(estimation_started);
        if estimation_ms > self.config.estimation_budget_ms {
            warn!(
                elapsed_ms = estimation_ms,
                budget_ms = self.config.estimation_budget_ms,
                "estimation and fusion over budget"
            );
        }

        let dimensions = apply_context(&fused.dimensions, weights.factor);

        self.dimensions.push(dimensions.clone());
        let trajectory_point = TrajectoryPoint::from_state(&dimensions, now);
        self.trajectory.push(trajectory_point.clone());

        let processing_time_ms = elapsed_since(started);
        if processing_time_ms > self.config.tick_budget_ms {
            warn!(
                elapsed_ms = processing_time_ms,
                budget_ms = self.config.tick_budget_ms,
                "pipeline tick over budget"
            );
        }

        self.ticks += 1;
        self.phase = TickPhase::Updated;
        debug!(
            tick = self.ticks,
            arousal = dimensions.arousal,
            valence = dimensions.valence,
            control = dimensions.control,
            level = dimensions.uncertainty.as_str(),
            "pipeline tick"
        );

        PipelineState {
            dimensions,
            behavioral,
            fused,
            uncertainty,
            deviation: input.deviation,
            response: input.response,
            context_factor: weights.factor,
            baseline_updated: true,
            trajectory_point,
            processing_time_ms,
            timestamp: now,
        }
    }

    /// Behavior is always present; face and hand count when fusion would use them
    fn available_sources(&self, input: &TickInput<'_>) -> usize {
        let face = input
            .face
            .is_some_and(|f| f.is_usable(self.fusion_config.face_min_confidence));
        let hand = input.hand.is_some_and(|h| h.classified_sign().is_some());
        1 + usize::from(face) + usize::from(hand)
    }

    /// Clear every bounded history (session boundary)
    pub fn reset_pipeline_history(&mut self) {
        self.deviations.clear();
        self.responses.clear();
        self.dimensions.clear();
        self.trajectory.clear();
        self.phase = TickPhase::Idle;
        debug!("pipeline history reset");
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    /// Total ticks since construction
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn deviation_history(&self) -> &BoundedHistory<DeviationVector> {
        &self.deviations
    }

    pub fn response_history(&self) -> &BoundedHistory<BehavioralResponse> {
        &self.responses
    }

    pub fn dimension_history(&self) -> &BoundedHistory<ThreeDimensionalState> {
        &self.dimensions
    }

    pub fn trajectory(&self) -> &BoundedHistory<TrajectoryPoint> {
        &self.trajectory
    }
}

fn elapsed_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TaskType;
    use crate::external::FaceEmotion;
    use crate::types::UncertaintyLevel;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn deviation(ts: DateTime<Utc>, latency: f64) -> DeviationVector {
        DeviationVector {
            delta_latency: latency,
            delta_smoothness: 0.0,
            delta_engagement: 0.0,
            is_significant: latency.abs() > 1.5,
            timestamp: ts,
        }
    }

    fn response(ts: DateTime<Utc>, jitter: f64) -> BehavioralResponse {
        BehavioralResponse {
            jitter,
            corrections: 0,
            abandonment: false,
            response_latency: 0.0,
            timestamp: ts,
        }
    }

    fn run_tick(
        orchestrator: &mut PipelineOrchestrator,
        context: &ContextWeighter,
        ms: i64,
        face: Option<&FaceEmotionResult>,
    ) -> PipelineState {
        let signals = BehavioralSignals::neutral(t(ms));
        let input = TickInput {
            signals: &signals,
            deviation: deviation(t(ms), 0.0),
            response: response(t(ms), 0.0),
            face,
            hand: None,
        };
        orchestrator.tick(input, context)
    }

    #[test]
    fn test_first_tick_uses_neutral_reliability() {
        let mut orchestrator = PipelineOrchestrator::default();
        let context = ContextWeighter::new(TaskType::Chat, t(0));
        let state = run_tick(&mut orchestrator, &context, 0, None);

        assert_eq!(state.uncertainty.coupling, 0.5);
        assert_eq!(state.uncertainty.stability, 0.5);
        assert!((state.uncertainty.signal_density - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(state.uncertainty.level, UncertaintyLevel::Medium);
        assert!(state.baseline_updated);
        assert_eq!(orchestrator.phase(), TickPhase::Updated);
        assert_eq!(orchestrator.trajectory().len(), 1);
    }

    #[test]
    fn test_context_scales_confidence_not_dimensions() {
        let mut orchestrator = PipelineOrchestrator::default();
        let context = ContextWeighter::new(TaskType::Passive, t(0));
        let state = run_tick(&mut orchestrator, &context, 0, None);

        assert_eq!(state.dimensions.arousal, state.fused.dimensions.arousal);
        assert_eq!(state.dimensions.valence, state.fused.dimensions.valence);
        assert_eq!(state.dimensions.control, state.fused.dimensions.control);
        let expected = state.fused.dimensions.confidence * state.context_factor;
        assert!((state.dimensions.confidence - expected).abs() < 1e-12);
        assert!(state.context_factor < 1.0);
    }

    #[test]
    fn test_histories_stay_bounded() {
        let mut orchestrator = PipelineOrchestrator::default();
        let context = ContextWeighter::new(TaskType::Chat, t(0));
        for i in 0..150 {
            run_tick(&mut orchestrator, &context, i * 100, None);
        }
        assert_eq!(orchestrator.deviation_history().len(), 100);
        assert_eq!(orchestrator.response_history().len(), 100);
        assert_eq!(orchestrator.dimension_history().len(), 100);
        assert_eq!(orchestrator.trajectory().len(), 150);
        assert_eq!(
            orchestrator.deviation_history().iter().next().map(|d| d.timestamp),
            Some(t(5000))
        );
    }

    #[test]
    fn test_stable_history_raises_stability() {
        let mut orchestrator = PipelineOrchestrator::default();
        let context = ContextWeighter::new(TaskType::Chat, t(0));
        let mut state = run_tick(&mut orchestrator, &context, 0, None);
        for i in 1..5 {
            state = run_tick(&mut orchestrator, &context, i * 100, None);
        }
        // Identical samples produce identical estimates
        assert!((state.uncertainty.stability - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_face_counts_toward_signal_density() {
        let mut orchestrator = PipelineOrchestrator::default();
        let context = ContextWeighter::new(TaskType::Chat, t(0));
        let face = FaceEmotionResult {
            label: FaceEmotion::Happy,
            confidence: 0.9,
            scores: BTreeMap::new(),
            timestamp: t(0),
            inference_time_ms: 20.0,
        };
        let state = run_tick(&mut orchestrator, &context, 0, Some(&face));
        assert!((state.uncertainty.signal_density - 2.0 / 3.0).abs() < 1e-12);
        assert!(state.fused.has_face);
    }

    #[test]
    fn test_reset_clears_histories() {
        let mut orchestrator = PipelineOrchestrator::default();
        let context = ContextWeighter::new(TaskType::Chat, t(0));
        for i in 0..5 {
            run_tick(&mut orchestrator, &context, i * 100, None);
        }
        orchestrator.reset_pipeline_history();

        assert!(orchestrator.deviation_history().is_empty());
        assert!(orchestrator.response_history().is_empty());
        assert!(orchestrator.dimension_history().is_empty());
        assert!(orchestrator.trajectory().is_empty());
        assert_eq!(orchestrator.phase(), TickPhase::Idle);
        assert_eq!(orchestrator.tick_count(), 5);
    }
}
