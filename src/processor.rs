//! Stateful affect processor
//!
//! `AffectProcessor` is the single entry point hosts drive: feed it input
//! events as they happen, call `tick` on a ~100 ms timer, and bracket usage
//! with `start_session` / `end_session`. Persistence, when configured, runs on
//! a background writer and never blocks a tick.

use crate::baseline::{BaselineEstimator, BehavioralBaseline};
use crate::config::AffectConfig;
use crate::context::{ContextWeighter, TaskType};
use crate::deviation::{capture_response, DeviationMonitor};
use crate::encoder::ContextBlockEncoder;
use crate::error::AffectError;
use crate::external::{FaceEmotionResult, HandGestureResult};
use crate::pipeline::{PipelineOrchestrator, TickInput};
use crate::session::{EmotionSession, SessionRecorder};
use crate::signals::{InputEvent, SignalCollector};
use crate::store::{PersistCommand, PersistenceWorker, ResilientStore};
use crate::types::PipelineState;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Ticks between baseline snapshots written to the store (~1 minute at 100 ms)
pub const BASELINE_SNAPSHOT_INTERVAL: u64 = 600;

/// Processor shared between threads; every mutation goes through one lock
pub type SharedAffectProcessor = Arc<Mutex<AffectProcessor>>;

pub struct AffectProcessor {
    config: AffectConfig,
    collector: SignalCollector,
    baseline: BaselineEstimator,
    deviation: DeviationMonitor,
    orchestrator: PipelineOrchestrator,
    context: ContextWeighter,
    session: Option<SessionRecorder>,
    persistence: Option<PersistenceWorker>,
    encoder: ContextBlockEncoder,
    last_state: Option<PipelineState>,
    session_ticks: u64,
}

impl Default for AffectProcessor {
    fn default() -> Self {
        Self::new(AffectConfig::default())
    }
}

impl AffectProcessor {
    /// Create a processor without persistence. Collection is idle until
    /// `start_session`.
    pub fn new(config: AffectConfig) -> Self {
        let now = Utc::now();
        let mut collector = SignalCollector::new(config.collector.clone());
        collector.stop();

        Self {
            collector,
            baseline: BaselineEstimator::new(config.baseline.clone(), now),
            deviation: DeviationMonitor::new(
                config.pipeline.significance_threshold,
                config.pipeline.deviation_budget_ms,
            ),
            orchestrator: PipelineOrchestrator::new(&config),
            context: ContextWeighter::new(TaskType::default(), now),
            session: None,
            persistence: None,
            encoder: ContextBlockEncoder::new(),
            last_state: None,
            session_ticks: 0,
            config,
        }
    }

    /// Create a processor that persists sessions through `store`
    pub fn with_store(config: AffectConfig, store: ResilientStore) -> Result<Self, AffectError> {
        let backend = store.backend();
        let worker = PersistenceWorker::spawn(store)?;
        info!(backend, "persistence enabled");
        let mut processor = Self::new(config);
        processor.persistence = Some(worker);
        Ok(processor)
    }

    /// Create a processor persisting to the configured storage
    pub fn with_persistence(config: AffectConfig) -> Result<Self, AffectError> {
        let store = ResilientStore::open(&config.storage);
        Self::with_store(config, store)
    }

    /// Wrap into a handle shareable across threads
    pub fn into_shared(self) -> SharedAffectProcessor {
        Arc::new(Mutex::new(self))
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Begin a session and return its id. An active session is ended first.
    pub fn start_session(&mut self, now: DateTime<Utc>, task_type: TaskType) -> String {
        if self.session.is_some() {
            if let Err(e) = self.end_session(now) {
                warn!(error = %e, "failed to close previous session");
            }
        }

        let recorder = SessionRecorder::start(now, self.config.storage.max_trajectory_points);
        let id = recorder.id().to_string();

        self.collector.start();
        self.baseline.reset(now);
        self.context.reset(now);
        self.context.set_task_type(task_type);
        self.orchestrator.reset_pipeline_history();
        self.session = Some(recorder);
        self.session_ticks = 0;

        info!(session_id = %id, task = task_type.as_str(), "session started");
        id
    }

    /// Finalize the active session, persist it with its final baseline, stop
    /// collection and clear pipeline histories
    pub fn end_session(&mut self, now: DateTime<Utc>) -> Result<EmotionSession, AffectError> {
        let recorder = self.session.take().ok_or(AffectError::SessionNotActive)?;
        let final_baseline = self.baseline.baseline().clone();
        let session = recorder.finalize(now, Some(final_baseline.clone()));

        self.persist(PersistCommand::Session(Box::new(session.clone())));
        self.persist(PersistCommand::Baseline(final_baseline));

        self.collector.stop();
        self.orchestrator.reset_pipeline_history();

        info!(
            session_id = %session.id,
            duration_ms = session.duration_ms(),
            samples = session.behavioral_samples.len(),
            "session ended"
        );
        Ok(session)
    }

    pub fn is_session_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id())
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Feed one input event. Returns `Ok(false)` when collection is idle.
    pub fn ingest(&mut self, event: &InputEvent) -> Result<bool, AffectError> {
        event
            .validate()
            .map_err(|e| AffectError::InvalidEvent(e.to_string()))?;
        Ok(self.collector.handle_event(event))
    }

    /// Parse and feed one JSON-encoded event
    pub fn ingest_json(&mut self, json: &str) -> Result<bool, AffectError> {
        let event: InputEvent = serde_json::from_str(json)?;
        self.ingest(&event)
    }

    /// Record whether the user's latest action succeeded
    pub fn record_outcome(&mut self, success: bool) {
        self.context.record_outcome(success);
    }

    pub fn set_task_type(&mut self, task_type: TaskType) {
        self.context.set_task_type(task_type);
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Sample, compare against the baseline, update it, and run the pipeline.
    ///
    /// Deviation is measured against the baseline as it stood before this
    /// sample was folded in.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        face: Option<&FaceEmotionResult>,
        hand: Option<&HandGestureResult>,
    ) -> PipelineState {
        let mut signals = self.collector.sample(now);

        let deviation = self.deviation.compute(&signals, self.baseline.baseline());
        signals.deviation_from_baseline = deviation.magnitude();

        self.baseline.update(&signals);
        let response = capture_response(&signals);

        let input = TickInput {
            signals: &signals,
            deviation,
            response,
            face,
            hand,
        };
        let state = self.orchestrator.tick(input, &self.context);

        if let Some(recorder) = self.session.as_mut() {
            recorder.record(&signals, &state, face);
            let session_id = recorder.id().to_string();
            self.session_ticks += 1;

            self.persist(PersistCommand::Trajectory {
                session_id,
                point: state.trajectory_point.clone(),
            });
            if self.session_ticks % BASELINE_SNAPSHOT_INTERVAL == 0 {
                self.persist(PersistCommand::Baseline(self.baseline.baseline().clone()));
            }
        }

        self.last_state = Some(state.clone());
        state
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    pub fn last_state(&self) -> Option<&PipelineState> {
        self.last_state.as_ref()
    }

    /// Context block for the latest state, if any tick has run
    pub fn context_block(&self) -> Option<String> {
        self.last_state.as_ref().map(|s| self.encoder.format(s))
    }

    /// JSON payload for a state
    pub fn encode_state(&self, state: &PipelineState) -> Result<String, AffectError> {
        self.encoder.encode_json(state)
    }

    pub fn encoder(&self) -> &ContextBlockEncoder {
        &self.encoder
    }

    pub fn config(&self) -> &AffectConfig {
        &self.config
    }

    pub fn baseline(&self) -> &BehavioralBaseline {
        self.baseline.baseline()
    }

    pub fn is_baseline_ready(&self) -> bool {
        self.baseline.is_ready()
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    // ------------------------------------------------------------------
    // Baseline state
    // ------------------------------------------------------------------

    /// Load baseline state from JSON
    pub fn load_baselines(&mut self, json: &str) -> Result<(), AffectError> {
        self.baseline = BaselineEstimator::from_json(self.config.baseline.clone(), json)?;
        Ok(())
    }

    /// Save baseline state to JSON
    pub fn save_baselines(&self) -> Result<String, AffectError> {
        Ok(self.baseline.to_json()?)
    }

    // ------------------------------------------------------------------
    // Storage
    // ------------------------------------------------------------------

    /// Queue a full purge of stored data
    pub fn purge_all_data(&self) -> bool {
        self.persist(PersistCommand::Purge)
    }

    /// End any active session, drain pending writes and return the store
    pub fn shutdown(mut self, now: DateTime<Utc>) -> Option<ResilientStore> {
        if self.session.is_some() {
            if let Err(e) = self.end_session(now) {
                warn!(error = %e, "failed to close session at shutdown");
            }
        }
        let worker = self.persistence.take()?;
        debug!("draining persistence queue");
        worker.shutdown()
    }

    fn persist(&self, command: PersistCommand) -> bool {
        match &self.persistence {
            Some(worker) => worker.enqueue(command),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::CONTEXT_HEADER;
    use crate::store::RetentionCaps;
    use chrono::{Duration, TimeZone};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn click(ms: i64, x: f64) -> InputEvent {
        InputEvent::Click {
            timestamp: t(ms),
            x,
            y: 200.0,
        }
    }

    #[test]
    fn test_deviation_uses_pre_update_baseline() {
        let mut processor = AffectProcessor::default();
        processor.start_session(t(0), TaskType::Chat);
        let state = processor.tick(t(100), None, None);

        // Neutral sample against default baseline: latency 0, smoothness 1, engagement 0
        assert!((state.deviation.delta_latency - (-2.0)).abs() < 1e-9);
        assert!((state.deviation.delta_smoothness - 2.0).abs() < 1e-9);
        assert!((state.deviation.delta_engagement - (-2.5)).abs() < 1e-9);
        assert!(state.deviation.is_significant);
        assert!(state.baseline_updated);
        assert_eq!(processor.baseline().sample_count, 1);
        assert!(processor.baseline().latency_mean < 1000.0);
    }

    #[test]
    fn test_events_ignored_without_session() {
        let mut processor = AffectProcessor::default();
        assert!(!processor.ingest(&click(0, 10.0)).unwrap());

        processor.start_session(t(0), TaskType::Chat);
        assert!(processor.ingest(&click(10, 10.0)).unwrap());
    }

    #[test]
    fn test_invalid_event_rejected() {
        let mut processor = AffectProcessor::default();
        processor.start_session(t(0), TaskType::Chat);
        let result = processor.ingest(&click(0, f64::NAN));
        assert!(matches!(result, Err(AffectError::InvalidEvent(_))));
    }

    #[test]
    fn test_ingest_json() {
        let mut processor = AffectProcessor::default();
        processor.start_session(t(0), TaskType::Chat);
        let json = r#"{"event_type":"key_down","timestamp":"2024-01-15T14:00:00.500Z"}"#;
        assert!(processor.ingest_json(json).unwrap());
        assert!(matches!(
            processor.ingest_json("{not json"),
            Err(AffectError::JsonError(_))
        ));
    }

    #[test]
    fn test_end_session_without_start() {
        let mut processor = AffectProcessor::default();
        assert!(matches!(
            processor.end_session(t(0)),
            Err(AffectError::SessionNotActive)
        ));
    }

    #[test]
    fn test_session_lifecycle_persists() {
        let store = ResilientStore::in_memory(RetentionCaps::default());
        let mut processor = AffectProcessor::with_store(AffectConfig::default(), store).unwrap();
        assert!(processor.is_persistent());

        let id = processor.start_session(t(0), TaskType::Navigation);
        assert_eq!(processor.session_id(), Some(id.as_str()));
        for i in 0..10 {
            processor.ingest(&click(i * 100, 100.0 + i as f64)).unwrap();
            processor.tick(t(i * 100 + 50), None, None);
        }

        let session = processor.end_session(t(1_000)).unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.behavioral_samples.len(), 10);
        assert_eq!(session.trajectory.len(), 10);
        assert!(session.final_baseline.is_some());
        assert!(!processor.is_session_active());
        assert!(processor.orchestrator().trajectory().is_empty());

        let store = processor.shutdown(t(2_000)).unwrap();
        assert_eq!(store.get_sessions().len(), 1);
        assert_eq!(store.get_trajectory_by_session(&id).len(), 10);
        assert_eq!(store.get_latest_baseline(), session.final_baseline);
    }

    #[test]
    fn test_starting_new_session_closes_previous() {
        let store = ResilientStore::in_memory(RetentionCaps::default());
        let mut processor = AffectProcessor::with_store(AffectConfig::default(), store).unwrap();
        let first = processor.start_session(t(0), TaskType::Chat);
        processor.tick(t(100), None, None);
        let second = processor.start_session(t(200), TaskType::Passive);
        assert_ne!(first, second);
        assert_eq!(processor.baseline().sample_count, 0);

        let store = processor.shutdown(t(300)).unwrap();
        assert_eq!(store.get_sessions().len(), 2);
    }

    #[test]
    fn test_context_block_after_tick() {
        let mut processor = AffectProcessor::default();
        assert!(processor.context_block().is_none());
        processor.start_session(t(0), TaskType::Chat);
        processor.tick(t(100), None, None);

        let block = processor.context_block().unwrap();
        assert!(block.starts_with(CONTEXT_HEADER));
        let state = processor.last_state().unwrap().clone();
        assert!(processor.encode_state(&state).unwrap().contains("context_block"));
    }

    #[test]
    fn test_baselines_json_round_trip() {
        let mut source = AffectProcessor::default();
        source.start_session(t(0), TaskType::Chat);
        for i in 1..=5 {
            source.tick(t(i * 100), None, None);
        }
        let json = source.save_baselines().unwrap();

        let mut restored = AffectProcessor::default();
        restored.load_baselines(&json).unwrap();
        assert_eq!(restored.baseline(), source.baseline());
        assert!(restored.load_baselines("[]").is_err());
    }

    #[test]
    fn test_shared_processor_across_threads() {
        let shared = AffectProcessor::default().into_shared();
        shared.lock().start_session(t(0), TaskType::Chat);

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    let mut processor = shared.lock();
                    processor.tick(t(100 * (n + 1)), None, None);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(shared.lock().orchestrator().tick_count(), 4);
    }
}
