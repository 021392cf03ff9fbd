//! Session recording and wellness metrics
//!
//! A session collects compact per-tick samples while it runs and is finalized
//! into an `EmotionSession` carrying aggregate `MentalHealthMetrics`. The
//! metrics are heuristic, non-diagnostic indicators.

use crate::baseline::BehavioralBaseline;
use crate::external::{FaceEmotion, FaceEmotionResult};
use crate::history::BoundedHistory;
use crate::types::{BehavioralSignals, PipelineState, TrajectoryPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Engagement run (ms) counted as full engagement
const FULL_ENGAGEMENT_MS: f64 = 30_000.0;

/// Upper bound on per-session sample lists
pub const MAX_SESSION_SAMPLES: usize = 10_000;

/// Face classification observed during a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSample {
    pub emotion: FaceEmotion,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Compact per-tick behavioral summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralSample {
    pub arousal: f64,
    pub valence: f64,
    pub control: f64,
    pub confidence: f64,
    pub motion_smoothness: f64,
    pub interaction_latency: f64,
    pub engagement_duration: f64,
    pub abandoned: bool,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate wellness indicators for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentalHealthMetrics {
    /// Mean valence rescaled to [0, 1]
    pub emotional_balance: f64,
    /// 1 for a flat valence trace, falling with its spread
    pub mood_stability: f64,
    /// Mean of arousal under low control
    pub stress_indicator: f64,
    /// Mean engagement, saturating at 30 s runs
    pub engagement_level: f64,
    pub timestamp: DateTime<Utc>,
}

impl MentalHealthMetrics {
    /// Compute metrics from a session's behavioral samples
    pub fn from_samples(samples: &[BehavioralSample], timestamp: DateTime<Utc>) -> Self {
        if samples.is_empty() {
            return Self {
                emotional_balance: 0.5,
                mood_stability: 1.0,
                stress_indicator: 0.0,
                engagement_level: 0.0,
                timestamp,
            };
        }
        let n = samples.len() as f64;

        let valence_mean = samples.iter().map(|s| s.valence).sum::<f64>() / n;
        let valence_std = (samples
            .iter()
            .map(|s| (s.valence - valence_mean).powi(2))
            .sum::<f64>()
            / n)
            .sqrt();

        let stress = samples
            .iter()
            .map(|s| s.arousal * (1.0 - s.control))
            .sum::<f64>()
            / n;
        let engagement = samples
            .iter()
            .map(|s| (s.engagement_duration / FULL_ENGAGEMENT_MS).clamp(0.0, 1.0))
            .sum::<f64>()
            / n;

        Self {
            emotional_balance: ((valence_mean + 1.0) / 2.0).clamp(0.0, 1.0),
            mood_stability: (1.0 - 2.0 * valence_std).clamp(0.0, 1.0),
            stress_indicator: stress.clamp(0.0, 1.0),
            engagement_level: engagement,
            timestamp,
        }
    }
}

/// One finalized user session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub emotion_samples: Vec<EmotionSample>,
    pub behavioral_samples: Vec<BehavioralSample>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub final_baseline: Option<BehavioralBaseline>,
    pub metrics: MentalHealthMetrics,
}

impl EmotionSession {
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

/// Accumulates samples for the active session
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    id: String,
    start_time: DateTime<Utc>,
    emotion_samples: BoundedHistory<EmotionSample>,
    behavioral_samples: BoundedHistory<BehavioralSample>,
    trajectory: BoundedHistory<TrajectoryPoint>,
}

impl SessionRecorder {
    /// Open a session with a fresh id
    pub fn start(start_time: DateTime<Utc>, max_trajectory_points: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_time,
            emotion_samples: BoundedHistory::new(MAX_SESSION_SAMPLES),
            behavioral_samples: BoundedHistory::new(MAX_SESSION_SAMPLES),
            trajectory: BoundedHistory::new(max_trajectory_points),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Record one tick
    pub fn record(
        &mut self,
        signals: &BehavioralSignals,
        state: &PipelineState,
        face: Option<&FaceEmotionResult>,
    ) {
        if let Some(face) = face.filter(|f| state.fused.has_face && f.confidence.is_finite()) {
            self.emotion_samples.push(EmotionSample {
                emotion: face.label,
                confidence: face.confidence,
                timestamp: face.timestamp,
            });
        }

        self.behavioral_samples.push(BehavioralSample {
            arousal: state.dimensions.arousal,
            valence: state.dimensions.valence,
            control: state.dimensions.control,
            confidence: state.dimensions.confidence,
            motion_smoothness: signals.motion_smoothness,
            interaction_latency: signals.interaction_latency,
            engagement_duration: signals.engagement_duration,
            abandoned: signals.is_abandoned(),
            timestamp: state.timestamp,
        });
        self.trajectory.push(state.trajectory_point.clone());
    }

    pub fn sample_count(&self) -> usize {
        self.behavioral_samples.len()
    }

    /// Close the session and compute its metrics
    pub fn finalize(
        self,
        end_time: DateTime<Utc>,
        final_baseline: Option<BehavioralBaseline>,
    ) -> EmotionSession {
        let behavioral_samples: Vec<BehavioralSample> =
            self.behavioral_samples.iter().cloned().collect();
        let metrics = MentalHealthMetrics::from_samples(&behavioral_samples, end_time);

        EmotionSession {
            id: self.id,
            start_time: self.start_time,
            end_time,
            emotion_samples: self.emotion_samples.iter().cloned().collect(),
            behavioral_samples,
            trajectory: self.trajectory.iter().cloned().collect(),
            final_baseline,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn sample(arousal: f64, valence: f64, control: f64, engagement: f64) -> BehavioralSample {
        BehavioralSample {
            arousal,
            valence,
            control,
            confidence: 0.5,
            motion_smoothness: 1.0,
            interaction_latency: 0.0,
            engagement_duration: engagement,
            abandoned: false,
            timestamp: t(0),
        }
    }

    #[test]
    fn test_empty_session_metrics() {
        let metrics = MentalHealthMetrics::from_samples(&[], t(0));
        assert_eq!(metrics.emotional_balance, 0.5);
        assert_eq!(metrics.mood_stability, 1.0);
        assert_eq!(metrics.stress_indicator, 0.0);
        assert_eq!(metrics.engagement_level, 0.0);
    }

    #[test]
    fn test_metrics_formulas() {
        let samples = vec![
            sample(0.8, 0.5, 0.25, 15_000.0),
            sample(0.4, -0.1, 0.75, 60_000.0),
        ];
        let metrics = MentalHealthMetrics::from_samples(&samples, t(0));

        // mean valence 0.2
        assert!((metrics.emotional_balance - 0.6).abs() < 1e-12);
        // stdev(valence) = 0.3
        assert!((metrics.mood_stability - 0.4).abs() < 1e-9);
        // (0.8 * 0.75 + 0.4 * 0.25) / 2
        assert!((metrics.stress_indicator - 0.35).abs() < 1e-12);
        // (0.5 + 1.0) / 2
        assert!((metrics.engagement_level - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_volatile_mood_floors_at_zero() {
        let samples = vec![sample(0.5, -1.0, 0.5, 0.0), sample(0.5, 1.0, 0.5, 0.0)];
        let metrics = MentalHealthMetrics::from_samples(&samples, t(0));
        assert_eq!(metrics.mood_stability, 0.0);
        assert!((metrics.emotional_balance - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_recorder_assigns_unique_ids() {
        let a = SessionRecorder::start(t(0), 1000);
        let b = SessionRecorder::start(t(0), 1000);
        assert_ne!(a.id(), b.id());
        assert!(Uuid::parse_str(a.id()).is_ok());
    }

    #[test]
    fn test_finalize_empty_recorder() {
        let recorder = SessionRecorder::start(t(0), 1000);
        let id = recorder.id().to_string();
        let session = recorder.finalize(t(60_000), None);

        assert_eq!(session.id, id);
        assert_eq!(session.duration_ms(), 60_000);
        assert!(session.behavioral_samples.is_empty());
        assert_eq!(session.metrics.emotional_balance, 0.5);
        assert_eq!(session.metrics.timestamp, t(60_000));
    }
}
