//! Signal collection
//!
//! Consumes raw input events and produces one `BehavioralSignals` sample per
//! tick. Motion features are recomputed on every pointer sample; interaction
//! timing (latency, hesitation, engagement, abandonment) is tracked from
//! discrete events and throttled pointer moves.

use crate::config::CollectorConfig;
use crate::history::BoundedHistory;
use crate::signals::events::InputEvent;
use crate::signals::motion::{analyze_window, elapsed_ms, MotionFeatures, TrajectorySample};
use crate::types::BehavioralSignals;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Listens to input events and samples behavioral features
#[derive(Debug, Clone)]
pub struct SignalCollector {
    config: CollectorConfig,
    active: bool,
    trajectory: BoundedHistory<TrajectorySample>,
    motion: MotionFeatures,

    last_discrete: Option<DateTime<Utc>>,
    interaction_latency: f64,
    last_motion: Option<DateTime<Utc>>,
    hesitation: f64,

    last_activity: Option<DateTime<Utc>>,
    last_counted_move: Option<DateTime<Utc>>,
    engagement_start: Option<DateTime<Utc>>,

    last_sample_at: Option<DateTime<Utc>>,
    events_since_sample: u32,
}

impl Default for SignalCollector {
    fn default() -> Self {
        Self::new(CollectorConfig::default())
    }
}

impl SignalCollector {
    /// Create an active collector
    pub fn new(config: CollectorConfig) -> Self {
        let capacity = config.trajectory_capacity;
        Self {
            config,
            active: true,
            trajectory: BoundedHistory::new(capacity),
            motion: MotionFeatures::default(),
            last_discrete: None,
            interaction_latency: 0.0,
            last_motion: None,
            hesitation: 0.0,
            last_activity: None,
            last_counted_move: None,
            engagement_start: None,
            last_sample_at: None,
            events_since_sample: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Resume listening after `stop`
    pub fn start(&mut self) {
        self.active = true;
    }

    /// Stop listening: drop all buffered state and ignore further events
    pub fn stop(&mut self) {
        self.clear();
        self.active = false;
        debug!("signal collection stopped");
    }

    /// Feed one event. Returns `false` when the collector is stopped.
    pub fn handle_event(&mut self, event: &InputEvent) -> bool {
        if !self.active {
            return false;
        }
        let ts = event.timestamp();
        self.events_since_sample += 1;

        if event.is_motion() {
            if let Some((x, y)) = event.position() {
                self.trajectory.push(TrajectorySample { x, y, timestamp: ts });
                let points: Vec<TrajectorySample> = self.trajectory.iter().copied().collect();
                self.motion = analyze_window(&points, &self.config);
            }
            self.last_motion = Some(ts);

            let throttled = self
                .last_counted_move
                .is_some_and(|last| elapsed_ms(last, ts) < self.config.move_throttle_ms);
            if !throttled {
                self.last_counted_move = Some(ts);
                self.register_activity(ts);
            }
        } else {
            if let Some(prev) = self.last_discrete {
                self.interaction_latency = elapsed_ms(prev, ts).max(0.0);
            }
            self.last_discrete = Some(ts);

            if let Some(motion_at) = self.last_motion.take() {
                self.hesitation = elapsed_ms(motion_at, ts).max(0.0);
            }
            self.register_activity(ts);
        }
        true
    }

    fn register_activity(&mut self, ts: DateTime<Utc>) {
        let lapsed = self
            .last_activity
            .is_some_and(|last| elapsed_ms(last, ts) >= self.config.engagement_gap_ms);
        if lapsed || self.engagement_start.is_none() {
            self.engagement_start = Some(ts);
        }
        self.last_activity = Some(ts);
    }

    /// Take a behavioral sample at `now`.
    ///
    /// `deviation_from_baseline` is left at 0; the processor fills it in after
    /// deviation monitoring.
    pub fn sample(&mut self, now: DateTime<Utc>) -> BehavioralSignals {
        let (engagement_duration, abandonment_timing) = match self.last_activity {
            Some(last) if elapsed_ms(last, now) >= self.config.engagement_gap_ms => (0.0, Some(last)),
            Some(_) => {
                let run_start = self.engagement_start.unwrap_or(now);
                (elapsed_ms(run_start, now).max(0.0), None)
            }
            None => (0.0, None),
        };

        let delta_time = self
            .last_sample_at
            .map(|prev| elapsed_ms(prev, now).max(0.0))
            .unwrap_or(0.0);
        self.last_sample_at = Some(now);
        self.events_since_sample = 0;

        BehavioralSignals {
            interaction_latency: self.interaction_latency,
            hesitation_duration: self.hesitation,
            motion_smoothness: self.motion.smoothness,
            jitter_magnitude: self.motion.jitter,
            correction_count: self.motion.corrections,
            path_efficiency: self.motion.path_efficiency,
            motion_speed: self.motion.speed,
            engagement_duration,
            abandonment_timing,
            timestamp: now,
            delta_time,
            deviation_from_baseline: 0.0,
        }
    }

    /// Events received since the previous sample
    pub fn events_since_sample(&self) -> u32 {
        self.events_since_sample
    }

    pub fn trajectory_len(&self) -> usize {
        self.trajectory.len()
    }

    fn clear(&mut self) {
        self.trajectory.clear();
        self.motion = MotionFeatures::default();
        self.last_discrete = None;
        self.interaction_latency = 0.0;
        self.last_motion = None;
        self.hesitation = 0.0;
        self.last_activity = None;
        self.last_counted_move = None;
        self.engagement_start = None;
        self.last_sample_at = None;
        self.events_since_sample = 0;
    }
}
