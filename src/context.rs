//! Interaction context weighting
//!
//! The same behavioral signal is more informative in some contexts than in
//! others: typing in a chat says more than passively scrolling, a fresh session
//! more than one that has been running for half an hour, and a user who keeps
//! succeeding at what they attempt is read with more confidence.
//!
//! The resulting factor scales confidence only; dimension values are never
//! changed.

use crate::history::BoundedHistory;
use crate::signals::motion::elapsed_ms;
use crate::types::ThreeDimensionalState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session length (ms) after which the time factor reaches its floor
pub const TIME_DECAY_HORIZON_MS: f64 = 30.0 * 60.0 * 1000.0;

/// Lowest value of the time-in-session factor
pub const TIME_FACTOR_FLOOR: f64 = 0.5;

/// Number of recent outcomes used for the success rate
pub const SUCCESS_WINDOW: usize = 10;

const TASK_WEIGHT: f64 = 0.4;
const TIME_WEIGHT: f64 = 0.3;
const SUCCESS_WEIGHT: f64 = 0.3;

/// What the user is doing while signals are collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Chat,
    Navigation,
    Passive,
}

impl TaskType {
    pub fn weight(&self) -> f64 {
        match self {
            TaskType::Chat => 1.0,
            TaskType::Navigation => 0.7,
            TaskType::Passive => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Chat => "chat",
            TaskType::Navigation => "navigation",
            TaskType::Passive => "passive",
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Ok(TaskType::Chat),
            "navigation" => Ok(TaskType::Navigation),
            "passive" => Ok(TaskType::Passive),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

/// Breakdown of one context factor computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWeights {
    pub task_weight: f64,
    pub time_factor: f64,
    pub success_factor: f64,
    /// `0.4 * task + 0.3 * time + 0.3 * success`
    pub factor: f64,
}

/// Tracks the interaction context of a session and derives confidence weights
#[derive(Debug, Clone)]
pub struct ContextWeighter {
    task_type: TaskType,
    session_start: DateTime<Utc>,
    outcomes: BoundedHistory<bool>,
}

impl ContextWeighter {
    pub fn new(task_type: TaskType, session_start: DateTime<Utc>) -> Self {
        Self {
            task_type,
            session_start,
            outcomes: BoundedHistory::new(SUCCESS_WINDOW),
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn set_task_type(&mut self, task_type: TaskType) {
        self.task_type = task_type;
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    /// Record whether the latest user action succeeded
    pub fn record_outcome(&mut self, success: bool) {
        self.outcomes.push(success);
    }

    /// Fraction of successful recent outcomes; 0.5 with no history
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.5;
        }
        let successes = self.outcomes.iter().filter(|ok| **ok).count();
        successes as f64 / self.outcomes.len() as f64
    }

    /// Start a new session: clock restarts, outcomes are forgotten
    pub fn reset(&mut self, session_start: DateTime<Utc>) {
        self.session_start = session_start;
        self.outcomes.clear();
    }

    /// Compute the context weights at `now`
    pub fn weights(&self, now: DateTime<Utc>) -> ContextWeights {
        let task_weight = self.task_type.weight();
        let time_factor = compute_time_factor(elapsed_ms(self.session_start, now));
        let success_factor = 0.5 + 0.5 * self.success_rate();

        ContextWeights {
            task_weight,
            time_factor,
            success_factor,
            factor: TASK_WEIGHT * task_weight
                + TIME_WEIGHT * time_factor
                + SUCCESS_WEIGHT * success_factor,
        }
    }
}

/// Linear decay from 1.0 at session start to the floor at the horizon
///
/// Formula: `max(0.5, 1 - 0.5 * elapsed / 30 min)`
fn compute_time_factor(elapsed_ms: f64) -> f64 {
    let elapsed = elapsed_ms.max(0.0);
    (1.0 - (1.0 - TIME_FACTOR_FLOOR) * elapsed / TIME_DECAY_HORIZON_MS).max(TIME_FACTOR_FLOOR)
}

/// Scale the confidence of `state` by `factor`
pub fn apply_context(state: &ThreeDimensionalState, factor: f64) -> ThreeDimensionalState {
    ThreeDimensionalState::new(
        state.arousal,
        state.valence,
        state.control,
        state.confidence * factor,
        state.uncertainty,
    )
}
