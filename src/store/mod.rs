//! Durable session storage
//!
//! Sessions, baseline snapshots and trajectory points are kept in three
//! retention-capped collections. `SqliteSessionStore` is the durable backend,
//! `MemorySessionStore` the best-effort fallback, and `ResilientStore` routes
//! between them so that storage failures never reach the pipeline.

pub mod memory;
pub mod resilient;
pub mod sqlite;
pub mod worker;

pub use memory::MemorySessionStore;
pub use resilient::ResilientStore;
pub use sqlite::SqliteSessionStore;
pub use worker::{PersistCommand, PersistenceWorker};

use crate::baseline::BehavioralBaseline;
use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::session::EmotionSession;
use crate::types::TrajectoryPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Retention limits, oldest entries evicted first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionCaps {
    pub sessions: usize,
    pub baselines: usize,
    pub trajectory_points: usize,
}

impl Default for RetentionCaps {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for RetentionCaps {
    fn from(config: &StorageConfig) -> Self {
        Self {
            sessions: config.max_sessions,
            baselines: config.max_baselines,
            trajectory_points: config.max_trajectory_points,
        }
    }
}

/// Number of records evicted by one retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub sessions: usize,
    pub baselines: usize,
    pub trajectory_points: usize,
}

impl RetentionReport {
    pub fn total(&self) -> usize {
        self.sessions + self.baselines + self.trajectory_points
    }
}

/// Storage backend for sessions, baselines and trajectories
pub trait SessionRepository: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Provision the collections. Safe to call more than once.
    fn init(&mut self) -> Result<(), StoreError>;

    /// Insert or replace a session by id
    fn save_session(&mut self, session: &EmotionSession) -> Result<(), StoreError>;

    /// Every stored session, oldest start first
    fn get_sessions(&self) -> Result<Vec<EmotionSession>, StoreError>;

    /// Sessions that started within `[from, to]`, oldest start first
    fn get_sessions_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EmotionSession>, StoreError>;

    fn save_baseline(&mut self, baseline: &BehavioralBaseline) -> Result<(), StoreError>;

    /// The most recently updated baseline snapshot
    fn get_latest_baseline(&self) -> Result<Option<BehavioralBaseline>, StoreError>;

    fn save_trajectory(&mut self, session_id: &str, point: &TrajectoryPoint) -> Result<(), StoreError>;

    /// Trajectory of one session in timestamp order
    fn get_trajectory_by_session(&self, session_id: &str) -> Result<Vec<TrajectoryPoint>, StoreError>;

    /// Remove everything from all three collections
    fn purge_all_data(&mut self) -> Result<(), StoreError>;

    /// Evict the oldest entries of each collection beyond its cap
    fn enforce_retention(&mut self, caps: &RetentionCaps) -> Result<RetentionReport, StoreError>;
}
