//! Fallback-routing store
//!
//! Writes go to the durable primary when there is one. When it fails, the
//! in-memory fallback takes the record; when that fails too, the failure is
//! logged and dropped. Reads consult the primary and fall back the same way.
//! Retention caps are enforced on whichever store took a write.

use super::{MemorySessionStore, RetentionCaps, SessionRepository, SqliteSessionStore};
use crate::baseline::BehavioralBaseline;
use crate::config::StorageConfig;
use crate::error::StoreError;
use crate::session::EmotionSession;
use crate::types::TrajectoryPoint;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

pub struct ResilientStore {
    primary: Option<Box<dyn SessionRepository>>,
    fallback: MemorySessionStore,
    caps: RetentionCaps,
}

impl ResilientStore {
    /// Open the configured database, or run memory-only when there is none or
    /// it cannot be opened
    pub fn open(config: &StorageConfig) -> Self {
        let caps = RetentionCaps::from(config);
        let primary: Option<Box<dyn SessionRepository>> = match &config.db_path {
            Some(path) => match SqliteSessionStore::open(path) {
                Ok(store) => Some(Box::new(store)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "session store unavailable, using memory");
                    None
                }
            },
            None => None,
        };
        Self::with_primary(primary, caps)
    }

    /// Memory-only store
    pub fn in_memory(caps: RetentionCaps) -> Self {
        Self::with_primary(None, caps)
    }

    pub fn with_primary(primary: Option<Box<dyn SessionRepository>>, caps: RetentionCaps) -> Self {
        Self {
            primary,
            fallback: MemorySessionStore::new(),
            caps,
        }
    }

    /// Name of the backend currently taking writes first
    pub fn backend(&self) -> &'static str {
        self.primary.as_ref().map_or("memory", |p| p.name())
    }

    pub fn is_durable(&self) -> bool {
        self.primary.is_some()
    }

    pub fn save_session(&mut self, session: &EmotionSession) {
        self.write("save_session", |store| store.save_session(session));
    }

    pub fn save_baseline(&mut self, baseline: &BehavioralBaseline) {
        self.write("save_baseline", |store| store.save_baseline(baseline));
    }

    pub fn save_trajectory(&mut self, session_id: &str, point: &TrajectoryPoint) {
        self.write("save_trajectory", |store| store.save_trajectory(session_id, point));
    }

    pub fn get_sessions(&self) -> Vec<EmotionSession> {
        self.read("get_sessions", |store| store.get_sessions())
    }

    pub fn get_sessions_in_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<EmotionSession> {
        self.read("get_sessions_in_range", |store| store.get_sessions_in_range(from, to))
    }

    pub fn get_latest_baseline(&self) -> Option<BehavioralBaseline> {
        self.read("get_latest_baseline", |store| store.get_latest_baseline())
    }

    pub fn get_trajectory_by_session(&self, session_id: &str) -> Vec<TrajectoryPoint> {
        self.read("get_trajectory_by_session", |store| {
            store.get_trajectory_by_session(session_id)
        })
    }

    /// Clear both stores.
    ///
    /// Unlike the other operations this reports a primary failure, since it
    /// is triggered explicitly by the user.
    pub fn purge_all_data(&mut self) -> Result<(), StoreError> {
        let _ = self.fallback.purge_all_data();
        match self.primary.as_mut() {
            Some(primary) => primary.purge_all_data(),
            None => Ok(()),
        }
    }

    fn write<F>(&mut self, operation: &'static str, mut op: F)
    where
        F: FnMut(&mut dyn SessionRepository) -> Result<(), StoreError>,
    {
        if let Some(primary) = self.primary.as_mut() {
            match op(primary.as_mut()) {
                Ok(()) => {
                    cleanup(primary.as_mut(), &self.caps);
                    return;
                }
                Err(e) => {
                    warn!(operation, backend = primary.name(), error = %e, "durable write failed, falling back to memory");
                }
            }
        }
        match op(&mut self.fallback) {
            Ok(()) => cleanup(&mut self.fallback, &self.caps),
            Err(e) => warn!(operation, error = %e, "fallback write failed, record dropped"),
        }
    }

    fn read<T, F>(&self, operation: &'static str, op: F) -> T
    where
        T: Default,
        F: Fn(&dyn SessionRepository) -> Result<T, StoreError>,
    {
        if let Some(primary) = self.primary.as_ref() {
            match op(primary.as_ref()) {
                Ok(value) => return value,
                Err(e) => {
                    warn!(operation, backend = primary.name(), error = %e, "durable read failed, reading memory");
                }
            }
        }
        op(&self.fallback).unwrap_or_else(|e| {
            warn!(operation, error = %e, "fallback read failed");
            T::default()
        })
    }
}

/// Best-effort retention pass after a write
fn cleanup(store: &mut dyn SessionRepository, caps: &RetentionCaps) {
    match store.enforce_retention(caps) {
        Ok(report) if report.total() > 0 => {
            debug!(backend = store.name(), evicted = report.total(), "retention pass")
        }
        Ok(_) => {}
        Err(e) => warn!(backend = store.name(), error = %e, "retention pass failed"),
    }
}
