//! In-memory session store
//!
//! Best-effort fallback when the durable store is unavailable. Contents are
//! lost with the process.

use super::{RetentionCaps, RetentionReport, SessionRepository};
use crate::baseline::BehavioralBaseline;
use crate::error::StoreError;
use crate::session::EmotionSession;
use crate::types::TrajectoryPoint;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Vec<EmotionSession>,
    baselines: Vec<BehavioralBaseline>,
    trajectory: Vec<(String, TrajectoryPoint)>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.baselines.is_empty() && self.trajectory.is_empty()
    }
}

/// Drop the oldest entries (by `key`) until `items` fits `cap`
fn evict_oldest<T, K: Ord>(items: &mut Vec<T>, cap: usize, key: impl Fn(&T) -> K) -> usize {
    if items.len() <= cap {
        return 0;
    }
    let excess = items.len() - cap;
    // Stable sort keeps insertion order among equal keys
    items.sort_by_key(key);
    items.drain(..excess);
    excess
}

impl SessionRepository for MemorySessionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn init(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn save_session(&mut self, session: &EmotionSession) -> Result<(), StoreError> {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => self.sessions.push(session.clone()),
        }
        Ok(())
    }

    fn get_sessions(&self) -> Result<Vec<EmotionSession>, StoreError> {
        let mut sessions = self.sessions.clone();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    fn get_sessions_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EmotionSession>, StoreError> {
        // Millisecond resolution, matching the SQLite index column
        let range = from.timestamp_millis()..=to.timestamp_millis();
        let mut sessions: Vec<EmotionSession> = self
            .sessions
            .iter()
            .filter(|s| range.contains(&s.start_time.timestamp_millis()))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }

    fn save_baseline(&mut self, baseline: &BehavioralBaseline) -> Result<(), StoreError> {
        self.baselines.push(baseline.clone());
        Ok(())
    }

    fn get_latest_baseline(&self) -> Result<Option<BehavioralBaseline>, StoreError> {
        // max_by_key keeps the last maximum, so later insertions win ties
        Ok(self.baselines.iter().max_by_key(|b| b.last_updated).cloned())
    }

    fn save_trajectory(&mut self, session_id: &str, point: &TrajectoryPoint) -> Result<(), StoreError> {
        self.trajectory.push((session_id.to_string(), point.clone()));
        Ok(())
    }

    fn get_trajectory_by_session(&self, session_id: &str) -> Result<Vec<TrajectoryPoint>, StoreError> {
        let mut points: Vec<TrajectoryPoint> = self
            .trajectory
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, point)| point.clone())
            .collect();
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    fn purge_all_data(&mut self) -> Result<(), StoreError> {
        self.sessions.clear();
        self.baselines.clear();
        self.trajectory.clear();
        Ok(())
    }

    fn enforce_retention(&mut self, caps: &RetentionCaps) -> Result<RetentionReport, StoreError> {
        Ok(RetentionReport {
            sessions: evict_oldest(&mut self.sessions, caps.sessions, |s| s.start_time),
            baselines: evict_oldest(&mut self.baselines, caps.baselines, |b| b.last_updated),
            trajectory_points: evict_oldest(&mut self.trajectory, caps.trajectory_points, |(_, p)| {
                p.timestamp
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{sample_baseline, sample_point, sample_session};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_and_purge() {
        let mut store = MemorySessionStore::new();
        let session = sample_session(2);
        store.save_session(&session).unwrap();

        let found = store
            .get_sessions_in_range(session.start_time, session.end_time)
            .unwrap();
        assert_eq!(found, vec![session.clone()]);

        store.purge_all_data().unwrap();
        assert!(store
            .get_sessions_in_range(session.start_time, session.end_time)
            .unwrap()
            .is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_range_bounds_compare_at_millisecond_resolution() {
        let mut store = MemorySessionStore::new();
        let mut session = sample_session(1);
        session.start_time += Duration::microseconds(500);
        store.save_session(&session).unwrap();

        let from = session.start_time + Duration::microseconds(300);
        let found = store.get_sessions_in_range(from, session.end_time).unwrap();
        assert_eq!(found, vec![session.clone()]);

        let to = session.start_time - Duration::microseconds(400);
        assert_eq!(store.get_sessions_in_range(to - Duration::minutes(1), to).unwrap().len(), 1);
    }

    #[test]
    fn test_latest_baseline_prefers_newest() {
        let mut store = MemorySessionStore::new();
        store.save_baseline(&sample_baseline(4)).unwrap();
        store.save_baseline(&sample_baseline(1)).unwrap();
        assert_eq!(store.get_latest_baseline().unwrap(), Some(sample_baseline(4)));
    }

    #[test]
    fn test_retention_matches_sqlite_semantics() {
        let mut store = MemorySessionStore::new();
        for i in (0..5).rev() {
            store.save_session(&sample_session(i)).unwrap();
            store.save_trajectory("s", &sample_point(i * 100)).unwrap();
        }
        let caps = RetentionCaps {
            sessions: 2,
            baselines: 10,
            trajectory_points: 3,
        };
        let report = store.enforce_retention(&caps).unwrap();
        assert_eq!(report.sessions, 3);
        assert_eq!(report.trajectory_points, 2);

        let starts: Vec<_> = store.get_sessions().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(starts, vec!["session-3".to_string(), "session-4".to_string()]);
        assert_eq!(
            store.get_trajectory_by_session("s").unwrap(),
            vec![sample_point(200), sample_point(300), sample_point(400)]
        );
    }
}
