//! SQLite session store
//!
//! Each collection is one table holding the JSON form of the record next to
//! the indexed columns used for ordering and lookup.

use super::{RetentionCaps, RetentionReport, SessionRepository};
use crate::baseline::BehavioralBaseline;
use crate::error::StoreError;
use crate::session::EmotionSession;
use crate::types::TrajectoryPoint;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params};
use std::path::Path;
use tracing::{debug, instrument};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY,
        start_time INTEGER NOT NULL,
        end_time INTEGER NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS sessions_start_idx ON sessions(start_time);
    CREATE INDEX IF NOT EXISTS sessions_end_idx ON sessions(end_time);
    CREATE TABLE IF NOT EXISTS baselines (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        last_updated INTEGER NOT NULL,
        session_start INTEGER NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS baselines_updated_idx ON baselines(last_updated);
    CREATE INDEX IF NOT EXISTS baselines_session_idx ON baselines(session_start);
    CREATE TABLE IF NOT EXISTS trajectory (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        data TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS trajectory_time_idx ON trajectory(timestamp);
    CREATE INDEX IF NOT EXISTS trajectory_session_idx ON trajectory(session_id);
";

/// Session store backed by a SQLite database
pub struct SqliteSessionStore {
    conn: Connection,
}

impl SqliteSessionStore {
    /// Open (or create) a database file and provision the schema
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let mut store = Self { conn };
        store.init()?;
        debug!("opened session store");
        Ok(store)
    }

    /// In-memory database, for tests and ephemeral hosts
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init()?;
        Ok(store)
    }

    /// Row counts of (sessions, baselines, trajectory points)
    pub fn counts(&self) -> Result<(usize, usize, usize), StoreError> {
        let count = |table: &str| -> Result<usize, StoreError> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok((count("sessions")?, count("baselines")?, count("trajectory")?))
    }

    fn query_blobs<P: Params>(&self, sql: &str, params: P) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
        let blobs = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(blobs)
    }

    fn decode_sessions(blobs: Vec<String>) -> Result<Vec<EmotionSession>, StoreError> {
        blobs
            .iter()
            .map(|data| serde_json::from_str(data).map_err(StoreError::from))
            .collect()
    }
}

impl SessionRepository for SqliteSessionStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn init(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn save_session(&mut self, session: &EmotionSession) -> Result<(), StoreError> {
        let data = serde_json::to_string(session)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO sessions (id, start_time, end_time, data) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id,
                session.start_time.timestamp_millis(),
                session.end_time.timestamp_millis(),
                data
            ],
        )?;
        Ok(())
    }

    fn get_sessions(&self) -> Result<Vec<EmotionSession>, StoreError> {
        let blobs = self.query_blobs("SELECT data FROM sessions ORDER BY start_time ASC", [])?;
        Self::decode_sessions(blobs)
    }

    fn get_sessions_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EmotionSession>, StoreError> {
        let blobs = self.query_blobs(
            "SELECT data FROM sessions WHERE start_time >= ?1 AND start_time <= ?2 ORDER BY start_time ASC",
            params![from.timestamp_millis(), to.timestamp_millis()],
        )?;
        Self::decode_sessions(blobs)
    }

    fn save_baseline(&mut self, baseline: &BehavioralBaseline) -> Result<(), StoreError> {
        let data = serde_json::to_string(baseline)?;
        self.conn.execute(
            "INSERT INTO baselines (last_updated, session_start, data) VALUES (?1, ?2, ?3)",
            params![
                baseline.last_updated.timestamp_millis(),
                baseline.session_start.timestamp_millis(),
                data
            ],
        )?;
        Ok(())
    }

    fn get_latest_baseline(&self) -> Result<Option<BehavioralBaseline>, StoreError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM baselines ORDER BY last_updated DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    fn save_trajectory(&mut self, session_id: &str, point: &TrajectoryPoint) -> Result<(), StoreError> {
        let data = serde_json::to_string(point)?;
        self.conn.execute(
            "INSERT INTO trajectory (session_id, timestamp, data) VALUES (?1, ?2, ?3)",
            params![session_id, point.timestamp.timestamp_millis(), data],
        )?;
        Ok(())
    }

    fn get_trajectory_by_session(&self, session_id: &str) -> Result<Vec<TrajectoryPoint>, StoreError> {
        let blobs = self.query_blobs(
            "SELECT data FROM trajectory WHERE session_id = ?1 ORDER BY timestamp ASC, id ASC",
            params![session_id],
        )?;
        blobs
            .iter()
            .map(|data| serde_json::from_str(data).map_err(StoreError::from))
            .collect()
    }

    fn purge_all_data(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "BEGIN;
            DELETE FROM sessions;
            DELETE FROM baselines;
            DELETE FROM trajectory;
            COMMIT;",
        )?;
        debug!("purged all stored data");
        Ok(())
    }

    fn enforce_retention(&mut self, caps: &RetentionCaps) -> Result<RetentionReport, StoreError> {
        let sessions = self.conn.execute(
            "DELETE FROM sessions WHERE id NOT IN (
                SELECT id FROM sessions ORDER BY start_time DESC, id DESC LIMIT ?1)",
            params![caps.sessions as i64],
        )?;
        let baselines = self.conn.execute(
            "DELETE FROM baselines WHERE id NOT IN (
                SELECT id FROM baselines ORDER BY last_updated DESC, id DESC LIMIT ?1)",
            params![caps.baselines as i64],
        )?;
        let trajectory_points = self.conn.execute(
            "DELETE FROM trajectory WHERE id NOT IN (
                SELECT id FROM trajectory ORDER BY timestamp DESC, id DESC LIMIT ?1)",
            params![caps.trajectory_points as i64],
        )?;

        let report = RetentionReport {
            sessions,
            baselines,
            trajectory_points,
        };
        if report.total() > 0 {
            debug!(
                sessions,
                baselines, trajectory_points, "evicted records past retention caps"
            );
        }
        Ok(report)
    }
}
