//! Background persistence
//!
//! Ticks hand their writes to a dedicated thread that owns the store, so the
//! pipeline never waits on storage. Writes are fire-and-forget; a failed
//! write only shows up as a warning from the store.

use super::ResilientStore;
use crate::baseline::BehavioralBaseline;
use crate::session::EmotionSession;
use crate::types::TrajectoryPoint;
use std::sync::mpsc::{channel, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// One queued storage write
#[derive(Debug, Clone)]
pub enum PersistCommand {
    Session(Box<EmotionSession>),
    Baseline(BehavioralBaseline),
    Trajectory {
        session_id: String,
        point: TrajectoryPoint,
    },
    Purge,
}

/// Writer thread owning a `ResilientStore`
pub struct PersistenceWorker {
    sender: Option<Sender<PersistCommand>>,
    handle: Option<JoinHandle<ResilientStore>>,
}

impl PersistenceWorker {
    /// Move `store` onto a new writer thread
    pub fn spawn(store: ResilientStore) -> std::io::Result<Self> {
        let (sender, receiver) = channel::<PersistCommand>();
        let handle = thread::Builder::new()
            .name("affect-persist".into())
            .spawn(move || {
                let mut store = store;
                for command in receiver {
                    apply(&mut store, command);
                }
                debug!("persistence worker drained");
                store
            })?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a write without waiting. Returns false once the worker is gone.
    pub fn enqueue(&self, command: PersistCommand) -> bool {
        match &self.sender {
            Some(sender) => match sender.send(command) {
                Ok(()) => true,
                Err(_) => {
                    warn!("persistence worker stopped, write dropped");
                    false
                }
            },
            None => false,
        }
    }

    /// Close the queue, let pending writes finish and hand the store back
    pub fn shutdown(mut self) -> Option<ResilientStore> {
        self.stop()
    }

    fn stop(&mut self) -> Option<ResilientStore> {
        self.sender.take();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(store) => Some(store),
            Err(_) => {
                warn!("persistence worker panicked");
                None
            }
        }
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply(store: &mut ResilientStore, command: PersistCommand) {
    match command {
        PersistCommand::Session(session) => store.save_session(&session),
        PersistCommand::Baseline(baseline) => store.save_baseline(&baseline),
        PersistCommand::Trajectory { session_id, point } => store.save_trajectory(&session_id, &point),
        PersistCommand::Purge => {
            if let Err(e) = store.purge_all_data() {
                warn!(error = %e, "purge failed");
            }
        }
    }
}
