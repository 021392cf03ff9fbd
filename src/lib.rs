//! Synheart Affect - On-device affect inference from interaction telemetry
//!
//! Affect turns raw interaction events (pointer motion, clicks, keys, scrolls,
//! touches) into a continuous three-dimensional affect estimate (arousal,
//! valence, control) with an explicit uncertainty level, through a per-tick
//! pipeline: signal collection → baseline → deviation → reliability →
//! dimensional estimate → fusion with optional face/hand readings → context
//! weighting → context block encoding.
//!
//! ## Modules
//!
//! - **Signals**: raw input events and behavioral feature sampling
//! - **Pipeline**: baseline, deviation, reliability, estimation and fusion stages
//! - **Sessions**: session recording, wellness metrics and durable storage
//! - **Processor**: the stateful façade hosts drive, also exposed over FFI

pub mod baseline;
pub mod config;
pub mod context;
pub mod deviation;
pub mod dimensions;
pub mod encoder;
pub mod error;
pub mod external;
pub mod fusion;
pub mod history;
pub mod pipeline;
pub mod processor;
pub mod reliability;
pub mod session;
pub mod signals;
pub mod store;
pub mod types;
pub mod uncertainty;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use baseline::{BaselineEstimator, BehavioralBaseline};
pub use config::AffectConfig;
pub use context::{ContextWeighter, TaskType};
pub use encoder::ContextBlockEncoder;
pub use error::{AffectError, StoreError};
pub use external::{FaceEmotion, FaceEmotionResult, HandGestureResult, HandSign};
pub use pipeline::PipelineOrchestrator;
pub use processor::{AffectProcessor, SharedAffectProcessor};
pub use session::{EmotionSession, MentalHealthMetrics};
pub use signals::{InputEvent, InputEventAdapter, SignalCollector};
pub use store::{ResilientStore, SessionRepository};
pub use types::{PipelineState, ThreeDimensionalState, UncertaintyLevel};

/// Affect version embedded in encoded payloads
pub const AFFECT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for encoded payloads
pub const PRODUCER_NAME: &str = "synheart-affect";
