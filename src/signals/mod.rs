//! Raw-signal capture
//!
//! Pipeline entry: Input events → SignalCollector (motion analysis + interaction
//! timing) → one `BehavioralSignals` sample per tick.

pub mod collector;
pub mod events;
pub mod motion;

pub use collector::SignalCollector;
pub use events::{EventValidationError, InputEvent, InputEventAdapter};
pub use motion::{MotionFeatures, TrajectorySample};
