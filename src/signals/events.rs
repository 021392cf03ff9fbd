//! Raw input events
//!
//! DOM-style interaction events (pointer, touch, keyboard, scroll, click) as
//! delivered by the host. Only positions and timing are carried; key identity
//! is optional and never used for inference.

use crate::error::AffectError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw interaction event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum InputEvent {
    Click {
        timestamp: DateTime<Utc>,
        x: f64,
        y: f64,
    },
    KeyDown {
        timestamp: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    Scroll {
        timestamp: DateTime<Utc>,
        #[serde(default)]
        delta_y: f64,
    },
    TouchStart {
        timestamp: DateTime<Utc>,
        x: f64,
        y: f64,
    },
    MouseMove {
        timestamp: DateTime<Utc>,
        x: f64,
        y: f64,
    },
    TouchMove {
        timestamp: DateTime<Utc>,
        x: f64,
        y: f64,
    },
}

impl InputEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            InputEvent::Click { timestamp, .. }
            | InputEvent::KeyDown { timestamp, .. }
            | InputEvent::Scroll { timestamp, .. }
            | InputEvent::TouchStart { timestamp, .. }
            | InputEvent::MouseMove { timestamp, .. }
            | InputEvent::TouchMove { timestamp, .. } => *timestamp,
        }
    }

    /// Pointer position, when the event carries one
    pub fn position(&self) -> Option<(f64, f64)> {
        match self {
            InputEvent::Click { x, y, .. }
            | InputEvent::TouchStart { x, y, .. }
            | InputEvent::MouseMove { x, y, .. }
            | InputEvent::TouchMove { x, y, .. } => Some((*x, *y)),
            InputEvent::KeyDown { .. } | InputEvent::Scroll { .. } => None,
        }
    }

    /// Pointer or touch movement (feeds the trajectory buffer)
    pub fn is_motion(&self) -> bool {
        matches!(self, InputEvent::MouseMove { .. } | InputEvent::TouchMove { .. })
    }

    /// Click, key, scroll or touch start
    pub fn is_discrete(&self) -> bool {
        !self.is_motion()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            InputEvent::Click { .. } => "click",
            InputEvent::KeyDown { .. } => "key_down",
            InputEvent::Scroll { .. } => "scroll",
            InputEvent::TouchStart { .. } => "touch_start",
            InputEvent::MouseMove { .. } => "mouse_move",
            InputEvent::TouchMove { .. } => "touch_move",
        }
    }

    /// Reject events whose coordinates are not finite
    pub fn validate(&self) -> Result<(), EventValidationError> {
        if let Some((x, y)) = self.position() {
            if !x.is_finite() || !y.is_finite() {
                return Err(EventValidationError::NonFinitePosition {
                    event_type: self.type_name().to_string(),
                });
            }
        }
        if let InputEvent::Scroll { delta_y, .. } = self {
            if !delta_y.is_finite() {
                return Err(EventValidationError::NonFiniteScroll);
            }
        }
        Ok(())
    }
}

/// Validation errors for input events
#[derive(Debug, Error, PartialEq)]
pub enum EventValidationError {
    #[error("Non-finite position on {event_type} event")]
    NonFinitePosition { event_type: String },

    #[error("Non-finite scroll delta")]
    NonFiniteScroll,
}

/// Parser for event streams
pub struct InputEventAdapter;

impl InputEventAdapter {
    /// Parse newline-delimited JSON, one event per line
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<InputEvent>, AffectError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<InputEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(AffectError::InvalidEvent(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Parse a JSON array of events
    pub fn parse_array(json: &str) -> Result<Vec<InputEvent>, AffectError> {
        serde_json::from_str(json).map_err(|e| AffectError::InvalidEvent(e.to_string()))
    }

    /// Indices and errors of every invalid event
    pub fn validate_events(events: &[InputEvent]) -> Vec<(usize, EventValidationError)> {
        events
            .iter()
            .enumerate()
            .filter_map(|(idx, event)| event.validate().err().map(|e| (idx, e)))
            .collect()
    }
}
