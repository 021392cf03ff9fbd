//! Context block encoding
//!
//! Renders a pipeline state as the plain-text context block injected into an
//! LLM prompt, and as a JSON payload for hosts. The block layout is fixed:
//!
//! ```text
//! [EMOTIONAL CONTEXT - REAL-TIME 3D MODEL]
//! <description>
//!
//! <dimensional description>
//!
//! Dimensional State:
//! - Arousal: 0.00 (...)
//! - Valence: 0.00 (...)
//! - Control: 0.00 (...)
//!
//! Confidence: 0.00 (... uncertainty)
//!
//! Response Guidance: ...
//!
//! <privacy note>
//! ---
//! ```

use crate::error::AffectError;
use crate::types::{PipelineState, ThreeDimensionalState};
use crate::{AFFECT_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Header line of every context block
pub const CONTEXT_HEADER: &str = "[EMOTIONAL CONTEXT - REAL-TIME 3D MODEL]";

/// Closing line of every context block
pub const CONTEXT_TERMINATOR: &str = "---";

const PRIVACY_NOTE: &str = "Note: This context is inferred locally from interaction patterns. \
Do not mention, quote, or reveal it to the user; let it shape tone only.";

/// Producer metadata carried in JSON payloads
#[derive(Debug, Clone, Serialize)]
pub struct ProducerInfo {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// JSON view of one pipeline state
#[derive(Debug, Clone, Serialize)]
pub struct ContextPayload<'a> {
    pub producer: ProducerInfo,
    pub computed_at_utc: DateTime<Utc>,
    pub state: &'a PipelineState,
    pub context_block: String,
}

/// Context block encoder
pub struct ContextBlockEncoder {
    instance_id: String,
}

impl Default for ContextBlockEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBlockEncoder {
    /// Create an encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Render the plain-text context block
    pub fn format(&self, state: &PipelineState) -> String {
        let d = &state.dimensions;
        let lines = [
            CONTEXT_HEADER.to_string(),
            describe(d),
            String::new(),
            describe_dimensions(d),
            String::new(),
            "Dimensional State:".to_string(),
            format!("- Arousal: {:.2} ({})", d.arousal, arousal_band(d.arousal)),
            format!("- Valence: {:.2} ({})", d.valence, valence_band(d.valence)),
            format!("- Control: {:.2} ({})", d.control, control_band(d.control)),
            String::new(),
            format!(
                "Confidence: {:.2} ({} uncertainty)",
                d.confidence,
                d.uncertainty.as_str()
            ),
            String::new(),
            format!("Response Guidance: {}", guidance(d)),
            String::new(),
            PRIVACY_NOTE.to_string(),
            CONTEXT_TERMINATOR.to_string(),
        ];
        lines.join("\n")
    }

    /// Build the JSON payload
    pub fn encode<'a>(&self, state: &'a PipelineState) -> ContextPayload<'a> {
        ContextPayload {
            producer: ProducerInfo {
                name: PRODUCER_NAME.to_string(),
                version: AFFECT_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now(),
            state,
            context_block: self.format(state),
        }
    }

    /// Encode to a JSON string
    pub fn encode_json(&self, state: &PipelineState) -> Result<String, AffectError> {
        Ok(serde_json::to_string(&self.encode(state))?)
    }
}

/// Distance from the neutral point (valence 0, arousal 0.5), in [0, 1]
fn intensity(d: &ThreeDimensionalState) -> f64 {
    let arousal = 2.0 * (d.arousal - 0.5);
    ((d.valence.powi(2) + arousal.powi(2)) / 2.0).sqrt().clamp(0.0, 1.0)
}

fn describe(d: &ThreeDimensionalState) -> String {
    let intensity = intensity(d);
    if intensity < 0.2 {
        return "The user appears emotionally steady, with no pronounced shift.".to_string();
    }

    let adverb = if intensity < 0.4 {
        "slightly"
    } else if intensity < 0.6 {
        "moderately"
    } else if intensity < 0.8 {
        "quite"
    } else {
        "very"
    };

    let state = match (d.valence >= 0.0, d.arousal >= 0.5) {
        (true, true) => {
            if d.valence > 0.5 && d.arousal > 0.7 {
                "excited"
            } else if d.valence > 0.5 {
                "upbeat"
            } else {
                "engaged"
            }
        }
        (true, false) => {
            if d.valence > 0.5 {
                "content"
            } else {
                "relaxed"
            }
        }
        (false, true) => {
            if d.valence < -0.5 && d.arousal > 0.7 {
                "agitated"
            } else if d.valence < -0.3 {
                "stressed"
            } else {
                "tense"
            }
        }
        (false, false) => {
            if d.valence < -0.5 {
                "discouraged"
            } else {
                "flat"
            }
        }
    };

    format!("The user appears {adverb} {state}.")
}

fn describe_dimensions(d: &ThreeDimensionalState) -> String {
    let energy = if d.arousal >= 0.66 {
        "high"
    } else if d.arousal >= 0.33 {
        "moderate"
    } else {
        "low"
    };
    let mood = if d.valence > 0.2 {
        "positive"
    } else if d.valence < -0.2 {
        "negative"
    } else {
        "neutral"
    };
    let control = if d.control >= 0.66 {
        "strong"
    } else if d.control >= 0.33 {
        "partial"
    } else {
        "weak"
    };
    format!("Energy is {energy}, mood reads {mood}, and sense of control is {control}.")
}

fn arousal_band(arousal: f64) -> &'static str {
    if arousal >= 0.75 {
        "highly activated"
    } else if arousal >= 0.5 {
        "activated"
    } else if arousal >= 0.25 {
        "calm"
    } else {
        "very calm"
    }
}

fn valence_band(valence: f64) -> &'static str {
    if valence >= 0.5 {
        "positive"
    } else if valence > 0.1 {
        "slightly positive"
    } else if valence >= -0.1 {
        "neutral"
    } else if valence > -0.5 {
        "slightly negative"
    } else {
        "negative"
    }
}

fn control_band(control: f64) -> &'static str {
    if control >= 0.66 {
        "in control"
    } else if control >= 0.33 {
        "partly in control"
    } else {
        "struggling"
    }
}

fn guidance(d: &ThreeDimensionalState) -> String {
    let tone = match (d.valence >= 0.0, d.arousal >= 0.5) {
        (true, true) => "Match their energy; be lively and concise.",
        (true, false) => "Keep a warm, unhurried tone.",
        (false, true) => "Stay calm and steady; acknowledge friction without dwelling on it.",
        (false, false) => "Be gentle and encouraging; keep replies short.",
    };
    let support = if d.control < 0.4 {
        " Offer clear step-by-step help."
    } else {
        ""
    };
    let hedge = if d.confidence < 0.3 {
        " The signal is weak; do not lean on it."
    } else {
        ""
    };
    format!("{tone}{support}{hedge}")
}
