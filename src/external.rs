//! External classifier results
//!
//! Face-emotion and hand-gesture classifiers run outside this crate. Their
//! outputs arrive as JSON and are treated as optional, best-effort inputs to
//! fusion: anything malformed is simply absent.

use crate::error::AffectError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of landmarks a hand tracker reports
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Face emotion labels understood by fusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceEmotion {
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl FaceEmotion {
    /// Fold a raw classifier label into the four supported emotions.
    ///
    /// Negative labels read as sad, fear reads as surprise (high arousal),
    /// anything unknown is neutral.
    pub fn from_classifier_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "happy" => FaceEmotion::Happy,
            "sad" | "angry" | "disgust" => FaceEmotion::Sad,
            "surprise" | "fear" => FaceEmotion::Surprise,
            _ => FaceEmotion::Neutral,
        }
    }

    /// Fixed (valence, arousal) coordinates
    pub fn valence_arousal(&self) -> (f64, f64) {
        match self {
            FaceEmotion::Happy => (0.8, 0.6),
            FaceEmotion::Sad => (-0.7, 0.2),
            FaceEmotion::Surprise => (0.1, 0.9),
            FaceEmotion::Neutral => (0.0, 0.3),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaceEmotion::Happy => "happy",
            FaceEmotion::Sad => "sad",
            FaceEmotion::Surprise => "surprise",
            FaceEmotion::Neutral => "neutral",
        }
    }
}

/// Output of the face-emotion classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEmotionResult {
    /// Dominant label
    #[serde(alias = "emotion")]
    pub label: FaceEmotion,
    pub confidence: f64,
    /// Full score vector, normalized to sum to 1
    #[serde(default)]
    pub scores: BTreeMap<FaceEmotion, f64>,
    pub timestamp: DateTime<Utc>,
    /// Classifier inference time in milliseconds
    #[serde(default)]
    pub inference_time_ms: f64,
}

impl FaceEmotionResult {
    /// Build a result from a raw classifier score map and its dominant label.
    ///
    /// Raw labels are folded into the supported emotions and the scores
    /// renormalized. The classifier's own dominant label is folded the same
    /// way and its confidence is read back from the folded map. An all-zero
    /// score vector stays zero.
    pub fn from_raw_scores(
        raw: &BTreeMap<String, f64>,
        dominant: &str,
        timestamp: DateTime<Utc>,
        inference_time_ms: f64,
    ) -> Self {
        let mut scores: BTreeMap<FaceEmotion, f64> = [
            (FaceEmotion::Happy, 0.0),
            (FaceEmotion::Sad, 0.0),
            (FaceEmotion::Surprise, 0.0),
            (FaceEmotion::Neutral, 0.0),
        ]
        .into_iter()
        .collect();

        for (label, score) in raw {
            if score.is_finite() && *score > 0.0 {
                *scores.entry(FaceEmotion::from_classifier_label(label)).or_insert(0.0) += score;
            }
        }

        let total: f64 = scores.values().sum();
        if total > 0.0 {
            for value in scores.values_mut() {
                *value /= total;
            }
        }

        let label = FaceEmotion::from_classifier_label(dominant);
        let confidence = scores.get(&label).copied().unwrap_or(0.0);

        Self {
            label,
            confidence,
            scores,
            timestamp,
            inference_time_ms,
        }
    }

    /// True when the reading is well-formed and confident enough for fusion
    pub fn is_usable(&self, min_confidence: f64) -> bool {
        self.confidence.is_finite()
            && self.confidence <= 1.0
            && self.confidence >= min_confidence
    }

    pub fn from_json(json: &str) -> Result<Self, AffectError> {
        serde_json::from_str(json).map_err(|e| AffectError::InvalidSignal(format!("face: {e}")))
    }
}

/// Static hand signs recognized by the gesture classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandSign {
    Open,
    Close,
    Pointer,
    #[serde(rename = "OK")]
    Ok,
}

impl HandSign {
    /// Fixed control contribution of the sign
    pub fn control(&self) -> f64 {
        match self {
            HandSign::Open => 0.4,
            HandSign::Close => 0.8,
            HandSign::Pointer => 0.9,
            HandSign::Ok => 0.7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandSign::Open => "Open",
            HandSign::Close => "Close",
            HandSign::Pointer => "Pointer",
            HandSign::Ok => "OK",
        }
    }
}

/// One normalized hand landmark
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandLandmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Output of the hand-gesture classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandGestureResult {
    #[serde(default)]
    pub hand_sign: Option<HandSign>,
    #[serde(default)]
    pub hand_sign_confidence: f64,
    /// Dynamic finger gesture label, passed through untouched
    #[serde(default)]
    pub finger_gesture: Option<String>,
    #[serde(default)]
    pub finger_gesture_confidence: Option<f64>,
    #[serde(default)]
    pub landmarks: Vec<HandLandmark>,
    pub detected: bool,
    pub timestamp: DateTime<Utc>,
}

impl HandGestureResult {
    /// The classified sign and its confidence, if a hand was detected and
    /// classified with a finite confidence
    pub fn classified_sign(&self) -> Option<(HandSign, f64)> {
        if !self.detected {
            return None;
        }
        let sign = self.hand_sign?;
        if !self.hand_sign_confidence.is_finite() {
            return None;
        }
        Some((sign, self.hand_sign_confidence.clamp(0.0, 1.0)))
    }

    pub fn has_full_landmarks(&self) -> bool {
        self.landmarks.len() == HAND_LANDMARK_COUNT
    }

    pub fn from_json(json: &str) -> Result<Self, AffectError> {
        serde_json::from_str(json).map_err(|e| AffectError::InvalidSignal(format!("hand: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_label_folding() {
        assert_eq!(FaceEmotion::from_classifier_label("angry"), FaceEmotion::Sad);
        assert_eq!(FaceEmotion::from_classifier_label("Fear"), FaceEmotion::Surprise);
        assert_eq!(FaceEmotion::from_classifier_label("contempt"), FaceEmotion::Neutral);
        assert_eq!(FaceEmotion::from_classifier_label("happy"), FaceEmotion::Happy);
    }

    fn raw_scores(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_from_raw_scores_keeps_classifier_dominant() {
        let raw = raw_scores(&[("happy", 35.0), ("angry", 30.0), ("disgust", 25.0), ("neutral", 10.0)]);

        // Folded sad (0.55) outweighs happy, but the classifier said happy
        let result = FaceEmotionResult::from_raw_scores(&raw, "happy", ts(), 12.0);
        assert_eq!(result.label, FaceEmotion::Happy);
        assert!((result.confidence - 0.35).abs() < 1e-12);
        assert!((result.scores[&FaceEmotion::Sad] - 0.55).abs() < 1e-12);
        assert!((result.scores.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_raw_scores_folds_dominant_label() {
        let raw = raw_scores(&[("fear", 60.0), ("surprise", 20.0), ("neutral", 20.0)]);
        let result = FaceEmotionResult::from_raw_scores(&raw, "fear", ts(), 0.0);
        assert_eq!(result.label, FaceEmotion::Surprise);
        assert!((result.confidence - 0.8).abs() < 1e-12);

        let result = FaceEmotionResult::from_raw_scores(&raw, "contempt", ts(), 0.0);
        assert_eq!(result.label, FaceEmotion::Neutral);
        assert!((result.confidence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_from_raw_scores_all_zero_stays_zero() {
        let raw = raw_scores(&[("happy", 0.0), ("sad", 0.0)]);
        let result = FaceEmotionResult::from_raw_scores(&raw, "neutral", ts(), 0.0);
        assert_eq!(result.label, FaceEmotion::Neutral);
        assert_eq!(result.confidence, 0.0);
        assert!(result.scores.values().all(|v| *v == 0.0));
    }

    #[test]
    fn test_face_usability_gate() {
        let mut result = FaceEmotionResult::from_raw_scores(&BTreeMap::new(), "neutral", ts(), 0.0);
        result.confidence = 0.29;
        assert!(!result.is_usable(0.3));
        result.confidence = 0.3;
        assert!(result.is_usable(0.3));
        result.confidence = f64::NAN;
        assert!(!result.is_usable(0.3));
    }

    #[test]
    fn test_face_json_accepts_emotion_alias() {
        let json = r#"{"emotion":"happy","confidence":0.9,"timestamp":"2024-01-15T14:00:00Z"}"#;
        let result = FaceEmotionResult::from_json(json).unwrap();
        assert_eq!(result.label, FaceEmotion::Happy);
        assert!(result.scores.is_empty());
    }

    #[test]
    fn test_hand_sign_parsing_and_control() {
        let json = r#"{"hand_sign":"OK","hand_sign_confidence":0.8,"detected":true,"timestamp":"2024-01-15T14:00:00Z"}"#;
        let result = HandGestureResult::from_json(json).unwrap();
        assert_eq!(result.classified_sign(), Some((HandSign::Ok, 0.8)));
        assert_eq!(HandSign::Ok.control(), 0.7);
        assert!(!result.has_full_landmarks());
    }

    #[test]
    fn test_hand_without_sign_is_absent() {
        let result = HandGestureResult {
            hand_sign: None,
            hand_sign_confidence: 0.9,
            finger_gesture: Some("Clockwise".to_string()),
            finger_gesture_confidence: Some(0.7),
            landmarks: vec![HandLandmark { x: 0.1, y: 0.2, z: 0.0 }; HAND_LANDMARK_COUNT],
            detected: true,
            timestamp: ts(),
        };
        assert!(result.classified_sign().is_none());
        assert!(result.has_full_landmarks());

        let undetected = HandGestureResult {
            hand_sign: Some(HandSign::Open),
            detected: false,
            ..result
        };
        assert!(undetected.classified_sign().is_none());
    }

    #[test]
    fn test_malformed_signal_is_error() {
        assert!(matches!(
            HandGestureResult::from_json("{\"detected\": \"yes\"}"),
            Err(AffectError::InvalidSignal(_))
        ));
    }
}
