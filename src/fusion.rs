//! Multi-source signal fusion
//!
//! Combines the behavioral estimate (always present) with optional face-emotion
//! and hand-gesture readings. Fixed source weights are scaled by each external
//! source's own confidence and renormalized over the sources that are present.
//!
//! Arousal and valence draw on behavior and face; control draws on behavior
//! and hand. Without a hand reading, behavioral control passes through as is.

use crate::config::FusionConfig;
use crate::external::{FaceEmotionResult, HandGestureResult, HandSign};
use crate::types::{FusedEmotionalState, SourceContributions, ThreeDimensionalState, UncertaintyLevel};
use tracing::debug;

/// Number of sources a fully instrumented tick can have
const SOURCE_COUNT: f64 = 3.0;

/// A face reading that passed the confidence gate
#[derive(Debug, Clone, Copy)]
struct FaceInput {
    valence: f64,
    arousal: f64,
    confidence: f64,
}

/// A classified hand sign
#[derive(Debug, Clone, Copy)]
struct HandInput {
    control: f64,
    confidence: f64,
}

/// Confidence-weighted fusion of behavioral, face and hand signals
#[derive(Debug, Clone, Default)]
pub struct SignalFusionEngine {
    config: FusionConfig,
}

impl SignalFusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Normalized source weights for the given external confidences.
    ///
    /// `None` marks an absent source. Face and hand weights are scaled by their
    /// confidence before the weights are renormalized to sum to 1.
    pub fn normalized_weights(
        &self,
        face_confidence: Option<f64>,
        hand_confidence: Option<f64>,
    ) -> SourceContributions {
        let behavioral = self.config.behavioral_weight.max(0.0);
        let face = face_confidence.map_or(0.0, |c| self.config.face_weight.max(0.0) * c);
        let hand = hand_confidence.map_or(0.0, |c| self.config.hand_weight.max(0.0) * c);

        let total = behavioral + face + hand;
        if total <= 0.0 {
            return SourceContributions {
                face: 0.0,
                behavioral: 1.0,
                hand: 0.0,
            };
        }
        SourceContributions {
            face: face / total,
            behavioral: behavioral / total,
            hand: hand / total,
        }
    }

    /// Fuse the behavioral estimate with whatever external readings are usable
    pub fn fuse(
        &self,
        behavioral: &ThreeDimensionalState,
        face: Option<&FaceEmotionResult>,
        hand: Option<&HandGestureResult>,
    ) -> FusedEmotionalState {
        let face = face
            .filter(|f| f.is_usable(self.config.face_min_confidence))
            .map(|f| {
                let (valence, arousal) = f.label.valence_arousal();
                FaceInput {
                    valence,
                    arousal,
                    confidence: f.confidence,
                }
            });
        let hand = hand
            .and_then(HandGestureResult::classified_sign)
            .map(|(sign, confidence): (HandSign, f64)| HandInput {
                control: sign.control(),
                confidence,
            });

        let weights =
            self.normalized_weights(face.map(|f| f.confidence), hand.map(|h| h.confidence));

        let (arousal, valence) = match face {
            Some(f) => (
                pair_average(behavioral.arousal, weights.behavioral, f.arousal, weights.face),
                pair_average(behavioral.valence, weights.behavioral, f.valence, weights.face),
            ),
            None => (behavioral.arousal, behavioral.valence),
        };

        // NOTE: without a hand reading the renormalized weight is bypassed and
        // behavioral control passes through unchanged. This is inconsistent
        // with arousal/valence, which always go through the weights; hosts
        // observe it, so it stays.
        let control = match hand {
            Some(h) => pair_average(behavioral.control, weights.behavioral, h.control, weights.hand),
            None => behavioral.control,
        };

        let present = 1 + usize::from(face.is_some()) + usize::from(hand.is_some());
        let weighted_confidence = weights.behavioral * behavioral.confidence
            + face.map_or(0.0, |f| weights.face * f.confidence)
            + hand.map_or(0.0, |h| weights.hand * h.confidence);
        let fusion_confidence = (weighted_confidence * present as f64 / SOURCE_COUNT).clamp(0.0, 1.0);

        debug!(
            has_face = face.is_some(),
            has_hand = hand.is_some(),
            fusion_confidence,
            "fused signal sources"
        );

        FusedEmotionalState {
            dimensions: ThreeDimensionalState::new(
                arousal,
                valence,
                control,
                fusion_confidence,
                UncertaintyLevel::from_score(fusion_confidence),
            ),
            source_contributions: weights,
            fusion_confidence,
            has_face: face.is_some(),
            has_hand: hand.is_some(),
        }
    }
}

/// Weighted average of two values, renormalized over the pair
fn pair_average(a: f64, weight_a: f64, b: f64, weight_b: f64) -> f64 {
    let total = weight_a + weight_b;
    if total <= 0.0 {
        return a;
    }
    (a * weight_a + b * weight_b) / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{FaceEmotion, HandLandmark};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn behavioral() -> ThreeDimensionalState {
        ThreeDimensionalState::new(0.4, 0.2, 0.6, 0.9, UncertaintyLevel::Low)
    }

    fn face(label: FaceEmotion, confidence: f64) -> FaceEmotionResult {
        FaceEmotionResult {
            label,
            confidence,
            scores: BTreeMap::new(),
            timestamp: ts(),
            inference_time_ms: 15.0,
        }
    }

    fn hand(sign: Option<HandSign>, confidence: f64) -> HandGestureResult {
        HandGestureResult {
            hand_sign: sign,
            hand_sign_confidence: confidence,
            finger_gesture: None,
            finger_gesture_confidence: None,
            landmarks: vec![HandLandmark { x: 0.5, y: 0.5, z: 0.0 }; 21],
            detected: true,
            timestamp: ts(),
        }
    }

    #[test]
    fn test_full_confidence_weights_keep_fixed_ratios() {
        let engine = SignalFusionEngine::default();
        let weights = engine.normalized_weights(Some(1.0), Some(1.0));
        assert!((weights.behavioral - 0.5).abs() < 1e-12);
        assert!((weights.face - 0.3).abs() < 1e-12);
        assert!((weights.hand - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_behavioral_only_weight_is_one() {
        let engine = SignalFusionEngine::default();
        let weights = engine.normalized_weights(None, None);
        assert_eq!(weights.behavioral, 1.0);
        assert_eq!(weights.face, 0.0);
        assert_eq!(weights.hand, 0.0);
    }

    #[test]
    fn test_behavioral_only_passthrough() {
        let engine = SignalFusionEngine::default();
        let fused = engine.fuse(&behavioral(), None, None);

        assert_eq!(fused.dimensions.arousal, 0.4);
        assert_eq!(fused.dimensions.valence, 0.2);
        assert_eq!(fused.dimensions.control, 0.6);
        // 0.9 * 1/3
        assert!((fused.fusion_confidence - 0.3).abs() < 1e-12);
        assert_eq!(fused.dimensions.uncertainty, UncertaintyLevel::Medium);
        assert!(!fused.has_face && !fused.has_hand);
    }

    #[test]
    fn test_low_confidence_face_is_discarded() {
        let engine = SignalFusionEngine::default();
        let reading = face(FaceEmotion::Happy, 0.2);
        let fused = engine.fuse(&behavioral(), Some(&reading), None);
        assert!(!fused.has_face);
        assert_eq!(fused.dimensions.valence, 0.2);
    }

    #[test]
    fn test_face_shifts_arousal_and_valence_only() {
        let engine = SignalFusionEngine::default();
        let reading = face(FaceEmotion::Happy, 1.0);
        let fused = engine.fuse(&behavioral(), Some(&reading), None);

        // Weights 0.5 / 0.3 over the pair: 0.625 / 0.375
        assert!((fused.dimensions.arousal - (0.625 * 0.4 + 0.375 * 0.6)).abs() < 1e-12);
        assert!((fused.dimensions.valence - (0.625 * 0.2 + 0.375 * 0.8)).abs() < 1e-12);
        assert_eq!(fused.dimensions.control, 0.6);
        assert!(fused.has_face);

        // (0.625 * 0.9 + 0.375 * 1.0) * 2/3
        let expected = (0.625 * 0.9 + 0.375) * 2.0 / 3.0;
        assert!((fused.fusion_confidence - expected).abs() < 1e-12);
    }

    #[test]
    fn test_hand_shifts_control() {
        let engine = SignalFusionEngine::default();
        let reading = hand(Some(HandSign::Pointer), 1.0);
        let fused = engine.fuse(&behavioral(), None, Some(&reading));

        // Weights 0.5 / 0.2 over the pair
        let expected = (0.5 * 0.6 + 0.2 * 0.9) / 0.7;
        assert!((fused.dimensions.control - expected).abs() < 1e-12);
        assert_eq!(fused.dimensions.arousal, 0.4);
        assert!(fused.has_hand);
    }

    #[test]
    fn test_unclassified_hand_is_absent() {
        let engine = SignalFusionEngine::default();
        let reading = hand(None, 0.9);
        let fused = engine.fuse(&behavioral(), None, Some(&reading));
        assert!(!fused.has_hand);
        assert_eq!(fused.source_contributions.hand, 0.0);
    }

    #[test]
    fn test_all_sources_stay_in_range() {
        let engine = SignalFusionEngine::default();
        let f = face(FaceEmotion::Sad, 0.8);
        let h = hand(Some(HandSign::Open), 0.6);
        let fused = engine.fuse(&behavioral(), Some(&f), Some(&h));

        let c = &fused.source_contributions;
        assert!((c.behavioral + c.face + c.hand - 1.0).abs() < 1e-12);
        assert!((-1.0..=1.0).contains(&fused.dimensions.valence));
        assert!((0.0..=1.0).contains(&fused.fusion_confidence));
        assert_eq!(
            fused.dimensions.uncertainty,
            UncertaintyLevel::from_score(fused.fusion_confidence)
        );
    }
}
