use serde::{Deserialize, Serialize};

use crate::faces::DetectedFace;

/// Quality buckets, ordered worst to best so `Ord` follows quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Unusable,
    Poor,
    Acceptable,
    Good,
    Excellent,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Unusable => "unusable",
            QualityTier::Poor => "poor",
            QualityTier::Acceptable => "acceptable",
            QualityTier::Good => "good",
            QualityTier::Excellent => "excellent",
        }
    }
}

/// Classification outcome for one face.
#[derive(Debug, Clone)]
pub struct QualityMetrics {
    pub tier: QualityTier,
    pub confidence: f64,
    pub pose: String,
    pub shorter_side: u32,
    pub masked: bool,
    pub reasons: Vec<String>,
}

/// Outcome of a per-operation gate.
#[derive(Debug, Clone)]
pub struct Decision {
    pub accepted: bool,
    pub metrics: QualityMetrics,
    pub reason: String,
}

/// Threshold bundle gating what a face may do: seed a new subject, match an
/// existing one, or be processed at all. Confidence thresholds are on the
/// raw detector scale; similarity thresholds tighten as the tier drops, a
/// weaker face needs a stronger match.
#[derive(Debug, Clone)]
pub struct AcceptancePolicy {
    pub name: &'static str,
    pub min_tier_new_subject: QualityTier,
    pub min_tier_matching: QualityTier,
    pub min_tier_batch: QualityTier,
    pub similarity_excellent: f64,
    pub similarity_good: f64,
    pub similarity_acceptable: f64,
    pub confidence_excellent: f64,
    pub confidence_good: f64,
    pub confidence_acceptable: f64,
    pub min_face_size: u32,
    /// Fuzzy half-width around each confidence threshold; 0 means hard
    /// cutoffs.
    pub fuzz: f64,
    pub always_accept_explicit_index: bool,
}

impl AcceptancePolicy {
    pub fn strict() -> Self {
        AcceptancePolicy {
            name: "strict",
            min_tier_new_subject: QualityTier::Excellent,
            min_tier_matching: QualityTier::Good,
            min_tier_batch: QualityTier::Acceptable,
            similarity_excellent: 0.90,
            similarity_good: 0.93,
            similarity_acceptable: 0.96,
            confidence_excellent: 3.5,
            confidence_good: 2.5,
            confidence_acceptable: 1.2,
            min_face_size: 64,
            fuzz: 0.0,
            always_accept_explicit_index: false,
        }
    }

    pub fn balanced() -> Self {
        AcceptancePolicy {
            name: "balanced",
            min_tier_new_subject: QualityTier::Good,
            min_tier_matching: QualityTier::Acceptable,
            min_tier_batch: QualityTier::Poor,
            similarity_excellent: 0.85,
            similarity_good: 0.89,
            similarity_acceptable: 0.93,
            confidence_excellent: 3.0,
            confidence_good: 1.5,
            confidence_acceptable: 0.7,
            min_face_size: 64,
            fuzz: 0.2,
            always_accept_explicit_index: true,
        }
    }

    pub fn permissive() -> Self {
        AcceptancePolicy {
            name: "permissive",
            min_tier_new_subject: QualityTier::Acceptable,
            min_tier_matching: QualityTier::Poor,
            min_tier_batch: QualityTier::Poor,
            similarity_excellent: 0.81,
            similarity_good: 0.85,
            similarity_acceptable: 0.90,
            confidence_excellent: 2.0,
            confidence_good: 1.0,
            confidence_acceptable: 0.5,
            min_face_size: 64,
            fuzz: 0.3,
            always_accept_explicit_index: true,
        }
    }

    /// Policy selection by name; unknown names resolve to balanced.
    pub fn from_name(name: &str) -> Self {
        match name {
            "strict" => Self::strict(),
            "permissive" => Self::permissive(),
            "balanced" => Self::balanced(),
            other => {
                tracing::warn!("unknown quality policy '{}', using balanced", other);
                Self::balanced()
            }
        }
    }

    pub fn with_min_face_size(mut self, min_face_size: u32) -> Self {
        self.min_face_size = min_face_size;
        self
    }

    pub fn classify(&self, face: &DetectedFace) -> QualityMetrics {
        let shorter_side = face.bbox.shorter_side();
        let mut metrics = QualityMetrics {
            tier: QualityTier::Unusable,
            confidence: face.confidence,
            pose: face.pose.clone(),
            shorter_side,
            masked: face.masked,
            reasons: Vec::new(),
        };

        if shorter_side < self.min_face_size {
            metrics.reasons.push(format!("too_small_{}px", shorter_side));
            return metrics;
        }
        if face.masked {
            metrics.reasons.push("masked".to_string());
            return metrics;
        }

        let c = face.confidence;
        let frontal = face.is_frontal();
        let above = |t: f64| c >= t + self.fuzz;
        let fuzzy = |t: f64| self.fuzz > 0.0 && c >= t - self.fuzz && c < t + self.fuzz;

        if above(self.confidence_excellent) && frontal {
            metrics.tier = QualityTier::Excellent;
            metrics.reasons.push("confidence_excellent".to_string());
            return metrics;
        }
        if fuzzy(self.confidence_excellent) && frontal {
            if face.landmarks >= 5 && face.bbox.width() >= 100 {
                metrics.tier = QualityTier::Excellent;
                metrics.reasons.push("fuzzy_excellent_landmarks".to_string());
            } else {
                metrics.tier = QualityTier::Good;
                metrics.reasons.push("fuzzy_excellent_downgraded".to_string());
            }
            return metrics;
        }

        if above(self.confidence_good) {
            if frontal {
                metrics.tier = QualityTier::Good;
                metrics.reasons.push("confidence_good".to_string());
            } else {
                metrics.tier = QualityTier::Acceptable;
                metrics.reasons.push("confidence_good_non_frontal".to_string());
            }
            return metrics;
        }
        if fuzzy(self.confidence_good) {
            if frontal && face.landmarks >= 5 {
                metrics.tier = QualityTier::Good;
                metrics.reasons.push("fuzzy_good_landmarks".to_string());
            } else if frontal {
                metrics.tier = QualityTier::Acceptable;
                metrics.reasons.push("fuzzy_good_frontal".to_string());
            } else {
                metrics.tier = QualityTier::Acceptable;
                metrics.reasons.push("fuzzy_good_non_frontal".to_string());
            }
            return metrics;
        }

        if above(self.confidence_acceptable) && frontal {
            metrics.tier = QualityTier::Acceptable;
            metrics.reasons.push("confidence_acceptable".to_string());
            return metrics;
        }
        if fuzzy(self.confidence_acceptable) && frontal {
            metrics.tier = QualityTier::Poor;
            metrics.reasons.push("fuzzy_acceptable".to_string());
            return metrics;
        }

        if c >= self.confidence_acceptable || (c >= 0.5 && frontal) {
            metrics.tier = QualityTier::Poor;
            metrics.reasons.push("low_confidence".to_string());
        } else if c < 0.0 && frontal {
            // inherited detector convention: borderline frontal faces can
            // score below zero and are still worth a poor-tier look
            metrics.tier = QualityTier::Poor;
            metrics.reasons.push("negative_confidence_frontal".to_string());
        } else {
            metrics.reasons.push("below_thresholds".to_string());
        }
        metrics
    }

    fn similarity_threshold(&self, tier: QualityTier) -> f64 {
        match tier {
            QualityTier::Excellent => self.similarity_excellent,
            QualityTier::Good => self.similarity_good,
            QualityTier::Acceptable => self.similarity_acceptable,
            QualityTier::Poor => self.similarity_acceptable,
            QualityTier::Unusable => f64::INFINITY,
        }
    }

    /// May this face seed a brand-new subject? An explicitly selected first
    /// face bypasses the tier gate when the policy allows it.
    pub fn should_create_subject(
        &self,
        face: &DetectedFace,
        explicit_index: Option<usize>,
    ) -> Decision {
        let metrics = self.classify(face);
        if self.always_accept_explicit_index && explicit_index == Some(0) {
            return Decision {
                accepted: true,
                metrics,
                reason: "explicit_index".to_string(),
            };
        }
        if metrics.tier >= self.min_tier_new_subject {
            Decision {
                accepted: true,
                metrics,
                reason: "tier_accepted".to_string(),
            }
        } else {
            Decision {
                accepted: false,
                metrics,
                reason: "tier_below_new_subject_minimum".to_string(),
            }
        }
    }

    /// May this face be bound to an existing subject at the given similarity?
    pub fn should_match_to_subject(&self, face: &DetectedFace, similarity: f64) -> Decision {
        let metrics = self.classify(face);
        if metrics.tier < self.min_tier_matching {
            return Decision {
                accepted: false,
                metrics,
                reason: "tier_below_matching_minimum".to_string(),
            };
        }
        let threshold = self.similarity_threshold(metrics.tier);
        if similarity >= threshold {
            Decision {
                accepted: true,
                metrics,
                reason: "similarity_accepted".to_string(),
            }
        } else {
            Decision {
                accepted: false,
                metrics,
                reason: "similarity_below_threshold".to_string(),
            }
        }
    }

    /// Is this face worth spending recognition calls on at all?
    pub fn should_process_in_batch(&self, face: &DetectedFace) -> Decision {
        let metrics = self.classify(face);
        if metrics.tier >= self.min_tier_batch {
            Decision {
                accepted: true,
                metrics,
                reason: "tier_accepted".to_string(),
            }
        } else {
            Decision {
                accepted: false,
                metrics,
                reason: "tier_below_batch_minimum".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::BoundingBox;

    fn face(confidence: f64, pose: &str, width: i64, height: i64) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox::new(0, 0, width, height),
            confidence,
            pose: pose.into(),
            landmarks: 5,
            masked: false,
            embedding: None,
        }
    }

    #[test]
    fn tier_order_matches_quality() {
        assert!(QualityTier::Excellent > QualityTier::Good);
        assert!(QualityTier::Good > QualityTier::Acceptable);
        assert!(QualityTier::Acceptable > QualityTier::Poor);
        assert!(QualityTier::Poor > QualityTier::Unusable);
    }

    #[test]
    fn small_face_is_unusable_with_size_reason() {
        let policy = AcceptancePolicy::balanced();
        let metrics = policy.classify(&face(3.0, "front", 40, 40));
        assert_eq!(metrics.tier, QualityTier::Unusable);
        assert_eq!(metrics.reasons, vec!["too_small_40px"]);
    }

    #[test]
    fn masked_face_is_unusable() {
        let policy = AcceptancePolicy::balanced();
        let mut f = face(3.0, "front", 200, 200);
        f.masked = true;
        let metrics = policy.classify(&f);
        assert_eq!(metrics.tier, QualityTier::Unusable);
        assert_eq!(metrics.reasons, vec!["masked"]);
    }

    #[test]
    fn balanced_frontal_mid_confidence_is_good() {
        let policy = AcceptancePolicy::balanced();
        let metrics = policy.classify(&face(2.4, "front", 200, 200));
        assert_eq!(metrics.tier, QualityTier::Good);
    }

    #[test]
    fn balanced_high_confidence_frontal_is_excellent() {
        let policy = AcceptancePolicy::balanced();
        let metrics = policy.classify(&face(3.5, "front", 200, 200));
        assert_eq!(metrics.tier, QualityTier::Excellent);
    }

    #[test]
    fn non_frontal_caps_at_acceptable() {
        let policy = AcceptancePolicy::balanced();
        let metrics = policy.classify(&face(3.5, "profile-left", 200, 200));
        assert_eq!(metrics.tier, QualityTier::Acceptable);
    }

    #[test]
    fn fuzzy_excellent_needs_landmarks_and_width() {
        let policy = AcceptancePolicy::balanced();
        // within the fuzzy band around 3.0
        let mut f = face(2.9, "front", 200, 200);
        assert_eq!(policy.classify(&f).tier, QualityTier::Excellent);
        f.landmarks = 3;
        assert_eq!(policy.classify(&f).tier, QualityTier::Good);
        f.landmarks = 5;
        f.bbox = BoundingBox::new(0, 0, 90, 200);
        assert_eq!(policy.classify(&f).tier, QualityTier::Good);
    }

    #[test]
    fn negative_confidence_frontal_is_poor() {
        // inherited from the upstream detector's score conventions; pinned
        // here so a future detector swap shows up as a test change
        let policy = AcceptancePolicy::balanced();
        let metrics = policy.classify(&face(-0.3, "front", 200, 200));
        assert_eq!(metrics.tier, QualityTier::Poor);
        assert_eq!(metrics.reasons, vec!["negative_confidence_frontal"]);
    }

    #[test]
    fn negative_confidence_profile_is_unusable() {
        let policy = AcceptancePolicy::balanced();
        let metrics = policy.classify(&face(-0.3, "profile-right", 200, 200));
        assert_eq!(metrics.tier, QualityTier::Unusable);
    }

    #[test]
    fn strict_policy_uses_hard_cutoffs() {
        let policy = AcceptancePolicy::strict();
        assert_eq!(policy.fuzz, 0.0);
        // just below the good threshold: no fuzzy band to rescue it
        let metrics = policy.classify(&face(2.49, "front", 200, 200));
        assert_eq!(metrics.tier, QualityTier::Acceptable);
        let metrics = policy.classify(&face(2.5, "front", 200, 200));
        assert_eq!(metrics.tier, QualityTier::Good);
    }

    #[test]
    fn tier_is_monotonic_in_confidence() {
        // holds for non-negative scores; the negative-frontal branch above is
        // the deliberate exception
        let policy = AcceptancePolicy::balanced();
        for pose in ["front", "profile-left"] {
            let mut last = QualityTier::Unusable;
            let mut c = 0.0;
            while c <= 4.0 {
                let tier = policy.classify(&face(c, pose, 200, 200)).tier;
                assert!(
                    tier >= last,
                    "tier dropped from {:?} to {:?} at confidence {} pose {}",
                    last,
                    tier,
                    c,
                    pose
                );
                last = tier;
                c += 0.01;
            }
        }
    }

    #[test]
    fn unknown_policy_name_resolves_to_balanced() {
        let policy = AcceptancePolicy::from_name("aggressive");
        assert_eq!(policy.name, "balanced");
    }

    #[test]
    fn match_decision_uses_per_tier_threshold() {
        let policy = AcceptancePolicy::balanced();
        let good = face(2.4, "front", 200, 200);
        // good tier threshold is 0.89
        assert!(policy.should_match_to_subject(&good, 0.93).accepted);
        assert!(!policy.should_match_to_subject(&good, 0.88).accepted);
        let unusable = face(3.0, "front", 40, 40);
        let decision = policy.should_match_to_subject(&unusable, 0.999);
        assert!(!decision.accepted);
        assert_eq!(decision.reason, "tier_below_matching_minimum");
    }

    #[test]
    fn explicit_first_face_bypasses_create_gate() {
        let policy = AcceptancePolicy::balanced();
        let weak = face(0.6, "front", 200, 200);
        assert!(!policy.should_create_subject(&weak, None).accepted);
        let decision = policy.should_create_subject(&weak, Some(0));
        assert!(decision.accepted);
        assert_eq!(decision.reason, "explicit_index");
        assert!(!policy.should_create_subject(&weak, Some(1)).accepted);
        // strict policy does not honor the bypass
        assert!(!AcceptancePolicy::strict()
            .should_create_subject(&weak, Some(0))
            .accepted);
    }

    #[test]
    fn batch_gate_follows_minimum_tier() {
        let policy = AcceptancePolicy::strict();
        assert!(!policy
            .should_process_in_batch(&face(1.0, "front", 200, 200))
            .accepted);
        assert!(policy
            .should_process_in_batch(&face(1.3, "front", 200, 200))
            .accepted);
    }
}
