use serde::{Deserialize, Serialize};

/// Pixel-space face bounding box, inclusive of min, exclusive of max.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl BoundingBox {
    pub fn new(x_min: i64, y_min: i64, x_max: i64, y_max: i64) -> Self {
        BoundingBox {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> u32 {
        (self.x_max - self.x_min).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y_max - self.y_min).max(0) as u32
    }

    pub fn shorter_side(&self) -> u32 {
        self.width().min(self.height())
    }

    fn area(&self) -> i64 {
        (self.x_max - self.x_min).max(0) * (self.y_max - self.y_min).max(0)
    }

    /// Intersection over union with another box, 0.0 when disjoint.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix_min = self.x_min.max(other.x_min);
        let iy_min = self.y_min.max(other.y_min);
        let ix_max = self.x_max.min(other.x_max);
        let iy_max = self.y_max.min(other.y_max);

        let intersection = (ix_max - ix_min).max(0) * (iy_max - iy_min).max(0);
        if intersection == 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            return 0.0;
        }
        intersection as f64 / union as f64
    }
}

/// Converts a bounded detection probability into the log-odds score the
/// acceptance thresholds are written against (which is also why borderline
/// faces can score negative). Backends that already score on the raw scale
/// bypass this. The clamp keeps saturated probabilities finite.
pub fn log_odds_score(probability: f64) -> f64 {
    let p = probability.clamp(1e-6, 1.0 - 1e-6);
    (p / (1.0 - p)).ln()
}

/// One face reported by a detector backend, normalized across backends.
/// Lives for the duration of a single entity's processing.
#[derive(Debug, Clone, Default)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    /// Raw detector score. Detector-specific scale, not clamped to [0, 1];
    /// some detectors report negative scores for borderline faces.
    pub confidence: f64,
    /// Pose label: `front`, `front-rotate-left`, `front-rotate-right`,
    /// `profile-left`, `profile-right`.
    pub pose: String,
    /// Number of facial landmarks the detector located.
    pub landmarks: usize,
    pub masked: bool,
    /// 512-D embedding when the backend computes one inline.
    pub embedding: Option<Vec<f32>>,
}

impl DetectedFace {
    pub fn is_frontal(&self) -> bool {
        self.pose == "front" || self.pose.starts_with("front-rotate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(10, 10, 110, 110);
        assert!((a.iou(&a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0, 0, 50, 50);
        let b = BoundingBox::new(100, 100, 150, 150);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        // b covers the right half of a
        let a = BoundingBox::new(0, 0, 100, 100);
        let b = BoundingBox::new(50, 0, 150, 100);
        let expected = 5000.0 / 15000.0;
        assert!((a.iou(&b) - expected).abs() < 1e-9);
    }

    #[test]
    fn shorter_side_picks_the_minimum() {
        let b = BoundingBox::new(0, 0, 200, 80);
        assert_eq!(b.shorter_side(), 80);
        assert_eq!(b.width(), 200);
        assert_eq!(b.height(), 80);
    }

    #[test]
    fn log_odds_score_spans_the_threshold_scale() {
        assert!(log_odds_score(0.5).abs() < 1e-9);
        assert!((log_odds_score(0.917) - 2.4).abs() < 0.01);
        assert!(log_odds_score(0.98) > 3.2);
        assert!(log_odds_score(0.4) < 0.0);
        assert!(log_odds_score(0.9) < log_odds_score(0.99));
        assert!(log_odds_score(1.0).is_finite());
        assert!(log_odds_score(0.0).is_finite());
    }

    #[test]
    fn frontal_covers_rotated_variants() {
        let mut face = DetectedFace {
            pose: "front".into(),
            ..Default::default()
        };
        assert!(face.is_frontal());
        face.pose = "front-rotate-left".into();
        assert!(face.is_frontal());
        face.pose = "profile-left".into();
        assert!(!face.is_frontal());
    }
}
