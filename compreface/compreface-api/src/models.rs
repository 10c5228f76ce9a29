use serde::{Deserialize, Serialize};

use shared_api::{log_odds_score, BoundingBox, DetectedFace};

#[derive(Deserialize, Debug)]
pub struct DetectApiResponse {
    pub result: Vec<DetectResultItem>,
}

#[derive(Deserialize, Debug)]
pub struct DetectResultItem {
    #[serde(rename = "box")]
    pub bbox: WireBox,
    #[serde(default)]
    pub landmarks: Vec<[i64; 2]>,
    #[serde(default)]
    pub age: Option<AgeRange>,
    #[serde(default)]
    pub gender: Option<PluginValue>,
    #[serde(default)]
    pub mask: Option<PluginValue>,
    #[serde(default)]
    pub pose: Option<Pose>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct WireBox {
    pub probability: f64,
    pub x_min: i64,
    pub y_min: i64,
    pub x_max: i64,
    pub y_max: i64,
}

impl From<WireBox> for BoundingBox {
    fn from(b: WireBox) -> Self {
        BoundingBox::new(b.x_min, b.y_min, b.x_max, b.y_max)
    }
}

#[derive(Deserialize, Debug)]
pub struct AgeRange {
    pub low: u32,
    pub high: u32,
}

#[derive(Deserialize, Debug)]
pub struct PluginValue {
    pub value: String,
    pub probability: f64,
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct Pose {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

/// Pose label from the head-pose plugin angles. Yaw alone decides: the
/// filter only distinguishes frontal-ish from profile.
pub fn pose_label(pose: Option<&Pose>) -> String {
    let Some(pose) = pose else {
        return "front".to_string();
    };
    let yaw = pose.yaw;
    if yaw.abs() <= 30.0 {
        "front".to_string()
    } else if yaw.abs() <= 60.0 {
        if yaw > 0.0 {
            "front-rotate-right".to_string()
        } else {
            "front-rotate-left".to_string()
        }
    } else if yaw > 0.0 {
        "profile-right".to_string()
    } else {
        "profile-left".to_string()
    }
}

impl DetectResultItem {
    pub fn into_detected_face(self) -> DetectedFace {
        let masked = self
            .mask
            .as_ref()
            .map(|m| m.value != "without_mask")
            .unwrap_or(false);
        DetectedFace {
            bbox: self.bbox.into(),
            // the wire probability is bounded; the thresholds are not
            confidence: log_odds_score(self.bbox.probability),
            pose: pose_label(self.pose.as_ref()),
            landmarks: self.landmarks.len(),
            masked,
            embedding: self.embedding,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct RecognizeApiResponse {
    pub result: Vec<RecognizeResultItem>,
}

#[derive(Deserialize, Debug)]
pub struct RecognizeResultItem {
    #[serde(rename = "box")]
    pub bbox: WireBox,
    #[serde(default)]
    pub subjects: Vec<SubjectSimilarity>,
}

/// One recognition candidate for a face, best-first as the recognizer
/// returns them.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SubjectSimilarity {
    pub subject: String,
    pub similarity: f64,
}

/// Recognition output correlated back to pixel space by the caller.
#[derive(Debug, Clone)]
pub struct RecognizedFace {
    pub bbox: BoundingBox,
    pub subjects: Vec<SubjectSimilarity>,
}

impl RecognizeResultItem {
    pub fn into_recognized_face(self) -> RecognizedFace {
        RecognizedFace {
            bbox: self.bbox.into(),
            subjects: self.subjects,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct EmbeddingRecognizeResponse {
    pub result: Vec<EmbeddingResultItem>,
}

#[derive(Deserialize, Debug)]
pub struct EmbeddingResultItem {
    #[serde(default)]
    pub similarities: Vec<SubjectSimilarity>,
}

#[derive(Deserialize, Debug)]
pub struct AddSubjectResponse {
    pub image_id: String,
    #[serde(default)]
    pub subject: String,
}

#[derive(Deserialize, Debug)]
pub struct SubjectsResponse {
    pub subjects: Vec<String>,
}

#[derive(Deserialize, Debug)]
pub struct FacesResponse {
    #[serde(default)]
    pub faces: Vec<FaceEntry>,
}

#[derive(Deserialize, Debug)]
pub struct FaceEntry {
    pub image_id: String,
    #[serde(default)]
    pub subject: String,
}
