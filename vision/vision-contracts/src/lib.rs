use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection settings for the video analyzer. The service is optional;
/// scene workflows refuse to start without a URL. There is deliberately no
/// default URL or port.
#[derive(Debug, clap::Parser, Clone, Deserialize)]
pub struct VisionConfig {
    #[clap(long, env = "VISION_SERVICE_URL", help = "Video analyzer base URL")]
    pub vision_service_url: String,

    /// Per-request timeout in seconds; frame extraction can be slow
    #[clap(long, env = "VISION_TIMEOUT_SECONDS", default_value = "120")]
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    120
}

/// Connection settings for the optional external face-quality service.
#[derive(Debug, clap::Parser, Clone, Deserialize)]
pub struct QualityServiceConfig {
    #[clap(long, env = "QUALITY_SERVICE_URL", help = "Face quality service base URL")]
    pub quality_service_url: String,

    #[clap(long, env = "QUALITY_TIMEOUT_SECONDS", default_value = "60")]
    #[serde(default = "default_quality_timeout")]
    pub timeout_seconds: u64,
}

fn default_quality_timeout() -> u64 {
    60
}

/// What the analyzer should read: the original video file, or the
/// library-generated sprite sheet with its VTT index.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisSource {
    File { path: String },
    Sprites { vtt_url: String, image_url: String },
}

/// Parameters of the faces module of an analysis job.
#[derive(Debug, Clone, Serialize)]
pub struct FacesParameters {
    pub min_confidence: f64,
    pub min_quality: f64,
    pub max_faces: usize,
    /// Seconds between sampled frames
    pub sampling_interval: f64,
    /// Collapse near-identical detections of the same face
    pub deduplicate: bool,
    /// Embedding similarity for cross-frame clustering
    pub similarity_threshold: f64,
    pub detect_demographics: bool,
    pub cache_ttl_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhancement: Option<EnhancementParameters>,
}

impl Default for FacesParameters {
    fn default() -> Self {
        FacesParameters {
            min_confidence: 0.7,
            min_quality: 0.2,
            max_faces: 20,
            sampling_interval: 2.0,
            deduplicate: true,
            similarity_threshold: 0.85,
            detect_demographics: false,
            cache_ttl_seconds: 86_400,
            enhancement: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnhancementParameters {
    pub upscale: bool,
    pub denoise: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Accepted,
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub summary: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisResults {
    #[serde(default)]
    pub faces: Vec<ClusteredFace>,
    #[serde(default)]
    pub metadata: Value,
}

/// One face identity clustered across frames, with the 512-D embedding of
/// the cluster and the detection chosen to represent it.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusteredFace {
    pub face_id: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub demographics: Option<Demographics>,
    #[serde(default)]
    pub detections: Vec<FaceDetection>,
    pub representative_detection: FaceDetection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaceDetection {
    /// Seconds from the start of the source
    pub timestamp: f64,
    /// x_min, y_min, x_max, y_max in pixels
    pub bbox: [i64; 4],
    /// Detection probability in [0, 1]
    pub confidence: f64,
    /// Overall face quality in [0, 1]
    pub quality_score: f64,
    #[serde(default = "default_pose")]
    pub pose: String,
}

fn default_pose() -> String {
    "front".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub gender: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn analysis_source_tags_by_type() {
        let file = serde_json::to_value(AnalysisSource::File {
            path: "/m/11.mp4".into(),
        })
        .unwrap();
        assert_eq!(file, json!({"type": "file", "path": "/m/11.mp4"}));

        let sprites = serde_json::to_value(AnalysisSource::Sprites {
            vtt_url: "http://lib/scene/11_thumbs.vtt".into(),
            image_url: "http://lib/scene/11_sprite.jpg".into(),
        })
        .unwrap();
        assert_eq!(sprites["type"], "sprites");
    }

    #[test]
    fn job_status_terminality() {
        assert!(!JobStatus::Accepted.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn results_parse_with_representative_detection() {
        let raw = json!({
            "faces": [{
                "face_id": "f0",
                "embedding": [0.0, 0.0, 0.0, 0.0],
                "detections": [],
                "representative_detection": {
                    "timestamp": 12.5,
                    "bbox": [10, 10, 210, 210],
                    "confidence": 0.91,
                    "quality_score": 0.77
                }
            }],
            "metadata": {"frames_sampled": 300}
        });
        let results: AnalysisResults = serde_json::from_value(raw).unwrap();
        let face = &results.faces[0];
        assert_eq!(face.representative_detection.pose, "front");
        assert_eq!(face.representative_detection.bbox[2], 210);
    }
}
