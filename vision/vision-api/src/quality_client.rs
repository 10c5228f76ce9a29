use std::time::Duration;

use async_trait::async_trait;
use mime_guess::MimeGuess;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use shared_api::{BoundingBox, DetectedFace, FaceDetector};
use tracing::debug;
use vision_contracts::QualityServiceConfig;

use crate::VisionError;

/// Remote face-quality detector. Interchangeable with the recognizer's
/// detection endpoint behind [`FaceDetector`]; this one scores on the raw
/// detector scale and labels poses directly.
pub struct QualityServiceClient {
    client: Client,
    config: QualityServiceConfig,
}

#[derive(Deserialize, Debug)]
struct QualityDetectResponse {
    #[serde(default)]
    faces: Vec<QualityFace>,
}

#[derive(Deserialize, Debug)]
struct QualityFace {
    bbox: [i64; 4],
    confidence: f64,
    #[serde(default = "default_pose")]
    pose: String,
    #[serde(default)]
    landmarks: usize,
    #[serde(default)]
    masked: bool,
}

fn default_pose() -> String {
    "front".to_string()
}

impl QualityServiceClient {
    pub fn new(config: QualityServiceConfig) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(QualityServiceClient { client, config })
    }

    async fn detect(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        batch_mode: bool,
    ) -> Result<Vec<DetectedFace>, VisionError> {
        let url = format!(
            "{}/api/v1/faces/detect",
            self.config.quality_service_url
        );
        let mime = MimeGuess::from_path(filename).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime.as_ref())
            .map_err(VisionError::Transport)?;
        let form = Form::new().part("file", part);
        let response = self
            .client
            .post(&url)
            .query(&[("batch", batch_mode.to_string())])
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(256)
                .collect();
            return Err(VisionError::Status { status, body });
        }
        let parsed = response.json::<QualityDetectResponse>().await?;
        debug!(
            "quality service detected {} faces in {}",
            parsed.faces.len(),
            filename
        );
        Ok(parsed
            .faces
            .into_iter()
            .map(|f| DetectedFace {
                bbox: BoundingBox::new(f.bbox[0], f.bbox[1], f.bbox[2], f.bbox[3]),
                confidence: f.confidence,
                pose: f.pose,
                landmarks: f.landmarks,
                masked: f.masked,
                embedding: None,
            })
            .collect())
    }
}

#[async_trait]
impl FaceDetector for QualityServiceClient {
    async fn detect_faces(
        &self,
        bytes: &[u8],
        filename: &str,
        batch_mode: bool,
    ) -> anyhow::Result<Vec<DetectedFace>> {
        Ok(self.detect(bytes.to_vec(), filename, batch_mode).await?)
    }
}
