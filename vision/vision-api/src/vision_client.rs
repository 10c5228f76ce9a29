use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::json;
use tracing::debug;
use vision_contracts::{
    AnalysisResults, AnalysisSource, EnhancementParameters, FacesParameters, JobStatusResponse,
    SubmitResponse, VisionConfig,
};

use crate::poll::JobPoller;
use crate::VisionError;

/// Client for the video analyzer's job API and its frame-extraction
/// endpoint.
pub struct VisionClient {
    client: Client,
    config: VisionConfig,
}

impl VisionClient {
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(VisionClient { client, config })
    }

    async fn checked(response: Response) -> Result<Response, VisionError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(256)
                .collect();
            Err(VisionError::Status { status, body })
        }
    }

    /// Submits an analysis job for one scene; only the faces module is
    /// requested. Returns the analyzer-assigned job id.
    pub async fn submit(
        &self,
        source: &AnalysisSource,
        scene_id: &str,
        faces: &FacesParameters,
    ) -> Result<String, VisionError> {
        let url = format!("{}/api/v1/analyze", self.config.vision_service_url);
        let body = json!({
            "source": source,
            "scene_id": scene_id,
            "modules": ["faces"],
            "faces": faces,
        });
        let response = self.client.post(&url).json(&body).send().await?;
        let response = Self::checked(response).await?;
        let submitted = response.json::<SubmitResponse>().await?;
        debug!(
            "submitted analysis job {} for scene {} ({:?})",
            submitted.job_id, scene_id, submitted.status
        );
        Ok(submitted.job_id)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatusResponse, VisionError> {
        let url = format!("{}/api/v1/jobs/{}", self.config.vision_service_url, job_id);
        let response = self.client.get(&url).send().await?;
        let response = Self::checked(response).await?;
        Ok(response.json::<JobStatusResponse>().await?)
    }

    /// Fetches the results of a completed job. Asking before the job is
    /// terminal yields [`VisionError::NotYetComplete`], which the polling
    /// loop absorbs.
    pub async fn results(&self, job_id: &str) -> Result<AnalysisResults, VisionError> {
        let url = format!(
            "{}/api/v1/jobs/{}/results",
            self.config.vision_service_url, job_id
        );
        let response = self.client.get(&url).send().await?;
        let status = response.status().as_u16();
        // 409 and 425 both mean "come back later" depending on the analyzer
        // version
        if status == 409 || status == 425 {
            return Err(VisionError::NotYetComplete);
        }
        let response = Self::checked(response).await?;
        Ok(response.json::<AnalysisResults>().await?)
    }

    /// Extracts a single frame as JPEG bytes, optionally enhanced. Used to
    /// enroll a representative still for a face that only exists on video.
    pub async fn extract_frame(
        &self,
        source: &AnalysisSource,
        timestamp: f64,
        enhancement: Option<&EnhancementParameters>,
    ) -> Result<Vec<u8>, VisionError> {
        let url = format!("{}/api/v1/frames/extract", self.config.vision_service_url);
        let body = json!({
            "source": source,
            "timestamp": timestamp,
            "enhancement": enhancement,
        });
        let response = self.client.post(&url).json(&body).send().await?;
        let response = Self::checked(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl JobPoller for VisionClient {
    async fn poll_status(&self, job_id: &str) -> Result<JobStatusResponse, VisionError> {
        self.status(job_id).await
    }

    async fn fetch_results(&self, job_id: &str) -> Result<AnalysisResults, VisionError> {
        self.results(job_id).await
    }
}
