use async_trait::async_trait;
use compreface_contracts::CompreFaceConfig;
use mime_guess::MimeGuess;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde_json::json;
use shared_api::{DetectedFace, FaceDetector};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::models::{
    AddSubjectResponse, DetectApiResponse, EmbeddingRecognizeResponse, FacesResponse,
    RecognizeApiResponse, RecognizedFace, SubjectSimilarity, SubjectsResponse,
};
use crate::RecognizerError;

/// Plugins requested on every detection call; the filter needs landmarks,
/// mask state and head pose, the rest is demographic garnish.
const DETECT_PLUGINS: &str = "landmarks,gender,age,mask,pose";

/// Typed facade over the CompreFace HTTP surface. One request per call, no
/// retries, no threshold interpretation; both belong to the caller.
pub struct CompreFaceClient {
    client: Client,
    config: CompreFaceConfig,
}

impl CompreFaceClient {
    pub fn new(config: CompreFaceConfig) -> Result<Self, RecognizerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(CompreFaceClient { client, config })
    }

    fn image_part(bytes: Vec<u8>, filename: &str) -> Result<Part, RecognizerError> {
        let mime = MimeGuess::from_path(filename).first_or_octet_stream();
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime.as_ref())
            .map_err(RecognizerError::Transport)?;
        Ok(part)
    }

    async fn checked(response: Response) -> Result<Response, RecognizerError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(RecognizerError::from_response(response).await)
        }
    }

    /// Enumerates faces in an image via the detection service.
    pub async fn detect(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<Vec<DetectedFace>, RecognizerError> {
        let url = format!("{}/api/v1/detection/detect", self.config.compreface_url);
        let form = Form::new().part("file", Self::image_part(bytes, filename)?);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.detection_api_key)
            .query(&[("limit", "0"), ("face_plugins", DETECT_PLUGINS)])
            .multipart(form)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let parsed = response.json::<DetectApiResponse>().await?;
        debug!("detected {} faces in {}", parsed.result.len(), filename);
        Ok(parsed
            .result
            .into_iter()
            .map(|item| item.into_detected_face())
            .collect())
    }

    /// Matches every face in an image against the subject database.
    pub async fn recognize(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        prediction_count: usize,
    ) -> Result<Vec<RecognizedFace>, RecognizerError> {
        let url = format!("{}/api/v1/recognition/recognize", self.config.compreface_url);
        let form = Form::new().part("file", Self::image_part(bytes, filename)?);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.recognition_api_key)
            .query(&[
                ("limit", "0".to_string()),
                ("prediction_count", prediction_count.to_string()),
            ])
            .multipart(form)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let parsed = response.json::<RecognizeApiResponse>().await?;
        Ok(parsed
            .result
            .into_iter()
            .map(|item| item.into_recognized_face())
            .collect())
    }

    /// Matches a batch of 512-D embeddings; one candidate list per vector,
    /// in input order.
    pub async fn recognize_embeddings(
        &self,
        embeddings: &[Vec<f32>],
        prediction_count: usize,
    ) -> Result<Vec<Vec<SubjectSimilarity>>, RecognizerError> {
        let url = format!(
            "{}/api/v1/recognition/embeddings/recognize",
            self.config.compreface_url
        );
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.recognition_api_key)
            .query(&[("prediction_count", prediction_count.to_string())])
            .json(&json!({ "embeddings": embeddings }))
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let parsed = response.json::<EmbeddingRecognizeResponse>().await?;
        Ok(parsed
            .result
            .into_iter()
            .map(|item| item.similarities)
            .collect())
    }

    /// Enrolls an example image under a subject, creating the subject when
    /// it does not exist. Returns the recognizer-assigned image id.
    /// A name conflict surfaces as [`RecognizerError::Duplicate`].
    pub async fn add_subject(
        &self,
        name: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> Result<String, RecognizerError> {
        let url = format!("{}/api/v1/recognition/faces", self.config.compreface_url);
        let form = Form::new().part("file", Self::image_part(bytes, filename)?);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.recognition_api_key)
            .query(&[("subject", name)])
            .multipart(form)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let parsed = response.json::<AddSubjectResponse>().await?;
        debug!("enrolled face {} under subject {}", parsed.image_id, name);
        Ok(parsed.image_id)
    }

    pub async fn list_subjects(&self) -> Result<Vec<String>, RecognizerError> {
        let url = format!("{}/api/v1/recognition/subjects", self.config.compreface_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.config.recognition_api_key)
            .send()
            .await?;
        let response = Self::checked(response).await?;
        Ok(response.json::<SubjectsResponse>().await?.subjects)
    }

    /// Removes a subject and all its enrolled faces. Deleting a subject that
    /// is already gone is not an error.
    pub async fn delete_subject(&self, name: &str) -> Result<(), RecognizerError> {
        // Url::parse percent-encodes the spaces a canonical name contains
        let url = Url::parse(&format!(
            "{}/api/v1/recognition/subjects/{}",
            self.config.compreface_url, name
        ))
        .map_err(|_| RecognizerError::Status {
            status: 0,
            body: format!("unbuildable subject url for {}", name),
        })?;
        let response = self
            .client
            .delete(url)
            .header("x-api-key", &self.config.recognition_api_key)
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            debug!("subject {} already absent", name);
            return Ok(());
        }
        Self::checked(response).await?;
        Ok(())
    }

    pub async fn list_faces(&self, name: &str) -> Result<Vec<String>, RecognizerError> {
        let url = format!("{}/api/v1/recognition/faces", self.config.compreface_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.config.recognition_api_key)
            .query(&[("subject", name)])
            .send()
            .await?;
        let response = Self::checked(response).await?;
        Ok(response
            .json::<FacesResponse>()
            .await?
            .faces
            .into_iter()
            .map(|f| f.image_id)
            .collect())
    }

    /// Removes one enrolled face image. Idempotent like [`delete_subject`].
    pub async fn delete_face(&self, image_id: &str) -> Result<(), RecognizerError> {
        let url = format!(
            "{}/api/v1/recognition/faces/{}",
            self.config.compreface_url, image_id
        );
        let response = self
            .client
            .delete(&url)
            .header("x-api-key", &self.config.recognition_api_key)
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(());
        }
        Self::checked(response).await?;
        Ok(())
    }
}

#[async_trait]
impl FaceDetector for CompreFaceClient {
    async fn detect_faces(
        &self,
        bytes: &[u8],
        filename: &str,
        _batch_mode: bool,
    ) -> anyhow::Result<Vec<DetectedFace>> {
        Ok(self.detect(bytes.to_vec(), filename).await?)
    }
}
