mod compreface_client;
pub mod models;

pub use compreface_client::CompreFaceClient;
pub use models::{RecognizedFace, SubjectSimilarity};

/// Gateway error kinds the task engine branches on. Everything else is a
/// plain status or transport failure the caller logs and moves past.
#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    /// Subject creation conflicted with an existing subject of the same name
    #[error("subject already exists")]
    Duplicate,

    #[error("recognizer returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl RecognizerError {
    /// Folds a non-2xx response into an error, keeping only a prefix of the
    /// body for the log line.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => text.chars().take(256).collect(),
            Err(_) => String::new(),
        };
        if status == 409 || body.contains("already exists") {
            return RecognizerError::Duplicate;
        }
        RecognizerError::Status { status, body }
    }
}
