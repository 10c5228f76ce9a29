mod poll;
mod quality_client;
mod vision_client;

pub use poll::{wait_for_completion, JobPoller, POLL_INTERVAL, WALL_CLOCK_BUDGET};
pub use quality_client::QualityServiceClient;
pub use vision_client::VisionClient;

/// Analyzer error kinds. `NotYetComplete` never escapes the polling loop;
/// `TimedOut` is imposed by this side and is distinct from a job the
/// analyzer itself failed.
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("job results are not available yet")]
    NotYetComplete,

    #[error("analysis job failed: {0}")]
    JobFailed(String),

    #[error("analysis job exceeded the wall-clock budget")]
    TimedOut,

    #[error("analyzer returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
