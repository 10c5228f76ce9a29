use std::fmt::{Display, Formatter};

use async_trait::async_trait;

pub mod cancel;
pub mod faces;
pub mod naming;
pub mod quality;
pub mod settings;

pub use cancel::CancellationToken;
pub use faces::{log_odds_score, BoundingBox, DetectedFace};
pub use quality::{AcceptancePolicy, Decision, QualityMetrics, QualityTier};
pub use settings::Settings;

/// Face detector capability.
/// Backed either by the recognizer's detection endpoint or by the remote
/// quality service; the task engine picks the backend, the backends stay
/// ignorant of each other.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect_faces(
        &self,
        bytes: &[u8],
        filename: &str,
        batch_mode: bool,
    ) -> anyhow::Result<Vec<DetectedFace>>;
}

/// ProgressReporter enum to report the progress of a running task
pub enum ProgressReporter {
    /// Overall task progress as a fraction in [0, 1]
    Fraction(f64),
    /// Set the progress message
    Message(String),
    /// Finish the progress with the given message
    FinishWithMessage(String),
}

/// Accumulated outcome of one task run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskSummary {
    /// The number of entities offered to recognition
    pub processed: usize,

    /// The number of entities where at least one face bound to a performer
    pub matched: usize,

    /// The number of performers or subjects newly created
    pub created: usize,

    /// The number of entities skipped (no usable image, filtered out)
    pub skipped: usize,

    /// The number of entities abandoned after an error
    pub failed: usize,
}

impl TaskSummary {
    /// merge the result of a sub-task into this one
    pub fn add(&mut self, other: &TaskSummary) {
        self.processed += other.processed;
        self.matched += other.matched;
        self.created += other.created;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl Display for TaskSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed: {}, matched: {}, created: {}, skipped: {}, failed: {}",
            self.processed, self.matched, self.created, self.skipped, self.failed
        )
    }
}
