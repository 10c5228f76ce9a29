use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};
use vision_contracts::{AnalysisResults, JobStatus, JobStatusResponse};

use crate::VisionError;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const WALL_CLOCK_BUDGET: Duration = Duration::from_secs(3600);

/// Transport seam for the polling loop, so the state machine is testable
/// without a running analyzer.
#[async_trait]
pub trait JobPoller: Send + Sync {
    async fn poll_status(&self, job_id: &str) -> Result<JobStatusResponse, VisionError>;
    async fn fetch_results(&self, job_id: &str) -> Result<AnalysisResults, VisionError>;
}

/// Polls a job to a terminal state and returns its results.
///
/// The state chain is linear: submitted → running/staged → completed,
/// failed, or the core-imposed timed-out. Reported progress is clamped and
/// never allowed to move backwards within one job.
pub async fn wait_for_completion<P, F>(
    poller: &P,
    job_id: &str,
    mut on_progress: F,
) -> Result<AnalysisResults, VisionError>
where
    P: JobPoller + ?Sized,
    F: FnMut(f64),
{
    let started = Instant::now();
    let mut reported = 0.0_f64;
    loop {
        let status = poller.poll_status(job_id).await?;
        let fraction = status.progress.clamp(0.0, 1.0).max(reported);
        if fraction > reported {
            reported = fraction;
        }
        on_progress(reported);
        match status.status {
            JobStatus::Completed => match poller.fetch_results(job_id).await {
                // completed status can race the results becoming readable;
                // stay in the loop, the budget still bounds us
                Err(VisionError::NotYetComplete) => {
                    debug!("job {} completed but results not readable yet", job_id);
                }
                other => return other,
            },
            JobStatus::Failed => {
                let cause = status
                    .error
                    .or(status.message)
                    .unwrap_or_else(|| "unspecified analyzer failure".to_string());
                return Err(VisionError::JobFailed(cause));
            }
            JobStatus::Accepted | JobStatus::Queued | JobStatus::Running => {
                if let Some(stage) = &status.stage {
                    debug!("job {} at stage {} ({:.0}%)", job_id, stage, reported * 100.0);
                }
            }
        }
        if started.elapsed() >= WALL_CLOCK_BUDGET {
            warn!("job {} exceeded {:?}", job_id, WALL_CLOCK_BUDGET);
            return Err(VisionError::TimedOut);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Plays back a scripted sequence of status responses; the last entry
    /// repeats forever.
    struct ScriptedPoller {
        script: Mutex<Vec<JobStatusResponse>>,
        results_failures: Mutex<usize>,
    }

    impl ScriptedPoller {
        fn new(script: Vec<JobStatusResponse>) -> Self {
            ScriptedPoller {
                script: Mutex::new(script),
                results_failures: Mutex::new(0),
            }
        }

        fn with_lagging_results(script: Vec<JobStatusResponse>, failures: usize) -> Self {
            ScriptedPoller {
                script: Mutex::new(script),
                results_failures: Mutex::new(failures),
            }
        }
    }

    fn status(status: JobStatus, progress: f64) -> JobStatusResponse {
        JobStatusResponse {
            status,
            progress,
            stage: None,
            message: None,
            error: None,
            summary: None,
        }
    }

    #[async_trait]
    impl JobPoller for ScriptedPoller {
        async fn poll_status(&self, _job_id: &str) -> Result<JobStatusResponse, VisionError> {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                Ok(script.remove(0))
            } else {
                Ok(script[0].clone())
            }
        }

        async fn fetch_results(&self, _job_id: &str) -> Result<AnalysisResults, VisionError> {
            let mut failures = self.results_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(VisionError::NotYetComplete);
            }
            Ok(AnalysisResults {
                faces: vec![],
                metadata: serde_json::Value::Null,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_running_states() {
        let poller = ScriptedPoller::new(vec![
            status(JobStatus::Accepted, 0.0),
            status(JobStatus::Running, 0.3),
            status(JobStatus::Running, 0.8),
            status(JobStatus::Completed, 1.0),
        ]);
        let mut reports = Vec::new();
        let results = wait_for_completion(&poller, "j1", |p| reports.push(p))
            .await
            .unwrap();
        assert!(results.faces.is_empty());
        assert_eq!(reports, vec![0.0, 0.3, 0.8, 1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_never_decreases() {
        let poller = ScriptedPoller::new(vec![
            status(JobStatus::Running, 0.6),
            status(JobStatus::Running, 0.4),
            status(JobStatus::Completed, 1.0),
        ]);
        let mut reports = Vec::new();
        wait_for_completion(&poller, "j1", |p| reports.push(p))
            .await
            .unwrap();
        assert_eq!(reports, vec![0.6, 0.6, 1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_carries_the_analyzer_error() {
        let mut failed = status(JobStatus::Failed, 0.5);
        failed.error = Some("decoder crashed".to_string());
        let poller = ScriptedPoller::new(vec![status(JobStatus::Running, 0.1), failed]);
        let err = wait_for_completion(&poller, "j1", |_| {}).await.unwrap_err();
        match err {
            VisionError::JobFailed(cause) => assert_eq!(cause, "decoder crashed"),
            other => panic!("expected JobFailed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_job_times_out_distinctly() {
        let poller = ScriptedPoller::new(vec![status(JobStatus::Running, 0.5)]);
        let err = wait_for_completion(&poller, "j1", |_| {}).await.unwrap_err();
        assert!(matches!(err, VisionError::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_results_never_surface_not_yet_complete() {
        let poller = ScriptedPoller::with_lagging_results(
            vec![status(JobStatus::Completed, 1.0)],
            2,
        );
        let results = wait_for_completion(&poller, "j1", |_| {}).await.unwrap();
        assert!(results.faces.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn progress_is_clamped_to_unit_interval() {
        let poller = ScriptedPoller::new(vec![
            status(JobStatus::Running, 3.7),
            status(JobStatus::Completed, 1.0),
        ]);
        let mut reports = Vec::new();
        wait_for_completion(&poller, "j1", |p| reports.push(p))
            .await
            .unwrap();
        assert_eq!(reports, vec![1.0, 1.0]);
    }
}
