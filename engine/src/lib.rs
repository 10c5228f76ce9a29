use std::sync::Arc;
use std::time::Duration;

use compreface_api::CompreFaceClient;
use shared_api::{
    AcceptancePolicy, CancellationToken, FaceDetector, ProgressReporter, Settings, TaskSummary,
};
use stash_api::StashClient;
use stash_contracts::{
    GalleryUpdateInput, ImageUpdateInput, PerformerUpdateInput, SceneUpdateInput,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use vision_api::VisionClient;

pub mod batch;
mod galleries;
mod images;
pub mod mode;
mod performers;
mod reset;
mod scenes;

use batch::{BatchConfig, PageMode};
pub use mode::{RecognitionQuality, TaskMode};

/// Runs exactly one task workflow per process lifetime. Owns the gateways,
/// the quality policy and the cancellation flag; every workflow shares the
/// batched loop in [`batch`].
pub struct TaskEngine {
    stash: Arc<StashClient>,
    recognizer: Arc<CompreFaceClient>,
    vision: Option<Arc<VisionClient>>,
    detector: Arc<dyn FaceDetector>,
    policy: AcceptancePolicy,
    settings: Settings,
    cancel: CancellationToken,
    progress: UnboundedSender<ProgressReporter>,
}

impl TaskEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stash: Arc<StashClient>,
        recognizer: Arc<CompreFaceClient>,
        vision: Option<Arc<VisionClient>>,
        detector: Arc<dyn FaceDetector>,
        settings: Settings,
        cancel: CancellationToken,
        progress: UnboundedSender<ProgressReporter>,
    ) -> Self {
        let policy = AcceptancePolicy::from_name(&settings.quality_policy)
            .with_min_face_size(settings.min_face_size);
        TaskEngine {
            stash,
            recognizer,
            vision,
            detector,
            policy,
            settings,
            cancel,
            progress,
        }
    }

    pub async fn run(&self, mode: TaskMode) -> anyhow::Result<TaskSummary> {
        self.message(format!("starting task {:?}", mode));
        let summary = match mode {
            TaskMode::SyncPerformers => self.run_sync_performers().await,
            TaskMode::RecognizeImages { quality, limit } => {
                self.run_recognize_images(quality, limit).await
            }
            TaskMode::IdentifyImages { only_new, limit } => {
                self.run_identify_images(only_new, limit).await
            }
            TaskMode::IdentifyImage {
                image_id,
                create_performer,
            } => self.run_identify_single(&image_id, create_performer).await,
            TaskMode::IdentifyGallery { gallery_id } => {
                self.run_identify_gallery(&gallery_id).await
            }
            TaskMode::ResetUnmatchedImages { limit } => self.run_reset_images(limit).await,
            TaskMode::ResetUnmatchedScenes { limit } => self.run_reset_scenes(limit).await,
            TaskMode::RecognizeScenes {
                only_new,
                use_sprites,
                limit,
            } => {
                self.run_recognize_scenes(only_new, use_sprites, limit)
                    .await
            }
            TaskMode::CreatePerformerFromImage { image_id } => {
                self.run_create_performer_from_image(&image_id).await
            }
        }?;
        if summary.created > 0 && !self.settings.dry_run {
            // new performers and aliases should show up in the library
            // without waiting for its next scheduled scan
            if let Err(e) = self.stash.trigger_metadata_scan().await {
                warn!("metadata scan trigger failed: {:#}", e);
            }
        }
        self.finish(summary.to_string());
        info!("task finished: {}", summary);
        Ok(summary)
    }

    pub(crate) fn report_fraction(&self, fraction: f64) {
        let _ = self
            .progress
            .send(ProgressReporter::Fraction(fraction.clamp(0.0, 1.0)));
    }

    pub(crate) fn message(&self, text: String) {
        let _ = self.progress.send(ProgressReporter::Message(text));
    }

    fn finish(&self, text: String) {
        let _ = self.progress.send(ProgressReporter::FinishWithMessage(text));
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn stash(&self) -> &StashClient {
        &self.stash
    }

    pub(crate) fn recognizer(&self) -> &CompreFaceClient {
        &self.recognizer
    }

    pub(crate) fn vision(&self) -> anyhow::Result<&VisionClient> {
        self.vision
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("visionServiceUrl is not configured"))
    }

    pub(crate) fn detector(&self) -> &dyn FaceDetector {
        self.detector.as_ref()
    }

    pub(crate) fn policy(&self) -> &AcceptancePolicy {
        &self.policy
    }

    /// Every tag id lookup goes through the gateway cache; the configured
    /// display name doubles as the lookup key.
    pub(crate) async fn tag_id(&self, name: &str) -> anyhow::Result<String> {
        Ok(self.stash.get_or_create_tag(name, name).await?)
    }

    pub(crate) fn batch_config(&self, limit: i64, page_mode: PageMode) -> BatchConfig {
        BatchConfig {
            max_batch_size: self.settings.max_batch_size,
            cooldown: Duration::from_secs(self.settings.cooldown_seconds),
            limit: if limit > 0 {
                Some(limit as usize)
            } else {
                None
            },
            page_mode,
        }
    }

    /// A dry run applies no exclusion tags, so shrinking queries would spin;
    /// walk pages forward instead.
    pub(crate) fn effective_page_mode(&self, preferred: PageMode) -> PageMode {
        if self.settings.dry_run {
            PageMode::Stable
        } else {
            preferred
        }
    }

    pub(crate) async fn apply_image_update(
        &self,
        input: &ImageUpdateInput,
    ) -> anyhow::Result<()> {
        if self.settings.dry_run {
            info!("dry run: skipping update of image {}", input.id);
            return Ok(());
        }
        Ok(self.stash.update_image(input).await?)
    }

    pub(crate) async fn apply_scene_update(
        &self,
        input: &SceneUpdateInput,
    ) -> anyhow::Result<()> {
        if self.settings.dry_run {
            info!("dry run: skipping update of scene {}", input.id);
            return Ok(());
        }
        Ok(self.stash.update_scene(input).await?)
    }

    pub(crate) async fn apply_gallery_update(
        &self,
        input: &GalleryUpdateInput,
    ) -> anyhow::Result<()> {
        if self.settings.dry_run {
            info!("dry run: skipping update of gallery {}", input.id);
            return Ok(());
        }
        Ok(self.stash.update_gallery(input).await?)
    }

    pub(crate) async fn apply_performer_update(
        &self,
        input: &PerformerUpdateInput,
    ) -> anyhow::Result<()> {
        if self.settings.dry_run {
            info!("dry run: skipping update of performer {}", input.id);
            return Ok(());
        }
        Ok(self.stash.update_performer(input).await?)
    }
}
