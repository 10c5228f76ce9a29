use shared_api::TaskSummary;
use stash_api::filters::{FindFilter, ImageFilter, SceneFilter};
use stash_contracts::{Image, ImageUpdateInput, Scene, SceneUpdateInput};
use tracing::debug;

use crate::batch::{run_batched, ItemOutcome, PageMode};
use crate::TaskEngine;

impl TaskEngine {
    /// Narrow undo: entities that were offered to recognition but produced
    /// no confident match lose the *scanned* tag so a later run (with a
    /// different policy, say) revisits them.
    pub(crate) async fn run_reset_images(&self, limit: i64) -> anyhow::Result<TaskSummary> {
        let scanned_id = self.tag_id(&self.settings().scanned_tag_name).await?;
        let matched_id = self.tag_id(&self.settings().matched_tag_name).await?;
        let filter = ImageFilter::with_all_tags(&[scanned_id.clone()]);
        let config = self.batch_config(limit, self.effective_page_mode(PageMode::Shrinking));
        let per_page = self.settings().max_batch_size as i64;
        let run = run_batched(
            &config,
            self.cancel_token(),
            |fraction| self.report_fraction(fraction),
            |page| {
                let filter = &filter;
                let stash = self.stash();
                async move {
                    let (images, count) = stash
                        .find_images(&FindFilter::page(page, per_page), filter)
                        .await?;
                    Ok((images, count))
                }
            },
            |image: &Image| image.id.clone(),
            |image| {
                let scanned_id = &scanned_id;
                let matched_id = &matched_id;
                async move {
                    if image.has_tag(matched_id) {
                        debug!("image {} matched before, keeping its tags", image.id);
                        return Ok(ItemOutcome::skipped());
                    }
                    let tags: Vec<String> = image
                        .tag_ids()
                        .into_iter()
                        .filter(|t| t != scanned_id)
                        .collect();
                    self.apply_image_update(&ImageUpdateInput {
                        id: image.id.clone(),
                        tag_ids: Some(tags),
                        performer_ids: None,
                    })
                    .await?;
                    Ok(ItemOutcome::processed())
                }
            },
        )
        .await?;
        Ok(run.summary)
    }

    pub(crate) async fn run_reset_scenes(&self, limit: i64) -> anyhow::Result<TaskSummary> {
        let scanned_id = self.tag_id(&self.settings().scanned_tag_name).await?;
        let matched_id = self.tag_id(&self.settings().matched_tag_name).await?;
        let filter = SceneFilter::with_all_tags(&[scanned_id.clone()]);
        let config = self.batch_config(limit, self.effective_page_mode(PageMode::Shrinking));
        let per_page = self.settings().max_batch_size as i64;
        let run = run_batched(
            &config,
            self.cancel_token(),
            |fraction| self.report_fraction(fraction),
            |page| {
                let filter = &filter;
                let stash = self.stash();
                async move {
                    let (scenes, count) = stash
                        .find_scenes(&FindFilter::page(page, per_page), filter)
                        .await?;
                    Ok((scenes, count))
                }
            },
            |scene: &Scene| scene.id.clone(),
            |scene| {
                let scanned_id = &scanned_id;
                let matched_id = &matched_id;
                async move {
                    if scene.has_tag(matched_id) {
                        debug!("scene {} matched before, keeping its tags", scene.id);
                        return Ok(ItemOutcome::skipped());
                    }
                    let tags: Vec<String> = scene
                        .tag_ids()
                        .into_iter()
                        .filter(|t| t != scanned_id)
                        .collect();
                    self.apply_scene_update(&SceneUpdateInput {
                        id: scene.id.clone(),
                        tag_ids: Some(tags),
                        performer_ids: None,
                    })
                    .await?;
                    Ok(ItemOutcome::processed())
                }
            },
        )
        .await?;
        Ok(run.summary)
    }
}
