use std::sync::Mutex;

use shared_api::TaskSummary;
use stash_api::filters::{CriterionModifier, FindFilter, HierarchicalMultiCriterion, ImageFilter};
use stash_contracts::{GalleryUpdateInput, Image};
use tracing::info;

use crate::batch::{run_batched, PageMode};
use crate::images::merge_ordered;
use crate::TaskEngine;

impl TaskEngine {
    /// Identifies every image of one gallery, propagates the accepted
    /// performers to the gallery entity, and marks it *complete* when all
    /// its images ended up *scanned*, *partial* otherwise.
    pub(crate) async fn run_identify_gallery(
        &self,
        gallery_id: &str,
    ) -> anyhow::Result<TaskSummary> {
        let gallery = self.stash().get_gallery(gallery_id).await?;
        info!(
            "identifying gallery {} with {} images",
            gallery.id, gallery.image_count
        );
        let image_filter = ImageFilter::in_gallery(gallery_id);
        // gallery membership does not shrink as images are tagged
        let config = self.batch_config(0, PageMode::Stable);
        let per_page = self.settings().max_batch_size as i64;
        let policy = self.policy().clone();
        let collected: Mutex<Vec<String>> = Mutex::new(Vec::new());

        let run = run_batched(
            &config,
            self.cancel_token(),
            |fraction| self.report_fraction(fraction),
            |page| {
                let filter = &image_filter;
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
                let policy = &policy;
                let collected = &collected;
                async move {
                    let outcome = self
                        .process_image_entity(&image, policy, false, false)
                        .await?;
                    collected
                        .lock()
                        .unwrap()
                        .extend(outcome.performers.iter().cloned());
                    Ok(outcome)
                }
            },
        )
        .await?;

        let bound = collected.into_inner().unwrap();
        let prior = gallery.performer_ids();
        let merged = merge_ordered(&prior, &bound);
        if merged != prior {
            self.apply_gallery_update(&GalleryUpdateInput {
                id: gallery.id.clone(),
                performer_ids: Some(merged),
                tag_ids: None,
            })
            .await?;
        }

        if !run.cancelled {
            let scanned_id = self.tag_id(&self.settings().scanned_tag_name).await?;
            let mut unscanned = ImageFilter::in_gallery(gallery_id);
            unscanned.tags = Some(HierarchicalMultiCriterion::tags(
                &[scanned_id],
                CriterionModifier::Excludes,
            ));
            let (_, remaining) = self
                .stash()
                .find_images(&FindFilter::page(1, 1), &unscanned)
                .await?;
            let outcome_tag = if remaining == 0 {
                &self.settings().complete_tag_name
            } else {
                &self.settings().partial_tag_name
            };
            let tag_id = self.tag_id(outcome_tag).await?;
            let mut tags = gallery.tag_ids();
            if !tags.contains(&tag_id) {
                tags.push(tag_id);
                self.apply_gallery_update(&GalleryUpdateInput {
                    id: gallery.id.clone(),
                    tag_ids: Some(tags),
                    performer_ids: None,
                })
                .await?;
            }
        }

        Ok(run.summary)
    }
}
