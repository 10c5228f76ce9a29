use compreface_api::RecognizerError;
use shared_api::naming;
use shared_api::TaskSummary;
use stash_api::filters::{FindFilter, PerformerFilter};
use stash_contracts::{Performer, PerformerCreateInput, PerformerUpdateInput};
use tracing::{debug, info, warn};

use crate::batch::{run_batched, ItemOutcome, PageMode};
use crate::TaskEngine;

impl TaskEngine {
    /// Binds library performers to recognizer subjects: every unsynced
    /// performer that already carries a subject alias or has a real primary
    /// image gets a subject enrolled from that image, then the *synced* tag.
    pub(crate) async fn run_sync_performers(&self) -> anyhow::Result<TaskSummary> {
        let synced_id = self.tag_id(&self.settings().synced_tag_name).await?;
        let filter = PerformerFilter::excluding_tags(&[synced_id.clone()]);
        let config = self.batch_config(0, self.effective_page_mode(PageMode::Shrinking));
        let per_page = self.settings().max_batch_size as i64;
        let run = run_batched(
            &config,
            self.cancel_token(),
            |fraction| self.report_fraction(fraction),
            |page| {
                let filter = &filter;
                let stash = self.stash();
                async move {
                    let (performers, count) = stash
                        .find_performers(&FindFilter::page(page, per_page), filter)
                        .await?;
                    Ok((performers, count))
                }
            },
            |performer: &Performer| performer.id.clone(),
            |performer| {
                let synced_id = &synced_id;
                async move { self.sync_performer(&performer, synced_id).await }
            },
        )
        .await?;
        Ok(run.summary)
    }

    async fn sync_performer(
        &self,
        performer: &Performer,
        synced_tag_id: &str,
    ) -> anyhow::Result<ItemOutcome> {
        let existing_alias = naming::find_person_alias(performer);
        if existing_alias.is_none() && !performer.has_custom_image() {
            debug!(
                "performer {} has neither a subject alias nor an uploaded image, skipping",
                performer.id
            );
            return Ok(ItemOutcome::skipped());
        }
        let Some(image_url) = performer
            .image_path
            .as_ref()
            .filter(|_| performer.has_custom_image())
        else {
            warn!(
                "performer {} has no usable primary image, skipping",
                performer.id
            );
            return Ok(ItemOutcome::skipped());
        };

        // an existing alias is the subject name; otherwise mint one and put
        // it at the head of the alias list
        let subject_name = match existing_alias {
            Some(alias) => alias,
            None => {
                let name = naming::create_subject_name(&performer.id);
                let mut aliases = Vec::with_capacity(performer.alias_list.len() + 1);
                aliases.push(name.clone());
                aliases.extend(performer.alias_list.iter().cloned());
                self.apply_performer_update(&PerformerUpdateInput {
                    id: performer.id.clone(),
                    alias_list: Some(aliases),
                    ..Default::default()
                })
                .await?;
                name
            }
        };

        let bytes = self.stash().download(image_url).await?;
        let filename = format!("performer_{}.jpg", performer.id);
        self.enroll_subject(&subject_name, bytes, &filename).await?;

        let mut tags: Vec<String> = performer.tags.iter().map(|t| t.id.clone()).collect();
        if !tags.iter().any(|t| t == synced_tag_id) {
            tags.push(synced_tag_id.to_string());
            self.apply_performer_update(&PerformerUpdateInput {
                id: performer.id.clone(),
                tag_ids: Some(tags),
                ..Default::default()
            })
            .await?;
        }
        info!(
            "performer {} synced as subject {}",
            performer.id, subject_name
        );
        Ok(ItemOutcome {
            created: 1,
            ..Default::default()
        })
    }

    /// Enrolls an example image under a subject. A duplicate-name conflict
    /// is recovered once by deleting the stale subject and retrying.
    pub(crate) async fn enroll_subject(
        &self,
        subject_name: &str,
        bytes: Vec<u8>,
        filename: &str,
    ) -> anyhow::Result<()> {
        if self.settings().dry_run {
            info!("dry run: skipping enrollment of subject {}", subject_name);
            return Ok(());
        }
        match self
            .recognizer()
            .add_subject(subject_name, bytes.clone(), filename)
            .await
        {
            Ok(_) => Ok(()),
            Err(RecognizerError::Duplicate) => {
                warn!("subject {} already exists, replacing it", subject_name);
                self.recognizer().delete_subject(subject_name).await?;
                self.recognizer()
                    .add_subject(subject_name, bytes, filename)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Materializes a new performer for an unmatched face: a placeholder
    /// display name, the canonical alias (which doubles as the display name
    /// until someone renames it), and a subject enrolled from the given
    /// bytes. Returns the new performer id, or `None` on a dry run.
    pub(crate) async fn create_performer_for_face(
        &self,
        bytes: Vec<u8>,
        filename: &str,
    ) -> anyhow::Result<Option<String>> {
        if self.settings().dry_run {
            info!(
                "dry run: would create a performer from a face in {}",
                filename
            );
            return Ok(None);
        }
        let placeholder = format!("Unknown {}", naming::random_token(8));
        let performer = self
            .stash()
            .create_performer(&PerformerCreateInput {
                name: placeholder,
                alias_list: None,
            })
            .await?;
        let subject_name = naming::create_subject_name(&performer.id);
        self.stash()
            .update_performer(&PerformerUpdateInput {
                id: performer.id.clone(),
                name: Some(subject_name.clone()),
                alias_list: Some(vec![subject_name.clone()]),
                tag_ids: None,
            })
            .await?;
        self.enroll_subject(&subject_name, bytes, filename).await?;
        info!(
            "created performer {} bound to subject {}",
            performer.id, subject_name
        );
        Ok(Some(performer.id))
    }

    /// Short path for the host's context-menu action: run single-image
    /// identification with creation enabled for the first face.
    pub(crate) async fn run_create_performer_from_image(
        &self,
        image_id: &str,
    ) -> anyhow::Result<TaskSummary> {
        self.run_identify_single(image_id, true).await
    }
}
