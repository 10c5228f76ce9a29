use compreface_api::RecognizedFace;
use shared_api::naming;
use shared_api::{AcceptancePolicy, DetectedFace, TaskSummary};
use stash_api::filters::{FindFilter, ImageFilter};
use stash_contracts::{Image, ImageUpdateInput};
use tracing::debug;

use crate::batch::{run_batched, ItemOutcome, PageMode};
use crate::mode::RecognitionQuality;
use crate::TaskEngine;

const MIN_CORRELATION_IOU: f64 = 0.5;

/// Pairs recognizer output with quality-filtered detections by best bbox
/// overlap. A recognition binds to the detection it overlaps most; equal
/// overlap goes to the more confident detection; a detection keeps only its
/// best recognition.
pub(crate) fn correlate<'a>(
    detections: &[DetectedFace],
    recognitions: &'a [RecognizedFace],
) -> Vec<(usize, &'a RecognizedFace)> {
    let mut best_per_detection: Vec<Option<(f64, &'a RecognizedFace)>> =
        vec![None; detections.len()];
    for recognition in recognitions {
        let mut best: Option<(usize, f64)> = None;
        for (idx, detection) in detections.iter().enumerate() {
            let iou = detection.bbox.iou(&recognition.bbox);
            if iou < MIN_CORRELATION_IOU {
                continue;
            }
            best = match best {
                None => Some((idx, iou)),
                Some((best_idx, best_iou)) => {
                    if iou > best_iou
                        || (iou == best_iou
                            && detections[idx].confidence > detections[best_idx].confidence)
                    {
                        Some((idx, iou))
                    } else {
                        Some((best_idx, best_iou))
                    }
                }
            };
        }
        if let Some((idx, iou)) = best {
            match best_per_detection[idx] {
                Some((existing, _)) if existing >= iou => {}
                _ => best_per_detection[idx] = Some((iou, recognition)),
            }
        }
    }
    best_per_detection
        .into_iter()
        .enumerate()
        .filter_map(|(idx, slot)| slot.map(|(_, recognition)| (idx, recognition)))
        .collect()
}

/// Set union that keeps the prior members' relative order and appends new
/// members in first-seen order, without duplicates.
pub(crate) fn merge_ordered(prior: &[String], additions: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(prior.len() + additions.len());
    for id in prior.iter().chain(additions.iter()) {
        if !merged.iter().any(|existing| existing == id) {
            merged.push(id.clone());
        }
    }
    merged
}

fn image_filename(image: &Image) -> String {
    image
        .files
        .first()
        .and_then(|f| std::path::Path::new(&f.path).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("image_{}.jpg", image.id))
}

impl TaskEngine {
    /// The common image subroutine: download, detect, quality-gate,
    /// recognize once, correlate client-side, bind accepted subjects to
    /// performers, write the merged performer set, then tag.
    pub(crate) async fn process_image_entity(
        &self,
        image: &Image,
        policy: &AcceptancePolicy,
        create_missing: bool,
        explicit_first_face: bool,
    ) -> anyhow::Result<ItemOutcome> {
        let filename = image_filename(image);
        let bytes = self
            .stash()
            .download(&self.stash().image_download_url(&image.id))
            .await?;
        let detections = self.detector().detect_faces(&bytes, &filename, true).await?;
        let kept: Vec<DetectedFace> = detections
            .into_iter()
            .filter(|face| {
                let decision = policy.should_process_in_batch(face);
                if !decision.accepted {
                    debug!(
                        "image {}: dropping face, {} ({:?})",
                        image.id, decision.reason, decision.metrics.reasons
                    );
                }
                decision.accepted
            })
            .collect();

        let mut bound: Vec<String> = Vec::new();
        let mut created = 0usize;

        if !kept.is_empty() {
            let recognitions = self
                .recognizer()
                .recognize(bytes.clone(), &filename, 1)
                .await?;
            let pairs = correlate(&kept, &recognitions);
            let mut face_matched = vec![false; kept.len()];
            for (det_idx, recognition) in &pairs {
                let face = &kept[*det_idx];
                let Some(top) = recognition.subjects.first() else {
                    continue;
                };
                if top.similarity < self.settings().min_similarity {
                    continue;
                }
                let decision = policy.should_match_to_subject(face, top.similarity);
                if !decision.accepted {
                    debug!(
                        "image {}: rejecting match to {} at {:.3}, {}",
                        image.id, top.subject, top.similarity, decision.reason
                    );
                    continue;
                }
                let Some(performer_id) = naming::extract_performer_id(&top.subject) else {
                    debug!(
                        "image {}: subject {} is not a bound subject, ignoring",
                        image.id, top.subject
                    );
                    continue;
                };
                face_matched[*det_idx] = true;
                if !bound.contains(&performer_id) {
                    bound.push(performer_id);
                }
            }

            if create_missing {
                for (idx, face) in kept.iter().enumerate() {
                    if face_matched[idx] {
                        if explicit_first_face {
                            break;
                        }
                        continue;
                    }
                    let explicit_index = if explicit_first_face && idx == 0 {
                        Some(0)
                    } else {
                        None
                    };
                    let decision = policy.should_create_subject(face, explicit_index);
                    if !decision.accepted {
                        debug!(
                            "image {}: not seeding a subject from face {}, {}",
                            image.id, idx, decision.reason
                        );
                        if explicit_first_face {
                            break;
                        }
                        continue;
                    }
                    if let Some(performer_id) = self
                        .create_performer_for_face(bytes.clone(), &filename)
                        .await?
                    {
                        created += 1;
                        if !bound.contains(&performer_id) {
                            bound.push(performer_id);
                        }
                    }
                    if explicit_first_face {
                        break;
                    }
                }
            }
        }

        let matched_any = !bound.is_empty();
        let prior = image.performer_ids();
        let merged = merge_ordered(&prior, &bound);
        if merged != prior {
            self.apply_image_update(&ImageUpdateInput {
                id: image.id.clone(),
                performer_ids: Some(merged),
                tag_ids: None,
            })
            .await?;
        }
        self.tag_image(image, matched_any).await?;

        Ok(ItemOutcome {
            matched: matched_any,
            created,
            skipped: false,
            performers: bound,
        })
    }

    /// Tag writes in the mandated order: *matched* (when any face bound)
    /// before *scanned*.
    async fn tag_image(&self, image: &Image, matched: bool) -> anyhow::Result<()> {
        let mut tags = image.tag_ids();
        if matched {
            let matched_id = self.tag_id(&self.settings().matched_tag_name).await?;
            if !tags.contains(&matched_id) {
                tags.push(matched_id);
                self.apply_image_update(&ImageUpdateInput {
                    id: image.id.clone(),
                    tag_ids: Some(tags.clone()),
                    performer_ids: None,
                })
                .await?;
            }
        }
        let scanned_id = self.tag_id(&self.settings().scanned_tag_name).await?;
        if !tags.contains(&scanned_id) {
            tags.push(scanned_id);
            self.apply_image_update(&ImageUpdateInput {
                id: image.id.clone(),
                tag_ids: Some(tags),
                performer_ids: None,
            })
            .await?;
        }
        Ok(())
    }

    pub(crate) async fn run_identify_images(
        &self,
        only_new: bool,
        limit: i64,
    ) -> anyhow::Result<TaskSummary> {
        self.image_loop(only_new, limit, false, self.policy().clone())
            .await
    }

    /// Like identification, but faces that fail to match may seed new
    /// subjects and performers. Low quality swaps in the permissive policy.
    pub(crate) async fn run_recognize_images(
        &self,
        quality: RecognitionQuality,
        limit: i64,
    ) -> anyhow::Result<TaskSummary> {
        let policy = match quality {
            RecognitionQuality::High => self.policy().clone(),
            RecognitionQuality::Low => {
                AcceptancePolicy::permissive().with_min_face_size(self.settings().min_face_size)
            }
        };
        self.image_loop(true, limit, true, policy).await
    }

    async fn image_loop(
        &self,
        only_new: bool,
        limit: i64,
        create_missing: bool,
        policy: AcceptancePolicy,
    ) -> anyhow::Result<TaskSummary> {
        let image_filter = if only_new {
            let scanned = self.tag_id(&self.settings().scanned_tag_name).await?;
            ImageFilter::excluding_tags(&[scanned])
        } else {
            ImageFilter::default()
        };
        let page_mode = self.effective_page_mode(if only_new {
            PageMode::Shrinking
        } else {
            PageMode::Stable
        });
        let config = self.batch_config(limit, page_mode);
        let per_page = self.settings().max_batch_size as i64;
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
                async move {
                    self.process_image_entity(&image, policy, create_missing, false)
                        .await
                }
            },
        )
        .await?;
        Ok(run.summary)
    }

    /// Single-image identification; with `create_performer` the first face
    /// may seed a new subject even below the policy's tier gate.
    pub(crate) async fn run_identify_single(
        &self,
        image_id: &str,
        create_performer: bool,
    ) -> anyhow::Result<TaskSummary> {
        let image = self.stash().get_image(image_id).await?;
        let outcome = self
            .process_image_entity(&image, self.policy(), create_performer, create_performer)
            .await?;
        self.report_fraction(1.0);
        Ok(TaskSummary {
            processed: 1,
            matched: outcome.matched as usize,
            created: outcome.created,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compreface_api::SubjectSimilarity;
    use shared_api::BoundingBox;

    fn detection(x: i64, y: i64, size: i64, confidence: f64) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox::new(x, y, x + size, y + size),
            confidence,
            pose: "front".into(),
            landmarks: 5,
            masked: false,
            embedding: None,
        }
    }

    fn recognition(x: i64, y: i64, size: i64, subject: &str) -> RecognizedFace {
        RecognizedFace {
            bbox: BoundingBox::new(x, y, x + size, y + size),
            subjects: vec![SubjectSimilarity {
                subject: subject.into(),
                similarity: 0.95,
            }],
        }
    }

    #[test]
    fn correlate_pairs_by_overlap() {
        let detections = vec![detection(0, 0, 100, 2.0), detection(300, 300, 100, 2.0)];
        let recognitions = vec![
            recognition(305, 305, 100, "Person 2 AAAAAAAAAAAAAAAA"),
            recognition(2, 2, 100, "Person 1 AAAAAAAAAAAAAAAA"),
        ];
        let pairs = correlate(&detections, &recognitions);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, 0);
        assert_eq!(pairs[0].1.subjects[0].subject, "Person 1 AAAAAAAAAAAAAAAA");
        assert_eq!(pairs[1].0, 1);
        assert_eq!(pairs[1].1.subjects[0].subject, "Person 2 AAAAAAAAAAAAAAAA");
    }

    #[test]
    fn correlate_drops_low_overlap() {
        let detections = vec![detection(0, 0, 100, 2.0)];
        let recognitions = vec![recognition(90, 90, 100, "Person 1 AAAAAAAAAAAAAAAA")];
        assert!(correlate(&detections, &recognitions).is_empty());
    }

    #[test]
    fn correlate_ties_prefer_confident_detection() {
        // two identical boxes, different confidences
        let detections = vec![detection(0, 0, 100, 1.0), detection(0, 0, 100, 3.0)];
        let recognitions = vec![recognition(0, 0, 100, "Person 1 AAAAAAAAAAAAAAAA")];
        let pairs = correlate(&detections, &recognitions);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, 1);
    }

    #[test]
    fn correlate_keeps_best_recognition_per_detection() {
        let detections = vec![detection(0, 0, 100, 2.0)];
        let recognitions = vec![
            recognition(40, 0, 100, "Person 1 AAAAAAAAAAAAAAAA"),
            recognition(5, 5, 100, "Person 2 AAAAAAAAAAAAAAAA"),
        ];
        let pairs = correlate(&detections, &recognitions);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1.subjects[0].subject, "Person 2 AAAAAAAAAAAAAAAA");
    }

    #[test]
    fn merge_keeps_prior_order_and_deduplicates() {
        let prior = vec!["5".to_string(), "2".to_string()];
        let additions = vec!["2".to_string(), "9".to_string(), "9".to_string()];
        assert_eq!(merge_ordered(&prior, &additions), vec!["5", "2", "9"]);
    }

    #[test]
    fn merge_with_no_additions_is_identity() {
        let prior = vec!["1".to_string(), "2".to_string()];
        assert_eq!(merge_ordered(&prior, &[]), prior);
    }

    #[test]
    fn merge_deduplicates_prior_members() {
        let prior = vec!["1".to_string(), "1".to_string(), "2".to_string()];
        assert_eq!(merge_ordered(&prior, &[]), vec!["1", "2"]);
    }

    #[test]
    fn image_filename_falls_back_to_id() {
        let image = Image {
            id: "17".into(),
            ..Default::default()
        };
        assert_eq!(image_filename(&image), "image_17.jpg");
        let image = Image {
            id: "17".into(),
            files: vec![stash_contracts::FileRef {
                path: "/media/img/party.jpg".into(),
            }],
            ..Default::default()
        };
        assert_eq!(image_filename(&image), "party.jpg");
    }
}
