use shared_api::naming;
use shared_api::{log_odds_score, BoundingBox, DetectedFace, TaskSummary};
use stash_api::filters::{FindFilter, SceneFilter};
use stash_contracts::{Scene, SceneUpdateInput};
use tracing::{debug, info, warn};
use vision_api::wait_for_completion;
use vision_contracts::{
    AnalysisSource, EnhancementParameters, FaceDetection, FacesParameters,
};

use crate::batch::{run_batched, ItemOutcome, PageMode};
use crate::images::merge_ordered;
use crate::TaskEngine;

/// The analyzer source for a scene: sprite sheet when requested and
/// available, otherwise the original video file.
fn scene_source(scene: &Scene, use_sprites: bool) -> Option<AnalysisSource> {
    if use_sprites {
        if let (Some(vtt), Some(sprite)) = (&scene.paths.vtt, &scene.paths.sprite) {
            return Some(AnalysisSource::Sprites {
                vtt_url: vtt.clone(),
                image_url: sprite.clone(),
            });
        }
    }
    scene.files.first().map(|f| AnalysisSource::File {
        path: f.path.clone(),
    })
}

/// A clustered face's representative detection, reshaped for the quality
/// filter. The analyzer reports a bounded probability, so it gets the same
/// log-odds treatment as the recognizer's detections; the creation gates
/// below keep comparing the bounded wire values. The analyzer only clusters
/// faces it could landmark fully.
fn representative_face(rep: &FaceDetection, embedding: &[f32]) -> DetectedFace {
    DetectedFace {
        bbox: BoundingBox::new(rep.bbox[0], rep.bbox[1], rep.bbox[2], rep.bbox[3]),
        confidence: log_odds_score(rep.confidence),
        pose: rep.pose.clone(),
        landmarks: 5,
        masked: false,
        embedding: Some(embedding.to_vec()),
    }
}

impl TaskEngine {
    pub(crate) async fn run_recognize_scenes(
        &self,
        only_new: bool,
        use_sprites: Option<bool>,
        limit: i64,
    ) -> anyhow::Result<TaskSummary> {
        // fail before any work when the analyzer is not configured
        self.vision()?;
        let use_sprites = use_sprites.unwrap_or(self.settings().use_sprites);
        let scene_filter = if only_new {
            let scanned = self.tag_id(&self.settings().scanned_tag_name).await?;
            SceneFilter::excluding_tags(&[scanned])
        } else {
            SceneFilter::default()
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
                let filter = &scene_filter;
                let stash = self.stash();
                async move {
                    let (scenes, count) = stash
                        .find_scenes(&FindFilter::page(page, per_page), filter)
                        .await?;
                    Ok((scenes, count))
                }
            },
            |scene: &Scene| scene.id.clone(),
            |scene| async move { self.process_scene(&scene, use_sprites).await },
        )
        .await?;
        Ok(run.summary)
    }

    /// One scene: analyzer job, embedding recognition, quality gating on the
    /// representative detections, optional enrollment from an extracted
    /// frame, then performer-set and tag writeback.
    async fn process_scene(
        &self,
        scene: &Scene,
        use_sprites: bool,
    ) -> anyhow::Result<ItemOutcome> {
        let vision = self.vision()?;
        let Some(source) = scene_source(scene, use_sprites) else {
            warn!("scene {} has no file path to analyze, skipping", scene.id);
            return Ok(ItemOutcome::skipped());
        };

        let faces_params = FacesParameters {
            min_quality: self.settings().min_scene_processing_quality_score,
            ..FacesParameters::default()
        };
        let job_id = vision.submit(&source, &scene.id, &faces_params).await?;
        self.message(format!("analyzing scene {}", scene.id));
        let results = wait_for_completion(vision, &job_id, |fraction| {
            debug!("scene {} analysis at {:.0}%", scene.id, fraction * 100.0)
        })
        .await?;

        let candidates: Vec<_> = results
            .faces
            .iter()
            .filter(|face| {
                face.representative_detection.quality_score
                    >= self.settings().min_scene_processing_quality_score
            })
            .collect();

        let mut bound: Vec<String> = Vec::new();
        let mut created = 0usize;

        if !candidates.is_empty() {
            let embeddings: Vec<Vec<f32>> =
                candidates.iter().map(|f| f.embedding.clone()).collect();
            let predictions = self
                .recognizer()
                .recognize_embeddings(&embeddings, 1)
                .await?;

            for (face, prediction) in candidates.iter().zip(predictions.iter()) {
                let rep = &face.representative_detection;
                let detected = representative_face(rep, &face.embedding);
                let mut matched_this_face = false;

                if let Some(top) = prediction.first() {
                    if top.similarity >= self.settings().min_similarity {
                        let decision = self
                            .policy()
                            .should_match_to_subject(&detected, top.similarity);
                        if decision.accepted {
                            if let Some(performer_id) =
                                naming::extract_performer_id(&top.subject)
                            {
                                matched_this_face = true;
                                if !bound.contains(&performer_id) {
                                    bound.push(performer_id);
                                }
                            } else {
                                debug!(
                                    "scene {}: subject {} is not a bound subject",
                                    scene.id, top.subject
                                );
                            }
                        } else {
                            debug!(
                                "scene {}: face {} rejected, {}",
                                scene.id, face.face_id, decision.reason
                            );
                        }
                    }
                }

                if !matched_this_face
                    && rep.confidence >= self.settings().min_scene_confidence_score
                    && rep.quality_score >= self.settings().min_scene_quality_score
                    && self.policy().should_create_subject(&detected, None).accepted
                {
                    // enroll a representative still; enhance it when the
                    // cluster's quality sits below the trigger
                    let enhancement = (rep.quality_score
                        < self.settings().enhance_quality_score_trigger)
                        .then_some(EnhancementParameters {
                            upscale: true,
                            denoise: true,
                        });
                    let frame = vision
                        .extract_frame(&source, rep.timestamp, enhancement.as_ref())
                        .await?;
                    let filename = format!("scene_{}_{}.jpg", scene.id, face.face_id);
                    if let Some(performer_id) =
                        self.create_performer_for_face(frame, &filename).await?
                    {
                        created += 1;
                        if !bound.contains(&performer_id) {
                            bound.push(performer_id);
                        }
                    }
                }
            }
        }

        let matched_any = !bound.is_empty();
        let prior = scene.performer_ids();
        let merged = merge_ordered(&prior, &bound);
        if merged != prior {
            self.apply_scene_update(&SceneUpdateInput {
                id: scene.id.clone(),
                performer_ids: Some(merged),
                tag_ids: None,
            })
            .await?;
        }
        self.tag_scene(scene, matched_any).await?;
        if matched_any {
            info!(
                "scene {} bound to performers {:?}",
                scene.id, bound
            );
        }

        Ok(ItemOutcome {
            matched: matched_any,
            created,
            skipped: false,
            performers: bound,
        })
    }

    async fn tag_scene(&self, scene: &Scene, matched: bool) -> anyhow::Result<()> {
        let mut tags = scene.tag_ids();
        if matched {
            let matched_id = self.tag_id(&self.settings().matched_tag_name).await?;
            if !tags.contains(&matched_id) {
                tags.push(matched_id);
                self.apply_scene_update(&SceneUpdateInput {
                    id: scene.id.clone(),
                    tag_ids: Some(tags.clone()),
                    performer_ids: None,
                })
                .await?;
            }
        }
        let scanned_id = self.tag_id(&self.settings().scanned_tag_name).await?;
        if !tags.contains(&scanned_id) {
            tags.push(scanned_id);
            self.apply_scene_update(&SceneUpdateInput {
                id: scene.id.clone(),
                tag_ids: Some(tags),
                performer_ids: None,
            })
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_contracts::{FileRef, ScenePaths};

    fn scene_with(paths: ScenePaths, files: Vec<FileRef>) -> Scene {
        Scene {
            id: "11".into(),
            paths,
            files,
            ..Default::default()
        }
    }

    #[test]
    fn source_prefers_sprites_when_requested_and_present() {
        let scene = scene_with(
            ScenePaths {
                sprite: Some("http://lib/scene/11_sprite.jpg".into()),
                vtt: Some("http://lib/scene/11_thumbs.vtt".into()),
            },
            vec![FileRef {
                path: "/m/11.mp4".into(),
            }],
        );
        match scene_source(&scene, true) {
            Some(AnalysisSource::Sprites { vtt_url, .. }) => {
                assert_eq!(vtt_url, "http://lib/scene/11_thumbs.vtt")
            }
            other => panic!("expected sprites source, got {:?}", other),
        }
    }

    #[test]
    fn source_falls_back_to_file_without_sprites() {
        let scene = scene_with(
            ScenePaths::default(),
            vec![FileRef {
                path: "/m/11.mp4".into(),
            }],
        );
        match scene_source(&scene, true) {
            Some(AnalysisSource::File { path }) => assert_eq!(path, "/m/11.mp4"),
            other => panic!("expected file source, got {:?}", other),
        }
    }

    #[test]
    fn source_is_none_for_empty_scene() {
        let scene = scene_with(ScenePaths::default(), vec![]);
        assert!(scene_source(&scene, false).is_none());
    }

    #[test]
    fn representative_face_carries_detection_attributes() {
        let rep = FaceDetection {
            timestamp: 31.0,
            bbox: [10, 20, 210, 240],
            confidence: 0.88,
            quality_score: 0.7,
            pose: "front-rotate-left".into(),
        };
        let face = representative_face(&rep, &[0.5; 8]);
        assert_eq!(face.bbox.width(), 200);
        assert_eq!(face.bbox.height(), 220);
        assert!((face.confidence - log_odds_score(0.88)).abs() < 1e-9);
        assert!(face.is_frontal());
        assert_eq!(face.embedding.unwrap().len(), 8);
    }
}
