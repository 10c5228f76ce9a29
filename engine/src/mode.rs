use std::collections::HashMap;

use anyhow::{anyhow, bail};
use serde_json::Value;

/// Closed set of task modes the host can request. One mode maps to one
/// workflow; anything else is rejected before any work starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskMode {
    SyncPerformers,
    RecognizeImages {
        quality: RecognitionQuality,
        limit: i64,
    },
    IdentifyImages {
        only_new: bool,
        limit: i64,
    },
    IdentifyImage {
        image_id: String,
        create_performer: bool,
    },
    IdentifyGallery {
        gallery_id: String,
    },
    ResetUnmatchedImages {
        limit: i64,
    },
    ResetUnmatchedScenes {
        limit: i64,
    },
    RecognizeScenes {
        only_new: bool,
        use_sprites: Option<bool>,
        limit: i64,
    },
    CreatePerformerFromImage {
        image_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionQuality {
    High,
    Low,
}

fn arg_str(args: &HashMap<String, Value>, key: &str) -> Option<String> {
    match args.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn arg_i64(args: &HashMap<String, Value>, key: &str, default: i64) -> i64 {
    match args.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(default),
        Some(Value::String(s)) => s.parse().unwrap_or(default),
        _ => default,
    }
}

fn arg_bool(args: &HashMap<String, Value>, key: &str, default: bool) -> bool {
    match args.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true" || s == "1",
        _ => default,
    }
}

impl TaskMode {
    /// Parses the host's `args` block. `mode` is required; per-mode
    /// arguments are read from their snake_case keys.
    pub fn from_args(args: &HashMap<String, Value>) -> anyhow::Result<TaskMode> {
        let mode = arg_str(args, "mode")
            .ok_or_else(|| anyhow!("task descriptor is missing the mode argument"))?;
        let limit = arg_i64(args, "limit", 0);
        let parsed = match mode.as_str() {
            "sync-performers" => TaskMode::SyncPerformers,
            "recognize-images-high" => TaskMode::RecognizeImages {
                quality: RecognitionQuality::High,
                limit,
            },
            "recognize-images-low" => TaskMode::RecognizeImages {
                quality: RecognitionQuality::Low,
                limit,
            },
            "identify-images-all" => TaskMode::IdentifyImages {
                only_new: false,
                limit,
            },
            "identify-images-new" => TaskMode::IdentifyImages {
                only_new: true,
                limit,
            },
            "identify-image" => TaskMode::IdentifyImage {
                image_id: arg_str(args, "image_id")
                    .ok_or_else(|| anyhow!("identify-image requires image_id"))?,
                create_performer: arg_bool(args, "create_performer", false),
            },
            "identify-gallery" => TaskMode::IdentifyGallery {
                gallery_id: arg_str(args, "gallery_id")
                    .ok_or_else(|| anyhow!("identify-gallery requires gallery_id"))?,
            },
            "reset-unmatched-images" => TaskMode::ResetUnmatchedImages { limit },
            "reset-unmatched-scenes" => TaskMode::ResetUnmatchedScenes { limit },
            "recognize-scenes-new" => TaskMode::RecognizeScenes {
                only_new: true,
                use_sprites: sprites_arg(args),
                limit,
            },
            "recognize-scenes-all" => TaskMode::RecognizeScenes {
                only_new: false,
                use_sprites: sprites_arg(args),
                limit,
            },
            "create-performer-from-image" => TaskMode::CreatePerformerFromImage {
                image_id: arg_str(args, "image_id")
                    .ok_or_else(|| anyhow!("create-performer-from-image requires image_id"))?,
            },
            other => bail!("unknown task mode: {}", other),
        };
        Ok(parsed)
    }
}

fn sprites_arg(args: &HashMap<String, Value>) -> Option<bool> {
    match arg_str(args, "source").as_deref() {
        Some("sprites") => Some(true),
        Some("frames") => Some(false),
        _ => None,
    }
}
