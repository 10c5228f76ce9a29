use std::net::IpAddr;

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// Host-stored plugin settings, merged over built-in defaults. Keys follow
/// the library's camelCase config convention.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub compreface_url: Option<String>,
    pub recognition_api_key: Option<String>,
    pub detection_api_key: Option<String>,
    pub verification_api_key: Option<String>,
    /// Scene analyzer base URL; the scene workflows are off when unset.
    pub vision_service_url: Option<String>,
    /// External quality service base URL; detection falls back to the
    /// recognizer when unset.
    pub quality_service_url: Option<String>,
    /// Library base URL for media downloads when it differs from the host
    /// connection.
    pub stash_host_url: Option<String>,
    pub cooldown_seconds: u64,
    pub max_batch_size: usize,
    pub min_similarity: f64,
    pub min_face_size: u32,
    pub min_scene_confidence_score: f64,
    pub min_scene_quality_score: f64,
    pub min_scene_processing_quality_score: f64,
    pub enhance_quality_score_trigger: f64,
    pub quality_policy: String,
    pub use_sprites: bool,
    pub dry_run: bool,
    pub scanned_tag_name: String,
    pub matched_tag_name: String,
    pub partial_tag_name: String,
    pub complete_tag_name: String,
    pub synced_tag_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            compreface_url: None,
            recognition_api_key: None,
            detection_api_key: None,
            verification_api_key: None,
            vision_service_url: None,
            quality_service_url: None,
            stash_host_url: None,
            cooldown_seconds: 10,
            max_batch_size: 20,
            min_similarity: 0.81,
            min_face_size: 64,
            min_scene_confidence_score: 0.7,
            min_scene_quality_score: 0.65,
            min_scene_processing_quality_score: 0.2,
            enhance_quality_score_trigger: 0.5,
            quality_policy: "balanced".to_string(),
            use_sprites: false,
            dry_run: false,
            scanned_tag_name: "scanned".to_string(),
            matched_tag_name: "matched".to_string(),
            partial_tag_name: "partial".to_string(),
            complete_tag_name: "complete".to_string(),
            synced_tag_name: "synced".to_string(),
        }
    }
}

impl Settings {
    /// Parses the plugin section of the library configuration document.
    /// Absent or null sections yield the defaults.
    pub fn from_plugin_config(value: Value) -> anyhow::Result<Self> {
        if value.is_null() {
            return Ok(Settings::default());
        }
        serde_json::from_value(value).context("malformed plugin settings")
    }

    /// Rejects configurations no task can run under. Called once before any
    /// work starts.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.recognition_api_key.as_deref().unwrap_or("").is_empty() {
            bail!("recognitionApiKey is required");
        }
        if self.detection_api_key.as_deref().unwrap_or("").is_empty() {
            bail!("detectionApiKey is required");
        }
        if self.cooldown_seconds == 0 {
            bail!("cooldownSeconds must be positive");
        }
        if self.max_batch_size == 0 {
            bail!("maxBatchSize must be positive");
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            bail!("minSimilarity must be within [0, 1]");
        }
        if self.min_face_size == 0 {
            bail!("minFaceSize must be at least 1");
        }
        for (key, url) in [
            ("comprefaceUrl", &self.compreface_url),
            ("visionServiceUrl", &self.vision_service_url),
            ("qualityServiceUrl", &self.quality_service_url),
            ("stashHostUrl", &self.stash_host_url),
        ] {
            if let Some(url) = url {
                Url::parse(url).with_context(|| format!("{} is not a valid URL", key))?;
            }
        }
        Ok(())
    }
}

/// Hostnames the resolver must leave untouched: they only mean something to
/// the machine making the request.
const PRESERVED_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "host.docker.internal"];

/// Replaces a service URL's hostname with its first resolved address.
/// Loopback-ish names and IP literals pass through; any failure falls back
/// to the original URL.
pub async fn resolve_service_url(raw: &str) -> String {
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            warn!("cannot parse service url {}: {}", raw, e);
            return raw.to_string();
        }
    };
    let host = match parsed.host_str() {
        Some(host) => host.to_string(),
        None => return raw.to_string(),
    };
    if PRESERVED_HOSTS.contains(&host.as_str()) || host.parse::<IpAddr>().is_ok() {
        return raw.to_string();
    }
    let port = match parsed.port_or_known_default() {
        Some(port) => port,
        None => return raw.to_string(),
    };
    match tokio::net::lookup_host((host.clone(), port)).await {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => {
                let mut resolved = parsed.clone();
                if resolved.set_ip_host(addr.ip()).is_err() {
                    return raw.to_string();
                }
                debug!("resolved service host {} to {}", host, addr.ip());
                let mut out = resolved.to_string();
                // Url::to_string normalizes an empty path to "/", which the
                // clients would turn into a double slash
                if !raw.ends_with('/') && out.ends_with('/') {
                    out.pop();
                }
                out
            }
            None => raw.to_string(),
        },
        Err(e) => {
            warn!("dns lookup failed for {}: {}, keeping original url", host, e);
            raw.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.cooldown_seconds, 10);
        assert_eq!(settings.max_batch_size, 20);
        assert_eq!(settings.min_similarity, 0.81);
        assert_eq!(settings.min_face_size, 64);
        assert_eq!(settings.scanned_tag_name, "scanned");
        assert!(settings.vision_service_url.is_none());
    }

    #[test]
    fn plugin_config_overrides_defaults_and_keeps_the_rest() {
        let settings = Settings::from_plugin_config(json!({
            "comprefaceUrl": "http://compreface:8000",
            "recognitionApiKey": "rk",
            "detectionApiKey": "dk",
            "maxBatchSize": 5,
            "scannedTagName": "face_scanned"
        }))
        .unwrap();
        assert_eq!(settings.compreface_url.as_deref(), Some("http://compreface:8000"));
        assert_eq!(settings.max_batch_size, 5);
        assert_eq!(settings.scanned_tag_name, "face_scanned");
        assert_eq!(settings.cooldown_seconds, 10);
    }

    #[test]
    fn null_plugin_config_yields_defaults() {
        let settings = Settings::from_plugin_config(Value::Null).unwrap();
        assert_eq!(settings.max_batch_size, 20);
    }

    #[test]
    fn validate_requires_api_keys() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_err());
        settings.recognition_api_key = Some("rk".into());
        assert!(settings.validate().is_err());
        settings.detection_api_key = Some("dk".into());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut settings = Settings::default();
        settings.recognition_api_key = Some("rk".into());
        settings.detection_api_key = Some("dk".into());
        settings.min_similarity = 1.5;
        assert!(settings.validate().is_err());
        settings.min_similarity = 0.81;
        settings.cooldown_seconds = 0;
        assert!(settings.validate().is_err());
        settings.cooldown_seconds = 10;
        settings.compreface_url = Some("not a url".into());
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    async fn resolver_preserves_local_hosts_and_literals() {
        for url in [
            "http://localhost:8000/api",
            "http://127.0.0.1:8000",
            "http://host.docker.internal:5000",
            "http://192.168.1.20:8000/api",
        ] {
            assert_eq!(resolve_service_url(url).await, url);
        }
    }

    #[tokio::test]
    async fn resolver_falls_back_on_unresolvable_host() {
        let url = "http://no-such-host.invalid:8000";
        assert_eq!(resolve_service_url(url).await, url);
    }
}
