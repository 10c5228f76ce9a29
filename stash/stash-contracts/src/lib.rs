use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection override options for the Stash library.
/// The canonical connection arrives on stdin from the plugin host; these
/// flags exist for running tasks by hand against a live server.
#[derive(Debug, clap::Parser, Clone)]
pub struct StashConfig {
    /// Base URL used for media downloads when it differs from the
    /// plugin-host connection (for example behind a reverse proxy)
    #[clap(long, env = "STASH_HOST_URL")]
    pub stash_host_url: Option<String>,

    /// Session cookie value for manual runs without a host descriptor
    #[clap(long, env = "STASH_SESSION_COOKIE")]
    pub stash_session_cookie: Option<String>,
}

/// Task descriptor written by the plugin host to stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginInput {
    pub server_connection: ServerConnection,
    #[serde(default)]
    pub args: HashMap<String, Value>,
}

/// The host serializes this block from Go, hence the field casing.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConnection {
    #[serde(rename = "Scheme")]
    pub scheme: String,
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "SessionCookie", default)]
    pub session_cookie: Option<SessionCookie>,
    #[serde(rename = "Dir", default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionCookie {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

impl ServerConnection {
    pub fn base_url(&self) -> String {
        // 0.0.0.0 is a listen address, not a connect address
        let host = if self.host == "0.0.0.0" {
            "localhost"
        } else {
            self.host.as_str()
        };
        format!("{}://{}:{}", self.scheme, host, self.port)
    }

    pub fn graphql_url(&self) -> String {
        format!("{}/graphql", self.base_url())
    }

    /// Cookie header value, empty when the server runs without auth.
    pub fn cookie_header(&self) -> Option<String> {
        self.session_cookie
            .as_ref()
            .map(|c| format!("{}={}", c.name, c.value))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Performer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub alias_list: Vec<String>,
    /// Serving URL of the primary image; the library substitutes a generated
    /// placeholder (`default=true` query) when none was uploaded.
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Performer {
    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }

    /// True when the primary image is a real upload rather than the
    /// library-generated placeholder.
    pub fn has_custom_image(&self) -> bool {
        match &self.image_path {
            Some(url) => !url.contains("default=true"),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub performers: Vec<IdRef>,
}

impl Image {
    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }

    pub fn performer_ids(&self) -> Vec<String> {
        self.performers.iter().map(|p| p.id.clone()).collect()
    }

    pub fn tag_ids(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenePaths {
    #[serde(default)]
    pub sprite: Option<String>,
    #[serde(default)]
    pub vtt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scene {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
    #[serde(default)]
    pub paths: ScenePaths,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub performers: Vec<IdRef>,
}

impl Scene {
    pub fn has_tag(&self, tag_id: &str) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }

    pub fn performer_ids(&self) -> Vec<String> {
        self.performers.iter().map(|p| p.id.clone()).collect()
    }

    pub fn tag_ids(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Gallery {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image_count: u64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub performers: Vec<IdRef>,
}

impl Gallery {
    pub fn tag_ids(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.id.clone()).collect()
    }

    pub fn performer_ids(&self) -> Vec<String> {
        self.performers.iter().map(|p| p.id.clone()).collect()
    }
}

/// Partial update inputs. An omitted field leaves the library value as-is;
/// a present set field replaces the whole set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GalleryUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performer_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformerUpdateInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformerCreateInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_list: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_connection_builds_base_url() {
        let conn = ServerConnection {
            scheme: "http".into(),
            host: "localhost".into(),
            port: 9999,
            session_cookie: None,
            dir: None,
        };
        assert_eq!(conn.base_url(), "http://localhost:9999");
        assert_eq!(conn.graphql_url(), "http://localhost:9999/graphql");
        assert_eq!(conn.cookie_header(), None);
    }

    #[test]
    fn server_connection_rewrites_wildcard_host() {
        let conn = ServerConnection {
            scheme: "http".into(),
            host: "0.0.0.0".into(),
            port: 9999,
            session_cookie: None,
            dir: None,
        };
        assert_eq!(conn.base_url(), "http://localhost:9999");
    }

    #[test]
    fn plugin_input_parses_host_casing() {
        let raw = r#"{
            "server_connection": {
                "Scheme": "http",
                "Host": "localhost",
                "Port": 9999,
                "SessionCookie": {"Name": "session", "Value": "abc123"},
                "Dir": "/config"
            },
            "args": {"mode": "sync-performers"}
        }"#;
        let input: PluginInput = serde_json::from_str(raw).unwrap();
        assert_eq!(input.server_connection.port, 9999);
        assert_eq!(
            input.server_connection.cookie_header().unwrap(),
            "session=abc123"
        );
        assert_eq!(input.args["mode"], "sync-performers");
    }

    #[test]
    fn default_performer_image_is_not_custom() {
        let mut performer = Performer {
            id: "12".into(),
            name: "Jane".into(),
            image_path: Some("http://localhost:9999/performer/12/image?default=true".into()),
            ..Default::default()
        };
        assert!(!performer.has_custom_image());
        performer.image_path = Some("http://localhost:9999/performer/12/image?t=169".into());
        assert!(performer.has_custom_image());
        performer.image_path = None;
        assert!(!performer.has_custom_image());
    }
}
