use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use stash_contracts::{
    Gallery, GalleryUpdateInput, Image, ImageUpdateInput, Performer, PerformerCreateInput,
    PerformerUpdateInput, Scene, SceneUpdateInput, ServerConnection, Tag,
};

use crate::filters::{
    FindFilter, GalleryFilter, ImageFilter, PerformerFilter, SceneFilter, TagFilter,
};
use crate::queries;
use crate::scrub::scrub_nulls;
use crate::tag_cache::TagCache;
use crate::LibraryError;

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

/// Typed facade over the library's query/mutation surface plus raw media
/// downloads. Owns the HTTP client and the tag cache for the process
/// lifetime.
pub struct StashClient {
    client: Client,
    graphql_url: String,
    media_base_url: String,
    cookie: Option<String>,
    tags: TagCache,
}

impl StashClient {
    /// `media_base_override` replaces the connection-derived base URL for
    /// media downloads (reverse-proxy setups).
    pub fn new(
        connection: &ServerConnection,
        media_base_override: Option<String>,
    ) -> Result<Self, LibraryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        let media_base_url = media_base_override
            .unwrap_or_else(|| connection.base_url())
            .trim_end_matches('/')
            .to_string();
        Ok(StashClient {
            client,
            graphql_url: connection.graphql_url(),
            media_base_url,
            cookie: connection.cookie_header(),
            tags: TagCache::new(),
        })
    }

    /// Single choke point for every library call: scrubs nulls from the
    /// variables, unwraps the GraphQL envelope, extracts one named field.
    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
        field: &str,
    ) -> Result<T, LibraryError> {
        let body = json!({
            "query": query,
            "variables": scrub_nulls(variables),
        });
        let mut request = self.client.post(&self.graphql_url).json(&body);
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(256)
                .collect();
            return Err(LibraryError::Status { status, body });
        }
        let envelope = response.json::<GraphQlResponse>().await?;
        if let Some(errors) = envelope.errors.filter(|e| !e.is_empty()) {
            let joined = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LibraryError::Query(joined));
        }
        let data = envelope
            .data
            .and_then(|mut d| d.get_mut(field).map(Value::take))
            .ok_or_else(|| LibraryError::Query(format!("missing field {}", field)))?;
        serde_json::from_value(data).map_err(|e| LibraryError::Query(e.to_string()))
    }

    async fn find_one<T: DeserializeOwned>(
        &self,
        query: &str,
        field: &str,
        kind: &'static str,
        id: &str,
    ) -> Result<T, LibraryError> {
        let value: Value = self.graphql(query, json!({ "id": id }), field).await?;
        if value.is_null() {
            return Err(LibraryError::NotFound {
                kind,
                id: id.to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| LibraryError::Query(e.to_string()))
    }

    pub async fn find_images(
        &self,
        filter: &FindFilter,
        image_filter: &ImageFilter,
    ) -> Result<(Vec<Image>, usize), LibraryError> {
        #[derive(Deserialize)]
        struct Page {
            count: usize,
            images: Vec<Image>,
        }
        let page: Page = self
            .graphql(
                queries::FIND_IMAGES,
                json!({
                    "filter": filter,
                    "image_filter": image_filter,
                }),
                "findImages",
            )
            .await?;
        debug!("findImages returned {} of {}", page.images.len(), page.count);
        Ok((page.images, page.count))
    }

    pub async fn get_image(&self, id: &str) -> Result<Image, LibraryError> {
        self.find_one(queries::FIND_IMAGE, "findImage", "image", id)
            .await
    }

    pub async fn find_scenes(
        &self,
        filter: &FindFilter,
        scene_filter: &SceneFilter,
    ) -> Result<(Vec<Scene>, usize), LibraryError> {
        #[derive(Deserialize)]
        struct Page {
            count: usize,
            scenes: Vec<Scene>,
        }
        let page: Page = self
            .graphql(
                queries::FIND_SCENES,
                json!({
                    "filter": filter,
                    "scene_filter": scene_filter,
                }),
                "findScenes",
            )
            .await?;
        Ok((page.scenes, page.count))
    }

    pub async fn get_scene(&self, id: &str) -> Result<Scene, LibraryError> {
        self.find_one(queries::FIND_SCENE, "findScene", "scene", id)
            .await
    }

    pub async fn find_performers(
        &self,
        filter: &FindFilter,
        performer_filter: &PerformerFilter,
    ) -> Result<(Vec<Performer>, usize), LibraryError> {
        #[derive(Deserialize)]
        struct Page {
            count: usize,
            performers: Vec<Performer>,
        }
        let page: Page = self
            .graphql(
                queries::FIND_PERFORMERS,
                json!({
                    "filter": filter,
                    "performer_filter": performer_filter,
                }),
                "findPerformers",
            )
            .await?;
        Ok((page.performers, page.count))
    }

    pub async fn get_performer(&self, id: &str) -> Result<Performer, LibraryError> {
        self.find_one(queries::FIND_PERFORMER, "findPerformer", "performer", id)
            .await
    }

    pub async fn find_galleries(
        &self,
        filter: &FindFilter,
        gallery_filter: &GalleryFilter,
    ) -> Result<(Vec<Gallery>, usize), LibraryError> {
        #[derive(Deserialize)]
        struct Page {
            count: usize,
            galleries: Vec<Gallery>,
        }
        let page: Page = self
            .graphql(
                queries::FIND_GALLERIES,
                json!({
                    "filter": filter,
                    "gallery_filter": gallery_filter,
                }),
                "findGalleries",
            )
            .await?;
        Ok((page.galleries, page.count))
    }

    pub async fn get_gallery(&self, id: &str) -> Result<Gallery, LibraryError> {
        self.find_one(queries::FIND_GALLERY, "findGallery", "gallery", id)
            .await
    }

    pub async fn update_image(&self, input: &ImageUpdateInput) -> Result<(), LibraryError> {
        let _: Value = self
            .graphql(
                queries::IMAGE_UPDATE,
                json!({ "input": input }),
                "imageUpdate",
            )
            .await?;
        Ok(())
    }

    pub async fn update_scene(&self, input: &SceneUpdateInput) -> Result<(), LibraryError> {
        let _: Value = self
            .graphql(
                queries::SCENE_UPDATE,
                json!({ "input": input }),
                "sceneUpdate",
            )
            .await?;
        Ok(())
    }

    pub async fn update_gallery(&self, input: &GalleryUpdateInput) -> Result<(), LibraryError> {
        let _: Value = self
            .graphql(
                queries::GALLERY_UPDATE,
                json!({ "input": input }),
                "galleryUpdate",
            )
            .await?;
        Ok(())
    }

    pub async fn update_performer(
        &self,
        input: &PerformerUpdateInput,
    ) -> Result<(), LibraryError> {
        let _: Value = self
            .graphql(
                queries::PERFORMER_UPDATE,
                json!({ "input": input }),
                "performerUpdate",
            )
            .await?;
        Ok(())
    }

    pub async fn create_performer(
        &self,
        input: &PerformerCreateInput,
    ) -> Result<Performer, LibraryError> {
        self.graphql(
            queries::PERFORMER_CREATE,
            json!({ "input": input }),
            "performerCreate",
        )
        .await
    }

    async fn find_tag_id(&self, name: &str) -> Result<Option<String>, LibraryError> {
        #[derive(Deserialize)]
        struct Page {
            tags: Vec<Tag>,
        }
        let page: Page = self
            .graphql(
                queries::FIND_TAGS,
                json!({
                    "filter": FindFilter::unbounded(),
                    "tag_filter": TagFilter::named(name),
                }),
                "findTags",
            )
            .await?;
        Ok(page.tags.into_iter().find(|t| t.name == name).map(|t| t.id))
    }

    async fn create_tag(&self, display_name: &str) -> Result<String, LibraryError> {
        let tag: Tag = self
            .graphql(
                queries::TAG_CREATE,
                json!({ "input": { "name": display_name } }),
                "tagCreate",
            )
            .await?;
        info!("created tag {} ({})", tag.name, tag.id);
        Ok(tag.id)
    }

    /// Resolves a tag name to its id: cache, then library query, then
    /// creation. The cache is authoritative once populated; every code path
    /// needing a tag id goes through here.
    pub async fn get_or_create_tag(
        &self,
        name: &str,
        display_name: &str,
    ) -> Result<String, LibraryError> {
        if let Some(id) = self.tags.get(name) {
            return Ok(id);
        }
        let id = match self.find_tag_id(name).await? {
            Some(id) => id,
            None => match self.create_tag(display_name).await {
                Ok(id) => id,
                // lost a creation race with another writer: the tag exists
                // now, so look it up again before giving up
                Err(create_err) => match self.find_tag_id(name).await? {
                    Some(id) => id,
                    None => return Err(create_err),
                },
            },
        };
        Ok(self.tags.insert_if_absent(name, id))
    }

    /// Kicks off a library re-scan of persisted metadata. Fire and forget:
    /// the job id is logged, never awaited.
    pub async fn trigger_metadata_scan(&self) -> Result<(), LibraryError> {
        let job: Value = self
            .graphql(queries::METADATA_SCAN, json!({}), "metadataScan")
            .await?;
        info!("triggered metadata scan, job {}", job);
        Ok(())
    }

    /// Host-stored settings for one plugin id, `null` when unset.
    pub async fn plugin_settings(&self, plugin_id: &str) -> Result<Value, LibraryError> {
        let config: Value = self
            .graphql(queries::CONFIGURATION_PLUGINS, json!({}), "configuration")
            .await?;
        Ok(config
            .get("plugins")
            .and_then(|p| p.get(plugin_id))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Serving URL for an image's original bytes.
    pub fn image_download_url(&self, image_id: &str) -> String {
        format!("{}/image/{}/image", self.media_base_url, image_id)
    }

    /// Fetches media bytes with the session cookie. Anything but 200 is a
    /// failure; redirects to login pages must not pass for image data.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, LibraryError> {
        let mut request = self.client.get(url);
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(LibraryError::Status {
                status,
                body: format!("download of {} failed", url),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
