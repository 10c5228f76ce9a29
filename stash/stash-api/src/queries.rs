//! GraphQL documents for the library surface. Field selections are kept to
//! what the workflows read.

pub const FIND_IMAGES: &str = r#"
query FindImages($filter: FindFilterType, $image_filter: ImageFilterType) {
  findImages(filter: $filter, image_filter: $image_filter) {
    count
    images {
      id
      title
      files { path }
      tags { id name }
      performers { id }
    }
  }
}"#;

pub const FIND_IMAGE: &str = r#"
query FindImage($id: ID!) {
  findImage(id: $id) {
    id
    title
    files { path }
    tags { id name }
    performers { id }
  }
}"#;

pub const FIND_SCENES: &str = r#"
query FindScenes($filter: FindFilterType, $scene_filter: SceneFilterType) {
  findScenes(filter: $filter, scene_filter: $scene_filter) {
    count
    scenes {
      id
      title
      files { path }
      paths { sprite vtt }
      tags { id name }
      performers { id }
    }
  }
}"#;

pub const FIND_SCENE: &str = r#"
query FindScene($id: ID!) {
  findScene(id: $id) {
    id
    title
    files { path }
    paths { sprite vtt }
    tags { id name }
    performers { id }
  }
}"#;

pub const FIND_PERFORMERS: &str = r#"
query FindPerformers($filter: FindFilterType, $performer_filter: PerformerFilterType) {
  findPerformers(filter: $filter, performer_filter: $performer_filter) {
    count
    performers {
      id
      name
      alias_list
      image_path
      gender
      tags { id name }
    }
  }
}"#;

pub const FIND_PERFORMER: &str = r#"
query FindPerformer($id: ID!) {
  findPerformer(id: $id) {
    id
    name
    alias_list
    image_path
    gender
    tags { id name }
  }
}"#;

pub const FIND_GALLERIES: &str = r#"
query FindGalleries($filter: FindFilterType, $gallery_filter: GalleryFilterType) {
  findGalleries(filter: $filter, gallery_filter: $gallery_filter) {
    count
    galleries {
      id
      title
      image_count
      tags { id name }
      performers { id }
    }
  }
}"#;

pub const FIND_GALLERY: &str = r#"
query FindGallery($id: ID!) {
  findGallery(id: $id) {
    id
    title
    image_count
    tags { id name }
    performers { id }
  }
}"#;

pub const FIND_TAGS: &str = r#"
query FindTags($filter: FindFilterType, $tag_filter: TagFilterType) {
  findTags(filter: $filter, tag_filter: $tag_filter) {
    count
    tags { id name }
  }
}"#;

pub const TAG_CREATE: &str = r#"
mutation TagCreate($input: TagCreateInput!) {
  tagCreate(input: $input) { id name }
}"#;

pub const IMAGE_UPDATE: &str = r#"
mutation ImageUpdate($input: ImageUpdateInput!) {
  imageUpdate(input: $input) { id }
}"#;

pub const SCENE_UPDATE: &str = r#"
mutation SceneUpdate($input: SceneUpdateInput!) {
  sceneUpdate(input: $input) { id }
}"#;

pub const GALLERY_UPDATE: &str = r#"
mutation GalleryUpdate($input: GalleryUpdateInput!) {
  galleryUpdate(input: $input) { id }
}"#;

pub const PERFORMER_UPDATE: &str = r#"
mutation PerformerUpdate($input: PerformerUpdateInput!) {
  performerUpdate(input: $input) { id }
}"#;

pub const PERFORMER_CREATE: &str = r#"
mutation PerformerCreate($input: PerformerCreateInput!) {
  performerCreate(input: $input) {
    id
    name
    alias_list
    image_path
    gender
    tags { id name }
  }
}"#;

pub const METADATA_SCAN: &str = r#"
mutation MetadataScan {
  metadataScan(input: {})
}"#;

pub const CONFIGURATION_PLUGINS: &str = r#"
query ConfigurationPlugins {
  configuration { plugins }
}"#;
