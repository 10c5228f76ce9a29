use serde::Serialize;

/// Field criterion modifiers understood by the library's find operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionModifier {
    Equals,
    NotEquals,
    Includes,
    Excludes,
    IncludesAll,
    IsNull,
    NotNull,
    GreaterThan,
    LessThan,
    Between,
}

/// Pagination and sorting. `per_page = -1` means unbounded.
#[derive(Debug, Clone, Serialize)]
pub struct FindFilter {
    pub page: u64,
    pub per_page: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

impl FindFilter {
    pub fn page(page: u64, per_page: i64) -> Self {
        FindFilter {
            page,
            per_page,
            sort: None,
            direction: None,
        }
    }

    pub fn unbounded() -> Self {
        Self::page(1, -1)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StringCriterion {
    pub value: String,
    pub modifier: CriterionModifier,
}

impl StringCriterion {
    pub fn equals(value: impl Into<String>) -> Self {
        StringCriterion {
            value: value.into(),
            modifier: CriterionModifier::Equals,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiCriterion {
    pub value: Vec<String>,
    pub modifier: CriterionModifier,
}

/// Tag criteria are hierarchical in the library; depth 0 means the named
/// tags only, no descendants.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchicalMultiCriterion {
    pub value: Vec<String>,
    pub modifier: CriterionModifier,
    pub depth: i32,
}

impl HierarchicalMultiCriterion {
    pub fn tags(ids: &[String], modifier: CriterionModifier) -> Self {
        HierarchicalMultiCriterion {
            value: ids.to_vec(),
            modifier,
            depth: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HierarchicalMultiCriterion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub galleries: Option<MultiCriterion>,
}

impl ImageFilter {
    pub fn excluding_tags(ids: &[String]) -> Self {
        ImageFilter {
            tags: Some(HierarchicalMultiCriterion::tags(
                ids,
                CriterionModifier::Excludes,
            )),
            ..Default::default()
        }
    }

    pub fn with_all_tags(ids: &[String]) -> Self {
        ImageFilter {
            tags: Some(HierarchicalMultiCriterion::tags(
                ids,
                CriterionModifier::IncludesAll,
            )),
            ..Default::default()
        }
    }

    pub fn in_gallery(gallery_id: &str) -> Self {
        ImageFilter {
            galleries: Some(MultiCriterion {
                value: vec![gallery_id.to_string()],
                modifier: CriterionModifier::Includes,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HierarchicalMultiCriterion>,
}

impl SceneFilter {
    pub fn excluding_tags(ids: &[String]) -> Self {
        SceneFilter {
            tags: Some(HierarchicalMultiCriterion::tags(
                ids,
                CriterionModifier::Excludes,
            )),
        }
    }

    pub fn with_all_tags(ids: &[String]) -> Self {
        SceneFilter {
            tags: Some(HierarchicalMultiCriterion::tags(
                ids,
                CriterionModifier::IncludesAll,
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformerFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HierarchicalMultiCriterion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<StringCriterion>,
}

impl PerformerFilter {
    pub fn excluding_tags(ids: &[String]) -> Self {
        PerformerFilter {
            tags: Some(HierarchicalMultiCriterion::tags(
                ids,
                CriterionModifier::Excludes,
            )),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GalleryFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<HierarchicalMultiCriterion>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TagFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<StringCriterion>,
}

impl TagFilter {
    pub fn named(name: &str) -> Self {
        TagFilter {
            name: Some(StringCriterion::equals(name)),
        }
    }
}
