use serde::{Deserialize, Serialize};

/// One fetchable space as listed by the remote wiki API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpaceInfo {
    pub key: String,
    pub name: String,
}

/// One wiki page. Metadata comes from the paginated listing; the raw HTML
/// body is fetched separately and only for sampled pages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub updated: String,
    #[serde(default)]
    pub update_count: u64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub level: usize,
}

/// The on-disk cache blob for a space: the pages known at save time plus the
/// upstream total, which may exceed what was sampled locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedSpace {
    pub space_key: String,
    pub name: String,
    pub sampled_pages: Vec<Page>,
    pub total_pages_in_space: usize,
}
