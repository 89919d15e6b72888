use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Titles are sanitized and capped before they are embedded in a filename.
const MAX_TITLE_CHARS: usize = 100;

stored_object!(FileRecord, "file", {
    file_name: String,
    sha256: String,
    size_bytes: u64,
    content_type: String,
    source: String,
    space_key: String,
    page_id: String,
    page_title: String,
    source_url: String,
    user_id: String,
    knowledge_id: String
});

/// Provenance carried by every catalog row and vector point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProvenance {
    pub space_key: String,
    pub space_name: String,
    pub page_id: String,
    pub page_title: String,
    pub source_url: String,
    pub last_updated: String,
}

impl FileRecord {
    pub fn new(
        content: &str,
        provenance: &PageProvenance,
        user_id: &str,
        knowledge_id: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::deterministic_id(&provenance.space_key, &provenance.page_id).to_string(),
            created_at: now,
            updated_at: now,
            file_name: Self::build_file_name(
                &provenance.space_key,
                &provenance.page_title,
                &provenance.page_id,
            ),
            sha256: Self::content_sha256(content),
            size_bytes: content.len() as u64,
            content_type: "text/markdown".to_string(),
            source: "wiki".to_string(),
            space_key: provenance.space_key.clone(),
            page_id: provenance.page_id.clone(),
            page_title: provenance.page_title.clone(),
            source_url: provenance.source_url.clone(),
            user_id: user_id.to_string(),
            knowledge_id: knowledge_id.to_string(),
        }
    }

    /// The catalog UUID is derived from the page's natural key so that a
    /// retried ingestion produces the same id and the existence check below
    /// can detect the earlier attempt.
    pub fn deterministic_id(space_key: &str, page_id: &str) -> Uuid {
        Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            format!("{space_key}:{page_id}").as_bytes(),
        )
    }

    /// Builds `<SPACE>_<sanitized-title>_<page-id>.md`. Characters outside
    /// alphanumerics, spaces, dashes and underscores become underscores, and
    /// the title portion is capped at 100 characters.
    pub fn build_file_name(space_key: &str, page_title: &str, page_id: &str) -> String {
        let safe_title: String = page_title
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .take(MAX_TITLE_CHARS)
            .collect();
        let safe_title = safe_title.trim();

        format!("{space_key}_{safe_title}_{page_id}.md")
    }

    pub fn content_sha256(content: &str) -> String {
        let digest = Sha256::digest(content.as_bytes());
        format!("{digest:x}")
    }

    /// Inserts the record unless a row with the same id already exists.
    /// Returns `true` when a new row was written, `false` when the record
    /// was already present (treated as success without modification).
    pub async fn register(&self, db: &SurrealDbClient) -> Result<bool, AppError> {
        if let Some(existing) = db.get_item::<FileRecord>(&self.id).await? {
            debug!(
                file_id = %existing.id,
                file_name = %existing.file_name,
                "file already registered in catalog"
            );
            return Ok(false);
        }

        db.store_item(self.clone()).await?;
        Ok(true)
    }
}
