use tracing::info;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(KnowledgeManifest, "knowledge", {
    name: String,
    files: Vec<ManifestEntry>,
    file_count: usize
});

/// One member file as the UI sees it. The manifest's `files` list is
/// rewritten wholesale by the registrar, never appended to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    pub id: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeManifest {
    pub async fn ensure_initialized(
        db: &SurrealDbClient,
        knowledge_id: &str,
        name: &str,
    ) -> Result<Self, AppError> {
        if let Some(existing) = db.get_item::<KnowledgeManifest>(knowledge_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let manifest = KnowledgeManifest {
            id: knowledge_id.to_string(),
            created_at: now,
            updated_at: now,
            name: name.to_string(),
            files: Vec::new(),
            file_count: 0,
        };

        let created = db.store_item(manifest).await?;
        created.ok_or_else(|| {
            AppError::InternalError("Failed to initialize knowledge manifest".into())
        })
    }

    pub async fn get(db: &SurrealDbClient, knowledge_id: &str) -> Result<Self, AppError> {
        db.get_item::<KnowledgeManifest>(knowledge_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("knowledge collection {knowledge_id}")))
    }

    /// Overwrites the member-file list and recomputes the count. The
    /// UI-visible state is exactly the list passed in; nothing is merged.
    pub async fn flush(
        db: &SurrealDbClient,
        knowledge_id: &str,
        files: &[ManifestEntry],
    ) -> Result<(), AppError> {
        let updated: Option<Self> = db
            .client
            .query(
                "UPDATE type::thing('knowledge', $id)
                 SET files = $files, file_count = $count, updated_at = time::now()
                 RETURN AFTER",
            )
            .bind(("id", knowledge_id.to_string()))
            .bind(("files", files.to_vec()))
            .bind(("count", files.len()))
            .await?
            .take(0)?;

        let manifest = updated.ok_or_else(|| {
            AppError::NotFound(format!("knowledge collection {knowledge_id} not found"))
        })?;

        info!(
            knowledge_id = %knowledge_id,
            file_count = manifest.file_count,
            "knowledge manifest flushed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn setup_db() -> SurrealDbClient {
        let namespace = "manifest_test";
        let database = Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, &database)
            .await
            .expect("Failed to start in-memory surrealdb")
    }

    fn entry(id: &str, file_name: &str) -> ManifestEntry {
        ManifestEntry {
            id: id.to_string(),
            file_name: file_name.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ensure_initialized_creates_once() {
        let db = setup_db().await;

        let first = KnowledgeManifest::ensure_initialized(&db, "kn-1", "Wiki")
            .await
            .expect("initialize");
        assert_eq!(first.file_count, 0);
        assert!(first.files.is_empty());

        // Second call returns the existing record untouched.
        KnowledgeManifest::flush(&db, "kn-1", &[entry("f1", "a.md")])
            .await
            .expect("flush");
        let second = KnowledgeManifest::ensure_initialized(&db, "kn-1", "Renamed")
            .await
            .expect("initialize again");
        assert_eq!(second.name, "Wiki");
        assert_eq!(second.file_count, 1);
    }

    #[tokio::test]
    async fn flush_overwrites_wholesale() {
        let db = setup_db().await;
        KnowledgeManifest::ensure_initialized(&db, "kn-1", "Wiki")
            .await
            .expect("initialize");

        KnowledgeManifest::flush(&db, "kn-1", &[entry("f1", "a.md"), entry("f2", "b.md")])
            .await
            .expect("first flush");

        // A later flush with a different list replaces, not appends.
        KnowledgeManifest::flush(&db, "kn-1", &[entry("f3", "c.md")])
            .await
            .expect("second flush");

        let manifest = KnowledgeManifest::get(&db, "kn-1").await.expect("get");
        assert_eq!(manifest.file_count, 1);
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].id, "f3");
    }

    #[tokio::test]
    async fn flush_into_missing_collection_fails() {
        let db = setup_db().await;
        let result = KnowledgeManifest::flush(&db, "missing", &[]).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_missing_collection_is_not_found() {
        let db = setup_db().await;
        let result = KnowledgeManifest::get(&db, "nope").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
