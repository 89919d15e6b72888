use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            file_record::FileRecord,
            knowledge_manifest::{KnowledgeManifest, ManifestEntry},
        },
    },
};
use tracing::debug;

/// Records ingested documents in the relational catalog and keeps the
/// knowledge collection's manifest fresh: rewritten every `flush_every`
/// newly registered documents during a run, and unconditionally at the end,
/// so the UI lags the true ingested state by at most `flush_every` files.
pub struct CatalogRegistrar {
    db: Arc<SurrealDbClient>,
    knowledge_id: String,
    flush_every: usize,
    since_flush: usize,
}

impl CatalogRegistrar {
    pub fn new(db: Arc<SurrealDbClient>, knowledge_id: &str, flush_every: usize) -> Self {
        Self {
            db,
            knowledge_id: knowledge_id.to_string(),
            flush_every: flush_every.max(1),
            since_flush: 0,
        }
    }

    /// Creates the knowledge collection record if it does not exist yet.
    pub async fn ensure_collection(&self, name: &str) -> Result<KnowledgeManifest, AppError> {
        KnowledgeManifest::ensure_initialized(&self.db, &self.knowledge_id, name).await
    }

    /// Idempotent row insert; an already-registered document is success
    /// without side effects and does not count toward the flush cadence.
    pub async fn register(&mut self, record: &FileRecord) -> Result<bool, AppError> {
        let inserted = record.register(&self.db).await?;
        if inserted {
            self.since_flush += 1;
            debug!(
                file_id = %record.id,
                file_name = %record.file_name,
                since_flush = self.since_flush,
                "file registered in catalog"
            );
        }
        Ok(inserted)
    }

    /// Flushes the manifest when enough documents accumulated since the
    /// last flush. Returns whether a flush happened.
    pub async fn maybe_flush(&mut self, files: &[ManifestEntry]) -> Result<bool, AppError> {
        if self.since_flush < self.flush_every {
            return Ok(false);
        }
        self.flush(files).await?;
        Ok(true)
    }

    /// Unconditional wholesale rewrite of the manifest.
    pub async fn flush(&mut self, files: &[ManifestEntry]) -> Result<(), AppError> {
        KnowledgeManifest::flush(&self.db, &self.knowledge_id, files).await?;
        self.since_flush = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::storage::types::file_record::PageProvenance;
    use uuid::Uuid;

    async fn setup() -> (Arc<SurrealDbClient>, CatalogRegistrar) {
        let namespace = "registrar_test";
        let database = Uuid::new_v4().to_string();
        let db = Arc::new(
            SurrealDbClient::memory(namespace, &database)
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        let registrar = CatalogRegistrar::new(Arc::clone(&db), "kn-1", 2);
        (db, registrar)
    }

    fn record(page_id: &str) -> FileRecord {
        let provenance = PageProvenance {
            space_key: "ENG".to_string(),
            space_name: "Engineering".to_string(),
            page_id: page_id.to_string(),
            page_title: format!("Page {page_id}"),
            source_url: String::new(),
            last_updated: String::new(),
        };
        FileRecord::new("content", &provenance, "pipeline", "kn-1")
    }

    fn entries(records: &[&FileRecord]) -> Vec<ManifestEntry> {
        records
            .iter()
            .map(|record| ManifestEntry {
                id: record.id.clone(),
                file_name: record.file_name.clone(),
                created_at: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn flush_cadence_follows_registration_count() {
        let (db, mut registrar) = setup().await;
        registrar.ensure_collection("Wiki").await.expect("manifest");

        let first = record("1");
        assert!(registrar.register(&first).await.expect("register"));
        assert!(!registrar
            .maybe_flush(&entries(&[&first]))
            .await
            .expect("maybe flush"));

        let second = record("2");
        assert!(registrar.register(&second).await.expect("register"));
        assert!(registrar
            .maybe_flush(&entries(&[&first, &second]))
            .await
            .expect("maybe flush"));

        let manifest = KnowledgeManifest::get(&db, "kn-1").await.expect("manifest");
        assert_eq!(manifest.file_count, 2);

        // The counter reset; the next single registration does not flush.
        let third = record("3");
        assert!(registrar.register(&third).await.expect("register"));
        assert!(!registrar
            .maybe_flush(&entries(&[&first, &second, &third]))
            .await
            .expect("maybe flush"));
    }

    #[tokio::test]
    async fn duplicate_registration_does_not_advance_cadence() {
        let (_db, mut registrar) = setup().await;
        registrar.ensure_collection("Wiki").await.expect("manifest");

        let record = record("1");
        assert!(registrar.register(&record).await.expect("first"));
        assert!(!registrar.register(&record).await.expect("second"));
        assert_eq!(registrar.since_flush, 1);
    }

    #[tokio::test]
    async fn final_flush_is_unconditional() {
        let (db, mut registrar) = setup().await;
        registrar.ensure_collection("Wiki").await.expect("manifest");

        let only = record("1");
        registrar.register(&only).await.expect("register");
        registrar.flush(&entries(&[&only])).await.expect("flush");

        let manifest = KnowledgeManifest::get(&db, "kn-1").await.expect("manifest");
        assert_eq!(manifest.file_count, 1);
        assert_eq!(manifest.files[0].id, only.id);
    }
}
