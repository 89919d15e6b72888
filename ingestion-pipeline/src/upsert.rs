use std::{sync::Arc, time::Duration};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            file_record::PageProvenance,
            vector_point::{VectorCollectionInfo, VectorPoint},
        },
    },
};
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::chunker::Chunk;

/// Collection scoped to individual documents (`tenant_id = file-<uuid>`),
/// backing "search within this document".
pub const FILE_COLLECTION: &str = "file_chunks";
/// Collection scoped to the knowledge collection, backing "search across
/// the whole collection".
pub const KNOWLEDGE_COLLECTION: &str = "knowledge_chunks";

const SIMILARITY_METRIC: &str = "cosine";

/// Writes embedded chunks into both vector collections in fixed-size
/// batches. A document's upsert either fully succeeds or reports failure;
/// the caller must not checkpoint the document on failure. Point ids are
/// deterministic, so a retried document overwrites its earlier points.
pub struct VectorUpserter {
    db: Arc<SurrealDbClient>,
    batch_size: usize,
    batch_delay: Duration,
    embedding_model: Option<String>,
}

impl VectorUpserter {
    pub fn new(
        db: Arc<SurrealDbClient>,
        batch_size: usize,
        batch_delay: Duration,
        embedding_model: Option<String>,
    ) -> Self {
        Self {
            db,
            batch_size: batch_size.max(1),
            batch_delay,
            embedding_model,
        }
    }

    /// Lazily creates both destination collections with the given
    /// dimensionality and a cosine HNSW index. An existing collection with
    /// a different dimensionality is a loud warning, not an auto-migration.
    pub async fn ensure_collections(&self, dimension: usize) -> Result<(), AppError> {
        for collection in [FILE_COLLECTION, KNOWLEDGE_COLLECTION] {
            self.ensure_collection(collection, dimension).await?;
        }
        Ok(())
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<(), AppError> {
        if let Some(existing) = self.db.get_item::<VectorCollectionInfo>(collection).await? {
            if existing.dimension != dimension {
                warn!(
                    collection,
                    existing_dimension = existing.dimension,
                    expected_dimension = dimension,
                    "vector collection exists with a different dimensionality; \
                     leaving it untouched"
                );
            }
            return Ok(());
        }

        info!(collection, dimension, "creating vector collection");
        self.db
            .client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_{collection}_embedding ON TABLE {collection} \
                 FIELDS embedding HNSW DIMENSION {dimension} DIST COSINE;"
            ))
            .await?;

        let now = Utc::now();
        self.db
            .store_item(VectorCollectionInfo {
                id: collection.to_string(),
                created_at: now,
                updated_at: now,
                dimension,
                metric: SIMILARITY_METRIC.to_string(),
            })
            .await?;

        Ok(())
    }

    /// Upserts every chunk into both collections. `chunks` and `embeddings`
    /// are parallel slices; a length mismatch is a programming error
    /// surfaced as a validation failure rather than a partial write.
    pub async fn upsert_chunks(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        file_id: &str,
        file_name: &str,
        knowledge_id: &str,
        user_id: &str,
        provenance: &PageProvenance,
    ) -> Result<(), AppError> {
        if chunks.len() != embeddings.len() {
            return Err(AppError::Validation(format!(
                "chunk/embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| VectorPoint {
                id: VectorPoint::point_id(file_id, chunk.index),
                text: chunk.text.clone(),
                hash: chunk.hash.clone(),
                file_id: file_id.to_string(),
                file_name: file_name.to_string(),
                start_offset: chunk.start,
                chunk_index: chunk.index,
                tenant_id: String::new(),
                space_key: provenance.space_key.clone(),
                page_id: provenance.page_id.clone(),
                page_title: provenance.page_title.clone(),
                created_by: user_id.to_string(),
                embedding_model: self.embedding_model.clone(),
                embedding: embedding.clone(),
            })
            .collect();

        let file_tenant = VectorPoint::file_tenant(file_id);
        let total_batches = points.len().div_ceil(self.batch_size);

        for (batch_index, batch) in points.chunks(self.batch_size).enumerate() {
            for point in batch {
                let mut file_point = point.clone();
                file_point.tenant_id = file_tenant.clone();
                self.upsert_point(FILE_COLLECTION, file_point).await?;

                let mut knowledge_point = point.clone();
                knowledge_point.tenant_id = knowledge_id.to_string();
                self.upsert_point(KNOWLEDGE_COLLECTION, knowledge_point)
                    .await?;
            }

            debug!(
                file_id,
                batch = batch_index + 1,
                total_batches,
                batch_len = batch.len(),
                "vector batch upserted"
            );

            // Breathe between batches so the vector service is not slammed.
            if batch_index + 1 < total_batches {
                sleep(self.batch_delay).await;
            }
        }

        Ok(())
    }

    async fn upsert_point(&self, collection: &str, point: VectorPoint) -> Result<(), AppError> {
        let _: Option<VectorPoint> = self
            .db
            .client
            .upsert((collection, point.id.clone()))
            .content(point)
            .await?;
        Ok(())
    }
}
