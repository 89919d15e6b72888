mod services;

#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::{collections::HashMap, path::Path, sync::Arc, time::Duration};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            file_record::{FileRecord, PageProvenance},
            knowledge_manifest::ManifestEntry,
        },
    },
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use tracing::{debug, error, info, warn};

use crate::{
    cache::SpaceCache,
    checkpoint::{Checkpoint, CheckpointStore},
    chunker::chunk_text,
    extract::{build_page_path, compose_page_content, html_to_text, page_url},
    registrar::CatalogRegistrar,
    types::{CachedSpace, Page, SpaceInfo},
    upsert::VectorUpserter,
};

/// Final accounting for one pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub spaces_processed: usize,
    pub spaces_skipped: usize,
    pub spaces_failed: usize,
    pub documents_ingested: usize,
    pub documents_failed: usize,
    pub documents_skipped: usize,
}

enum SpaceOutcome {
    Skipped,
    Processed { ingested: usize, failed: usize, skipped: usize },
}

/// Drives the whole ingestion: for each space decide skip/fetch/resume,
/// replay cached pages through extract → chunk → embed → upsert → register,
/// and keep the checkpoint valid after every page so an interrupted run
/// resumes without re-processing completed work.
#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    config: AppConfig,
    services: Arc<dyn PipelineServices>,
    cache: SpaceCache,
    checkpoints: CheckpointStore,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        embedding_provider: Arc<EmbeddingProvider>,
    ) -> Result<Self, AppError> {
        let services = DefaultPipelineServices::new(&config, embedding_provider)?;
        Self::with_services(db, config, Arc::new(services))
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        config: AppConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let cache = SpaceCache::new(Path::new(&config.data_dir).join("spaces"))?;
        let checkpoints = CheckpointStore::new(&config.checkpoint_path);

        Ok(Self {
            db,
            config,
            services,
            cache,
            checkpoints,
        })
    }

    pub async fn run(&self) -> Result<RunSummary, AppError> {
        // Startup section: every failure here is process-fatal and aborts
        // before any ingestion begins.
        let dimension = self.services.probe_dimension().await?;
        if dimension != self.config.vector_size {
            warn!(
                configured = self.config.vector_size,
                probed = dimension,
                "embedding service dimensionality differs from configuration; \
                 using the probed value"
            );
        }

        let upserter = VectorUpserter::new(
            Arc::clone(&self.db),
            self.config.upsert_batch_size,
            Duration::from_millis(self.config.upsert_batch_delay_ms),
            Some(self.config.embedding_model.clone()),
        );
        upserter.ensure_collections(dimension).await?;

        let mut registrar = CatalogRegistrar::new(
            Arc::clone(&self.db),
            &self.config.knowledge_id,
            self.config.manifest_flush_every,
        );
        registrar
            .ensure_collection(&self.config.knowledge_name)
            .await?;

        let mut checkpoint = self.checkpoints.load();
        let spaces = self.services.list_spaces().await?;
        info!(
            total_spaces = spaces.len(),
            embedding_dimension = dimension,
            "ingestion run starting"
        );

        let mut summary = RunSummary::default();
        for space in &spaces {
            match self
                .process_space(space, &mut checkpoint, &upserter, &mut registrar)
                .await
            {
                Ok(SpaceOutcome::Skipped) => summary.spaces_skipped += 1,
                Ok(SpaceOutcome::Processed {
                    ingested,
                    failed,
                    skipped,
                }) => {
                    summary.spaces_processed += 1;
                    summary.documents_ingested += ingested;
                    summary.documents_failed += failed;
                    summary.documents_skipped += skipped;
                }
                Err(err) => {
                    error!(
                        space = %space.key,
                        error = %err,
                        "space failed; continuing with the next one"
                    );
                    summary.spaces_failed += 1;
                }
            }
        }

        // The UI-visible manifest is exactly correct at completion.
        registrar.flush(&checkpoint.ingested_files).await?;

        let all_spaces_completed = spaces.iter().all(|space| {
            checkpoint
                .progress(&space.key)
                .is_some_and(|progress| progress.completed)
        });
        if summary.spaces_failed == 0
            && summary.documents_failed == 0
            && all_spaces_completed
            && checkpoint.fully_successful()
        {
            self.checkpoints.clear()?;
        } else {
            self.checkpoints.save(&mut checkpoint)?;
            info!("checkpoint retained; failed or pending work will be retried next run");
        }

        info!(
            spaces_processed = summary.spaces_processed,
            spaces_skipped = summary.spaces_skipped,
            spaces_failed = summary.spaces_failed,
            documents_ingested = summary.documents_ingested,
            documents_failed = summary.documents_failed,
            documents_skipped = summary.documents_skipped,
            "ingestion run finished"
        );

        Ok(summary)
    }

    async fn process_space(
        &self,
        space: &SpaceInfo,
        checkpoint: &mut Checkpoint,
        upserter: &VectorUpserter,
        registrar: &mut CatalogRegistrar,
    ) -> Result<SpaceOutcome, AppError> {
        if checkpoint
            .progress(&space.key)
            .is_some_and(|progress| progress.skip_entirely())
        {
            info!(space = %space.key, "space already fully processed; skipping");
            return Ok(SpaceOutcome::Skipped);
        }

        // A completed space with leftover failures is re-entered for those
        // pages only; nothing else is re-processed.
        let retry_only = checkpoint
            .progress(&space.key)
            .is_some_and(|progress| progress.retry_failed_only());

        let cached = match self.cache.load(&space.key)? {
            Some(cached) => {
                debug!(space = %space.key, pages = cached.sampled_pages.len(), "cache hit");
                cached
            }
            None => {
                info!(space = %space.key, "cache miss; fetching from remote API");
                let fetched = self.services.fetch_space(space).await?;
                self.cache.save(&fetched)?;
                fetched
            }
        };

        let page_ids: Vec<String> = cached
            .sampled_pages
            .iter()
            .map(|page| page.id.clone())
            .collect();
        let pages_by_id: HashMap<&str, &Page> = cached
            .sampled_pages
            .iter()
            .map(|page| (page.id.as_str(), page))
            .collect();

        let mut ingested = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for page in &cached.sampled_pages {
            if checkpoint.is_done(&space.key, &page.id) {
                skipped += 1;
                continue;
            }
            if retry_only
                && !checkpoint
                    .progress(&space.key)
                    .is_some_and(|progress| progress.failed.contains(&page.id))
            {
                skipped += 1;
                continue;
            }

            match self
                .process_page(&cached, page, &pages_by_id, upserter, registrar)
                .await
            {
                Ok(entry) => {
                    checkpoint.mark_done(&space.key, &page.id);
                    checkpoint.record_file(entry);
                    // Per-page granularity: a crash after this point never
                    // re-processes the page.
                    self.checkpoints.save(checkpoint)?;
                    registrar.maybe_flush(&checkpoint.ingested_files).await?;
                    ingested += 1;
                }
                Err(err) => {
                    warn!(
                        space = %space.key,
                        page_id = %page.id,
                        page_title = %page.title,
                        error = %err,
                        "page failed; it stays eligible for retry"
                    );
                    checkpoint.mark_failed(&space.key, &page.id);
                    self.checkpoints.save(checkpoint)?;
                    failed += 1;
                }
            }
        }

        checkpoint.finish_space(&space.key, &page_ids);
        self.checkpoints.save(checkpoint)?;

        info!(
            space = %space.key,
            ingested,
            failed,
            skipped,
            "space finished"
        );

        Ok(SpaceOutcome::Processed {
            ingested,
            failed,
            skipped,
        })
    }

    async fn process_page(
        &self,
        space: &CachedSpace,
        page: &Page,
        pages_by_id: &HashMap<&str, &Page>,
        upserter: &VectorUpserter,
        registrar: &mut CatalogRegistrar,
    ) -> Result<ManifestEntry, AppError> {
        let text = html_to_text(&page.body);
        if text.is_empty() {
            return Err(AppError::Processing(format!(
                "page {} has no content after extraction",
                page.id
            )));
        }

        let path = build_page_path(page, pages_by_id);
        let url = page_url(&self.config.site_base_url, &page.id);
        let provenance = PageProvenance {
            space_key: space.space_key.clone(),
            space_name: space.name.clone(),
            page_id: page.id.clone(),
            page_title: page.title.clone(),
            source_url: url.clone(),
            last_updated: page.updated.clone(),
        };

        let content = compose_page_content(
            &space.name,
            &space.space_key,
            page,
            &path,
            &url,
            &text,
        );

        let record = FileRecord::new(
            &content,
            &provenance,
            &self.config.ingest_user_id,
            &self.config.knowledge_id,
        );

        // Catalog first: its id is deterministic and the insert idempotent,
        // so a crash before the upsert leaves a retry-safe state.
        registrar.register(&record).await?;

        let chunks = chunk_text(&content, self.config.chunk_size, self.config.chunk_overlap);
        let mut embeddings = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            embeddings.push(self.services.embed(&chunk.text).await?);
        }

        upserter
            .upsert_chunks(
                &chunks,
                &embeddings,
                &record.id,
                &record.file_name,
                &self.config.knowledge_id,
                &self.config.ingest_user_id,
                &provenance,
            )
            .await?;

        debug!(
            space = %space.space_key,
            page_id = %page.id,
            chunks = chunks.len(),
            file_name = %record.file_name,
            "page ingested"
        );

        Ok(ManifestEntry {
            id: record.id.clone(),
            file_name: record.file_name.clone(),
            created_at: record.created_at,
        })
    }
}
