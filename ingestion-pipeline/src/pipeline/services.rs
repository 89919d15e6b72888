use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    utils::{config::AppConfig, embedding::EmbeddingProvider},
};
use tracing::debug;

use crate::{
    fetcher::ContentApiClient,
    sampler::{sample_pages, SampleLimits},
    types::{CachedSpace, SpaceInfo},
};

/// The orchestrator's seam to the outside world: the remote wiki API and
/// the embedding service. Everything else (cache, checkpoint, vector
/// collections, catalog) is owned state.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    /// Lists all ingestible spaces.
    async fn list_spaces(&self) -> Result<Vec<SpaceInfo>, AppError>;

    /// Fetches, samples and hydrates one space's pages.
    async fn fetch_space(&self, space: &SpaceInfo) -> Result<CachedSpace, AppError>;

    /// Startup probe; the returned dimensionality is authoritative.
    async fn probe_dimension(&self) -> Result<usize, AppError>;

    /// Embeds one chunk of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

pub struct DefaultPipelineServices {
    fetcher: ContentApiClient,
    embedding: Arc<EmbeddingProvider>,
    limits: SampleLimits,
    sample_all: bool,
}

impl DefaultPipelineServices {
    pub fn new(config: &AppConfig, embedding: Arc<EmbeddingProvider>) -> Result<Self, AppError> {
        Ok(Self {
            fetcher: ContentApiClient::from_config(config)?,
            embedding,
            limits: SampleLimits {
                top_root: config.sample_top_root,
                top_recent: config.sample_top_recent,
                top_frequent: config.sample_top_frequent,
            },
            sample_all: config.sample_all,
        })
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn list_spaces(&self) -> Result<Vec<SpaceInfo>, AppError> {
        Ok(self.fetcher.fetch_spaces().await?)
    }

    async fn fetch_space(&self, space: &SpaceInfo) -> Result<CachedSpace, AppError> {
        let metadata = self.fetcher.fetch_page_metadata(&space.key).await?;
        let total_pages_in_space = metadata.len();

        let mut sampled_pages = if self.sample_all {
            metadata
        } else {
            sample_pages(&metadata, self.limits)
        };

        debug!(
            space = %space.key,
            total = total_pages_in_space,
            sampled = sampled_pages.len(),
            "fetching page bodies"
        );

        for page in &mut sampled_pages {
            page.body = self.fetcher.fetch_page_body(&page.id).await?;
        }

        Ok(CachedSpace {
            space_key: space.key.clone(),
            name: space.name.clone(),
            sampled_pages,
            total_pages_in_space,
        })
    }

    async fn probe_dimension(&self) -> Result<usize, AppError> {
        Ok(self.embedding.probe_dimension().await?)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(self.embedding.embed(text).await?)
    }
}
