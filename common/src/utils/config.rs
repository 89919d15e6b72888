use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Http,
    OpenAI,
    Hashed,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Http
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    // Remote wiki API
    pub api_base_url: String,
    pub api_username: String,
    pub api_password: String,
    /// Site root used to build human-facing page links in provenance.
    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,
    #[serde(default = "default_fetch_page_limit")]
    pub fetch_page_limit: usize,
    #[serde(default = "default_fetch_max_retries")]
    pub fetch_max_retries: u32,
    #[serde(default = "default_fetch_base_backoff_ms")]
    pub fetch_base_backoff_ms: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    // SurrealDB (vector collections + catalog)
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,

    // Knowledge collection the ingested files belong to
    pub knowledge_id: String,
    #[serde(default = "default_knowledge_name")]
    pub knowledge_name: String,
    #[serde(default = "default_ingest_user_id")]
    pub ingest_user_id: String,

    // Local state
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: String,

    // Embedding service
    #[serde(default = "default_embedding_backend")]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_base_url")]
    pub embedding_base_url: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_vector_size")]
    pub vector_size: usize,

    // Chunking and upserting
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
    #[serde(default = "default_upsert_batch_delay_ms")]
    pub upsert_batch_delay_ms: u64,
    #[serde(default = "default_manifest_flush_every")]
    pub manifest_flush_every: usize,

    // Sampling of pages per space
    #[serde(default = "default_sample_top_root")]
    pub sample_top_root: usize,
    #[serde(default = "default_sample_top_recent")]
    pub sample_top_recent: usize,
    #[serde(default = "default_sample_top_frequent")]
    pub sample_top_frequent: usize,
    #[serde(default)]
    pub sample_all: bool,
}

fn default_site_base_url() -> String {
    "https://wiki.example.com".to_string()
}

fn default_fetch_page_limit() -> usize {
    100
}

fn default_fetch_max_retries() -> u32 {
    5
}

fn default_fetch_base_backoff_ms() -> u64 {
    1_000
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_knowledge_name() -> String {
    "Wiki".to_string()
}

fn default_ingest_user_id() -> String {
    "pipeline".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_checkpoint_path() -> String {
    "./data/checkpoint.json".to_string()
}

fn default_embedding_base_url() -> String {
    "http://localhost:11434/api/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_vector_size() -> usize {
    768
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_upsert_batch_size() -> usize {
    30
}

fn default_upsert_batch_delay_ms() -> u64 {
    100
}

fn default_manifest_flush_every() -> usize {
    100
}

fn default_sample_top_root() -> usize {
    10
}

fn default_sample_top_recent() -> usize {
    30
}

fn default_sample_top_frequent() -> usize {
    30
}

impl AppConfig {
    /// Rejects configurations the pipeline cannot run with. Called once at
    /// startup, before any ingestion begins.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.chunk_size == 0 {
            return Err(AppError::Validation("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(AppError::Validation(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.upsert_batch_size == 0 {
            return Err(AppError::Validation(
                "upsert_batch_size must be positive".into(),
            ));
        }
        if self.manifest_flush_every == 0 {
            return Err(AppError::Validation(
                "manifest_flush_every must be positive".into(),
            ));
        }
        if self.knowledge_id.trim().is_empty() {
            return Err(AppError::Validation("knowledge_id must be set".into()));
        }
        Ok(())
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            api_base_url: "https://wiki.example.com/rest/api".into(),
            api_username: "svc".into(),
            api_password: "secret".into(),
            site_base_url: default_site_base_url(),
            fetch_page_limit: default_fetch_page_limit(),
            fetch_max_retries: default_fetch_max_retries(),
            fetch_base_backoff_ms: default_fetch_base_backoff_ms(),
            http_timeout_secs: default_http_timeout_secs(),
            surrealdb_address: "mem://".into(),
            surrealdb_username: String::new(),
            surrealdb_password: String::new(),
            surrealdb_namespace: "test".into(),
            surrealdb_database: "test".into(),
            knowledge_id: "kn-1".into(),
            knowledge_name: default_knowledge_name(),
            ingest_user_id: default_ingest_user_id(),
            data_dir: default_data_dir(),
            checkpoint_path: default_checkpoint_path(),
            embedding_backend: EmbeddingBackend::Hashed,
            embedding_base_url: default_embedding_base_url(),
            embedding_model: default_embedding_model(),
            openai_api_key: None,
            openai_base_url: default_openai_base_url(),
            vector_size: default_vector_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            upsert_batch_size: default_upsert_batch_size(),
            upsert_batch_delay_ms: default_upsert_batch_delay_ms(),
            manifest_flush_every: default_manifest_flush_every(),
            sample_top_root: default_sample_top_root(),
            sample_top_recent: default_sample_top_recent(),
            sample_top_frequent: default_sample_top_frequent(),
            sample_all: false,
        }
    }

    #[test]
    fn accepts_default_chunk_bounds() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let mut config = base_config();
        config.chunk_size = 50;
        config.chunk_overlap = 50;
        assert!(config.validate().is_err());

        config.chunk_overlap = 80;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_knowledge_id() {
        let mut config = base_config();
        config.knowledge_id = "  ".into();
        assert!(config.validate().is_err());
    }
}
