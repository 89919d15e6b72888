use std::sync::Arc;

use common::{
    storage::db::SurrealDbClient,
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use ingestion_pipeline::IngestionPipeline;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;
    config.validate()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let embedding_provider = Arc::new(EmbeddingProvider::from_config(&config)?);
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_model = ?embedding_provider.model_code(),
        "Embedding provider initialized"
    );

    let pipeline = IngestionPipeline::new(db, config, embedding_provider)?;
    let summary = pipeline.run().await?;

    info!(
        spaces_processed = summary.spaces_processed,
        spaces_skipped = summary.spaces_skipped,
        spaces_failed = summary.spaces_failed,
        documents_ingested = summary.documents_ingested,
        documents_failed = summary.documents_failed,
        documents_skipped = summary.documents_skipped,
        "Ingestion run complete"
    );

    Ok(())
}
