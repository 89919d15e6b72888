#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod cache;
pub mod checkpoint;
pub mod chunker;
pub mod extract;
pub mod fetcher;
pub mod pipeline;
pub mod registrar;
pub mod sampler;
pub mod types;
pub mod upsert;

pub use pipeline::{IngestionPipeline, PipelineServices, RunSummary};
