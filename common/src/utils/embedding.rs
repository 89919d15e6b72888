use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use async_openai::types::CreateEmbeddingRequestArgs;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::{
    error::AppError,
    utils::config::{AppConfig, EmbeddingBackend},
};

/// Sentinel input used by the startup probe to learn the service's actual
/// vector dimensionality.
const PROBE_SENTINEL: &str = "dimension probe";

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding service unreachable: {0}")]
    Unreachable(String),
    #[error("embedding service returned status {0}")]
    Status(u16),
    #[error("embedding service error: {0}")]
    Api(String),
    #[error("unrecognized embedding response shape")]
    UnrecognizedShape,
    #[error("embedding service returned an empty vector")]
    Empty,
}

#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    /// Ollama-style HTTP endpoint taking `{model, prompt}`.
    Http {
        client: reqwest::Client,
        base_url: String,
        model: String,
    },
    OpenAI {
        client: Arc<async_openai::Client<async_openai::config::OpenAIConfig>>,
        model: String,
    },
    Hashed {
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::Http { .. } => "http",
            EmbeddingInner::OpenAI { .. } => "openai",
            EmbeddingInner::Hashed { .. } => "hashed",
        }
    }

    pub fn model_code(&self) -> Option<String> {
        match &self.inner {
            EmbeddingInner::Http { model, .. } | EmbeddingInner::OpenAI { model, .. } => {
                Some(model.clone())
            }
            EmbeddingInner::Hashed { .. } => None,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(hashed_embedding(text, *dimension)),
            EmbeddingInner::Http {
                client,
                base_url,
                model,
            } => {
                let response = client
                    .post(base_url)
                    .json(&json!({ "model": model, "prompt": text }))
                    .send()
                    .await
                    .map_err(|err| EmbeddingError::Unreachable(err.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(EmbeddingError::Status(status.as_u16()));
                }

                let body: Value = response
                    .json()
                    .await
                    .map_err(|err| EmbeddingError::Api(err.to_string()))?;

                let vector = extract_vector(&body).ok_or(EmbeddingError::UnrecognizedShape)?;
                if vector.is_empty() {
                    return Err(EmbeddingError::Empty);
                }
                Ok(vector)
            }
            EmbeddingInner::OpenAI { client, model } => {
                let request = CreateEmbeddingRequestArgs::default()
                    .model(model.clone())
                    .input([text])
                    .build()
                    .map_err(|err| EmbeddingError::Api(err.to_string()))?;

                let response = client
                    .embeddings()
                    .create(request)
                    .await
                    .map_err(|err| EmbeddingError::Api(err.to_string()))?;

                let embedding = response
                    .data
                    .into_iter()
                    .next()
                    .map(|item| item.embedding)
                    .ok_or(EmbeddingError::UnrecognizedShape)?;

                if embedding.is_empty() {
                    return Err(EmbeddingError::Empty);
                }
                Ok(embedding)
            }
        }
    }

    /// Embeds a sentinel string to confirm the service is reachable and to
    /// learn its actual dimensionality, which becomes authoritative for the
    /// run regardless of the configured `vector_size`.
    pub async fn probe_dimension(&self) -> Result<usize, EmbeddingError> {
        let vector = self.embed(PROBE_SENTINEL).await?;
        debug!(
            backend = self.backend_label(),
            dimension = vector.len(),
            "embedding probe succeeded"
        );
        Ok(vector.len())
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let inner = match config.embedding_backend {
            EmbeddingBackend::Hashed => EmbeddingInner::Hashed {
                dimension: config.vector_size.max(1),
            },
            EmbeddingBackend::Http => EmbeddingInner::Http {
                client: reqwest::Client::builder()
                    .timeout(Duration::from_secs(config.http_timeout_secs))
                    .build()?,
                base_url: config.embedding_base_url.clone(),
                model: config.embedding_model.clone(),
            },
            EmbeddingBackend::OpenAI => {
                let api_key = config.openai_api_key.as_deref().ok_or_else(|| {
                    AppError::Validation(
                        "openai_api_key is required for the openai embedding backend".into(),
                    )
                })?;
                let client = async_openai::Client::with_config(
                    async_openai::config::OpenAIConfig::new()
                        .with_api_key(api_key)
                        .with_api_base(&config.openai_base_url),
                );
                EmbeddingInner::OpenAI {
                    client: Arc::new(client),
                    model: config.embedding_model.clone(),
                }
            }
        };

        Ok(EmbeddingProvider { inner })
    }

    pub fn new_hashed(dimension: usize) -> Self {
        EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: dimension.max(1),
            },
        }
    }
}

/// One extraction strategy over the not-quite-standardized response schema.
type ExtractStrategy = fn(&Value) -> Option<Vec<f32>>;

/// Tried in order; first success wins. Covers the shapes observed across
/// embedding providers: a bare array, an `embedding` field, an `embeddings`
/// field (flat or nested), and the OpenAI-style `data[0].embedding`.
const EXTRACT_STRATEGIES: &[ExtractStrategy] = &[
    extract_bare_array,
    extract_embedding_field,
    extract_embeddings_field,
    extract_data_field,
];

fn extract_vector(value: &Value) -> Option<Vec<f32>> {
    EXTRACT_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(value))
}

fn as_float_vector(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_f64().map(|f| f as f32))
        .collect()
}

fn extract_bare_array(value: &Value) -> Option<Vec<f32>> {
    as_float_vector(value)
}

fn extract_embedding_field(value: &Value) -> Option<Vec<f32>> {
    as_float_vector(value.get("embedding")?)
}

fn extract_embeddings_field(value: &Value) -> Option<Vec<f32>> {
    let embeddings = value.get("embeddings")?;
    // Either a flat vector, or a batch where only the first row matters.
    as_float_vector(embeddings)
        .or_else(|| as_float_vector(embeddings.as_array()?.first()?))
}

fn extract_data_field(value: &Value) -> Option<Vec<f32>> {
    as_float_vector(value.get("data")?.as_array()?.first()?.get("embedding")?)
}

// Helper functions for hashed embeddings
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    for token in tokens(text) {
        let idx = bucket(&token, dim);
        if let Some(slot) = vector.get_mut(idx) {
            *slot += 1.0;
        }
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_bare_array() {
        let value = json!([0.1, 0.2, 0.3]);
        assert_eq!(extract_vector(&value), Some(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn extracts_embedding_field() {
        let value = json!({ "embedding": [1.0, 2.0] });
        assert_eq!(extract_vector(&value), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn extracts_flat_embeddings_field() {
        let value = json!({ "embeddings": [0.5, 0.25] });
        assert_eq!(extract_vector(&value), Some(vec![0.5, 0.25]));
    }

    #[test]
    fn extracts_nested_embeddings_field() {
        let value = json!({ "embeddings": [[0.5, 0.25], [0.1, 0.9]] });
        assert_eq!(extract_vector(&value), Some(vec![0.5, 0.25]));
    }

    #[test]
    fn extracts_openai_data_field() {
        let value = json!({ "data": [{ "embedding": [0.7, 0.8] }] });
        assert_eq!(extract_vector(&value), Some(vec![0.7, 0.8]));
    }

    #[test]
    fn rejects_unrecognized_shapes() {
        assert_eq!(extract_vector(&json!({ "vectors": [1.0] })), None);
        assert_eq!(extract_vector(&json!("not a vector")), None);
        assert_eq!(extract_vector(&json!([])), None);
        assert_eq!(extract_vector(&json!(["a", "b"])), None);
    }

    #[test]
    fn hashed_embedding_is_deterministic_and_normalized() {
        let first = hashed_embedding("the quick brown fox", 64);
        let second = hashed_embedding("the quick brown fox", 64);
        assert_eq!(first, second);

        let norm = first.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hashed_embedding_of_empty_text_is_zero() {
        let vector = hashed_embedding("", 16);
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn hashed_probe_reports_dimension() {
        let provider = EmbeddingProvider::new_hashed(48);
        let dimension = provider
            .probe_dimension()
            .await
            .expect("hashed probe should succeed");
        assert_eq!(dimension, 48);
    }
}
