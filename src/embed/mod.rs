//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - A registry of supported provider/model pairs
//! - Per-chatbot backend selection driven by chatbot settings

mod http_backend;

pub use http_backend::*;

#[cfg(feature = "local-embed")]
mod fastembed_impl;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::records::EmbeddingModelConfig;
use async_trait::async_trait;

/// Trait for embedding backends
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Lookup the expected embedding dimension for a known provider/model pair
///
/// This is the registry consulted when chatbot settings are validated:
/// pairs absent from it are a configuration error, not a retry candidate.
pub fn registered_dimension(provider: &str, model: &str) -> Option<usize> {
    match (provider, model) {
        ("openai", "text-embedding-ada-002") => Some(1536),
        ("openai", "text-embedding-3-small") => Some(1536),
        ("openai", "text-embedding-3-large") => Some(3072),
        ("local", "BAAI/bge-small-en-v1.5") => Some(384),
        ("local", "BAAI/bge-base-en-v1.5") => Some(768),
        _ => None,
    }
}

/// Selects an embedding backend per chatbot configuration
pub trait EmbedderProvider: Send + Sync {
    fn embedder_for(&self, config: &EmbeddingModelConfig) -> Result<Box<dyn Embedder>>;
}

/// Default provider backed by the configured HTTP API (and the optional
/// local fastembed backend)
pub struct HttpEmbedderProvider {
    config: EmbeddingConfig,
}

impl HttpEmbedderProvider {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }
}

impl EmbedderProvider for HttpEmbedderProvider {
    fn embedder_for(&self, model_config: &EmbeddingModelConfig) -> Result<Box<dyn Embedder>> {
        let dimension = registered_dimension(&model_config.provider, &model_config.model)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Unknown embedding model '{}/{}'",
                    model_config.provider, model_config.model
                ))
            })?;

        match model_config.provider.as_str() {
            "openai" => Ok(Box::new(HttpEmbedder::new(
                &self.config,
                &model_config.model,
                dimension,
            )?)),
            #[cfg(feature = "local-embed")]
            "local" => Ok(Box::new(FastEmbedder::new(&model_config.model, dimension)?)),
            #[cfg(not(feature = "local-embed"))]
            "local" => Err(Error::Config(
                "Local embeddings require the 'local-embed' feature".to_string(),
            )),
            other => Err(Error::Config(format!(
                "Unknown embedding provider '{}'",
                other
            ))),
        }
    }
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch_texts: Vec<String> = chunk.to_vec();
        let embeddings = embedder.embed(batch_texts).await?;
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}
