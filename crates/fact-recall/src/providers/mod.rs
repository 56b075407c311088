//! Provider construction from configuration.
//!
//! The application owns provider lifecycles: providers are built once from
//! the config and injected into the core types as `Arc<dyn ...>`.

pub mod embedding;
pub mod generation;

use std::sync::Arc;

use anyhow::{bail, Result};

use fact_recall_core::embedding::EmbeddingProvider;
use fact_recall_core::generation::GenerativeProvider;

use crate::config::{EmbeddingConfig, GenerationConfig};

pub use embedding::{DisabledEmbeddings, OllamaEmbeddings, OpenAiEmbeddings};
pub use generation::OpenAiCompatibleGenerator;

/// Create the configured [`EmbeddingProvider`].
///
/// | Config value | Provider |
/// |--------------|----------|
/// | `"disabled"` | [`DisabledEmbeddings`] |
/// | `"openai"` | [`OpenAiEmbeddings`] |
/// | `"ollama"` | [`OllamaEmbeddings`] |
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbeddings)),
        "openai" => Ok(Arc::new(OpenAiEmbeddings::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbeddings::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Create the configured [`GenerativeProvider`]. Every supported value is
/// OpenAI-compatible; they differ only in base URL and auth.
pub fn create_generative_provider(config: &GenerationConfig) -> Result<Arc<dyn GenerativeProvider>> {
    match config.provider.as_str() {
        "openai" | "custom" => Ok(Arc::new(OpenAiCompatibleGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
