//! Factory for creating embedding providers.

use std::sync::Arc;

use kgweave_core::config::EmbedderProviderConfig;
use kgweave_core::error::KgResult;
use kgweave_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};
use tracing::debug;

use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAIEmbedder;

/// Factory for creating embedding providers.
pub struct EmbedderFactory;

impl EmbedderFactory {
    /// Create an embedder from the given configuration.
    pub fn create(
        provider: EmbedderProvider,
        config: EmbedderConfig,
    ) -> KgResult<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match provider {
            EmbedderProvider::OpenAI => Arc::new(OpenAIEmbedder::new(config)?),
            EmbedderProvider::Ollama => Arc::new(OllamaEmbedder::new(config)?),
        };
        debug!(
            ?provider,
            model = embedder.model_name(),
            dims = embedder.dimension(),
            "Created embedder"
        );
        Ok(embedder)
    }

    /// Create the embedder described by an `[embedder]` config section.
    pub fn from_config(config: &EmbedderProviderConfig) -> KgResult<Arc<dyn Embedder>> {
        Self::create(config.provider, config.config.clone())
    }

    /// Create an OpenAI embedder with default configuration.
    pub fn openai() -> KgResult<Arc<dyn Embedder>> {
        Self::openai_with_model("text-embedding-3-small", 1536)
    }

    /// Create an OpenAI embedder with a specific model.
    pub fn openai_with_model(
        model: impl Into<String>,
        dims: usize,
    ) -> KgResult<Arc<dyn Embedder>> {
        let config = EmbedderConfig {
            model: model.into(),
            embedding_dims: dims,
            ..Default::default()
        };
        Self::create(EmbedderProvider::OpenAI, config)
    }

    /// Create an Ollama embedder with default configuration.
    pub fn ollama() -> KgResult<Arc<dyn Embedder>> {
        Self::create(EmbedderProvider::Ollama, EmbedderConfig::default())
    }

    /// Create an Ollama embedder with a specific model.
    pub fn ollama_with_model(
        model: impl Into<String>,
        dims: usize,
    ) -> KgResult<Arc<dyn Embedder>> {
        let config = EmbedderConfig {
            model: model.into(),
            embedding_dims: dims,
            ..Default::default()
        };
        Self::create(EmbedderProvider::Ollama, config)
    }
}
