//! kgweave-embeddings - Embedding provider implementations for kgweave.
//!
//! Embeddings drive every similarity decision in graph building, so the
//! providers here reject vectors whose length disagrees with the
//! configured dimension instead of passing them on.
//!
//! # Supported Providers
//!
//! - **Ollama** (feature: `ollama`, default) - nomic-embed-text, mxbai-embed-large, etc.
//! - **OpenAI** (feature: `openai`) - text-embedding-3-small, text-embedding-3-large, etc.
//!
//! # Example
//!
//! ```ignore
//! use kgweave_embeddings::EmbedderFactory;
//!
//! let embedder = EmbedderFactory::ollama_with_model("nomic-embed-text", 768)?;
//! let embedder = EmbedderFactory::from_config(&config.embedder)?;
//! ```

mod factory;
mod ollama;
mod openai;

pub use factory::EmbedderFactory;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAIEmbedder;

// Re-export core types for convenience
pub use kgweave_core::config::EmbedderProviderConfig;
pub use kgweave_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};

use kgweave_core::error::{ErrorCode, KgError, KgResult};

/// Reject a vector whose length differs from the configured dimension.
/// A configured dimension of zero accepts any length.
#[cfg_attr(not(any(feature = "openai", feature = "ollama")), allow(dead_code))]
pub(crate) fn check_dimension(expected: usize, embedding: Vec<f32>) -> KgResult<Vec<f32>> {
    if expected != 0 && embedding.len() != expected {
        return Err(KgError::Embedding {
            message: format!(
                "expected {} dimensions, provider returned {}",
                expected,
                embedding.len()
            ),
            code: ErrorCode::EmbDimensionMismatch,
            source: None,
        });
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(3, vec![0.1, 0.2, 0.3]).is_ok());
        assert!(check_dimension(0, vec![0.1]).is_ok());

        let err = check_dimension(4, vec![0.1]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmbDimensionMismatch);
    }
}
