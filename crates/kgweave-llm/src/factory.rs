//! Factory for creating LLM providers.

use std::sync::Arc;

use kgweave_core::config::{LlmProvider, LlmProviderConfig};
use kgweave_core::error::KgResult;
use kgweave_core::traits::{Llm, LlmConfig};
use tracing::debug;

use crate::ollama::OllamaLlm;
use crate::openai::OpenAIProvider;

/// Factory for creating LLM providers.
pub struct LlmFactory;

impl LlmFactory {
    /// Create an LLM provider from the given configuration.
    pub fn create(provider: LlmProvider, config: LlmConfig) -> KgResult<Arc<dyn Llm>> {
        let llm: Arc<dyn Llm> = match provider {
            LlmProvider::OpenAI => Arc::new(OpenAIProvider::new(config)?),
            LlmProvider::Ollama => Arc::new(OllamaLlm::new(config)?),
        };
        debug!(?provider, model = llm.model_name(), "Created LLM provider");
        Ok(llm)
    }

    /// Create the provider described by a `[llm]` config section.
    pub fn from_config(config: &LlmProviderConfig) -> KgResult<Arc<dyn Llm>> {
        Self::create(config.provider, config.config.clone())
    }

    /// Create an OpenAI LLM provider with default configuration.
    pub fn openai() -> KgResult<Arc<dyn Llm>> {
        Self::create(LlmProvider::OpenAI, LlmConfig::default())
    }

    /// Create an OpenAI LLM provider with a specific model.
    pub fn openai_with_model(model: impl Into<String>) -> KgResult<Arc<dyn Llm>> {
        let config = LlmConfig {
            model: model.into(),
            ..Default::default()
        };
        Self::create(LlmProvider::OpenAI, config)
    }

    /// Create an Ollama LLM provider with default configuration.
    pub fn ollama() -> KgResult<Arc<dyn Llm>> {
        Self::create(LlmProvider::Ollama, LlmConfig::default())
    }

    /// Create an Ollama LLM provider with a specific model.
    pub fn ollama_with_model(model: impl Into<String>) -> KgResult<Arc<dyn Llm>> {
        let config = LlmConfig {
            model: model.into(),
            ..Default::default()
        };
        Self::create(LlmProvider::Ollama, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_uses_section_model() {
        let config = LlmProviderConfig::default();
        let llm = LlmFactory::from_config(&config).unwrap();
        assert_eq!(llm.model_name(), "deepseek-r1:32b");
    }

    #[test]
    fn test_openai_with_explicit_key() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let llm = LlmFactory::create(LlmProvider::OpenAI, config).unwrap();
        assert_eq!(llm.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn test_invalid_ollama_url_is_rejected() {
        let config = LlmConfig {
            base_url: Some("not a url".to_string()),
            ..Default::default()
        };
        let err = LlmFactory::create(LlmProvider::Ollama, config)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Invalid Ollama URL"));
    }
}
