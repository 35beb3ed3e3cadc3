//! kgweave-llm - LLM provider implementations for kgweave.
//!
//! The providers here back the structured extraction step of graph
//! building. Both are feature gated; a provider compiled without its
//! feature still constructs, but every generation call fails with a
//! configuration error.
//!
//! # Supported Providers
//!
//! - **Ollama** (feature: `ollama`, default) - local models such as deepseek-r1
//! - **OpenAI** (feature: `openai`) - GPT-4o, GPT-4.1, etc.
//!
//! # Example
//!
//! ```ignore
//! use kgweave_llm::LlmFactory;
//!
//! let llm = LlmFactory::ollama_with_model("deepseek-r1:32b")?;
//! let llm = LlmFactory::from_config(&config.llm)?;
//! ```

mod factory;
mod ollama;
mod openai;

pub use factory::LlmFactory;
pub use ollama::OllamaLlm;
pub use openai::OpenAIProvider;

// Re-export core types for convenience
pub use kgweave_core::config::{LlmProvider, LlmProviderConfig};
pub use kgweave_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse, ResponseFormat};
