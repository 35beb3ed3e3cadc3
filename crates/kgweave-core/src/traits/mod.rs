//! Core traits for kgweave providers.

mod embedder;
mod llm;

pub use embedder::*;
pub use llm::*;
