//! Candidate extraction from text.

mod gateway;
mod structured;

pub use gateway::{weighted_embedding, ExtractionGateway};
pub use structured::{LlmStructuredExtractor, OutputSchema, StructuredExtractor};
