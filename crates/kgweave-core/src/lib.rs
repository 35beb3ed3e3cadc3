//! kgweave-core - Core library for kgweave.
//!
//! This crate provides the graph model, the identifier and embedding based
//! resolution engine, the per-document graph builder and the concurrent
//! batch driver.
//!
//! # Example
//!
//! ```ignore
//! use kgweave_core::{BuildConfig, BuildRequest, ExtractionConfig, ExtractionGateway, GraphBuilder};
//!
//! let gateway = ExtractionGateway::new(extractor, embedder, ExtractionConfig::default());
//! let builder = GraphBuilder::new(gateway, BuildConfig::default());
//!
//! let graph = builder
//!     .build(BuildRequest::new(sections).with_source("PMID12345"))
//!     .await?;
//! ```

pub mod batch;
pub mod builder;
pub mod config;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use batch::{
    BatchFailure, BatchReport, BatchRunner, BatchWorker, DocumentPipeline, DocumentSource,
    GraphSink, JsonDirectorySource, JsonFileSink,
};
pub use builder::{BuildRequest, GraphBuilder};
pub use config::{BatchConfig, BuildConfig, ExtractionConfig, KgConfig};
pub use error::{ErrorCode, ExtractionKind, KgError, KgResult};
pub use extraction::{ExtractionGateway, LlmStructuredExtractor, OutputSchema, StructuredExtractor};
pub use graph::{ConsistencyEnforcer, FinalizeStats, MatchOutcome, RepresentativePolicy};
pub use traits::{Embedder, EmbedderConfig, Llm, LlmConfig};
pub use types::{
    Document, Entity, ExternalId, ExternalIdTable, KnowledgeGraph, Message, MessageRole,
    Relationship,
};
