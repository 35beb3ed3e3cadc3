//! The per-document batch worker.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::runner::BatchWorker;
use super::sink::GraphSink;
use super::source::DocumentSource;
use crate::builder::{BuildRequest, GraphBuilder};
use crate::error::KgResult;

/// Loads a document, builds its graph, and stores the result.
///
/// The sink is written only once the build, including finalisation, has
/// succeeded, so a failed document leaves no output behind.
pub struct DocumentPipeline {
    source: Arc<dyn DocumentSource>,
    builder: Arc<GraphBuilder>,
    sink: Arc<dyn GraphSink>,
}

impl DocumentPipeline {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        builder: Arc<GraphBuilder>,
        sink: Arc<dyn GraphSink>,
    ) -> Self {
        Self {
            source,
            builder,
            sink,
        }
    }
}

#[async_trait]
impl BatchWorker for DocumentPipeline {
    #[instrument(skip(self))]
    async fn process(&self, id: &str) -> KgResult<()> {
        let document = self.source.load(id).await?;
        debug!(sections = document.sections.len(), "Loaded document");

        let graph = self.builder.build(BuildRequest::from(document)).await?;
        self.sink.write(id, &graph).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::sink::MockGraphSink;
    use crate::config::{BuildConfig, ExtractionConfig};
    use crate::error::KgError;
    use crate::extraction::{ExtractionGateway, OutputSchema, StructuredExtractor};
    use crate::traits::Embedder;
    use crate::types::Document;
    use serde_json::{json, Value};

    struct MemorySource;

    #[async_trait]
    impl DocumentSource for MemorySource {
        async fn list_ids(&self) -> KgResult<Vec<String>> {
            Ok(vec!["good".into(), "empty".into()])
        }

        async fn load(&self, id: &str) -> KgResult<Document> {
            match id {
                "good" => Ok(Document::new(id, vec!["TP53 binds MDM2.".into()])),
                "empty" => Ok(Document::new(id, vec!["   ".into()])),
                _ => Err(KgError::storage_read(format!("no document {}", id))),
            }
        }
    }

    struct PairExtractor;

    #[async_trait]
    impl StructuredExtractor for PairExtractor {
        async fn extract_structured(
            &self,
            _context: &str,
            schema: OutputSchema,
            _instructions: &str,
        ) -> KgResult<Option<Value>> {
            Ok(Some(match schema {
                OutputSchema::Entities => json!({"entities": [
                    {"label": "gene", "name": "TP53"},
                    {"label": "gene", "name": "MDM2"}
                ]}),
                OutputSchema::Relationships => json!({"relationships": [
                    {"startNode": "tp53", "endNode": "mdm2", "name": "binds"}
                ]}),
            }))
        }
    }

    struct UnitEmbedder;

    #[async_trait]
    impl Embedder for UnitEmbedder {
        async fn embed(&self, _text: &str) -> KgResult<Vec<f32>> {
            Ok(vec![1.0])
        }

        fn dimension(&self) -> usize {
            1
        }

        fn model_name(&self) -> &str {
            "unit"
        }
    }

    fn pipeline(sink: MockGraphSink) -> DocumentPipeline {
        let gateway = ExtractionGateway::new(
            Arc::new(PairExtractor),
            Arc::new(UnitEmbedder),
            ExtractionConfig::default().without_delay(),
        );
        DocumentPipeline::new(
            Arc::new(MemorySource),
            Arc::new(GraphBuilder::new(gateway, BuildConfig::default())),
            Arc::new(sink),
        )
    }

    #[tokio::test]
    async fn test_successful_build_is_written() {
        let mut sink = MockGraphSink::new();
        sink.expect_write()
            .withf(|id, graph| id.to_string() == "good" && graph.relationship_count() == 1)
            .times(1)
            .returning(|_, _| Ok(()));

        pipeline(sink).process("good").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_build_writes_nothing() {
        let mut sink = MockGraphSink::new();
        sink.expect_write().never();

        let pipeline = pipeline(sink);
        let err = pipeline.process("empty").await.unwrap_err();
        assert!(matches!(err, KgError::MalformedInput { .. }));
        assert!(pipeline.process("missing").await.is_err());
    }
}
