//! Per-document graph construction.
//!
//! Sections are processed strictly in order. The first section seeds a
//! [`RunningGraph`]; each later section resolves its entities against the
//! running entity set, extracts relationships between the resolved
//! entities, resolves those against the running relationship set and
//! appends them. A prior graph, if any, is appended before the single
//! finalisation pass.

use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::error::{KgError, KgResult};
use crate::extraction::ExtractionGateway;
use crate::graph::{process_lists, ConsistencyEnforcer};
use crate::types::{Document, Entity, ExternalIdTable, KnowledgeGraph, Relationship};

/// Input of one build.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Identifier used in logs and errors.
    pub document_id: Option<String>,
    pub sections: Vec<String>,
    /// Provenance tag stamped on every extracted relationship.
    pub source: Option<String>,
    pub external_ids: ExternalIdTable,
    pub existing_graph: Option<KnowledgeGraph>,
}

impl BuildRequest {
    pub fn new(sections: Vec<String>) -> Self {
        Self {
            sections,
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_external_ids(mut self, external_ids: ExternalIdTable) -> Self {
        self.external_ids = external_ids;
        self
    }

    pub fn with_existing_graph(mut self, graph: KnowledgeGraph) -> Self {
        self.existing_graph = Some(graph);
        self
    }
}

impl From<Document> for BuildRequest {
    fn from(doc: Document) -> Self {
        Self {
            document_id: Some(doc.id),
            sections: doc.sections,
            source: doc.source,
            external_ids: doc.external_ids,
            existing_graph: None,
        }
    }
}

/// Accumulated state of a build between sections.
#[derive(Debug, Default)]
struct RunningGraph {
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    sections: usize,
}

impl RunningGraph {
    fn into_graph(self) -> KnowledgeGraph {
        KnowledgeGraph::new(self.entities, self.relationships)
    }
}

/// Builds one finalised graph per document.
pub struct GraphBuilder {
    gateway: ExtractionGateway,
    config: BuildConfig,
    enforcer: ConsistencyEnforcer,
}

impl GraphBuilder {
    pub fn new(gateway: ExtractionGateway, config: BuildConfig) -> Self {
        let enforcer = ConsistencyEnforcer::new(config.representative_policy);
        Self {
            gateway,
            config,
            enforcer,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build and finalise a graph from the request's sections.
    pub async fn build(&self, request: BuildRequest) -> KgResult<KnowledgeGraph> {
        let BuildRequest {
            document_id,
            sections,
            source,
            external_ids,
            existing_graph,
        } = request;
        let document = document_id.as_deref().unwrap_or("-");

        let mut running = RunningGraph::default();
        for (index, section) in sections.iter().enumerate() {
            if section.trim().is_empty() {
                warn!(document, section = index, "Skipping blank section");
                continue;
            }
            running = self
                .process_section(running, section, source.as_deref(), &external_ids)
                .await?;
            debug!(
                document,
                section = index,
                entities = running.entities.len(),
                relationships = running.relationships.len(),
                "Processed section"
            );
        }

        if running.sections == 0 {
            let message = "document has no non-blank section";
            return Err(match &document_id {
                Some(id) => KgError::malformed_document(id.clone(), message),
                None => KgError::malformed_input(message),
            });
        }

        let sections_processed = running.sections;
        let mut graph = running.into_graph();
        if let Some(mut existing) = existing_graph {
            existing.normalize();
            info!(
                document,
                entities = existing.entity_count(),
                relationships = existing.relationship_count(),
                "Appending existing graph"
            );
            graph.extend(existing);
        }

        let graph = self.enforcer.finalize(graph);
        info!(
            document,
            sections = sections_processed,
            entities = graph.entity_count(),
            relationships = graph.relationship_count(),
            "Built knowledge graph"
        );
        Ok(graph)
    }

    async fn process_section(
        &self,
        mut running: RunningGraph,
        section: &str,
        source: Option<&str>,
        external_ids: &ExternalIdTable,
    ) -> KgResult<RunningGraph> {
        let entities = self.gateway.extract_entities(section, external_ids).await?;

        if running.sections == 0 {
            let relationships = self
                .gateway
                .extract_relationships(section, &entities, source)
                .await?;
            running.entities = entities;
            running.relationships = relationships;
        } else {
            let (resolved, entities) =
                process_lists(entities, &running.entities, self.config.ent_threshold);
            running.entities = entities;

            let relationships = self
                .gateway
                .extract_relationships(section, &resolved, source)
                .await?;
            let (resolved, _) = process_lists(
                relationships,
                &running.relationships,
                self.config.rel_threshold,
            );
            running.relationships.extend(resolved);
        }

        running.sections += 1;
        Ok(running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::extraction::{OutputSchema, StructuredExtractor};
    use crate::traits::Embedder;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns the same two-entity answer for every section.
    struct FixedExtractor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StructuredExtractor for FixedExtractor {
        async fn extract_structured(
            &self,
            _context: &str,
            schema: OutputSchema,
            _instructions: &str,
        ) -> KgResult<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(match schema {
                OutputSchema::Entities => json!({"entities": [
                    {"label": "gene", "name": "TP53"},
                    {"label": "gene", "name": "MDM2"}
                ]}),
                OutputSchema::Relationships => json!({"relationships": [
                    {"startNode": "mdm2", "endNode": "tp53", "name": "degrades"}
                ]}),
            }))
        }
    }

    struct ConstantEmbedder;

    #[async_trait]
    impl Embedder for ConstantEmbedder {
        async fn embed(&self, text: &str) -> KgResult<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "constant"
        }
    }

    fn builder(extractor: Arc<FixedExtractor>) -> GraphBuilder {
        let gateway = ExtractionGateway::new(
            extractor,
            Arc::new(ConstantEmbedder),
            ExtractionConfig::default().without_delay(),
        );
        GraphBuilder::new(gateway, BuildConfig::default())
    }

    #[tokio::test]
    async fn test_blank_sections_skipped() {
        let extractor = Arc::new(FixedExtractor {
            calls: AtomicUsize::new(0),
        });
        let builder = builder(extractor.clone());

        let graph = builder
            .build(BuildRequest::new(vec![
                "  ".to_string(),
                "MDM2 degrades TP53.".to_string(),
            ]))
            .await
            .unwrap();

        assert_eq!(graph.entity_count(), 2);
        assert_eq!(graph.relationship_count(), 1);
        // One entity call and one relationship call.
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_all_blank_is_malformed() {
        let builder = builder(Arc::new(FixedExtractor {
            calls: AtomicUsize::new(0),
        }));
        let mut request = BuildRequest::new(vec!["".to_string(), "\n".to_string()]);
        request.document_id = Some("doc-1".to_string());

        match builder.build(request).await {
            Err(KgError::MalformedInput { document_id, .. }) => {
                assert_eq!(document_id.as_deref(), Some("doc-1"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_repeated_sections_converge() {
        let builder = builder(Arc::new(FixedExtractor {
            calls: AtomicUsize::new(0),
        }));
        let graph = builder
            .build(BuildRequest::new(vec!["a".into(), "b".into(), "c".into()]).with_source("PMID9"))
            .await
            .unwrap();

        assert_eq!(graph.entity_count(), 2);
        assert_eq!(graph.relationship_count(), 1);
        assert_eq!(graph.relationships[0].source(), Some("PMID9"));
    }

    #[test]
    fn test_request_from_document() {
        let doc = Document::new("42", vec!["text".into()]).with_source("PMID42");
        let request = BuildRequest::from(doc);
        assert_eq!(request.document_id.as_deref(), Some("42"));
        assert_eq!(request.source.as_deref(), Some("PMID42"));
        assert!(request.existing_graph.is_none());
    }
}
