//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use kgweave_core::extraction::{ExtractionGateway, OutputSchema, StructuredExtractor};
use kgweave_core::{BuildConfig, Embedder, ExtractionConfig, GraphBuilder, KgResult};

pub const DIM: usize = 64;
const FIRST_AUTO_AXIS: usize = 8;

/// Embedder with fixed vectors for known texts. Every other distinct text
/// gets its own orthogonal axis, so unknown texts never look similar.
pub struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    auto: Mutex<HashMap<String, usize>>,
}

impl TableEmbedder {
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            auto: Mutex::new(HashMap::new()),
        }
    }

    /// Register a vector given by its leading components.
    pub fn with(mut self, text: &str, head: &[f32]) -> Self {
        assert!(head.len() <= FIRST_AUTO_AXIS);
        let mut v = vec![0.0; DIM];
        v[..head.len()].copy_from_slice(head);
        self.table.insert(text.to_string(), v);
        self
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, text: &str) -> KgResult<Vec<f32>> {
        if let Some(v) = self.table.get(text) {
            return Ok(v.clone());
        }
        let mut auto = self.auto.lock().unwrap();
        let next = FIRST_AUTO_AXIS + auto.len();
        let axis = *auto.entry(text.to_string()).or_insert(next);
        assert!(axis < DIM, "too many distinct texts");
        let mut v = vec![0.0; DIM];
        v[axis] = 1.0;
        Ok(v)
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "table"
    }
}

/// Answers extraction calls from per-section scripts keyed by the context.
pub struct SectionExtractor {
    sections: HashMap<String, (Value, Value)>,
    pub calls: AtomicUsize,
}

impl SectionExtractor {
    pub fn new() -> Self {
        Self {
            sections: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script a section. Entities are `(label, name)`, relationships are
    /// `(start, end, predicate)` by entity name.
    pub fn section(
        mut self,
        text: &str,
        entities: &[(&str, &str)],
        relationships: &[(&str, &str, &str)],
    ) -> Self {
        let entities = json!({
            "entities": entities
                .iter()
                .map(|(label, name)| json!({"label": label, "name": name}))
                .collect::<Vec<_>>()
        });
        let relationships = json!({
            "relationships": relationships
                .iter()
                .map(|(s, e, n)| json!({"startNode": s, "endNode": e, "name": n}))
                .collect::<Vec<_>>()
        });
        self.sections
            .insert(text.to_string(), (entities, relationships));
        self
    }

    /// Script a section whose replies never carry the expected top-level key.
    pub fn malformed(mut self, text: &str) -> Self {
        self.sections
            .insert(text.to_string(), (json!({}), json!({})));
        self
    }
}

#[async_trait]
impl StructuredExtractor for SectionExtractor {
    async fn extract_structured(
        &self,
        context: &str,
        schema: OutputSchema,
        _instructions: &str,
    ) -> KgResult<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = match (self.sections.get(context), schema) {
            (Some((entities, _)), OutputSchema::Entities) => entities.clone(),
            (Some((_, relationships)), OutputSchema::Relationships) => relationships.clone(),
            (None, schema) => json!({ schema.top_level_key(): [] }),
        };
        Ok(Some(value))
    }
}

pub fn builder(extractor: SectionExtractor, embedder: TableEmbedder) -> GraphBuilder {
    builder_with(extractor, embedder, BuildConfig::default())
}

pub fn builder_with(
    extractor: SectionExtractor,
    embedder: TableEmbedder,
    config: BuildConfig,
) -> GraphBuilder {
    let gateway = ExtractionGateway::new(
        Arc::new(extractor),
        Arc::new(embedder),
        ExtractionConfig::default().without_delay(),
    );
    GraphBuilder::new(gateway, config)
}
