//! Candidate extraction with bounded retries.
//!
//! The gateway wraps a [`StructuredExtractor`] and an [`Embedder`]:
//!
//! 1. The structured call is repeated up to `max_tries` times while the
//!    result is absent, errors, or lacks the expected top-level array.
//! 2. Entities are normalised, stamped from the external identifier table,
//!    filtered to the allowed labels and embedded as a weighted sum of their
//!    name and label vectors.
//! 3. Relationship endpoints are resolved against the supplied entities,
//!    first by name and then by embedding similarity. Unresolvable and
//!    reflexive relationships are dropped.
//! 4. Entities left without any relationship get a few extra, focused
//!    relationship passes.
//!
//! Callers' inputs are never mutated.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::structured::{OutputSchema, StructuredExtractor};
use crate::config::ExtractionConfig;
use crate::error::{KgError, KgResult};
use crate::graph::cosine_similarity;
use crate::traits::Embedder;
use crate::types::{normalize_label, normalize_name, Entity, ExternalIdTable, Relationship};

/// Raw JSON structures for extraction results.
/// These allow flexible parsing before converting to graph types.
mod raw {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct RawEntity {
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default, alias = "type", alias = "entity_type", alias = "entityType")]
        pub label: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    pub enum RawEndpoint {
        Name(String),
        Entity(RawEntity),
    }

    impl RawEndpoint {
        pub fn name(&self) -> Option<&str> {
            match self {
                Self::Name(n) => Some(n.as_str()),
                Self::Entity(e) => e.name.as_deref(),
            }
        }

        pub fn label(&self) -> Option<&str> {
            match self {
                Self::Name(_) => None,
                Self::Entity(e) => e.label.as_deref(),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct RawRelationship {
        #[serde(
            default,
            alias = "startNode",
            alias = "start",
            alias = "source",
            alias = "from"
        )]
        pub start_node: Option<RawEndpoint>,
        #[serde(default, alias = "endNode", alias = "end", alias = "target", alias = "to")]
        pub end_node: Option<RawEndpoint>,
        #[serde(
            default,
            alias = "predicate",
            alias = "relationship_type",
            alias = "type"
        )]
        pub name: Option<String>,
    }
}

const ENTITY_DIRECTIVES: &str = "Act like an experienced knowledge graph builder. \
Extract biomedical entities such as genes, proteins, diseases, drugs, chemicals, \
metabolites, variants, cell lines, cell types, regions, processes and pathways.";

/// An endpoint as proposed by the extractor.
struct EndpointQuery {
    name: String,
    label: Option<String>,
}

struct RawTriple {
    start: EndpointQuery,
    end: EndpointQuery,
    predicate: String,
}

/// Combine name and label vectors into one entity vector.
pub fn weighted_embedding(
    name_vec: &[f32],
    label_vec: &[f32],
    name_weight: f32,
    label_weight: f32,
) -> KgResult<Vec<f32>> {
    if name_vec.len() != label_vec.len() {
        return Err(KgError::embedding(format!(
            "Dimension mismatch between name ({}) and label ({}) vectors",
            name_vec.len(),
            label_vec.len()
        )));
    }
    Ok(name_vec
        .iter()
        .zip(label_vec)
        .map(|(n, l)| name_weight * n + label_weight * l)
        .collect())
}

/// Extraction front-end used by the graph builder.
pub struct ExtractionGateway {
    extractor: Arc<dyn StructuredExtractor>,
    embedder: Arc<dyn Embedder>,
    config: ExtractionConfig,
}

impl ExtractionGateway {
    pub fn new(
        extractor: Arc<dyn StructuredExtractor>,
        embedder: Arc<dyn Embedder>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            extractor,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run the structured call until it yields the schema's top-level array.
    ///
    /// Returns `ExtractionFailure` once `max_tries` attempts have failed.
    pub async fn extract_candidates(
        &self,
        schema: OutputSchema,
        context: &str,
        instructions: &str,
    ) -> KgResult<Vec<Value>> {
        let max_tries = self.config.max_tries.max(1);
        let key = schema.top_level_key();
        let mut delays = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.config.retry_delay_ms))
            .with_max_delay(Duration::from_millis(
                self.config.max_retry_delay_ms.max(self.config.retry_delay_ms),
            ))
            .with_max_times(max_tries as usize)
            .build();

        let mut last_error = String::new();
        for attempt in 1..=max_tries {
            match self
                .extractor
                .extract_structured(context, schema, instructions)
                .await
            {
                Ok(Some(Value::Object(mut map))) => match map.remove(key) {
                    Some(Value::Array(items)) => {
                        debug!(kind = %schema.kind(), attempt, count = items.len(), "Extraction succeeded");
                        return Ok(items);
                    }
                    Some(_) => last_error = format!("`{}` is not an array", key),
                    None => last_error = format!("missing `{}` key", key),
                },
                Ok(Some(_)) => last_error = "result is not a JSON object".to_string(),
                Ok(None) => last_error = "result could not be parsed".to_string(),
                Err(e) => last_error = e.to_string(),
            }

            warn!(
                kind = %schema.kind(),
                attempt,
                max_tries,
                error = %last_error,
                "Extraction attempt failed"
            );

            if attempt < max_tries && self.config.retry_delay_ms > 0 {
                if let Some(delay) = delays.next() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(KgError::extraction_failure(schema.kind(), max_tries, last_error))
    }

    fn label_allowed(&self, label: &str) -> bool {
        self.config.allowed_labels.is_empty()
            || self
                .config
                .allowed_labels
                .iter()
                .any(|allowed| normalize_label(allowed) == label)
    }

    /// Extract entities from a context.
    pub async fn extract_entities(
        &self,
        context: &str,
        external_ids: &ExternalIdTable,
    ) -> KgResult<Vec<Entity>> {
        let items = self
            .extract_candidates(OutputSchema::Entities, context, ENTITY_DIRECTIVES)
            .await?;

        let mut seen = HashSet::new();
        let mut entities = Vec::new();
        for item in items {
            let raw: raw::RawEntity = match serde_json::from_value(item) {
                Ok(r) => r,
                Err(e) => {
                    debug!("Skipping unreadable entity candidate: {}", e);
                    continue;
                }
            };
            let Some(name) = raw.name else { continue };

            let entity = match external_ids.lookup(&name) {
                Some(ext) => {
                    debug!(name = %name, canonical_id = %ext.canonical_id, "Stamped external id");
                    Entity::new(&name, &ext.label).with_canonical_id(ext.canonical_id.clone())
                }
                None => Entity::new(&name, raw.label.as_deref().unwrap_or_default()),
            };

            if entity.name.is_empty() {
                continue;
            }
            if !self.label_allowed(&entity.label) {
                debug!(name = %entity.name, label = %entity.label, "Dropped entity with unrecognised label");
                continue;
            }
            if seen.insert(entity.key()) {
                entities.push(entity);
            }
        }

        self.embed_entities(&mut entities).await?;
        Ok(entities)
    }

    async fn embed_entities(&self, entities: &mut [Entity]) -> KgResult<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let names: Vec<String> = entities.iter().map(|e| e.name.clone()).collect();
        let labels: Vec<String> = entities
            .iter()
            .map(|e| e.label.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let name_vecs = self.embedder.embed_batch(&names).await?;
        let label_vecs = self.embedder.embed_batch(&labels).await?;
        if name_vecs.len() != names.len() || label_vecs.len() != labels.len() {
            return Err(KgError::embedding("Embedder returned a wrong number of vectors"));
        }
        let label_index: HashMap<&str, &Vec<f32>> = labels
            .iter()
            .map(String::as_str)
            .zip(label_vecs.iter())
            .collect();

        for (entity, name_vec) in entities.iter_mut().zip(name_vecs) {
            let label_vec = label_index[entity.label.as_str()];
            entity.embedding = Some(weighted_embedding(
                &name_vec,
                label_vec,
                self.config.entity_name_weight,
                self.config.entity_label_weight,
            )?);
        }
        Ok(())
    }

    /// Extract relationships between `entities` from a context.
    ///
    /// Every returned relationship connects two members of `entities` and
    /// carries `source` as its provenance property when given.
    pub async fn extract_relationships(
        &self,
        context: &str,
        entities: &[Entity],
        source: Option<&str>,
    ) -> KgResult<Vec<Relationship>> {
        if entities.len() < 2 {
            debug!(entities = entities.len(), "Too few entities for relationships");
            return Ok(Vec::new());
        }

        let instructions = relationship_directives(entities, &[]);
        let mut relationships = self
            .extract_relationship_pass(context, entities, &instructions, source)
            .await?;

        for round in 1..=self.config.max_tries_isolated_entities {
            let isolated = isolated_entities(entities, &relationships);
            if isolated.is_empty() {
                break;
            }
            info!(round, isolated = isolated.len(), "Re-prompting for isolated entities");

            let instructions = relationship_directives(entities, &isolated);
            match self
                .extract_relationship_pass(context, entities, &instructions, source)
                .await
            {
                Ok(extra) => {
                    for rel in extra {
                        if !relationships.contains(&rel) {
                            relationships.push(rel);
                        }
                    }
                }
                Err(e) => {
                    warn!(round, error = %e, "Isolated entity pass failed");
                    break;
                }
            }
        }

        Ok(relationships)
    }

    async fn extract_relationship_pass(
        &self,
        context: &str,
        entities: &[Entity],
        instructions: &str,
        source: Option<&str>,
    ) -> KgResult<Vec<Relationship>> {
        let items = self
            .extract_candidates(OutputSchema::Relationships, context, instructions)
            .await?;

        let triples: Vec<RawTriple> = items.into_iter().filter_map(read_triple).collect();

        let mut resolved: HashMap<(String, Option<String>), Option<usize>> = HashMap::new();
        let mut unresolved = Vec::new();
        for triple in &triples {
            for endpoint in [&triple.start, &triple.end] {
                let key = (endpoint.name.clone(), endpoint.label.clone());
                if resolved.contains_key(&key) {
                    continue;
                }
                let hit = resolve_by_name(entities, endpoint);
                if hit.is_none() {
                    unresolved.push(key.clone());
                }
                resolved.insert(key, hit);
            }
        }

        if !unresolved.is_empty() {
            let queries: Vec<EndpointQuery> = unresolved
                .iter()
                .map(|(name, label)| EndpointQuery {
                    name: name.clone(),
                    label: label.clone(),
                })
                .collect();
            // Endpoints left unresolved here drop their relationships.
            match self.resolve_by_similarity(entities, &queries).await {
                Ok(hits) => {
                    for (key, hit) in unresolved.into_iter().zip(hits) {
                        resolved.insert(key, hit);
                    }
                }
                Err(e) => warn!(
                    endpoints = queries.len(),
                    error = %e,
                    "Endpoint similarity lookup failed"
                ),
            }
        }

        let mut seen = HashSet::new();
        let mut relationships = Vec::new();
        for triple in triples {
            let start = resolved[&(triple.start.name.clone(), triple.start.label.clone())];
            let end = resolved[&(triple.end.name.clone(), triple.end.label.clone())];
            let (Some(start), Some(end)) = (start, end) else {
                debug!(
                    start = %triple.start.name,
                    end = %triple.end.name,
                    "Dropped relationship with unresolved endpoint"
                );
                continue;
            };

            let mut rel = Relationship::new(
                entities[start].clone(),
                entities[end].clone(),
                &triple.predicate,
            );
            if rel.name.is_empty() || rel.is_reflexive() {
                continue;
            }
            if let Some(source) = source {
                rel = rel.with_property("source", source);
            }
            if seen.insert((start, end, rel.name.clone())) {
                relationships.push(rel);
            }
        }

        if !relationships.is_empty() {
            let names: Vec<String> = relationships.iter().map(|r| r.name.clone()).collect();
            let vectors = self.embedder.embed_batch(&names).await?;
            if vectors.len() != relationships.len() {
                return Err(KgError::embedding("Embedder returned a wrong number of vectors"));
            }
            for (rel, vector) in relationships.iter_mut().zip(vectors) {
                rel.embedding = Some(vector);
            }
        }

        Ok(relationships)
    }

    async fn resolve_by_similarity(
        &self,
        entities: &[Entity],
        queries: &[EndpointQuery],
    ) -> KgResult<Vec<Option<usize>>> {
        if entities.iter().all(|e| e.embedding.is_none()) {
            return Ok(vec![None; queries.len()]);
        }

        let names: Vec<String> = queries.iter().map(|q| normalize_name(&q.name)).collect();
        let name_vecs = self.embedder.embed_batch(&names).await?;
        if name_vecs.len() != queries.len() {
            return Err(KgError::embedding("Embedder returned a wrong number of vectors"));
        }

        // Only labelled endpoints get a label vector.
        let labels: Vec<Option<String>> = queries
            .iter()
            .map(|q| {
                q.label
                    .as_deref()
                    .map(normalize_label)
                    .filter(|l| !l.is_empty())
            })
            .collect();
        let present: Vec<String> = labels.iter().flatten().cloned().collect();
        let mut label_vecs = if present.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&present).await?
        }
        .into_iter();
        if label_vecs.len() != present.len() {
            return Err(KgError::embedding("Embedder returned a wrong number of vectors"));
        }

        let mut hits = Vec::with_capacity(queries.len());
        for ((query, name_vec), label) in queries.iter().zip(name_vecs).zip(&labels) {
            let vector = match label {
                Some(_) => {
                    let label_vec = label_vecs.next().ok_or_else(|| {
                        KgError::embedding("Embedder returned a wrong number of vectors")
                    })?;
                    weighted_embedding(
                        &name_vec,
                        &label_vec,
                        self.config.entity_name_weight,
                        self.config.entity_label_weight,
                    )?
                }
                None => name_vec,
            };

            let mut best: Option<(usize, f32)> = None;
            for (i, entity) in entities.iter().enumerate() {
                let Some(embedding) = entity.embedding.as_deref() else {
                    continue;
                };
                let score = cosine_similarity(&vector, embedding);
                if score >= self.config.endpoint_threshold && best.map_or(true, |(_, b)| score > b) {
                    best = Some((i, score));
                }
            }
            if let Some((i, score)) = best {
                debug!(endpoint = %query.name, entity = %entities[i].name, score, "Resolved endpoint by similarity");
            }
            hits.push(best.map(|(i, _)| i));
        }
        Ok(hits)
    }
}

fn read_triple(item: Value) -> Option<RawTriple> {
    let raw: raw::RawRelationship = match serde_json::from_value(item) {
        Ok(r) => r,
        Err(e) => {
            debug!("Skipping unreadable relationship candidate: {}", e);
            return None;
        }
    };
    let endpoint = |e: &raw::RawEndpoint| -> Option<EndpointQuery> {
        let name = e.name()?.trim();
        (!name.is_empty()).then(|| EndpointQuery {
            name: name.to_string(),
            label: e.label().map(str::to_string).filter(|l| !l.trim().is_empty()),
        })
    };
    Some(RawTriple {
        start: endpoint(raw.start_node.as_ref()?)?,
        end: endpoint(raw.end_node.as_ref()?)?,
        predicate: raw.name?,
    })
}

/// Index of the entity named by `query`: name and label first, then name only.
fn resolve_by_name(entities: &[Entity], query: &EndpointQuery) -> Option<usize> {
    let name = normalize_name(&query.name);
    if let Some(label) = query.label.as_deref().map(normalize_label) {
        if let Some(i) = entities.iter().position(|e| e.name == name && e.label == label) {
            return Some(i);
        }
    }
    entities.iter().position(|e| e.name == name)
}

fn isolated_entities<'a>(entities: &'a [Entity], relationships: &[Relationship]) -> Vec<&'a Entity> {
    let referenced: HashSet<_> = relationships
        .iter()
        .flat_map(|r| [r.start.key(), r.end.key()])
        .collect();
    entities
        .iter()
        .filter(|e| !referenced.contains(&e.key()))
        .collect()
}

fn entity_list<'a>(items: impl Iterator<Item = &'a Entity>) -> String {
    Value::Array(
        items
            .map(|e| json!({ "label": e.label, "name": e.name }))
            .collect(),
    )
    .to_string()
}

fn relationship_directives(entities: &[Entity], isolated: &[&Entity]) -> String {
    let mut directives = format!(
        "Act like an experienced knowledge graph builder. Use ONLY these entities as \
startNode and endNode, copying their names exactly:\n{}",
        entity_list(entities.iter())
    );
    if !isolated.is_empty() {
        directives.push_str(&format!(
            "\n\nThe following entities have no relationship yet. Find how each of them \
relates to the other entities:\n{}",
            entity_list(isolated.iter().copied())
        ));
    }
    directives
}
