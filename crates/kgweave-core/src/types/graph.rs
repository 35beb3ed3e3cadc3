//! Knowledge graph types: entities, relationships and the graph itself.
//!
//! Entities compare by their normalised `(name, label)` identity key.
//! Canonical identifiers are authoritative for identity as well, but that
//! rule is enforced by the merger rather than by `PartialEq`, because two
//! entities may only learn that they share an identifier late in a build.

use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static NON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("valid regex"));

/// Normalise an entity name: lower-case, separators and quotes become
/// spaces, whitespace runs collapse to one space.
pub fn normalize_name(name: &str) -> String {
    let lowered: String = name
        .to_lowercase()
        .chars()
        .map(|c| match c {
            '_' | '-' | '"' | '\'' | '\u{201c}' | '\u{201d}' | '\u{2018}' | '\u{2019}' => ' ',
            other => other,
        })
        .collect();
    WHITESPACE.replace_all(lowered.trim(), " ").into_owned()
}

/// Normalise a label or relationship predicate to `[a-z0-9_]` words.
pub fn normalize_label(label: &str) -> String {
    let lowered = label.trim().to_lowercase().replace('&', " and ");
    NON_WORD
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Identity key of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub name: String,
    pub label: String,
}

/// A typed, named node of the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub label: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
}

impl Entity {
    /// Create a new entity, normalising name and label.
    pub fn new(name: impl AsRef<str>, label: impl AsRef<str>) -> Self {
        Self {
            label: normalize_label(label.as_ref()),
            name: normalize_name(name.as_ref()),
            embedding: None,
            canonical_id: None,
        }
    }

    /// Attach a canonical identifier. Blank identifiers are ignored.
    pub fn with_canonical_id(mut self, canonical_id: impl Into<String>) -> Self {
        let id = canonical_id.into();
        let id = id.trim();
        self.canonical_id = if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        };
        self
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Re-apply normalisation, e.g. after deserialising foreign data.
    pub fn normalize(&mut self) {
        self.name = normalize_name(&self.name);
        self.label = normalize_label(&self.label);
        if self
            .canonical_id
            .as_deref()
            .is_some_and(|id| id.trim().is_empty())
        {
            self.canonical_id = None;
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            name: self.name.clone(),
            label: self.label.clone(),
        }
    }

    /// Full identity rule: equal canonical identifiers, or equal name and label.
    pub fn same_as(&self, other: &Entity) -> bool {
        if let (Some(a), Some(b)) = (&self.canonical_id, &other.canonical_id) {
            if a == b {
                return true;
            }
        }
        self == other
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.label == other.label
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.label.hash(state);
    }
}

/// A named, directed edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub start: Entity,
    pub end: Entity,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Provenance such as the `source` tag. Not part of identity.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Relationship {
    /// Create a new relationship, normalising the predicate name.
    pub fn new(start: Entity, end: Entity, name: impl AsRef<str>) -> Self {
        Self {
            start,
            end,
            name: normalize_label(name.as_ref()),
            embedding: None,
            properties: BTreeMap::new(),
        }
    }

    /// Attach an embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Attach a provenance property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Re-apply normalisation to the predicate and both endpoints.
    pub fn normalize(&mut self) {
        self.start.normalize();
        self.end.normalize();
        self.name = normalize_label(&self.name);
    }

    /// The `source` tag, if any.
    pub fn source(&self) -> Option<&str> {
        self.properties.get("source").map(String::as_str)
    }

    pub fn is_reflexive(&self) -> bool {
        self.start == self.end
    }

    /// Whether both relationships connect the same ordered `(start, end)` pair.
    pub fn same_endpoints(&self, other: &Relationship) -> bool {
        self.start == other.start && self.end == other.end
    }

    /// Ordered endpoint key pair.
    pub fn endpoint_keys(&self) -> (EntityKey, EntityKey) {
        (self.start.key(), self.end.key())
    }

    /// Endpoint key pair with direction erased.
    pub fn unordered_pair(&self) -> (EntityKey, EntityKey) {
        let (a, b) = self.endpoint_keys();
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end && self.name == other.name
    }
}

impl Eq for Relationship {}

impl Hash for Relationship {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.start.hash(state);
        self.end.hash(state);
    }
}

/// A set of entities and the relationships between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl KnowledgeGraph {
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> Self {
        Self {
            entities,
            relationships,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Look up the stored entity equal to `other`.
    pub fn get_entity(&self, other: &Entity) -> Option<&Entity> {
        self.entities.iter().find(|e| *e == other)
    }

    /// Entities referenced by no relationship.
    pub fn find_isolated_entities(&self) -> Vec<&Entity> {
        let referenced = self.referenced_keys();
        self.entities
            .iter()
            .filter(|e| !referenced.contains(&e.key()))
            .collect()
    }

    /// Drop isolated entities, returning how many were removed.
    pub fn remove_isolated_entities(&mut self) -> usize {
        let referenced = self.referenced_keys();
        let before = self.entities.len();
        self.entities.retain(|e| referenced.contains(&e.key()));
        before - self.entities.len()
    }

    /// Re-apply normalisation to every entity and relationship. Graphs read
    /// from disk may carry names that never went through the constructors.
    pub fn normalize(&mut self) {
        self.entities.iter_mut().for_each(Entity::normalize);
        self.relationships.iter_mut().for_each(Relationship::normalize);
    }

    /// Append another graph's entities and relationships without resolution.
    pub fn extend(&mut self, other: KnowledgeGraph) {
        self.entities.extend(other.entities);
        self.relationships.extend(other.relationships);
    }

    fn referenced_keys(&self) -> HashSet<EntityKey> {
        self.relationships
            .iter()
            .flat_map(|r| [r.start.key(), r.end.key()])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  TP53 "), "tp53");
        assert_eq!(normalize_name("Tumor_Necrosis-Factor"), "tumor necrosis factor");
        assert_eq!(normalize_name("\"IL-6\"  receptor"), "il 6 receptor");
        assert_eq!(normalize_name("a__b"), "a b");
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Gene"), "gene");
        assert_eq!(normalize_label("Cell Line"), "cell_line");
        assert_eq!(normalize_label(" up-regulates "), "up_regulates");
        assert_eq!(normalize_label("R&D"), "r_and_d");
    }

    #[test]
    fn test_entity_identity() {
        let a = Entity::new("TP53", "Gene");
        let b = Entity::new("tp53", "gene").with_embedding(vec![1.0]);
        assert_eq!(a, b);

        let c = Entity::new("p53", "protein").with_canonical_id("Gene ID:7157");
        let d = Entity::new("tp53", "gene").with_canonical_id("Gene ID:7157");
        assert_ne!(c, d);
        assert!(c.same_as(&d));
    }

    #[test]
    fn test_normalize_foreign_graph() {
        let mut graph: KnowledgeGraph = serde_json::from_str(
            r#"{
                "entities": [{"label": "Gene", "name": "TP53", "canonical_id": " "}],
                "relationships": [{
                    "start": {"label": "Gene", "name": "MDM2"},
                    "end": {"label": "Gene", "name": "TP53"},
                    "name": "Degrades"
                }]
            }"#,
        )
        .unwrap();
        graph.normalize();

        assert_eq!(graph.entities[0], Entity::new("tp53", "gene"));
        assert!(graph.entities[0].canonical_id.is_none());
        let r = &graph.relationships[0];
        assert_eq!(r.start.name, "mdm2");
        assert_eq!(r.end.label, "gene");
        assert_eq!(r.name, "degrades");
    }

    #[test]
    fn test_blank_canonical_id_ignored() {
        let e = Entity::new("x", "gene").with_canonical_id("  ");
        assert!(e.canonical_id.is_none());
    }

    #[test]
    fn test_relationship_pairs() {
        let a = Entity::new("a", "gene");
        let b = Entity::new("b", "gene");
        let ab = Relationship::new(a.clone(), b.clone(), "Activates");
        let ba = Relationship::new(b.clone(), a.clone(), "inhibits");

        assert_eq!(ab.name, "activates");
        assert!(!ab.same_endpoints(&ba));
        assert_eq!(ab.unordered_pair(), ba.unordered_pair());
        assert!(Relationship::new(a.clone(), a, "self").is_reflexive());
    }

    #[test]
    fn test_isolated_entities() {
        let a = Entity::new("a", "gene");
        let b = Entity::new("b", "gene");
        let c = Entity::new("c", "gene");
        let mut kg = KnowledgeGraph::new(
            vec![a.clone(), b.clone(), c.clone()],
            vec![Relationship::new(a, b, "binds")],
        );

        assert_eq!(kg.find_isolated_entities(), vec![&c]);
        assert_eq!(kg.remove_isolated_entities(), 1);
        assert_eq!(kg.entity_count(), 2);
        assert!(kg.get_entity(&c).is_none());
    }

    #[test]
    fn test_serde_skips_empty_fields() {
        let e = Entity::new("a", "gene");
        let json = serde_json::to_value(&e).unwrap();
        assert!(json.get("embedding").is_none());
        assert!(json.get("canonical_id").is_none());
    }
}
