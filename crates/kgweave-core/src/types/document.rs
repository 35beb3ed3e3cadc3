//! Input documents and their external identifier tables.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::graph::normalize_name;

/// Canonical identity supplied by an upstream annotation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalId {
    pub label: String,
    #[serde(alias = "unique_id")]
    pub canonical_id: String,
}

impl ExternalId {
    pub fn new(label: impl Into<String>, canonical_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            canonical_id: canonical_id.into(),
        }
    }
}

/// Case-insensitive mapping from mention name to canonical identity.
///
/// Names that only agree after normalisation (`IL-6`, `il_6`) resolve to
/// the one registered first, so stamping does not depend on map order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, ExternalId>",
    into = "BTreeMap<String, ExternalId>"
)]
pub struct ExternalIdTable {
    entries: BTreeMap<String, ExternalId>,
    /// Normalised name to the `entries` key that claimed it first.
    normalized: BTreeMap<String, String>,
}

impl ExternalIdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mention. Later registrations of the same name win.
    pub fn insert(&mut self, name: &str, id: ExternalId) {
        let key = name.trim().to_lowercase();
        self.normalized
            .entry(normalize_name(&key))
            .or_insert_with(|| key.clone());
        self.entries.insert(key, id);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: &str, label: &str, canonical_id: &str) -> Self {
        self.insert(name, ExternalId::new(label, canonical_id));
        self
    }

    /// Look up a mention, first verbatim (case-insensitive), then by its
    /// normalised form.
    pub fn lookup(&self, name: &str) -> Option<&ExternalId> {
        let lowered = name.trim().to_lowercase();
        self.entries.get(&lowered).or_else(|| {
            self.normalized
                .get(&normalize_name(name))
                .and_then(|key| self.entries.get(key))
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for ExternalIdTable {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// Registers names in sorted key order.
impl From<BTreeMap<String, ExternalId>> for ExternalIdTable {
    fn from(map: BTreeMap<String, ExternalId>) -> Self {
        let mut table = Self::new();
        for (name, id) in map {
            table.insert(&name, id);
        }
        table
    }
}

impl From<HashMap<String, ExternalId>> for ExternalIdTable {
    fn from(map: HashMap<String, ExternalId>) -> Self {
        map.into_iter().collect::<BTreeMap<_, _>>().into()
    }
}

impl From<ExternalIdTable> for BTreeMap<String, ExternalId> {
    fn from(table: ExternalIdTable) -> Self {
        table.entries
    }
}

/// One unit of work for the batch driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub sections: Vec<String>,
    /// Provenance tag stamped on extracted relationships.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub external_ids: ExternalIdTable,
}

impl Document {
    pub fn new(id: impl Into<String>, sections: Vec<String>) -> Self {
        Self {
            id: id.into(),
            sections,
            source: None,
            external_ids: ExternalIdTable::new(),
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
}
