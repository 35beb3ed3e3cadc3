//! Identifier-based entity collapsing and endpoint-based relationship merging.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{Entity, EntityKey, Relationship};

/// How a group of entities sharing a canonical identifier elects its survivor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RepresentativePolicy {
    /// Longest non-empty name; ties keep the first seen.
    #[default]
    LongestName,
    /// Name with the most mentions across entities and relationship
    /// endpoints; ties keep the first seen.
    MostFrequent,
    /// Last member seen in input order.
    MostRecent,
}

/// Disjoint sets over slot indices. The root of a set is always its
/// smallest index, so iteration order follows first appearance.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = i;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

/// One distinct `(name, label)` key seen in the input.
struct Slot {
    entity: Entity,
    canonical_ids: Vec<String>,
    mentions: usize,
    last_seen: usize,
}

#[derive(Default)]
struct SlotTable {
    slots: Vec<Slot>,
    index: HashMap<EntityKey, usize>,
    seen: usize,
}

impl SlotTable {
    fn register(&mut self, entity: &Entity) {
        self.seen += 1;
        let position = self.seen;
        let key = entity.key();
        let i = match self.index.get(&key).copied() {
            Some(i) => i,
            None => {
                let i = self.slots.len();
                self.index.insert(key, i);
                self.slots.push(Slot {
                    entity: entity.clone(),
                    canonical_ids: Vec::new(),
                    mentions: 0,
                    last_seen: 0,
                });
                i
            }
        };
        let slot = &mut self.slots[i];
        slot.mentions += 1;
        slot.last_seen = position;
        if slot.entity.embedding.is_none() {
            slot.entity.embedding = entity.embedding.clone();
        }
        if let Some(id) = &entity.canonical_id {
            if !slot.canonical_ids.contains(id) {
                slot.canonical_ids.push(id.clone());
            }
        }
    }
}

fn elect(members: &[usize], slots: &[Slot], policy: RepresentativePolicy) -> usize {
    let first = members[0];
    match policy {
        RepresentativePolicy::LongestName => {
            let mut best: Option<(usize, usize)> = None;
            for &m in members {
                let len = slots[m].entity.name.chars().count();
                if len > 0 && best.map_or(true, |(_, l)| len > l) {
                    best = Some((m, len));
                }
            }
            best.map_or(first, |(m, _)| m)
        }
        RepresentativePolicy::MostFrequent => {
            let mut best = first;
            for &m in members {
                if slots[m].mentions > slots[best].mentions {
                    best = m;
                }
            }
            best
        }
        RepresentativePolicy::MostRecent => members
            .iter()
            .copied()
            .max_by_key(|&m| slots[m].last_seen)
            .unwrap_or(first),
    }
}

/// Collapse entities that share a canonical identifier or an identity key.
///
/// Relationship endpoints missing from `entities` join the output entity
/// set, every endpoint is rewritten to its group's representative, and
/// relationships made reflexive by the rewrite are dropped. Identical
/// relationships collapse to their first occurrence.
pub fn merge_by_canonical_id(
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    policy: RepresentativePolicy,
) -> (Vec<Entity>, Vec<Relationship>) {
    let entities_before = entities.len();
    let relationships_before = relationships.len();

    let mut table = SlotTable::default();
    for entity in &entities {
        table.register(entity);
    }
    for rel in &relationships {
        table.register(&rel.start);
        table.register(&rel.end);
    }

    let mut sets = DisjointSet::new(table.slots.len());
    let mut by_id: HashMap<&str, usize> = HashMap::new();
    for (i, slot) in table.slots.iter().enumerate() {
        for id in &slot.canonical_ids {
            match by_id.get(id.as_str()) {
                Some(&j) => sets.union(i, j),
                None => {
                    by_id.insert(id.as_str(), i);
                }
            }
        }
    }

    let mut classes: Vec<(usize, Vec<usize>)> = Vec::new();
    let mut class_of_root: HashMap<usize, usize> = HashMap::new();
    for i in 0..table.slots.len() {
        let root = sets.find(i);
        match class_of_root.get(&root) {
            Some(&c) => classes[c].1.push(i),
            None => {
                class_of_root.insert(root, classes.len());
                classes.push((root, vec![i]));
            }
        }
    }

    let mut representative_of = vec![0usize; table.slots.len()];
    let mut merged_entities = Vec::with_capacity(classes.len());
    for (_, members) in &classes {
        let winner = elect(members, &table.slots, policy);
        let mut representative = table.slots[winner].entity.clone();
        representative.canonical_id = table.slots[winner]
            .canonical_ids
            .first()
            .or_else(|| members.iter().find_map(|&m| table.slots[m].canonical_ids.first()))
            .cloned();
        if representative.embedding.is_none() {
            representative.embedding = members
                .iter()
                .find_map(|&m| table.slots[m].entity.embedding.clone());
        }
        if members.len() > 1 {
            debug!(
                representative = %representative.name,
                members = members.len(),
                "Collapsed entities sharing a canonical id"
            );
        }
        let position = merged_entities.len();
        for &m in members {
            representative_of[m] = position;
        }
        merged_entities.push(representative);
    }

    let resolve = |entity: &Entity| -> Entity {
        let slot = table.index[&entity.key()];
        merged_entities[representative_of[slot]].clone()
    };

    let mut seen = HashMap::new();
    let mut merged_relationships: Vec<Relationship> = Vec::with_capacity(relationships.len());
    for mut rel in relationships {
        rel.start = resolve(&rel.start);
        rel.end = resolve(&rel.end);
        if rel.is_reflexive() {
            continue;
        }
        let key = (rel.start.key(), rel.end.key(), rel.name.clone());
        if seen.insert(key, merged_relationships.len()).is_none() {
            merged_relationships.push(rel);
        }
    }

    info!(
        entities_before,
        entities_after = merged_entities.len(),
        relationships_before,
        relationships_after = merged_relationships.len(),
        "Merged entities and relationships by canonical id"
    );

    (merged_entities, merged_relationships)
}

/// Collapse relationships sharing the same ordered `(start, end)` pair.
///
/// The first-seen relationship of each pair survives with its name and
/// embedding; properties of later ones fill keys it lacks. Reflexive
/// relationships are dropped.
pub fn merge_relationships_sharing_endpoints(relationships: Vec<Relationship>) -> Vec<Relationship> {
    let mut index: HashMap<(EntityKey, EntityKey), usize> = HashMap::new();
    let mut merged: Vec<Relationship> = Vec::with_capacity(relationships.len());

    for rel in relationships {
        if rel.is_reflexive() {
            continue;
        }
        match index.get(&rel.endpoint_keys()) {
            Some(&i) => {
                let survivor = &mut merged[i];
                debug!(kept = %survivor.name, dropped = %rel.name, "Merged parallel relationship");
                for (k, v) in rel.properties {
                    survivor.properties.entry(k).or_insert(v);
                }
            }
            None => {
                index.insert(rel.endpoint_keys(), merged.len());
                merged.push(rel);
            }
        }
    }

    merged
}
