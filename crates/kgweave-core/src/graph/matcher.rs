//! Similarity matching of candidate entities and relationships.
//!
//! Decision order for one candidate against a reference collection:
//! 1. shared canonical identifier (authoritative, no scoring),
//! 2. equal normalised name (and label, for entities),
//! 3. best cosine similarity at or above the threshold.
//!
//! Steps 1 and 2 scan the whole reference collection before any scoring.
//! When nothing clears the threshold the candidate is kept as a new item;
//! under-merging is the safe default.

use std::collections::HashSet;
use std::hash::Hash;

use tracing::debug;

use crate::types::{Entity, EntityKey, Relationship};

/// How a candidate was resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchOutcome {
    /// Shared canonical identifier with a reference item.
    Identifier,
    /// Equal name (and label) as a reference item.
    Exact,
    /// Merged with the reference item at `index` through similarity.
    Similar { index: usize, score: f32 },
    /// No reference item was close enough.
    New,
}

impl MatchOutcome {
    pub fn is_merge(&self) -> bool {
        !matches!(self, MatchOutcome::New)
    }
}

/// An item the matcher can resolve against a reference collection.
pub trait Matchable: Clone {
    /// Key used by the duplicate-free union.
    type Key: Eq + Hash;

    fn union_key(&self) -> Self::Key;

    fn canonical_id(&self) -> Option<&str> {
        None
    }

    fn embedding(&self) -> Option<&[f32]>;

    /// Exact textual identity with a reference item.
    fn exact_match(&self, reference: &Self) -> bool;

    /// Similarity forced regardless of embeddings.
    fn forced_similarity(&self, _reference: &Self) -> Option<f32> {
        None
    }

    /// Produce the resolved item once `reference` won the similarity scan.
    fn absorb(self, reference: &Self) -> Self;
}

impl Matchable for Entity {
    type Key = EntityKey;

    fn union_key(&self) -> EntityKey {
        self.key()
    }

    fn canonical_id(&self) -> Option<&str> {
        self.canonical_id.as_deref()
    }

    fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    fn exact_match(&self, reference: &Self) -> bool {
        self.name == reference.name && self.label == reference.label
    }

    /// Entity merges collapse toward the pre-existing item.
    fn absorb(self, reference: &Self) -> Self {
        reference.clone()
    }
}

impl Matchable for Relationship {
    type Key = (EntityKey, EntityKey, String);

    fn union_key(&self) -> Self::Key {
        (self.start.key(), self.end.key(), self.name.clone())
    }

    fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    fn exact_match(&self, reference: &Self) -> bool {
        self.name == reference.name
    }

    fn forced_similarity(&self, reference: &Self) -> Option<f32> {
        (self.name != reference.name && self.same_endpoints(reference)).then_some(1.0)
    }

    /// Relationship merges keep the candidate's endpoints and borrow the
    /// reference's predicate and vector.
    fn absorb(mut self, reference: &Self) -> Self {
        self.name = reference.name.clone();
        self.embedding = reference.embedding.clone();
        self
    }
}

/// Cosine similarity of two vectors. Mismatched, empty or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > f32::EPSILON && norm_b > f32::EPSILON {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

fn score<T: Matchable>(candidate: &T, reference: &T) -> f32 {
    if let Some(forced) = candidate.forced_similarity(reference) {
        return forced;
    }
    match (candidate.embedding(), reference.embedding()) {
        (Some(a), Some(b)) => cosine_similarity(a, b),
        _ => 0.0,
    }
}

/// Resolve `candidate` against `reference`, reporting how it was resolved.
pub fn match_item<T: Matchable>(candidate: T, reference: &[T], threshold: f32) -> (T, MatchOutcome) {
    if let Some(id) = candidate.canonical_id() {
        if reference.iter().any(|r| r.canonical_id() == Some(id)) {
            return (candidate, MatchOutcome::Identifier);
        }
    }

    if reference.iter().any(|r| candidate.exact_match(r)) {
        return (candidate, MatchOutcome::Exact);
    }

    let mut best: Option<(usize, f32)> = None;
    for (index, r) in reference.iter().enumerate() {
        let s = score(&candidate, r);
        if s >= threshold && best.map_or(true, |(_, b)| s > b) {
            best = Some((index, s));
        }
    }

    match best {
        Some((index, score)) => {
            debug!(index, score, threshold, "Similarity match");
            (
                candidate.absorb(&reference[index]),
                MatchOutcome::Similar { index, score },
            )
        }
        None => (candidate, MatchOutcome::New),
    }
}

/// Resolve `candidate` against `reference`.
pub fn find_match<T: Matchable>(candidate: T, reference: &[T], threshold: f32) -> T {
    match_item(candidate, reference, threshold).0
}

/// Duplicate-free union: items of `first` in order, then unseen items of
/// `second`. The first occurrence of a key wins.
fn union_by_key<T: Matchable>(first: &[T], second: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    first
        .iter()
        .chain(second.iter())
        .filter(|item| seen.insert(item.union_key()))
        .cloned()
        .collect()
}

/// Union of two entity lists keyed by normalised `(name, label)`.
pub fn union_entities_by_id_and_label(first: &[Entity], second: &[Entity]) -> Vec<Entity> {
    union_by_key(first, second)
}

/// Union of two relationship lists keyed by `(start, end, name)`.
pub fn union_relationships_by_name(
    first: &[Relationship],
    second: &[Relationship],
) -> Vec<Relationship> {
    union_by_key(first, second)
}

/// Resolve every item of `local` against `global`.
///
/// Returns the per-item resolved results, in `local` order, and the
/// duplicate-free union of those results with `global`.
pub fn process_lists<T: Matchable>(local: Vec<T>, global: &[T], threshold: f32) -> (Vec<T>, Vec<T>) {
    let matched: Vec<T> = local
        .into_iter()
        .map(|item| find_match(item, global, threshold))
        .collect();
    let union = union_by_key(&matched, global);
    (matched, union)
}
