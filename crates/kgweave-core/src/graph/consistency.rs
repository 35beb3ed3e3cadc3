//! Post-pass invariant maintenance on a complete graph.

use std::collections::HashSet;

use tracing::info;

use super::merger::{merge_by_canonical_id, merge_relationships_sharing_endpoints, RepresentativePolicy};
use crate::types::KnowledgeGraph;

/// Sizes of a graph before and after finalisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeStats {
    pub entities_before: usize,
    pub entities_after: usize,
    pub relationships_before: usize,
    pub relationships_after: usize,
    pub isolated_removed: usize,
}

/// Enforces the finalised-graph invariants:
///
/// - entities sharing a canonical identifier are one entity,
/// - no relationship is reflexive,
/// - no two relationships share an unordered endpoint pair,
/// - every entity is referenced by some relationship.
///
/// Finalising is deterministic, keeps first-seen order, and is idempotent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyEnforcer {
    policy: RepresentativePolicy,
}

impl ConsistencyEnforcer {
    pub fn new(policy: RepresentativePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RepresentativePolicy {
        self.policy
    }

    /// Finalise a graph.
    pub fn finalize(&self, graph: KnowledgeGraph) -> KnowledgeGraph {
        self.finalize_with_stats(graph).0
    }

    /// Finalise a graph and report what changed.
    pub fn finalize_with_stats(&self, graph: KnowledgeGraph) -> (KnowledgeGraph, FinalizeStats) {
        let mut stats = FinalizeStats {
            entities_before: graph.entity_count(),
            relationships_before: graph.relationship_count(),
            ..Default::default()
        };

        let (entities, relationships) =
            merge_by_canonical_id(graph.entities, graph.relationships, self.policy);
        let relationships = merge_relationships_sharing_endpoints(relationships);

        let mut pairs = HashSet::new();
        let relationships = relationships
            .into_iter()
            .filter(|r| pairs.insert(r.unordered_pair()))
            .collect();

        let mut finalized = KnowledgeGraph::new(entities, relationships);
        stats.isolated_removed = finalized.remove_isolated_entities();
        stats.entities_after = finalized.entity_count();
        stats.relationships_after = finalized.relationship_count();

        info!(
            entities_before = stats.entities_before,
            entities_after = stats.entities_after,
            relationships_before = stats.relationships_before,
            relationships_after = stats.relationships_after,
            isolated_removed = stats.isolated_removed,
            "Finalized knowledge graph"
        );

        (finalized, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entity, Relationship};

    fn gene(name: &str) -> Entity {
        Entity::new(name, "gene")
    }

    #[test]
    fn test_finalize_collapses_parallel_and_symmetric() {
        let a = gene("a");
        let b = gene("b");
        let graph = KnowledgeGraph::new(
            vec![a.clone(), b.clone()],
            vec![
                Relationship::new(a.clone(), b.clone(), "activates"),
                Relationship::new(a.clone(), b.clone(), "upregulates"),
                Relationship::new(b.clone(), a.clone(), "inhibits"),
            ],
        );

        let (finalized, stats) = ConsistencyEnforcer::default().finalize_with_stats(graph);
        assert_eq!(finalized.relationship_count(), 1);
        assert_eq!(finalized.relationships[0].name, "activates");
        assert_eq!(stats.relationships_before, 3);
        assert_eq!(stats.relationships_after, 1);
    }

    #[test]
    fn test_finalize_prunes_isolated() {
        let a = gene("a");
        let b = gene("b");
        let lonely = gene("lonely");
        let graph = KnowledgeGraph::new(
            vec![a.clone(), lonely.clone(), b.clone()],
            vec![Relationship::new(a.clone(), b.clone(), "binds")],
        );

        let (finalized, stats) = ConsistencyEnforcer::default().finalize_with_stats(graph);
        assert_eq!(finalized.entities, vec![a, b]);
        assert_eq!(stats.isolated_removed, 1);
    }

    #[test]
    fn test_collapse_can_isolate_entity() {
        // Collapsing tp53/p53 makes their only relationship reflexive, so
        // the survivor ends up isolated and is pruned.
        let tp53 = gene("tp53").with_canonical_id("Gene ID:7157");
        let p53 = gene("p53").with_canonical_id("Gene ID:7157");
        let graph = KnowledgeGraph::new(
            vec![tp53.clone(), p53.clone()],
            vec![Relationship::new(p53, tp53, "same_as")],
        );

        let finalized = ConsistencyEnforcer::default().finalize(graph);
        assert!(finalized.is_empty());
    }

    #[test]
    fn test_finalize_empty_graph() {
        let finalized = ConsistencyEnforcer::default().finalize(KnowledgeGraph::default());
        assert!(finalized.is_empty());
    }
}
