//! End-to-end graph building over scripted sections.

mod common;

use common::{builder, builder_with, SectionExtractor, TableEmbedder};
use kgweave_core::{
    BuildConfig, BuildRequest, Entity, ErrorCode, ExternalIdTable, KnowledgeGraph,
    Relationship, RepresentativePolicy,
};

fn sections(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_same_entity_across_sections_resolves_to_one() {
    let extractor = SectionExtractor::new()
        .section(
            "s1",
            &[("gene", "TP53"), ("gene", "MDM2")],
            &[("MDM2", "TP53", "degrades")],
        )
        .section(
            "s2",
            &[("gene", "TP53"), ("disease", "Li-Fraumeni syndrome")],
            &[("TP53", "Li-Fraumeni syndrome", "causes")],
        );

    let graph = builder(extractor, TableEmbedder::new())
        .build(BuildRequest::new(sections(&["s1", "s2"])))
        .await
        .unwrap();

    let tp53: Vec<_> = graph
        .entities
        .iter()
        .filter(|e| e.name == "tp53" && e.label == "gene")
        .collect();
    assert_eq!(tp53.len(), 1);
    assert_eq!(graph.entity_count(), 3);
    assert_eq!(graph.relationship_count(), 2);
}

#[tokio::test]
async fn test_similar_names_merge_above_threshold() {
    // "tp 53" is 0.95-similar to "tp53"; the later mention collapses
    // toward the earlier one.
    let embedder = TableEmbedder::new()
        .with("tp53", &[1.0, 0.0])
        .with("tp 53", &[0.95, 0.312_25]);
    let extractor = SectionExtractor::new()
        .section(
            "s1",
            &[("gene", "TP53"), ("gene", "MDM2")],
            &[("MDM2", "TP53", "degrades")],
        )
        .section(
            "s2",
            &[("gene", "TP-53"), ("gene", "BRCA1")],
            &[("BRCA1", "TP53", "stabilizes")],
        );

    let graph = builder(extractor, embedder)
        .build(BuildRequest::new(sections(&["s1", "s2"])))
        .await
        .unwrap();

    let names: Vec<&str> = graph.entities.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"tp53"));
    assert!(!names.contains(&"tp 53"));
    assert!(graph
        .relationships
        .iter()
        .any(|r| r.start.name == "brca1" && r.end.name == "tp53"));
}

#[tokio::test]
async fn test_similar_names_stay_apart_below_threshold() {
    let embedder = TableEmbedder::new()
        .with("tp53", &[1.0, 0.0])
        .with("tp 53", &[0.95, 0.312_25]);
    let extractor = SectionExtractor::new()
        .section(
            "s1",
            &[("gene", "TP53"), ("gene", "MDM2")],
            &[("MDM2", "TP53", "degrades")],
        )
        .section(
            "s2",
            &[("gene", "TP-53"), ("gene", "BRCA1")],
            &[("BRCA1", "TP-53", "stabilizes")],
        );

    let config = BuildConfig::default().with_thresholds(0.999, 0.4);
    let graph = builder_with(extractor, embedder, config)
        .build(BuildRequest::new(sections(&["s1", "s2"])))
        .await
        .unwrap();

    let names: Vec<&str> = graph.entities.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"tp53"));
    assert!(names.contains(&"tp 53"));
}

#[tokio::test]
async fn test_canonical_id_collapse_keeps_longest_name() {
    let ids = ExternalIdTable::new()
        .with("TP53", "gene", "Gene ID:7157")
        .with("p53", "gene", "Gene ID:7157");
    let extractor = SectionExtractor::new()
        .section(
            "s1",
            &[("gene", "TP53"), ("gene", "MDM2")],
            &[("MDM2", "TP53", "degrades")],
        )
        .section(
            "s2",
            &[("protein", "p53"), ("drug", "Nutlin-3")],
            &[("Nutlin-3", "p53", "activates")],
        );

    let graph = builder(extractor, TableEmbedder::new())
        .build(BuildRequest::new(sections(&["s1", "s2"])).with_external_ids(ids))
        .await
        .unwrap();

    let with_id: Vec<&Entity> = graph
        .entities
        .iter()
        .filter(|e| e.canonical_id.as_deref() == Some("Gene ID:7157"))
        .collect();
    assert_eq!(with_id.len(), 1);
    assert_eq!(with_id[0].name, "tp53");
    assert!(graph.entities.iter().all(|e| e.name != "p53"));

    let nutlin = graph
        .relationships
        .iter()
        .find(|r| r.start.name == "nutlin 3")
        .unwrap();
    assert_eq!(nutlin.end.name, "tp53");
}

#[tokio::test]
async fn test_most_recent_policy() {
    let ids = ExternalIdTable::new()
        .with("TP53", "gene", "Gene ID:7157")
        .with("p53", "gene", "Gene ID:7157");
    let extractor = SectionExtractor::new()
        .section("s1", &[("gene", "TP53"), ("gene", "MDM2")], &[("MDM2", "TP53", "degrades")])
        .section("s2", &[("gene", "p53"), ("gene", "MDM2")], &[("MDM2", "p53", "binds")]);

    let config = BuildConfig::default().with_representative_policy(RepresentativePolicy::MostRecent);
    let graph = builder_with(extractor, TableEmbedder::new(), config)
        .build(BuildRequest::new(sections(&["s1", "s2"])).with_external_ids(ids))
        .await
        .unwrap();

    assert!(graph.entities.iter().any(|e| e.name == "p53"));
    assert!(graph.entities.iter().all(|e| e.name != "tp53"));
}

#[tokio::test]
async fn test_parallel_predicates_collapse() {
    let extractor = SectionExtractor::new()
        .section(
            "s1",
            &[("gene", "A1"), ("gene", "B1")],
            &[("A1", "B1", "activates")],
        )
        .section(
            "s2",
            &[("gene", "A1"), ("gene", "B1")],
            &[("A1", "B1", "upregulates")],
        );

    let graph = builder(extractor, TableEmbedder::new())
        .build(BuildRequest::new(sections(&["s1", "s2"])))
        .await
        .unwrap();

    assert_eq!(graph.relationship_count(), 1);
    assert_eq!(graph.relationships[0].start.name, "a1");
    assert_eq!(graph.relationships[0].end.name, "b1");
}

#[tokio::test]
async fn test_unconnected_entity_is_pruned() {
    let extractor = SectionExtractor::new().section(
        "s1",
        &[("gene", "TP53"), ("gene", "MDM2"), ("pathway", "apoptosis")],
        &[("MDM2", "TP53", "degrades")],
    );

    let graph = builder(extractor, TableEmbedder::new())
        .build(BuildRequest::new(sections(&["s1"])))
        .await
        .unwrap();

    assert_eq!(graph.entity_count(), 2);
    assert!(graph.entities.iter().all(|e| e.name != "apoptosis"));
}

#[tokio::test]
async fn test_existing_graph_is_merged() {
    let tp53 = Entity::new("tumor protein p53", "gene").with_canonical_id("Gene ID:7157");
    let atm = Entity::new("atm", "gene");
    let existing = KnowledgeGraph::new(
        vec![tp53.clone(), atm.clone()],
        vec![Relationship::new(atm, tp53, "phosphorylates")],
    );

    let ids = ExternalIdTable::new().with("TP53", "gene", "Gene ID:7157");
    let extractor = SectionExtractor::new().section(
        "s1",
        &[("gene", "TP53"), ("gene", "MDM2")],
        &[("MDM2", "TP53", "degrades")],
    );

    let graph = builder(extractor, TableEmbedder::new())
        .build(
            BuildRequest::new(sections(&["s1"]))
                .with_external_ids(ids)
                .with_existing_graph(existing),
        )
        .await
        .unwrap();

    assert_eq!(graph.entity_count(), 3);
    assert_eq!(graph.relationship_count(), 2);
    assert!(graph
        .relationships
        .iter()
        .all(|r| r.start.name != "tp53" && r.end.name != "tp53"));
}

#[tokio::test]
async fn test_source_tag_on_all_sections() {
    let extractor = SectionExtractor::new()
        .section("s1", &[("gene", "A1"), ("gene", "B1")], &[("A1", "B1", "binds")])
        .section("s2", &[("gene", "C1"), ("gene", "D1")], &[("C1", "D1", "binds")]);

    let graph = builder(extractor, TableEmbedder::new())
        .build(BuildRequest::new(sections(&["s1", "s2"])).with_source("PMID1"))
        .await
        .unwrap();

    assert_eq!(graph.relationship_count(), 2);
    assert!(graph
        .relationships
        .iter()
        .all(|r| r.source() == Some("PMID1")));
}

#[tokio::test]
async fn test_existing_graph_from_disk_is_normalised() {
    let existing: KnowledgeGraph = serde_json::from_str(
        r#"{
            "entities": [
                {"label": "Gene", "name": "TP53"},
                {"label": "Gene", "name": "BRCA1"}
            ],
            "relationships": [{
                "start": {"label": "Gene", "name": "BRCA1"},
                "end": {"label": "Gene", "name": "TP53"},
                "name": "Stabilizes"
            }]
        }"#,
    )
    .unwrap();
    let extractor = SectionExtractor::new().section(
        "s1",
        &[("gene", "TP53"), ("gene", "MDM2")],
        &[("MDM2", "TP53", "degrades")],
    );

    let graph = builder(extractor, TableEmbedder::new())
        .build(BuildRequest::new(sections(&["s1"])).with_existing_graph(existing))
        .await
        .unwrap();

    let keys: Vec<(&str, &str)> = graph
        .entities
        .iter()
        .map(|e| (e.name.as_str(), e.label.as_str()))
        .collect();
    assert_eq!(keys.len(), 3, "{keys:?}");
    assert_eq!(keys.iter().filter(|k| **k == ("tp53", "gene")).count(), 1);
    assert!(keys.contains(&("brca1", "gene")));
    assert!(graph
        .relationships
        .iter()
        .any(|r| r.start.name == "brca1" && r.end.name == "tp53" && r.name == "stabilizes"));
}

#[tokio::test]
async fn test_unreadable_section_fails_the_document() {
    let extractor = SectionExtractor::new()
        .section(
            "s1",
            &[("gene", "TP53"), ("gene", "MDM2")],
            &[("MDM2", "TP53", "degrades")],
        )
        .malformed("s2");

    let err = builder(extractor, TableEmbedder::new())
        .build(BuildRequest::new(sections(&["s1", "s2"])))
        .await
        .unwrap_err();

    assert!(err.is_extraction_failure(), "{err:?}");
    assert_eq!(err.code(), ErrorCode::ExtRetriesExhausted);
}
