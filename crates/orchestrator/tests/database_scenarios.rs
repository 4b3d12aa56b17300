//! End-to-end scenarios over [`vg_orchestrator::Database`]: insert, search,
//! relate, graph traversal, mode gating, and bulk import/export.

use std::sync::Arc;

use serde_json::json;
use vg_concurrency::CancellationToken;
use vg_core::{Error, NounType, VerbType};
use vg_orchestrator::{
    AddData, AddOptions, AddVerbOptions, Database, DatabaseConfig, DeleteOptions, ImportOptions, ImportOutcome, ImportRecord,
    ImportSource, Mode, NoopEmbedder, SearchQuery,
};

async fn open(dimensions: usize) -> Arc<Database> {
    Database::open(DatabaseConfig::for_dimensions(dimensions), Arc::new(NoopEmbedder::new(dimensions))).await.unwrap()
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn insert_search_relate_and_query_the_graph() {
    let db = open(3).await;
    let t = token();

    let alice = db.add(AddData::Vector(vec![1.0, 0.0, 0.0]), AddOptions { noun_type: NounType::Person, ..Default::default() }, &t).await.unwrap();
    let bob = db.add(AddData::Vector(vec![0.9, 0.1, 0.0]), AddOptions { noun_type: NounType::Person, ..Default::default() }, &t).await.unwrap();

    db.add_verb(alice, bob, VerbType::WorksWith, AddVerbOptions::default(), &t).await.unwrap();

    let results = db.search(SearchQuery::Vector(vec![1.0, 0.0, 0.0]), 5, None, &t).await.unwrap();
    assert!(results.iter().any(|r| r.id == alice));

    // Spec §8 seed test 1: filtering on the top-level `type` field (never
    // duplicated into metadata) must still match both nouns.
    let type_filter = vg_primitives::FilterExpr::eq("type", "Person");
    let filtered = db.search(SearchQuery::Vector(vec![1.0, 0.0, 0.0]), 5, Some(type_filter), &t).await.unwrap();
    assert!(filtered.iter().any(|r| r.id == alice));
    assert!(filtered.iter().any(|r| r.id == bob));

    let with_verbs = db.get_noun_with_verbs(alice, &t).await.unwrap().unwrap();
    assert_eq!(with_verbs.outbound_verbs.len(), 1);
    assert_eq!(with_verbs.outbound_verbs[0].target, bob);
}

#[tokio::test]
async fn search_respects_a_metadata_filter() {
    let db = open(2).await;
    let t = token();

    let mut red = serde_json::Map::new();
    red.insert("color".to_string(), json!("red"));
    let mut blue = serde_json::Map::new();
    blue.insert("color".to_string(), json!("blue"));

    db.add(AddData::Vector(vec![1.0, 0.0]), AddOptions { metadata: red, ..Default::default() }, &t).await.unwrap();
    let blue_id = db.add(AddData::Vector(vec![1.0, 0.01]), AddOptions { metadata: blue, ..Default::default() }, &t).await.unwrap();

    let filter = vg_primitives::FilterExpr::eq("color", "blue");
    let results = db.search(SearchQuery::Vector(vec![1.0, 0.0]), 5, Some(filter), &t).await.unwrap();

    assert!(results.iter().all(|r| r.id == blue_id));
}

#[tokio::test]
async fn add_with_an_existing_id_updates_in_place_instead_of_erroring() {
    let db = open(2).await;
    let t = token();
    let id = vg_core::NounId::new();

    db.add(AddData::Vector(vec![1.0, 0.0]), AddOptions { id: Some(id), ..Default::default() }, &t).await.unwrap();
    let second = db.add(AddData::Vector(vec![0.0, 1.0]), AddOptions { id: Some(id), ..Default::default() }, &t).await.unwrap();

    assert_eq!(second, id);
    let noun = db.get_noun_with_verbs(id, &t).await.unwrap().unwrap().noun;
    assert_eq!(noun.vector, Some(vec![0.0, 1.0]));
}

#[tokio::test]
async fn add_verb_without_auto_create_fails_on_a_missing_endpoint() {
    let db = open(2).await;
    let t = token();
    let real = db.add(AddData::Vector(vec![1.0, 0.0]), AddOptions::default(), &t).await.unwrap();
    let ghost = vg_core::NounId::new();

    let result = db.add_verb(real, ghost, VerbType::RelatedTo, AddVerbOptions::default(), &t).await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn add_verb_with_auto_create_synthesizes_a_placeholder_endpoint() {
    let db = open(2).await;
    let t = token();
    let real = db.add(AddData::Vector(vec![1.0, 0.0]), AddOptions::default(), &t).await.unwrap();
    let ghost = vg_core::NounId::new();

    let opts = AddVerbOptions { auto_create_missing_nouns: true, ..Default::default() };
    db.add_verb(real, ghost, VerbType::RelatedTo, opts, &t).await.unwrap();

    let placeholder = db.get_noun_with_verbs(ghost, &t).await.unwrap().unwrap().noun;
    assert!(placeholder.placeholder);
    assert!(placeholder.vector.is_none());
}

#[tokio::test]
async fn write_only_mode_skips_the_endpoint_existence_check() {
    let db = open(2).await;
    let t = token();
    db.set_mode(Mode::WriteOnly);

    let a = vg_core::NounId::new();
    let b = vg_core::NounId::new();
    // Neither endpoint exists anywhere, yet this must not fail: writeOnly
    // mode never touches storage to check (spec §4.10).
    db.add_verb(a, b, VerbType::RelatedTo, AddVerbOptions::default(), &t).await.unwrap();
}

#[tokio::test]
async fn write_only_mode_rejects_reads() {
    let db = open(2).await;
    let t = token();
    db.set_mode(Mode::WriteOnly);

    let result = db.search(SearchQuery::Vector(vec![1.0, 0.0]), 5, None, &t).await;
    assert!(matches!(result, Err(Error::WriteOnlyViolation { .. })));
}

#[tokio::test]
async fn read_only_mode_rejects_writes() {
    let db = open(2).await;
    let t = token();
    db.set_mode(Mode::ReadOnly);

    let result = db.add(AddData::Vector(vec![1.0, 0.0]), AddOptions::default(), &t).await;
    assert!(matches!(result, Err(Error::ReadOnlyViolation { .. })));
}

#[tokio::test]
async fn soft_delete_keeps_the_noun_out_of_future_search_results() {
    let db = open(2).await;
    let t = token();
    let id = db.add(AddData::Vector(vec![1.0, 0.0]), AddOptions::default(), &t).await.unwrap();

    let found = db.delete(id, DeleteOptions::default(), &t).await.unwrap();
    assert!(found);

    let results = db.search(SearchQuery::Vector(vec![1.0, 0.0]), 5, None, &t).await.unwrap();
    assert!(!results.iter().any(|r| r.id == id));
}

#[tokio::test]
async fn hard_delete_with_cascade_removes_incident_verbs() {
    let db = open(2).await;
    let t = token();
    let a = db.add(AddData::Vector(vec![1.0, 0.0]), AddOptions::default(), &t).await.unwrap();
    let b = db.add(AddData::Vector(vec![0.0, 1.0]), AddOptions::default(), &t).await.unwrap();
    db.add_verb(a, b, VerbType::RelatedTo, AddVerbOptions::default(), &t).await.unwrap();

    db.delete(a, DeleteOptions { hard: true, cascade: true }, &t).await.unwrap();
    assert!(db.get_noun_with_verbs(a, &t).await.unwrap().is_none());
}

#[tokio::test]
async fn import_reports_per_record_failures_without_aborting_the_batch() {
    let db = open(2).await;
    let t = token();

    let records = vec![
        ImportRecord { vector: Some(vec![1.0, 0.0]), ..Default::default() },
        ImportRecord::default(), // neither vector nor text: must fail, not abort
        ImportRecord { vector: Some(vec![0.0, 1.0]), ..Default::default() },
    ];
    let report = db.import(ImportSource::Records(records), ImportOptions::default(), &t).await.unwrap();

    assert_eq!(report.imported_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert!(report.outcomes.iter().any(|o| matches!(o, ImportOutcome::Failed { index: 1, .. })));
}

#[tokio::test]
async fn export_json_includes_every_non_deleted_noun() {
    let db = open(2).await;
    let t = token();
    db.add(AddData::Vector(vec![1.0, 0.0]), AddOptions::default(), &t).await.unwrap();
    db.add(AddData::Vector(vec![0.0, 1.0]), AddOptions::default(), &t).await.unwrap();

    let vg_orchestrator::ExportOutput::Text(text) = db.export(vg_orchestrator::ExportOptions::default(), &t).await.unwrap() else {
        panic!("expected text output for JSON export");
    };
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn text_input_without_a_configured_embedder_fails_clearly() {
    let db = open(2).await;
    let t = token();
    let result = db.add(AddData::Text("hello".to_string()), AddOptions::default(), &t).await;
    assert!(result.is_err());
}

/// Spec §8 seed test 6: build a database against the local filesystem
/// backend, export its graph, clear it, reimport, and check every id,
/// vector, metadata field, and verb topology survives.
#[tokio::test]
async fn filesystem_backend_graph_export_clear_import_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let config = vg_orchestrator::DatabaseConfig {
        storage: vg_orchestrator::StorageConfig::LocalFs { root: dir.path().to_path_buf() },
        ..vg_orchestrator::DatabaseConfig::for_dimensions(4)
    };
    let db = Database::open(config, Arc::new(NoopEmbedder::new(4))).await.unwrap();
    let t = token();

    let mut noun_ids = Vec::new();
    for n in 0..40u32 {
        let v = n as f32;
        let mut metadata = serde_json::Map::new();
        metadata.insert("n".to_string(), json!(n));
        let id = db
            .add(AddData::Vector(vec![v, v * 0.5, 1.0, -v]), AddOptions { noun_type: NounType::Thing, metadata, ..Default::default() }, &t)
            .await
            .unwrap();
        noun_ids.push(id);
    }

    let mut verb_ids = Vec::new();
    for pair in noun_ids.windows(2) {
        let verb = db.add_verb(pair[0], pair[1], VerbType::RelatedTo, AddVerbOptions::default(), &t).await.unwrap();
        verb_ids.push(verb);
    }

    let before_export = db.export(vg_orchestrator::ExportOptions { format: Some(vg_orchestrator::ExportFormat::Graph), ..Default::default() }, &t).await.unwrap();
    let vg_orchestrator::ExportOutput::Graph(graph) = before_export else { panic!("expected a graph export") };
    assert_eq!(graph.nodes.len(), 40);
    assert_eq!(graph.edges.len(), 39);

    db.clear(&t).await.unwrap();
    assert!(db.search(SearchQuery::Vector(vec![0.0, 0.0, 1.0, 0.0]), 5, None, &t).await.unwrap().is_empty());

    let report = db.import_graph(graph, &t).await.unwrap();
    assert_eq!(report.failed_count(), 0);
    assert_eq!(report.imported_count(), 40);

    for (index, &id) in noun_ids.iter().enumerate() {
        let n = index as f32;
        let with_verbs = db.get_noun_with_verbs(id, &t).await.unwrap().unwrap();
        assert_eq!(with_verbs.noun.vector, Some(vec![n, n * 0.5, 1.0, -n]));
        assert_eq!(with_verbs.noun.metadata.get("n"), Some(&json!(index as u32)));
    }
    for (pair_index, pair) in noun_ids.windows(2).enumerate() {
        let with_verbs = db.get_noun_with_verbs(pair[0], &t).await.unwrap().unwrap();
        assert!(with_verbs.outbound_verbs.iter().any(|v| v.id == verb_ids[pair_index] && v.target == pair[1]));
    }

    let results = db.search(SearchQuery::Vector(vec![39.0, 19.5, 1.0, -39.0]), 1, None, &t).await.unwrap();
    assert_eq!(results[0].id, *noun_ids.last().unwrap());
}
