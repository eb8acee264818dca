//! End-to-end ingest tests against the `SQLite` backend.
//!
//! Exercises the full pipeline the binary runs: structure setup, chapter
//! ingest from extraction payloads, re-ingest idempotence, resolution
//! across chapters, and merge behavior, all over a real database file.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use fabula::models::{
    AgentMetadata, ChapterExtraction, EntityUpsert, FactDelta, RelationshipUpsert,
};
use fabula::services::ChapterIngestService;
use fabula::storage::{KnowledgeStore, ProvenanceStore};
use fabula::{
    CreationSource, EntityType, SqliteStore, Store, StructureService, StructureType,
};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

fn open_store(temp_dir: &TempDir) -> Arc<SqliteStore> {
    let db_path = temp_dir.path().join("fabula.db");
    Arc::new(SqliteStore::new(&db_path).expect("open sqlite store"))
}

struct Book {
    ch1: fabula::models::StructureId,
    ch2: fabula::models::StructureId,
}

fn build_book(store: &Arc<SqliteStore>) -> Book {
    let structures = StructureService::new(Arc::clone(store));
    let book = structures
        .create_root(StructureType::Book, "The Winter Road")
        .unwrap();
    let ch1 = structures
        .insert_child(&book, StructureType::Chapter, "Ashfall", 0)
        .unwrap();
    let ch2 = structures
        .insert_child(&book, StructureType::Chapter, "The Manifest", 1)
        .unwrap();
    Book {
        ch1: ch1.id(),
        ch2: ch2.id(),
    }
}

fn upsert(identifier: &str, entity_type: &str, level: &str, fact: &str) -> EntityUpsert {
    EntityUpsert {
        identifier: identifier.to_string(),
        old_identifier: None,
        aliases: Vec::new(),
        entity_type: entity_type.to_string(),
        significance_level: level.to_string(),
        detailed_description: format!("{identifier}, as seen this chapter."),
        narrative_significance: String::new(),
        facts: FactDelta {
            explicit: vec![fact.to_string()],
            ..FactDelta::default()
        },
        history: Vec::new(),
        related_entities: Vec::new(),
    }
}

fn relationship(source: &str, target: &str, kind: &str) -> RelationshipUpsert {
    RelationshipUpsert {
        source_entity: source.to_string(),
        target_entity: target.to_string(),
        relationship_type: kind.to_string(),
        relationship_direction: None,
        description: String::new(),
        status: Some("active".to_string()),
        strength: Some(3),
        properties: HashMap::new(),
    }
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[test]
fn test_two_chapter_ingest_accumulates_history() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let book = build_book(&store);
    let ingest = ChapterIngestService::new(Arc::clone(&store));

    let first = ingest
        .ingest_chapter(
            book.ch1,
            &["Mira arrived under falling ash.".to_string()],
            &ChapterExtraction {
                entities: vec![upsert("Mira", "character", "major", "Mira arrived in Vael")],
                relationships: Vec::new(),
            },
            None,
        )
        .unwrap();
    assert!(first.is_clean());
    assert_eq!(first.entities_created, 1);

    let second = ingest
        .ingest_chapter(
            book.ch2,
            &["The manifest named her a spy.".to_string()],
            &ChapterExtraction {
                entities: vec![upsert("Mira", "character", "central", "Mira is a spy")],
                relationships: Vec::new(),
            },
            None,
        )
        .unwrap();
    assert_eq!(second.entities_created, 0, "same entity resolves across chapters");

    let mira = ingest.registry().resolve("Mira", None).unwrap().unwrap();
    let states = store.entity_states(mira.id()).unwrap();
    assert_eq!(states.len(), 2);
    assert!(states[0].seq_no < states[1].seq_no);
    // Facts union across chapters; the first observation survives untouched.
    assert_eq!(
        states[1].knowledge.explicit,
        vec!["Mira arrived in Vael".to_string(), "Mira is a spy".to_string()]
    );
    assert_eq!(states[0].knowledge.explicit, vec!["Mira arrived in Vael".to_string()]);
}

#[test]
fn test_reingest_is_idempotent_per_chapter() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let book = build_book(&store);
    let ingest = ChapterIngestService::new(Arc::clone(&store));
    let paragraphs = vec![
        "Ash fell for three days.".to_string(),
        "The docks emptied before dusk.".to_string(),
    ];

    let first = ingest
        .ingest_chapter(book.ch1, &paragraphs, &ChapterExtraction::default(), None)
        .unwrap();
    assert_eq!(first.units_created, 2);

    let second = ingest
        .ingest_chapter(book.ch1, &paragraphs, &ChapterExtraction::default(), None)
        .unwrap();
    assert_eq!(second.units_created, 0);
    assert_eq!(second.units_deduped, 2);

    // The same body in a different chapter is a new unit.
    let third = ingest
        .ingest_chapter(book.ch2, &paragraphs, &ChapterExtraction::default(), None)
        .unwrap();
    assert_eq!(third.units_created, 2);
}

#[test]
fn test_relationships_link_resolved_entities() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let book = build_book(&store);
    let ingest = ChapterIngestService::new(Arc::clone(&store));

    let report = ingest
        .ingest_chapter(
            book.ch1,
            &["Mira met Bren at the docks.".to_string()],
            &ChapterExtraction {
                entities: vec![
                    upsert("Mira", "character", "major", "seen at the docks"),
                    upsert("Bren", "character", "supporting", "works the docks"),
                ],
                relationships: vec![relationship("Mira", "Bren", "alliance")],
            },
            None,
        )
        .unwrap();
    assert!(report.is_clean());
    assert_eq!(report.relationships_upserted, 1);

    let mira = ingest.registry().resolve("Mira", None).unwrap().unwrap();
    let bren = ingest.registry().resolve("Bren", None).unwrap().unwrap();
    let rel = store
        .find_relationship(bren.id(), mira.id(), fabula::RelationshipType::Alliance)
        .unwrap()
        .expect("pair lookup is order independent");
    let states = store.relationship_states(rel.id()).unwrap();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].evidence.len(), 1);
}

#[test]
fn test_merge_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("fabula.db");
    let winner_id;
    let loser_id;
    {
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        let book = build_book(&store);
        let ingest = ChapterIngestService::new(Arc::clone(&store));
        ingest
            .ingest_chapter(
                book.ch1,
                &[],
                &ChapterExtraction {
                    entities: vec![
                        upsert("Mira Kessler", "character", "major", "arrived in Vael"),
                        upsert("The Gray Warden", "character", "supporting", "watches the gate"),
                    ],
                    relationships: Vec::new(),
                },
                None,
            )
            .unwrap();
        let winner = ingest.registry().resolve("Mira Kessler", None).unwrap().unwrap();
        let loser = ingest.registry().resolve("The Gray Warden", None).unwrap().unwrap();
        winner_id = winner.id();
        loser_id = loser.id();
        ingest.registry().merge_entities(winner_id, loser_id).unwrap();
    }

    // A fresh process over the same file sees the merged world.
    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    assert!(store.get_entity(loser_id).unwrap().is_none());
    assert_eq!(store.merge_target(loser_id).unwrap(), Some(winner_id));
    let winner = store.get_entity(winner_id).unwrap().unwrap();
    assert!(winner.aliases.contains(&"The Gray Warden".to_string()));
    assert_eq!(store.entity_states(winner_id).unwrap().len(), 2);
}

#[test]
fn test_ai_batch_requires_and_records_provenance() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let book = build_book(&store);
    let ingest = ChapterIngestService::new(Arc::clone(&store));
    let agent = AgentMetadata::new("chapter_extractor", "0.3.0").with_tokens(9_000);

    ingest
        .ingest_chapter(
            book.ch1,
            &[],
            &ChapterExtraction {
                entities: vec![upsert("Mira", "character", "major", "arrived in Vael")],
                relationships: Vec::new(),
            },
            Some(&agent),
        )
        .unwrap();

    let mira = ingest.registry().resolve("Mira", None).unwrap().unwrap();
    let states = store.entity_states(mira.id()).unwrap();
    assert_eq!(states[0].provenance, Some(agent.id()));
    assert_eq!(states[0].header.source, CreationSource::Ai);
    assert_eq!(
        store.get_agent_metadata(agent.id()).unwrap().unwrap().tokens_used,
        Some(9_000)
    );
}

#[test]
fn test_malformed_records_surface_in_report() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let book = build_book(&store);
    let ingest = ChapterIngestService::new(Arc::clone(&store));

    let report = ingest
        .ingest_chapter(
            book.ch1,
            &[],
            &ChapterExtraction {
                entities: vec![
                    upsert("The Relay", "megastructure", "major", "spans the bay"),
                    upsert("Mira", "character", "major", "arrived"),
                ],
                relationships: vec![relationship("Mira", "Nobody Known", "alliance")],
            },
            None,
        )
        .unwrap();

    assert_eq!(report.entities_created, 1);
    assert_eq!(report.relationships_upserted, 0);
    assert_eq!(report.skipped.len(), 2);
    assert!(report.skipped[0].reason.contains("megastructure"));

    let stats = store.stats().unwrap();
    assert_eq!(stats.knowledge.entities, 1);
    assert_eq!(stats.knowledge.relationships, 0);
}

#[test]
fn test_type_hint_separates_homonyms() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let book = build_book(&store);
    let ingest = ChapterIngestService::new(Arc::clone(&store));

    ingest
        .ingest_chapter(
            book.ch1,
            &[],
            &ChapterExtraction {
                entities: vec![
                    upsert("Vael", "location", "major", "a port city"),
                    upsert("Vael", "faction", "supporting", "the ruling house"),
                ],
                relationships: Vec::new(),
            },
            None,
        )
        .unwrap();

    let city = ingest
        .registry()
        .resolve("Vael", Some(EntityType::Location))
        .unwrap()
        .unwrap();
    let house = ingest
        .registry()
        .resolve("Vael", Some(EntityType::Organization))
        .unwrap()
        .unwrap();
    assert_ne!(city.id(), house.id());
}
