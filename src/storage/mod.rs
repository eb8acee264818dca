//! Storage layer: backend traits and the two shipped implementations.
//!
//! The layer is split by concern: knowledge (entities, relationships, state
//! versions), content (the structure forest, units, contexts), presentation
//! (articles and snapshots), and provenance (agent runs, prompts, merges).
//! The [`Store`] supertrait bundles all four so engines take one handle.
//!
//! `SqliteStore` is the durable default; `MemoryStore` backs tests and
//! short-lived tooling. Both enforce the same contracts, and the trait-level
//! tests in this crate run against each.

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    ContentCounts, ContentStore, KnowledgeCounts, KnowledgeStore, PresentationCounts,
    PresentationStore, ProvenanceCounts, ProvenanceStore, Store, StoreStats,
};
