//! In-memory store for testing.
//!
//! Provides a fast, non-persistent implementation of every store trait for
//! unit tests and development scenarios. Records live in id-keyed arenas;
//! anything relational (states of an entity, children of a node) is a scan,
//! which is fine at test scale.

mod content;
mod knowledge;
mod presentation;
mod provenance;

use crate::models::{
    AgentMetadata, AgentMetadataId, Article, ArticleId, ArticleSnapshot, ContentStructure,
    ContentUnit, Context, ContextId, Entity, EntityId, EntityMerge, EntityState, PromptMetadata,
    PromptMetadataId, Relationship, RelationshipId, RelationshipState, RelationshipStateId,
    SnapshotId, StateId, StructureId, UnitId,
};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;

/// In-memory store backed by `RwLock`ed arena maps.
///
/// Thread-safe with reader-writer semantics; data is not persisted between
/// runs. When a method touches two arenas it locks structures before units
/// and entities before relationships, always.
///
/// # Example
///
/// ```rust,ignore
/// use fabula::storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// // Use for testing...
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    entities: RwLock<HashMap<EntityId, Entity>>,
    entity_states: RwLock<HashMap<StateId, EntityState>>,
    relationships: RwLock<HashMap<RelationshipId, Relationship>>,
    relationship_states: RwLock<HashMap<RelationshipStateId, RelationshipState>>,
    structures: RwLock<HashMap<StructureId, ContentStructure>>,
    units: RwLock<HashMap<UnitId, ContentUnit>>,
    contexts: RwLock<HashMap<ContextId, Context>>,
    articles: RwLock<HashMap<ArticleId, Article>>,
    snapshots: RwLock<HashMap<SnapshotId, ArticleSnapshot>>,
    agent_runs: RwLock<HashMap<AgentMetadataId, AgentMetadata>>,
    prompts: RwLock<HashMap<PromptMetadataId, PromptMetadata>>,
    merges: RwLock<Vec<EntityMerge>>,
    /// Next `seq_no`; 0 is reserved for "not yet stored".
    seq: AtomicU64,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: RwLock::default(),
            entity_states: RwLock::default(),
            relationships: RwLock::default(),
            relationship_states: RwLock::default(),
            structures: RwLock::default(),
            units: RwLock::default(),
            contexts: RwLock::default(),
            articles: RwLock::default(),
            snapshots: RwLock::default(),
            agent_runs: RwLock::default(),
            prompts: RwLock::default(),
            merges: RwLock::default(),
            seq: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::Store;

    #[test]
    fn test_new_store_is_empty() {
        let store = MemoryStore::new();
        let stats = store.stats().unwrap();
        assert_eq!(stats.knowledge.entities, 0);
        assert_eq!(stats.content.structures, 0);
        assert_eq!(stats.presentation.articles, 0);
        assert_eq!(stats.provenance.merges, 0);
    }
}
