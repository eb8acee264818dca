//! Knowledge store trait: entities, states, relationships, and their versions.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Notes |
//! |---------|----------|-------|
//! | `SqliteStore` | Default; embedded | WAL mode, single connection |
//! | `MemoryStore` | Testing | Arena maps, no persistence |
//!
//! # Append-Only Discipline
//!
//! Entity and relationship *records* are upserted in place; their *states*
//! are append-only. `append_entity_state` and `append_relationship_state`
//! assign a store-wide monotonic `seq_no` that breaks `created_at` ties, so
//! "latest state" is total-ordered even when two appends share a timestamp.
//!
//! # Operation Costs
//!
//! | Operation | Complexity | Notes |
//! |-----------|------------|-------|
//! | `store_entity` | O(1) | Insert or update by id |
//! | `find_entities_by_name` | O(n) | Scans names and aliases |
//! | `append_entity_state` | O(1) | Assigns `seq_no` |
//! | `latest_entity_state` | O(k) | k = versions of the entity |
//! | `find_relationship` | O(k) | Unordered pair + type lookup |

use crate::Result;
use crate::models::{
    Entity, EntityId, EntityState, Relationship, RelationshipId, RelationshipState,
    RelationshipStateId, RelationshipType, StateId,
};

/// Trait for knowledge graph backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<S>`
/// - Use interior mutability (e.g. `Mutex<Connection>`) for mutable state
/// - State lists must come back ordered by `seq_no` ascending
/// - Removal exists for merge bookkeeping only; states are never deleted
pub trait KnowledgeStore: Send + Sync {
    // ========================================================================
    // Entity Operations
    // ========================================================================

    /// Stores an entity. An existing entity with the same id is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn store_entity(&self, entity: &Entity) -> Result<()>;

    /// Retrieves an entity by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_entity(&self, id: EntityId) -> Result<Option<Entity>>;

    /// Lists every live entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn list_entities(&self) -> Result<Vec<Entity>>;

    /// Finds entities whose canonical name or any alias equals `name`,
    /// compared case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the search operation fails.
    fn find_entities_by_name(&self, name: &str) -> Result<Vec<Entity>>;

    /// Removes an entity from the live set.
    ///
    /// Returns `true` if the entity existed. Used by merges after states and
    /// relationships have been re-pointed; the merge record keeps the trail.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn remove_entity(&self, id: EntityId) -> Result<bool>;

    // ========================================================================
    // Entity State Operations
    // ========================================================================

    /// Appends a state version, assigning its `seq_no`.
    ///
    /// Returns the stored state with the assigned `seq_no` filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn append_entity_state(&self, state: EntityState) -> Result<EntityState>;

    /// Retrieves one state version by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_entity_state(&self, id: StateId) -> Result<Option<EntityState>>;

    /// All state versions of an entity, ordered by `seq_no` ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn entity_states(&self, entity_id: EntityId) -> Result<Vec<EntityState>>;

    /// The most recently appended state of an entity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn latest_entity_state(&self, entity_id: EntityId) -> Result<Option<EntityState>>;

    /// Re-points every state of `from` onto `to`. Returns how many moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn repoint_entity_states(&self, from: EntityId, to: EntityId) -> Result<usize>;

    // ========================================================================
    // Relationship Operations
    // ========================================================================

    /// Stores a relationship. An existing relationship with the same id is
    /// replaced; endpoint and direction changes go through here.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn store_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Retrieves a relationship by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_relationship(&self, id: RelationshipId) -> Result<Option<Relationship>>;

    /// Finds the relationship for an unordered entity pair and type.
    ///
    /// `find_relationship(a, b, t)` and `find_relationship(b, a, t)` return
    /// the same record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn find_relationship(
        &self,
        a: EntityId,
        b: EntityId,
        relationship_type: RelationshipType,
    ) -> Result<Option<Relationship>>;

    /// All relationships touching an entity, either endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn relationships_for_entity(&self, entity_id: EntityId) -> Result<Vec<Relationship>>;

    /// Removes a relationship record. Returns `true` if it existed.
    ///
    /// Only merges call this, after the record's states have been re-pointed
    /// onto the surviving relationship.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn remove_relationship(&self, id: RelationshipId) -> Result<bool>;

    // ========================================================================
    // Relationship State Operations
    // ========================================================================

    /// Appends a relationship state version, assigning its `seq_no`.
    ///
    /// Returns the stored state with the assigned `seq_no` filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn append_relationship_state(&self, state: RelationshipState) -> Result<RelationshipState>;

    /// Retrieves one relationship state by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_relationship_state(&self, id: RelationshipStateId)
    -> Result<Option<RelationshipState>>;

    /// All state versions of a relationship, ordered by `seq_no` ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn relationship_states(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Vec<RelationshipState>>;

    /// The most recently appended state of a relationship, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn latest_relationship_state(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Option<RelationshipState>>;

    /// Re-points every state of relationship `from` onto `to`.
    /// Returns how many moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn repoint_relationship_states(
        &self,
        from: RelationshipId,
        to: RelationshipId,
    ) -> Result<usize>;

    // ========================================================================
    // Utility Operations
    // ========================================================================

    /// Row counts for this concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn knowledge_counts(&self) -> Result<KnowledgeCounts>;
}

/// Row counts for the knowledge concern.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeCounts {
    /// Live entities.
    pub entities: usize,
    /// Entity state versions.
    pub entity_states: usize,
    /// Relationship records.
    pub relationships: usize,
    /// Relationship state versions.
    pub relationship_states: usize,
}
