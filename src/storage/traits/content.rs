//! Content store trait: structure nodes, content units, and contexts.
//!
//! # Sequencing Contract
//!
//! Sibling structures (same parent) and units of one structure each hold a
//! zero-based, gap-free, duplicate-free `sequence`. The store owns keeping
//! that true: inserts at an occupied position shift the trailing siblings up
//! by one, removals close the gap, and reparenting does both, each as one
//! atomic step. Requested positions past the tail clamp to append.
//!
//! Cycle prevention is *not* the store's job: callers walk ancestry before
//! reparenting and reject moves that would make a node its own ancestor.

use crate::Result;
use crate::models::{
    ContentStructure, ContentUnit, Context, ContextId, StructureId, UnitId,
};

/// Trait for content hierarchy backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<S>`
/// - Child and unit lists must come back ordered by `sequence` ascending
/// - Shift-and-insert must never expose a transient duplicate `sequence`
///   to other readers (transaction or write-lock scope)
pub trait ContentStore: Send + Sync {
    // ========================================================================
    // Structure Operations
    // ========================================================================

    /// Inserts a structure node at its requested position among its
    /// siblings, shifting trailing siblings as needed.
    ///
    /// Returns the stored node; its `sequence` reflects any clamping.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent does not exist or the write fails.
    fn insert_structure(&self, structure: ContentStructure) -> Result<ContentStructure>;

    /// Updates a node's metadata in place: title, slug, flags, summary,
    /// `meta_info`. Parent and sequence changes go through
    /// [`ContentStore::reparent_structure`] and are ignored here.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not found or the write fails.
    fn update_structure(&self, structure: &ContentStructure) -> Result<()>;

    /// Moves a node to a new parent and/or position, closing the gap it
    /// leaves and opening one where it lands, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the node or new parent is not found or the
    /// write fails.
    fn reparent_structure(
        &self,
        id: StructureId,
        new_parent: Option<StructureId>,
        new_sequence: u32,
    ) -> Result<()>;

    /// Removes a childless, unit-less node, closing the sibling gap.
    /// Returns `true` if the node existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the node still has children or units, or the
    /// write fails.
    fn remove_structure(&self, id: StructureId) -> Result<bool>;

    /// Retrieves a structure node by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_structure(&self, id: StructureId) -> Result<Option<ContentStructure>>;

    /// Children of `parent` ordered by sequence; `None` lists the roots.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn children_of(&self, parent: Option<StructureId>) -> Result<Vec<ContentStructure>>;

    /// Every structure node, no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn list_structures(&self) -> Result<Vec<ContentStructure>>;

    // ========================================================================
    // Unit Operations
    // ========================================================================

    /// Inserts a content unit at its requested position within its
    /// structure, shifting trailing units as needed.
    ///
    /// Returns the stored unit; its `sequence` reflects any clamping.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure does not exist or the write fails.
    fn insert_unit(&self, unit: ContentUnit) -> Result<ContentUnit>;

    /// Retrieves a unit by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_unit(&self, id: UnitId) -> Result<Option<ContentUnit>>;

    /// Units of a structure ordered by sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn units_of(&self, structure_id: StructureId) -> Result<Vec<ContentUnit>>;

    /// Finds a unit of `structure_id` with the given content hash.
    ///
    /// Ingest uses this to skip bodies it has already stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn find_unit_by_hash(
        &self,
        structure_id: StructureId,
        content_hash: &str,
    ) -> Result<Option<ContentUnit>>;

    // ========================================================================
    // Context Operations
    // ========================================================================

    /// Stores a context. An existing context with the same id is replaced.
    ///
    /// Publication immutability is enforced above the store, which lets the
    /// scoping service re-store a published row untouched except for links.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn store_context(&self, context: &Context) -> Result<()>;

    /// Retrieves a context by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_context(&self, id: ContextId) -> Result<Option<Context>>;

    /// Every context, no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn list_contexts(&self) -> Result<Vec<Context>>;

    /// Contexts with global scope, ordered by sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn global_contexts(&self) -> Result<Vec<Context>>;

    /// Contexts attached to a structure node, ordered by sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn contexts_for_structure(&self, structure_id: StructureId) -> Result<Vec<Context>>;

    /// Contexts attached to a content unit, ordered by sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn contexts_for_unit(&self, unit_id: UnitId) -> Result<Vec<Context>>;

    // ========================================================================
    // Utility Operations
    // ========================================================================

    /// Row counts for this concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn content_counts(&self) -> Result<ContentCounts>;
}

/// Row counts for the content concern.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentCounts {
    /// Structure nodes.
    pub structures: usize,
    /// Content units.
    pub units: usize,
    /// Contexts.
    pub contexts: usize,
}
