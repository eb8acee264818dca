//! # Fabula
//!
//! An incremental knowledge graph engine for serialized fiction.
//!
//! Fabula ingests narrative content chapter by chapter, accumulates
//! append-only knowledge about entities and relationships, and projects
//! spoiler-safe encyclopedia articles bounded by a reader's position.
//!
//! ## Features
//!
//! - Append-only entity state history with per-chapter evidence tracking
//! - Fuzzy entity resolution with alias registration and audited merges
//! - Relationship reconciliation keyed by entity pair and relationship type
//! - Strict content hierarchy with gap-free sibling sequencing
//! - Spoiler-safe article projection frozen into immutable snapshots
//! - Pluggable storage (in-memory arenas, `SQLite` with WAL)
//!
//! ## Example
//!
//! ```rust,ignore
//! use fabula::{MemoryStore, StructureService, StructureType};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let structures = StructureService::new(Arc::clone(&store));
//! let book = structures.create_root(StructureType::Book, "The Winter Road")?;
//! let chapter = structures.insert_child(&book, StructureType::Chapter, "Ashfall", 0)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::FabulaConfig;
pub use models::{
    Article, ArticleSnapshot, ContentStructure, ContentUnit, Context, ContextScope, CreationSource,
    Entity, EntityId, EntityState, EntityType, Knowledge, Relationship, RelationshipState,
    RelationshipStatus, RelationshipType, SignificanceLevel, StateDraft, StructureType,
};
pub use services::{
    ChapterIngestService, ContextService, EntityRegistry, ProjectionService, RelationshipEngine,
    StateVersioningEngine, StructureService,
};
pub use storage::{
    ContentStore, KnowledgeStore, MemoryStore, PresentationStore, ProvenanceStore, SqliteStore,
    Store,
};

/// Error type for fabula operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty names, unknown enum strings, malformed extraction records |
/// | `NotFound` | Lookup by id misses, read position references a deleted node |
/// | `ResolutionAmbiguity` | Multiple entities tie as best fuzzy-resolution candidates |
/// | `Cycle` | A structure move would make a node its own ancestor |
/// | `StructureResolution` | An article read position cannot be located in the hierarchy |
/// | `ProvenanceMissing` | An AI-sourced state arrives without agent metadata |
/// | `OperationFailed` | Storage I/O errors, lock poisoning, serialization failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A required field is empty (entity names, structure titles)
    /// - An extraction record carries an unknown enum string
    /// - A relationship references the same entity on both ends
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record family (entity, structure, article, ...).
        kind: String,
        /// The id or name that missed.
        id: String,
    },

    /// Fuzzy resolution matched several entities equally well.
    ///
    /// Callers are expected to disambiguate (narrow the type hint, use an
    /// exact alias) and retry rather than pick a candidate at random.
    #[error("ambiguous reference '{name}': candidates {candidates:?}")]
    ResolutionAmbiguity {
        /// The name that was being resolved.
        name: String,
        /// Ids of the tied candidates.
        candidates: Vec<String>,
    },

    /// A structure mutation would create a parent cycle.
    #[error("structure cycle: {0} would become its own ancestor")]
    Cycle(String),

    /// A read position could not be resolved against the hierarchy.
    #[error("unresolvable read position: {0}")]
    StructureResolution(String),

    /// An AI-sourced write arrived without agent provenance.
    #[error("state for entity '{entity}' is AI-sourced but carries no agent metadata")]
    ProvenanceMissing {
        /// Entity the rejected state targeted.
        entity: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` operations fail
    /// - A lock is poisoned and cannot be recovered
    /// - JSON (de)serialization of stored columns fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    /// Shorthand for an `OperationFailed` error.
    #[must_use]
    pub fn operation(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for fabula operations.
pub type Result<T> = std::result::Result<T, Error>;
