//! Data models for fabula.
//!
//! This module contains all the core data structures used throughout the engine.

mod article;
mod content;
mod context;
mod extraction;
mod header;
pub mod ids;
mod knowledge;
mod provenance;
mod relationship;
pub mod slug;

pub use article::{Article, ArticleSnapshot, SnapshotEntityRef};
pub use content::{ContentStructure, ContentUnit, StructureType, hash_content};
pub use context::{Context, ContextScope, ContextType};
pub use extraction::{
    ChapterExtraction, EntityUpsert, FactDelta, FoundEntity, KeyEntitySet, RelationshipUpsert,
};
pub use header::{CreationSource, RecordHeader};
pub use ids::{
    AgentMetadataId, ArticleId, ContextId, EntityId, MergeId, PromptMetadataId, RelationshipId,
    RelationshipStateId, SnapshotId, StateId, StructureId, UnitId,
};
pub use knowledge::{
    Entity, EntityState, EntityType, Knowledge, KnowledgeCategory, SignificanceLevel, StateDraft,
};
pub use provenance::{AgentMetadata, EntityMerge, PromptMetadata};
pub use relationship::{
    RelationDirection, Relationship, RelationshipDraft, RelationshipState, RelationshipStatus,
    RelationshipType, pair_key,
};
