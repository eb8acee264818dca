//! Engine services layered over the storage traits.
//!
//! Each service owns one concern and composes through `Arc<S: Store>`:
//!
//! | Service | Concern |
//! |---------|---------|
//! | [`StructureService`] | Hierarchy edits, sequencing, flattened order |
//! | [`EntityRegistry`] | Name resolution, aliases, merges |
//! | [`StateVersioningEngine`] | Append-only entity state history |
//! | [`RelationshipEngine`] | Unordered-pair relationship reconciliation |
//! | [`ContextService`] | Context scoping and the publication boundary |
//! | [`ProjectionService`] | Spoiler-safe article snapshots |
//! | [`ChapterIngestService`] | Chapter batch ingest pipeline |

pub mod ingest;
pub mod locks;
pub mod projection;
pub mod reconciliation;
pub mod registry;
pub mod scoping;
pub mod structure;
pub mod versioning;

pub use ingest::{ChapterIngestService, IngestReport, SkippedRecord};
pub use locks::EntityLockRegistry;
pub use projection::ProjectionService;
pub use reconciliation::RelationshipEngine;
pub use registry::{DEFAULT_SIMILARITY_THRESHOLD, EntityRegistry};
pub use scoping::{ContextService, ScopeTarget};
pub use structure::{Descendants, StructureService};
pub use versioning::StateVersioningEngine;
