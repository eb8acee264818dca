//! Storage backend traits.
//!
//! One trait per concern; a backend implements all four and picks up the
//! [`Store`] supertrait through the blanket impl.

mod content;
mod knowledge;
mod presentation;
mod provenance;

pub use content::{ContentCounts, ContentStore};
pub use knowledge::{KnowledgeCounts, KnowledgeStore};
pub use presentation::{PresentationCounts, PresentationStore};
pub use provenance::{ProvenanceCounts, ProvenanceStore};

use crate::Result;

/// Everything the engines need from a backend.
///
/// Blanket-implemented for any type carrying all four concern traits, so
/// services can take one `Arc<S: Store>` handle instead of four.
pub trait Store: KnowledgeStore + ContentStore + PresentationStore + ProvenanceStore {
    /// Row counts across every concern, for status reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if any underlying count fails.
    fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            knowledge: self.knowledge_counts()?,
            content: self.content_counts()?,
            presentation: self.presentation_counts()?,
            provenance: self.provenance_counts()?,
        })
    }
}

impl<T> Store for T where
    T: KnowledgeStore + ContentStore + PresentationStore + ProvenanceStore
{
}

/// Row counts across the whole store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    /// Entity and relationship counts.
    pub knowledge: KnowledgeCounts,
    /// Structure, unit, and context counts.
    pub content: ContentCounts,
    /// Article and snapshot counts.
    pub presentation: PresentationCounts,
    /// Agent, prompt, and merge record counts.
    pub provenance: ProvenanceCounts,
}
