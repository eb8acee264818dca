//! Provenance store trait: agent runs, prompts, and merge records.

use crate::Result;
use crate::models::{AgentMetadata, AgentMetadataId, EntityId, EntityMerge, PromptMetadata};

/// Trait for provenance backends.
///
/// Everything here is append-only audit data; nothing is updated or removed.
pub trait ProvenanceStore: Send + Sync {
    /// Records an agent invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn store_agent_metadata(&self, metadata: &AgentMetadata) -> Result<()>;

    /// Retrieves an agent invocation record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_agent_metadata(&self, id: AgentMetadataId) -> Result<Option<AgentMetadata>>;

    /// Records a prompt issued during an invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn store_prompt_metadata(&self, metadata: &PromptMetadata) -> Result<()>;

    /// Prompts issued during one invocation, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn prompts_for_agent(&self, agent_id: AgentMetadataId) -> Result<Vec<PromptMetadata>>;

    /// Records an entity merge.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn record_merge(&self, merge: &EntityMerge) -> Result<()>;

    /// The winner a merged-away entity id now resolves to, one hop.
    ///
    /// Callers follow the chain when merges have stacked.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn merge_target(&self, loser: EntityId) -> Result<Option<EntityId>>;

    /// Every merge record, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn list_merges(&self) -> Result<Vec<EntityMerge>>;

    /// Row counts for this concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn provenance_counts(&self) -> Result<ProvenanceCounts>;
}

/// Row counts for the provenance concern.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvenanceCounts {
    /// Agent invocation records.
    pub agent_runs: usize,
    /// Prompt records.
    pub prompts: usize,
    /// Merge records.
    pub merges: usize,
}
