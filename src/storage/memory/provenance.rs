//! Provenance store implementation over the in-memory arenas.

use super::MemoryStore;
use crate::models::{AgentMetadata, AgentMetadataId, EntityId, EntityMerge, PromptMetadata};
use crate::storage::traits::{ProvenanceCounts, ProvenanceStore};
use crate::{Error, Result};

impl ProvenanceStore for MemoryStore {
    fn store_agent_metadata(&self, metadata: &AgentMetadata) -> Result<()> {
        let mut runs = self
            .agent_runs
            .write()
            .map_err(|_| Error::operation("store_agent_metadata", "lock poisoned"))?;
        runs.insert(metadata.id(), metadata.clone());
        Ok(())
    }

    fn get_agent_metadata(&self, id: AgentMetadataId) -> Result<Option<AgentMetadata>> {
        let runs = self
            .agent_runs
            .read()
            .map_err(|_| Error::operation("get_agent_metadata", "lock poisoned"))?;
        Ok(runs.get(&id).cloned())
    }

    fn store_prompt_metadata(&self, metadata: &PromptMetadata) -> Result<()> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::operation("store_prompt_metadata", "lock poisoned"))?;
        prompts.insert(metadata.id(), metadata.clone());
        Ok(())
    }

    fn prompts_for_agent(&self, agent_id: AgentMetadataId) -> Result<Vec<PromptMetadata>> {
        let prompts = self
            .prompts
            .read()
            .map_err(|_| Error::operation("prompts_for_agent", "lock poisoned"))?;
        let mut owned: Vec<PromptMetadata> = prompts
            .values()
            .filter(|p| p.agent_metadata_id == agent_id)
            .cloned()
            .collect();
        owned.sort_by_key(|p| p.header.created_at);
        Ok(owned)
    }

    fn record_merge(&self, merge: &EntityMerge) -> Result<()> {
        let mut merges = self
            .merges
            .write()
            .map_err(|_| Error::operation("record_merge", "lock poisoned"))?;
        merges.push(merge.clone());
        Ok(())
    }

    fn merge_target(&self, loser: EntityId) -> Result<Option<EntityId>> {
        let merges = self
            .merges
            .read()
            .map_err(|_| Error::operation("merge_target", "lock poisoned"))?;
        Ok(merges
            .iter()
            .rev()
            .find(|m| m.loser == loser)
            .map(|m| m.winner))
    }

    fn list_merges(&self) -> Result<Vec<EntityMerge>> {
        let merges = self
            .merges
            .read()
            .map_err(|_| Error::operation("list_merges", "lock poisoned"))?;
        Ok(merges.clone())
    }

    fn provenance_counts(&self) -> Result<ProvenanceCounts> {
        let runs = self
            .agent_runs
            .read()
            .map_err(|_| Error::operation("provenance_counts", "lock poisoned"))?;
        let prompts = self
            .prompts
            .read()
            .map_err(|_| Error::operation("provenance_counts", "lock poisoned"))?;
        let merges = self
            .merges
            .read()
            .map_err(|_| Error::operation("provenance_counts", "lock poisoned"))?;
        Ok(ProvenanceCounts {
            agent_runs: runs.len(),
            prompts: prompts.len(),
            merges: merges.len(),
        })
    }
}
