//! Provenance records: which agent produced a state, and merge audit trails.

use crate::models::header::{CreationSource, RecordHeader};
use crate::models::ids::{AgentMetadataId, EntityId, MergeId, PromptMetadataId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One extraction agent invocation.
///
/// Every AI-sourced state version must point at one of these; the engine
/// rejects AI-sourced drafts that arrive without it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    /// Identity and audit stamps.
    pub header: RecordHeader<AgentMetadataId>,
    /// Which agent ran, e.g. `chapter_extractor`.
    pub agent_kind: String,
    /// Version of the agent implementation.
    pub agent_version: String,
    /// Total tokens the invocation consumed, when known.
    pub tokens_used: Option<u64>,
    /// Whether the invocation completed.
    pub success: bool,
    /// Failure detail when `success` is false.
    pub error: Option<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl AgentMetadata {
    /// Creates a record for a successful invocation.
    #[must_use]
    pub fn new(agent_kind: impl Into<String>, agent_version: impl Into<String>) -> Self {
        Self {
            header: RecordHeader::new(AgentMetadataId::generate(), CreationSource::System),
            agent_kind: agent_kind.into(),
            agent_version: agent_version.into(),
            tokens_used: None,
            success: true,
            error: None,
            extra: HashMap::new(),
        }
    }

    /// Records an invocation failure.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }

    /// Records token usage.
    #[must_use]
    pub const fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    /// Returns the record id.
    #[must_use]
    pub const fn id(&self) -> AgentMetadataId {
        self.header.id
    }
}

/// One prompt issued during an agent invocation.
///
/// An invocation may issue several prompts (outline pass, extraction pass,
/// repair pass); each gets its own record tied back to the invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMetadata {
    /// Identity and audit stamps.
    pub header: RecordHeader<PromptMetadataId>,
    /// The invocation this prompt belongs to.
    pub agent_metadata_id: AgentMetadataId,
    /// Model identifier the prompt was sent to.
    pub model: String,
    /// Sampling parameters as sent.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Which prompt in the agent's repertoire this was.
    pub prompt_kind: String,
    /// Version of the prompt template.
    pub prompt_version: String,
    /// Tokens this prompt consumed, when known.
    pub tokens_used: Option<u64>,
}

impl PromptMetadata {
    /// Creates a prompt record tied to an invocation.
    #[must_use]
    pub fn new(
        agent_metadata_id: AgentMetadataId,
        model: impl Into<String>,
        prompt_kind: impl Into<String>,
        prompt_version: impl Into<String>,
    ) -> Self {
        Self {
            header: RecordHeader::new(PromptMetadataId::generate(), CreationSource::System),
            agent_metadata_id,
            model: model.into(),
            parameters: HashMap::new(),
            prompt_kind: prompt_kind.into(),
            prompt_version: prompt_version.into(),
            tokens_used: None,
        }
    }

    /// Returns the record id.
    #[must_use]
    pub const fn id(&self) -> PromptMetadataId {
        self.header.id
    }
}

/// Audit record of one entity merge.
///
/// The loser's row is removed from the live registry, so this record is the
/// only durable trace that it existed; stale references resolve through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMerge {
    /// Identity and audit stamps.
    pub header: RecordHeader<MergeId>,
    /// The surviving entity.
    pub winner: EntityId,
    /// The absorbed entity.
    pub loser: EntityId,
    /// Names the loser answered to, now aliases of the winner.
    pub carried_aliases: Vec<String>,
}

impl EntityMerge {
    /// Records a merge.
    #[must_use]
    pub fn new(winner: EntityId, loser: EntityId, carried_aliases: Vec<String>) -> Self {
        Self {
            header: RecordHeader::new(MergeId::generate(), CreationSource::System),
            winner,
            loser,
            carried_aliases,
        }
    }

    /// Returns the record id.
    #[must_use]
    pub const fn id(&self) -> MergeId {
        self.header.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_invocation_keeps_error() {
        let meta = AgentMetadata::new("chapter_extractor", "0.3.0")
            .failed("model returned malformed JSON");
        assert!(!meta.success);
        assert_eq!(meta.error.as_deref(), Some("model returned malformed JSON"));
    }

    #[test]
    fn test_prompt_ties_back_to_invocation() {
        let invocation = AgentMetadata::new("chapter_extractor", "0.3.0");
        let prompt = PromptMetadata::new(invocation.id(), "gpt-4o", "extraction", "v2");
        assert_eq!(prompt.agent_metadata_id, invocation.id());
    }

    #[test]
    fn test_merge_records_both_parties() {
        let winner = EntityId::generate();
        let loser = EntityId::generate();
        let merge = EntityMerge::new(winner, loser, vec!["The Gray Warden".into()]);
        assert_eq!(merge.winner, winner);
        assert_eq!(merge.loser, loser);
        assert_eq!(merge.carried_aliases, vec!["The Gray Warden".to_string()]);
    }
}
