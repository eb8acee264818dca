//! Relationship reconciliation.
//!
//! A relationship's identity is the unordered entity pair plus type: "Mira
//! allied with Bren" and "Bren allied with Mira" land on one record.
//! Direction and status changes stay on that record; each observation
//! appends a state version, and the record caches the latest status.

use crate::models::{
    CreationSource, EntityId, RecordHeader, RelationDirection, Relationship, RelationshipDraft,
    RelationshipId, RelationshipState, RelationshipStateId, RelationshipStatus, RelationshipType,
};
use crate::storage::Store;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::instrument;

/// Service upserting relationship observations.
pub struct RelationshipEngine<S: Store> {
    store: Arc<S>,
}

impl<S: Store> RelationshipEngine<S> {
    /// Creates an engine over a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records one observation of the relationship between two entities.
    ///
    /// Finds or creates the record for the unordered pair and type, appends
    /// a state version merged against the latest prior state, and refreshes
    /// the record's direction, subtype, and cached status. The direction in
    /// the draft reads from `source`'s perspective; when it is given, the
    /// record's endpoints are rewritten to match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when both ends are the same entity,
    /// [`Error::NotFound`] when either entity is missing,
    /// [`Error::ProvenanceMissing`] for an AI-sourced draft without agent
    /// metadata, or any store error.
    #[instrument(skip(self, draft), fields(%source, %target, %relationship_type))]
    pub fn upsert_relationship(
        &self,
        source: EntityId,
        target: EntityId,
        relationship_type: RelationshipType,
        draft: RelationshipDraft,
    ) -> Result<(Relationship, RelationshipState)> {
        if source == target {
            return Err(Error::InvalidInput(
                "a relationship must connect two distinct entities".to_string(),
            ));
        }
        let source_entity = self
            .store
            .get_entity(source)?
            .ok_or_else(|| Error::not_found("entity", source))?;
        self.store
            .get_entity(target)?
            .ok_or_else(|| Error::not_found("entity", target))?;

        let record_source = draft.source.unwrap_or(CreationSource::System);
        if record_source == CreationSource::Ai && draft.provenance.is_none() {
            return Err(Error::ProvenanceMissing {
                entity: source_entity.name,
            });
        }

        let mut relationship = match self
            .store
            .find_relationship(source, target, relationship_type)?
        {
            Some(mut existing) => {
                if let Some(direction) = draft.direction {
                    existing.source_id = source;
                    existing.target_id = target;
                    existing.direction = direction;
                }
                if draft.subtype.is_some() {
                    existing.subtype.clone_from(&draft.subtype);
                }
                existing
            },
            None => {
                let mut created = Relationship::new(
                    source,
                    target,
                    relationship_type,
                    draft.direction.unwrap_or(RelationDirection::Bidirectional),
                    record_source,
                );
                created.subtype.clone_from(&draft.subtype);
                created
            },
        };

        let prior = self.store.latest_relationship_state(relationship.id())?;
        let status = draft
            .status
            .or_else(|| prior.as_ref().map(|p| p.status))
            .unwrap_or(RelationshipStatus::Unknown);
        let strength = draft
            .strength
            .map(|s| s.clamp(1, 5))
            .or_else(|| prior.as_ref().and_then(|p| p.strength));
        let description = draft
            .description
            .or_else(|| prior.as_ref().map(|p| p.description.clone()))
            .unwrap_or_default();
        let mut properties = prior
            .as_ref()
            .map(|p| p.properties.clone())
            .unwrap_or_default();
        properties.extend(draft.properties);

        let state = self.store.append_relationship_state(RelationshipState {
            header: RecordHeader::new(RelationshipStateId::generate(), record_source),
            relationship_id: relationship.id(),
            status,
            strength,
            description,
            properties,
            evidence: draft.evidence,
            contexts: draft.contexts,
            provenance: draft.provenance,
            seq_no: 0,
        })?;

        relationship.current_status = state.status;
        relationship.header.touch();
        self.store.store_relationship(&relationship)?;
        Ok((relationship, state))
    }

    /// Full observation history of a relationship, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn history(&self, relationship_id: RelationshipId) -> Result<Vec<RelationshipState>> {
        self.store.relationship_states(relationship_id)
    }

    /// Every relationship touching an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn relationships_of(&self, entity_id: EntityId) -> Result<Vec<Relationship>> {
        self.store.relationships_for_entity(entity_id)
    }
}
