//! Entity state versioning.
//!
//! States are never edited. A draft is merged against the entity's latest
//! state (facts union per category, importance and summary latest-wins)
//! and appended as a new version; the store stamps it with the monotonic
//! `seq_no` that totals-orders state history.

use crate::models::{CreationSource, EntityId, EntityState, RecordHeader, StateDraft, StateId, UnitId};
use crate::storage::Store;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Service appending versions to entity state histories.
pub struct StateVersioningEngine<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StateVersioningEngine<S> {
    /// Creates an engine over a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Appends one observation to an entity's history.
    ///
    /// Facts union into the accumulated knowledge in first-seen order with
    /// exact-string dedup; contradictory facts coexist until a human edits
    /// them out. Importance and summary take the draft's value when given,
    /// otherwise carry forward.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing entity,
    /// [`Error::ProvenanceMissing`] for an AI-sourced draft without agent
    /// metadata, or any store error.
    #[instrument(skip(self, draft), fields(%entity_id))]
    pub fn append_state(&self, entity_id: EntityId, draft: StateDraft) -> Result<EntityState> {
        let entity = self
            .store
            .get_entity(entity_id)?
            .ok_or_else(|| Error::not_found("entity", entity_id))?;

        let source = draft.source.unwrap_or(CreationSource::System);
        if source == CreationSource::Ai && draft.provenance.is_none() {
            return Err(Error::ProvenanceMissing {
                entity: entity.name,
            });
        }

        let prior = self.store.latest_entity_state(entity_id)?;

        let mut knowledge = prior
            .as_ref()
            .map(|p| p.knowledge.clone())
            .unwrap_or_default();
        knowledge.merge_union(&draft.facts);

        let importance = draft
            .importance
            .or_else(|| prior.as_ref().map(|p| p.importance))
            .unwrap_or(crate::models::SignificanceLevel::Peripheral);
        let summary = draft
            .summary
            .or_else(|| prior.as_ref().map(|p| p.summary.clone()))
            .unwrap_or_default();

        let state = EntityState {
            header: RecordHeader::new(StateId::generate(), source),
            entity_id,
            importance,
            summary,
            knowledge,
            evidence: draft.evidence,
            contexts: draft.contexts,
            provenance: draft.provenance,
            seq_no: 0,
        };
        self.store.append_entity_state(state)
    }

    /// Full version history of an entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn history(&self, entity_id: EntityId) -> Result<Vec<EntityState>> {
        self.store.entity_states(entity_id)
    }

    /// Latest state whose evidence is fully inside the visible unit set.
    ///
    /// States without evidence have no timeline position and are skipped,
    /// so a reader at any position never sees them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn current_state_at(
        &self,
        entity_id: EntityId,
        visible: &HashSet<UnitId>,
    ) -> Result<Option<EntityState>> {
        Ok(self
            .store
            .entity_states(entity_id)?
            .into_iter()
            .rev()
            .find(|state| state.evidence_within(visible)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, EntityType, Knowledge, SignificanceLevel};
    use crate::storage::{KnowledgeStore, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, StateVersioningEngine<MemoryStore>, EntityId) {
        let store = Arc::new(MemoryStore::new());
        let entity = Entity::new("Mira Kessler", EntityType::Character, CreationSource::Human);
        store.store_entity(&entity).unwrap();
        let engine = StateVersioningEngine::new(Arc::clone(&store));
        (store, engine, entity.id())
    }

    fn facts(explicit: &[&str]) -> Knowledge {
        let mut knowledge = Knowledge::new();
        knowledge.explicit = explicit.iter().map(ToString::to_string).collect();
        knowledge
    }

    #[test]
    fn test_append_unions_facts_in_first_seen_order() {
        let (_, engine, entity_id) = setup();
        let unit = UnitId::generate();
        engine
            .append_state(
                entity_id,
                StateDraft::new(CreationSource::Human)
                    .with_facts(facts(&["keeps a ledger", "wears gray"]))
                    .with_evidence(unit),
            )
            .unwrap();
        let second = engine
            .append_state(
                entity_id,
                StateDraft::new(CreationSource::Human)
                    .with_facts(facts(&["wears gray", "lost the ledger"]))
                    .with_evidence(unit),
            )
            .unwrap();

        assert_eq!(
            second.knowledge.explicit,
            vec!["keeps a ledger", "wears gray", "lost the ledger"]
        );
    }

    #[test]
    fn test_contradictions_coexist() {
        let (_, engine, entity_id) = setup();
        engine
            .append_state(
                entity_id,
                StateDraft::new(CreationSource::Human).with_facts(facts(&["is alive"])),
            )
            .unwrap();
        let latest = engine
            .append_state(
                entity_id,
                StateDraft::new(CreationSource::Human).with_facts(facts(&["is dead"])),
            )
            .unwrap();
        assert_eq!(latest.knowledge.explicit, vec!["is alive", "is dead"]);
    }

    #[test]
    fn test_unset_fields_carry_forward() {
        let (_, engine, entity_id) = setup();
        engine
            .append_state(
                entity_id,
                StateDraft::new(CreationSource::Human)
                    .with_importance(SignificanceLevel::Major)
                    .with_summary("the quartermaster"),
            )
            .unwrap();
        let second = engine
            .append_state(entity_id, StateDraft::new(CreationSource::Human))
            .unwrap();
        assert_eq!(second.importance, SignificanceLevel::Major);
        assert_eq!(second.summary, "the quartermaster");

        let third = engine
            .append_state(
                entity_id,
                StateDraft::new(CreationSource::Human)
                    .with_importance(SignificanceLevel::Central),
            )
            .unwrap();
        assert_eq!(third.importance, SignificanceLevel::Central);
    }

    #[test]
    fn test_ai_draft_without_provenance_rejected() {
        let (_, engine, entity_id) = setup();
        let result = engine.append_state(entity_id, StateDraft::new(CreationSource::Ai));
        assert!(matches!(result, Err(Error::ProvenanceMissing { .. })));
    }

    #[test]
    fn test_history_is_append_only_and_ordered() {
        let (store, engine, entity_id) = setup();
        let first = engine
            .append_state(entity_id, StateDraft::new(CreationSource::Human))
            .unwrap();
        let second = engine
            .append_state(entity_id, StateDraft::new(CreationSource::Human))
            .unwrap();

        let history = engine.history(entity_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id(), first.id());
        assert!(history[1].seq_no > history[0].seq_no);

        // The first version is untouched by the second append.
        let reloaded = store.get_entity_state(first.id()).unwrap().unwrap();
        assert_eq!(reloaded, history[0]);
        assert_eq!(second.id(), history[1].id());
    }

    #[test]
    fn test_current_state_at_skips_invisible_and_evidence_free() {
        let (_, engine, entity_id) = setup();
        let early = UnitId::generate();
        let late = UnitId::generate();

        let visible_state = engine
            .append_state(
                entity_id,
                StateDraft::new(CreationSource::Human).with_evidence(early),
            )
            .unwrap();
        engine
            .append_state(entity_id, StateDraft::new(CreationSource::Human))
            .unwrap();
        engine
            .append_state(
                entity_id,
                StateDraft::new(CreationSource::Human).with_evidence(late),
            )
            .unwrap();

        let visible: HashSet<UnitId> = [early].into_iter().collect();
        let current = engine.current_state_at(entity_id, &visible).unwrap();
        assert_eq!(current.map(|s| s.id()), Some(visible_state.id()));

        let nothing: HashSet<UnitId> = HashSet::new();
        assert!(engine.current_state_at(entity_id, &nothing).unwrap().is_none());
    }
}
