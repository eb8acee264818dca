//! Knowledge store implementation over the in-memory arenas.

use super::MemoryStore;
use crate::models::{
    Entity, EntityId, EntityState, Relationship, RelationshipId, RelationshipState,
    RelationshipStateId, RelationshipType, StateId,
};
use crate::storage::traits::{KnowledgeCounts, KnowledgeStore};
use crate::{Error, Result};
use std::sync::atomic::Ordering;

impl KnowledgeStore for MemoryStore {
    fn store_entity(&self, entity: &Entity) -> Result<()> {
        let mut entities = self
            .entities
            .write()
            .map_err(|_| Error::operation("store_entity", "lock poisoned"))?;
        entities.insert(entity.id(), entity.clone());
        Ok(())
    }

    fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        let entities = self
            .entities
            .read()
            .map_err(|_| Error::operation("get_entity", "lock poisoned"))?;
        Ok(entities.get(&id).cloned())
    }

    fn list_entities(&self) -> Result<Vec<Entity>> {
        let entities = self
            .entities
            .read()
            .map_err(|_| Error::operation("list_entities", "lock poisoned"))?;
        Ok(entities.values().cloned().collect())
    }

    fn find_entities_by_name(&self, name: &str) -> Result<Vec<Entity>> {
        let entities = self
            .entities
            .read()
            .map_err(|_| Error::operation("find_entities_by_name", "lock poisoned"))?;
        Ok(entities
            .values()
            .filter(|e| e.matches_name(name))
            .cloned()
            .collect())
    }

    fn remove_entity(&self, id: EntityId) -> Result<bool> {
        let mut entities = self
            .entities
            .write()
            .map_err(|_| Error::operation("remove_entity", "lock poisoned"))?;
        Ok(entities.remove(&id).is_some())
    }

    fn append_entity_state(&self, mut state: EntityState) -> Result<EntityState> {
        state.seq_no = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut states = self
            .entity_states
            .write()
            .map_err(|_| Error::operation("append_entity_state", "lock poisoned"))?;
        states.insert(state.id(), state.clone());
        Ok(state)
    }

    fn get_entity_state(&self, id: StateId) -> Result<Option<EntityState>> {
        let states = self
            .entity_states
            .read()
            .map_err(|_| Error::operation("get_entity_state", "lock poisoned"))?;
        Ok(states.get(&id).cloned())
    }

    fn entity_states(&self, entity_id: EntityId) -> Result<Vec<EntityState>> {
        let states = self
            .entity_states
            .read()
            .map_err(|_| Error::operation("entity_states", "lock poisoned"))?;
        let mut versions: Vec<EntityState> = states
            .values()
            .filter(|s| s.entity_id == entity_id)
            .cloned()
            .collect();
        versions.sort_by_key(|s| s.seq_no);
        Ok(versions)
    }

    fn latest_entity_state(&self, entity_id: EntityId) -> Result<Option<EntityState>> {
        let states = self
            .entity_states
            .read()
            .map_err(|_| Error::operation("latest_entity_state", "lock poisoned"))?;
        Ok(states
            .values()
            .filter(|s| s.entity_id == entity_id)
            .max_by_key(|s| s.seq_no)
            .cloned())
    }

    fn repoint_entity_states(&self, from: EntityId, to: EntityId) -> Result<usize> {
        let mut states = self
            .entity_states
            .write()
            .map_err(|_| Error::operation("repoint_entity_states", "lock poisoned"))?;
        let mut moved = 0;
        for state in states.values_mut().filter(|s| s.entity_id == from) {
            state.entity_id = to;
            moved += 1;
        }
        Ok(moved)
    }

    fn store_relationship(&self, relationship: &Relationship) -> Result<()> {
        let mut relationships = self
            .relationships
            .write()
            .map_err(|_| Error::operation("store_relationship", "lock poisoned"))?;
        relationships.insert(relationship.id(), relationship.clone());
        Ok(())
    }

    fn get_relationship(&self, id: RelationshipId) -> Result<Option<Relationship>> {
        let relationships = self
            .relationships
            .read()
            .map_err(|_| Error::operation("get_relationship", "lock poisoned"))?;
        Ok(relationships.get(&id).cloned())
    }

    fn find_relationship(
        &self,
        a: EntityId,
        b: EntityId,
        relationship_type: RelationshipType,
    ) -> Result<Option<Relationship>> {
        let relationships = self
            .relationships
            .read()
            .map_err(|_| Error::operation("find_relationship", "lock poisoned"))?;
        Ok(relationships
            .values()
            .find(|r| r.relationship_type == relationship_type && r.connects(a, b))
            .cloned())
    }

    fn relationships_for_entity(&self, entity_id: EntityId) -> Result<Vec<Relationship>> {
        let relationships = self
            .relationships
            .read()
            .map_err(|_| Error::operation("relationships_for_entity", "lock poisoned"))?;
        Ok(relationships
            .values()
            .filter(|r| r.source_id == entity_id || r.target_id == entity_id)
            .cloned()
            .collect())
    }

    fn remove_relationship(&self, id: RelationshipId) -> Result<bool> {
        let mut relationships = self
            .relationships
            .write()
            .map_err(|_| Error::operation("remove_relationship", "lock poisoned"))?;
        Ok(relationships.remove(&id).is_some())
    }

    fn append_relationship_state(&self, mut state: RelationshipState) -> Result<RelationshipState> {
        state.seq_no = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut states = self
            .relationship_states
            .write()
            .map_err(|_| Error::operation("append_relationship_state", "lock poisoned"))?;
        states.insert(state.id(), state.clone());
        Ok(state)
    }

    fn get_relationship_state(
        &self,
        id: RelationshipStateId,
    ) -> Result<Option<RelationshipState>> {
        let states = self
            .relationship_states
            .read()
            .map_err(|_| Error::operation("get_relationship_state", "lock poisoned"))?;
        Ok(states.get(&id).cloned())
    }

    fn relationship_states(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Vec<RelationshipState>> {
        let states = self
            .relationship_states
            .read()
            .map_err(|_| Error::operation("relationship_states", "lock poisoned"))?;
        let mut versions: Vec<RelationshipState> = states
            .values()
            .filter(|s| s.relationship_id == relationship_id)
            .cloned()
            .collect();
        versions.sort_by_key(|s| s.seq_no);
        Ok(versions)
    }

    fn latest_relationship_state(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Option<RelationshipState>> {
        let states = self
            .relationship_states
            .read()
            .map_err(|_| Error::operation("latest_relationship_state", "lock poisoned"))?;
        Ok(states
            .values()
            .filter(|s| s.relationship_id == relationship_id)
            .max_by_key(|s| s.seq_no)
            .cloned())
    }

    fn repoint_relationship_states(
        &self,
        from: RelationshipId,
        to: RelationshipId,
    ) -> Result<usize> {
        let mut states = self
            .relationship_states
            .write()
            .map_err(|_| Error::operation("repoint_relationship_states", "lock poisoned"))?;
        let mut moved = 0;
        for state in states.values_mut().filter(|s| s.relationship_id == from) {
            state.relationship_id = to;
            moved += 1;
        }
        Ok(moved)
    }

    fn knowledge_counts(&self) -> Result<KnowledgeCounts> {
        let entities = self
            .entities
            .read()
            .map_err(|_| Error::operation("knowledge_counts", "lock poisoned"))?;
        let entity_states = self
            .entity_states
            .read()
            .map_err(|_| Error::operation("knowledge_counts", "lock poisoned"))?;
        let relationships = self
            .relationships
            .read()
            .map_err(|_| Error::operation("knowledge_counts", "lock poisoned"))?;
        let relationship_states = self
            .relationship_states
            .read()
            .map_err(|_| Error::operation("knowledge_counts", "lock poisoned"))?;
        Ok(KnowledgeCounts {
            entities: entities.len(),
            entity_states: entity_states.len(),
            relationships: relationships.len(),
            relationship_states: relationship_states.len(),
        })
    }
}
