//! Content store implementation over the in-memory arenas.
//!
//! Sequencing invariants are kept inside a single write-guard scope, so no
//! reader ever observes a transient duplicate or gap. Lock order when two
//! arenas are involved: structures before units.

use super::MemoryStore;
use crate::models::{
    ContentStructure, ContentUnit, Context, ContextId, ContextScope, StructureId, UnitId,
};
use crate::storage::traits::{ContentCounts, ContentStore};
use crate::{Error, Result};

fn clamp_to(count: usize, requested: u32) -> u32 {
    let tail = u32::try_from(count).unwrap_or(u32::MAX);
    requested.min(tail)
}

fn ordered_by_sequence(mut contexts: Vec<Context>) -> Vec<Context> {
    contexts.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.header.created_at.cmp(&b.header.created_at))
    });
    contexts
}

impl ContentStore for MemoryStore {
    fn insert_structure(&self, mut structure: ContentStructure) -> Result<ContentStructure> {
        let mut structures = self
            .structures
            .write()
            .map_err(|_| Error::operation("insert_structure", "lock poisoned"))?;

        if let Some(parent) = structure.parent_id {
            if !structures.contains_key(&parent) {
                return Err(Error::not_found("structure", parent.to_string()));
            }
        }

        let sibling_count = structures
            .values()
            .filter(|s| s.parent_id == structure.parent_id)
            .count();
        structure.sequence = clamp_to(sibling_count, structure.sequence);

        for sibling in structures
            .values_mut()
            .filter(|s| s.parent_id == structure.parent_id)
        {
            if sibling.sequence >= structure.sequence {
                sibling.sequence += 1;
            }
        }

        structures.insert(structure.id(), structure.clone());
        Ok(structure)
    }

    fn update_structure(&self, structure: &ContentStructure) -> Result<()> {
        let mut structures = self
            .structures
            .write()
            .map_err(|_| Error::operation("update_structure", "lock poisoned"))?;

        let stored = structures
            .get_mut(&structure.id())
            .ok_or_else(|| Error::not_found("structure", structure.id().to_string()))?;

        let mut updated = structure.clone();
        updated.parent_id = stored.parent_id;
        updated.sequence = stored.sequence;
        updated.header.touch();
        *stored = updated;
        Ok(())
    }

    fn reparent_structure(
        &self,
        id: StructureId,
        new_parent: Option<StructureId>,
        new_sequence: u32,
    ) -> Result<()> {
        let mut structures = self
            .structures
            .write()
            .map_err(|_| Error::operation("reparent_structure", "lock poisoned"))?;

        let node = structures
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("structure", id.to_string()))?;
        if let Some(parent) = new_parent {
            if parent == id {
                return Err(Error::Cycle(id.to_string()));
            }
            if !structures.contains_key(&parent) {
                return Err(Error::not_found("structure", parent.to_string()));
            }
        }

        // Close the gap the node leaves behind.
        for sibling in structures
            .values_mut()
            .filter(|s| s.parent_id == node.parent_id && s.id() != id)
        {
            if sibling.sequence > node.sequence {
                sibling.sequence -= 1;
            }
        }

        // Open a gap at the destination, with the node itself excluded.
        let sibling_count = structures
            .values()
            .filter(|s| s.parent_id == new_parent && s.id() != id)
            .count();
        let sequence = clamp_to(sibling_count, new_sequence);
        for sibling in structures
            .values_mut()
            .filter(|s| s.parent_id == new_parent && s.id() != id)
        {
            if sibling.sequence >= sequence {
                sibling.sequence += 1;
            }
        }

        if let Some(moved) = structures.get_mut(&id) {
            moved.parent_id = new_parent;
            moved.sequence = sequence;
            moved.header.touch();
        }
        Ok(())
    }

    fn remove_structure(&self, id: StructureId) -> Result<bool> {
        let mut structures = self
            .structures
            .write()
            .map_err(|_| Error::operation("remove_structure", "lock poisoned"))?;

        let Some(node) = structures.get(&id).cloned() else {
            return Ok(false);
        };

        if structures.values().any(|s| s.parent_id == Some(id)) {
            return Err(Error::InvalidInput(format!(
                "structure {id} still has children"
            )));
        }
        {
            let units = self
                .units
                .read()
                .map_err(|_| Error::operation("remove_structure", "lock poisoned"))?;
            if units.values().any(|u| u.structure_id == id) {
                return Err(Error::InvalidInput(format!(
                    "structure {id} still has content units"
                )));
            }
        }

        structures.remove(&id);
        for sibling in structures
            .values_mut()
            .filter(|s| s.parent_id == node.parent_id)
        {
            if sibling.sequence > node.sequence {
                sibling.sequence -= 1;
            }
        }
        Ok(true)
    }

    fn get_structure(&self, id: StructureId) -> Result<Option<ContentStructure>> {
        let structures = self
            .structures
            .read()
            .map_err(|_| Error::operation("get_structure", "lock poisoned"))?;
        Ok(structures.get(&id).cloned())
    }

    fn children_of(&self, parent: Option<StructureId>) -> Result<Vec<ContentStructure>> {
        let structures = self
            .structures
            .read()
            .map_err(|_| Error::operation("children_of", "lock poisoned"))?;
        let mut children: Vec<ContentStructure> = structures
            .values()
            .filter(|s| s.parent_id == parent)
            .cloned()
            .collect();
        children.sort_by_key(|s| s.sequence);
        Ok(children)
    }

    fn list_structures(&self) -> Result<Vec<ContentStructure>> {
        let structures = self
            .structures
            .read()
            .map_err(|_| Error::operation("list_structures", "lock poisoned"))?;
        Ok(structures.values().cloned().collect())
    }

    fn insert_unit(&self, mut unit: ContentUnit) -> Result<ContentUnit> {
        {
            let structures = self
                .structures
                .read()
                .map_err(|_| Error::operation("insert_unit", "lock poisoned"))?;
            if !structures.contains_key(&unit.structure_id) {
                return Err(Error::not_found("structure", unit.structure_id.to_string()));
            }
        }

        let mut units = self
            .units
            .write()
            .map_err(|_| Error::operation("insert_unit", "lock poisoned"))?;

        let existing_count = units
            .values()
            .filter(|u| u.structure_id == unit.structure_id)
            .count();
        unit.sequence = clamp_to(existing_count, unit.sequence);

        for other in units
            .values_mut()
            .filter(|u| u.structure_id == unit.structure_id)
        {
            if other.sequence >= unit.sequence {
                other.sequence += 1;
            }
        }

        units.insert(unit.id(), unit.clone());
        Ok(unit)
    }

    fn get_unit(&self, id: UnitId) -> Result<Option<ContentUnit>> {
        let units = self
            .units
            .read()
            .map_err(|_| Error::operation("get_unit", "lock poisoned"))?;
        Ok(units.get(&id).cloned())
    }

    fn units_of(&self, structure_id: StructureId) -> Result<Vec<ContentUnit>> {
        let units = self
            .units
            .read()
            .map_err(|_| Error::operation("units_of", "lock poisoned"))?;
        let mut owned: Vec<ContentUnit> = units
            .values()
            .filter(|u| u.structure_id == structure_id)
            .cloned()
            .collect();
        owned.sort_by_key(|u| u.sequence);
        Ok(owned)
    }

    fn find_unit_by_hash(
        &self,
        structure_id: StructureId,
        content_hash: &str,
    ) -> Result<Option<ContentUnit>> {
        let units = self
            .units
            .read()
            .map_err(|_| Error::operation("find_unit_by_hash", "lock poisoned"))?;
        Ok(units
            .values()
            .find(|u| u.structure_id == structure_id && u.content_hash == content_hash)
            .cloned())
    }

    fn store_context(&self, context: &Context) -> Result<()> {
        let mut contexts = self
            .contexts
            .write()
            .map_err(|_| Error::operation("store_context", "lock poisoned"))?;
        contexts.insert(context.id(), context.clone());
        Ok(())
    }

    fn get_context(&self, id: ContextId) -> Result<Option<Context>> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| Error::operation("get_context", "lock poisoned"))?;
        Ok(contexts.get(&id).cloned())
    }

    fn list_contexts(&self) -> Result<Vec<Context>> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| Error::operation("list_contexts", "lock poisoned"))?;
        Ok(contexts.values().cloned().collect())
    }

    fn global_contexts(&self) -> Result<Vec<Context>> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| Error::operation("global_contexts", "lock poisoned"))?;
        Ok(ordered_by_sequence(
            contexts
                .values()
                .filter(|c| c.scope == ContextScope::Global)
                .cloned()
                .collect(),
        ))
    }

    fn contexts_for_structure(&self, structure_id: StructureId) -> Result<Vec<Context>> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| Error::operation("contexts_for_structure", "lock poisoned"))?;
        Ok(ordered_by_sequence(
            contexts
                .values()
                .filter(|c| c.structure_ids.contains(&structure_id))
                .cloned()
                .collect(),
        ))
    }

    fn contexts_for_unit(&self, unit_id: UnitId) -> Result<Vec<Context>> {
        let contexts = self
            .contexts
            .read()
            .map_err(|_| Error::operation("contexts_for_unit", "lock poisoned"))?;
        Ok(ordered_by_sequence(
            contexts
                .values()
                .filter(|c| c.unit_ids.contains(&unit_id))
                .cloned()
                .collect(),
        ))
    }

    fn content_counts(&self) -> Result<ContentCounts> {
        let structures = self
            .structures
            .read()
            .map_err(|_| Error::operation("content_counts", "lock poisoned"))?;
        let units = self
            .units
            .read()
            .map_err(|_| Error::operation("content_counts", "lock poisoned"))?;
        let contexts = self
            .contexts
            .read()
            .map_err(|_| Error::operation("content_counts", "lock poisoned"))?;
        Ok(ContentCounts {
            structures: structures.len(),
            units: units.len(),
            contexts: contexts.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreationSource, StructureType};

    fn node(
        title: &str,
        parent: Option<StructureId>,
        sequence: u32,
    ) -> ContentStructure {
        ContentStructure::new(
            StructureType::Chapter,
            title,
            title.to_lowercase(),
            parent,
            sequence,
            CreationSource::Human,
        )
    }

    fn sequences(store: &MemoryStore, parent: Option<StructureId>) -> Vec<(String, u32)> {
        store
            .children_of(parent)
            .unwrap()
            .into_iter()
            .map(|s| (s.title, s.sequence))
            .collect()
    }

    #[test]
    fn test_insert_shifts_trailing_siblings() {
        let store = MemoryStore::new();
        let root = store
            .insert_structure(node("Book", None, 0))
            .unwrap();
        store.insert_structure(node("One", Some(root.id()), 0)).unwrap();
        store.insert_structure(node("Two", Some(root.id()), 1)).unwrap();
        store.insert_structure(node("Interlude", Some(root.id()), 1)).unwrap();

        assert_eq!(
            sequences(&store, Some(root.id())),
            vec![
                ("One".to_string(), 0),
                ("Interlude".to_string(), 1),
                ("Two".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_insert_past_tail_clamps_to_append() {
        let store = MemoryStore::new();
        let root = store.insert_structure(node("Book", None, 0)).unwrap();
        store.insert_structure(node("One", Some(root.id()), 0)).unwrap();
        let stored = store
            .insert_structure(node("Two", Some(root.id()), 99))
            .unwrap();
        assert_eq!(stored.sequence, 1);
    }

    #[test]
    fn test_reparent_within_same_parent_renumbers() {
        let store = MemoryStore::new();
        let root = store.insert_structure(node("Book", None, 0)).unwrap();
        store.insert_structure(node("A", Some(root.id()), 0)).unwrap();
        store.insert_structure(node("B", Some(root.id()), 1)).unwrap();
        let c = store.insert_structure(node("C", Some(root.id()), 2)).unwrap();

        store.reparent_structure(c.id(), Some(root.id()), 0).unwrap();
        assert_eq!(
            sequences(&store, Some(root.id())),
            vec![
                ("C".to_string(), 0),
                ("A".to_string(), 1),
                ("B".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_reparent_across_parents_closes_and_opens_gaps() {
        let store = MemoryStore::new();
        let book_one = store.insert_structure(node("Book One", None, 0)).unwrap();
        let book_two = store.insert_structure(node("Book Two", None, 1)).unwrap();
        store.insert_structure(node("A", Some(book_one.id()), 0)).unwrap();
        let b = store.insert_structure(node("B", Some(book_one.id()), 1)).unwrap();
        store.insert_structure(node("C", Some(book_one.id()), 2)).unwrap();
        store.insert_structure(node("X", Some(book_two.id()), 0)).unwrap();

        store.reparent_structure(b.id(), Some(book_two.id()), 0).unwrap();

        assert_eq!(
            sequences(&store, Some(book_one.id())),
            vec![("A".to_string(), 0), ("C".to_string(), 1)]
        );
        assert_eq!(
            sequences(&store, Some(book_two.id())),
            vec![("B".to_string(), 0), ("X".to_string(), 1)]
        );
    }

    #[test]
    fn test_remove_structure_refuses_non_empty() {
        let store = MemoryStore::new();
        let root = store.insert_structure(node("Book", None, 0)).unwrap();
        let chapter = store
            .insert_structure(node("One", Some(root.id()), 0))
            .unwrap();

        assert!(matches!(
            store.remove_structure(root.id()),
            Err(Error::InvalidInput(_))
        ));

        store
            .insert_unit(ContentUnit::new(
                chapter.id(),
                0,
                "text",
                CreationSource::Human,
            ))
            .unwrap();
        assert!(matches!(
            store.remove_structure(chapter.id()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_remove_structure_closes_gap() {
        let store = MemoryStore::new();
        let root = store.insert_structure(node("Book", None, 0)).unwrap();
        store.insert_structure(node("A", Some(root.id()), 0)).unwrap();
        let b = store.insert_structure(node("B", Some(root.id()), 1)).unwrap();
        store.insert_structure(node("C", Some(root.id()), 2)).unwrap();

        assert!(store.remove_structure(b.id()).unwrap());
        assert_eq!(
            sequences(&store, Some(root.id())),
            vec![("A".to_string(), 0), ("C".to_string(), 1)]
        );
        assert!(!store.remove_structure(b.id()).unwrap());
    }

    #[test]
    fn test_unit_hash_lookup() {
        let store = MemoryStore::new();
        let root = store.insert_structure(node("Book", None, 0)).unwrap();
        let unit = store
            .insert_unit(ContentUnit::new(root.id(), 0, "Same text", CreationSource::Human))
            .unwrap();

        let found = store
            .find_unit_by_hash(root.id(), &unit.content_hash)
            .unwrap();
        assert_eq!(found.map(|u| u.id()), Some(unit.id()));

        let missing = store
            .find_unit_by_hash(root.id(), &crate::models::hash_content("Other text"))
            .unwrap();
        assert!(missing.is_none());
    }
}
