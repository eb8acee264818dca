//! Content hierarchy service.
//!
//! Wraps the store's sequencing primitives with the operations callers
//! actually reach for: slugged node creation, cycle-checked moves, ancestor
//! paths, lazy subtree walks, and the flattened pre-order total order the
//! projection layer measures spoiler boundaries against.

use crate::models::{
    ContentStructure, ContentUnit, CreationSource, StructureId, StructureType, UnitId,
    slug::unique_slug,
};
use crate::storage::Store;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Service for building and walking the content forest.
pub struct StructureService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> StructureService<S> {
    /// Creates a service over a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the underlying store handle.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a root node appended after the existing roots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty title, or any store
    /// error.
    pub fn create_root(
        &self,
        structure_type: StructureType,
        title: &str,
    ) -> Result<ContentStructure> {
        self.insert(structure_type, title, None, u32::MAX, CreationSource::Human)
    }

    /// Inserts a child of `parent` at the requested sibling position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty title,
    /// [`Error::NotFound`] when the parent is gone, or any store error.
    pub fn insert_child(
        &self,
        parent: &ContentStructure,
        structure_type: StructureType,
        title: &str,
        sequence: u32,
    ) -> Result<ContentStructure> {
        self.insert(
            structure_type,
            title,
            Some(parent.id()),
            sequence,
            CreationSource::Human,
        )
    }

    /// Inserts a node with full control over parent, position, and source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty title,
    /// [`Error::NotFound`] when the parent is gone, or any store error.
    #[instrument(skip(self, title), fields(%structure_type))]
    pub fn insert(
        &self,
        structure_type: StructureType,
        title: &str,
        parent_id: Option<StructureId>,
        sequence: u32,
        source: CreationSource,
    ) -> Result<ContentStructure> {
        if title.trim().is_empty() {
            return Err(Error::InvalidInput(
                "structure title must not be empty".to_string(),
            ));
        }
        let siblings = self.store.children_of(parent_id)?;
        let slug = unique_slug(title, |candidate| {
            siblings.iter().any(|s| s.slug == candidate)
        });
        let node = ContentStructure::new(
            structure_type,
            title.trim(),
            slug,
            parent_id,
            sequence,
            source,
        );
        self.store.insert_structure(node)
    }

    /// Appends a content unit at the requested position within a node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty content,
    /// [`Error::NotFound`] when the node is gone, or any store error.
    pub fn insert_unit(
        &self,
        structure_id: StructureId,
        content: &str,
        sequence: u32,
        source: CreationSource,
    ) -> Result<ContentUnit> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput(
                "content unit must not be empty".to_string(),
            ));
        }
        self.store
            .insert_unit(ContentUnit::new(structure_id, sequence, content, source))
    }

    /// Moves a node to a new parent and position.
    ///
    /// Walks the destination's ancestor chain first: a node may never
    /// become its own ancestor, directly or transitively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cycle`] when the move would close a parent loop,
    /// [`Error::NotFound`] when node or destination is gone, or any store
    /// error.
    #[instrument(skip(self))]
    pub fn move_structure(
        &self,
        id: StructureId,
        new_parent: Option<StructureId>,
        new_sequence: u32,
    ) -> Result<()> {
        if let Some(parent) = new_parent {
            let mut cursor = Some(parent);
            let mut seen = HashSet::new();
            while let Some(current) = cursor {
                if current == id {
                    return Err(Error::Cycle(id.to_string()));
                }
                if !seen.insert(current) {
                    break;
                }
                cursor = self
                    .store
                    .get_structure(current)?
                    .ok_or_else(|| Error::not_found("structure", current))?
                    .parent_id;
            }
        }
        self.store.reparent_structure(id, new_parent, new_sequence)
    }

    /// Removes a childless, unit-less node, closing the sibling gap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the node still has children or
    /// units, or any store error.
    pub fn remove_structure(&self, id: StructureId) -> Result<bool> {
        self.store.remove_structure(id)
    }

    /// Retrieves one node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the node does not exist.
    pub fn get(&self, id: StructureId) -> Result<ContentStructure> {
        self.store
            .get_structure(id)?
            .ok_or_else(|| Error::not_found("structure", id))
    }

    /// The node and its ancestors, node first, root last.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the node or a recorded ancestor is
    /// gone.
    pub fn path_to_root(&self, id: StructureId) -> Result<Vec<ContentStructure>> {
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !seen.insert(current) {
                // A parent loop in stored data; surface it rather than spin.
                return Err(Error::Cycle(current.to_string()));
            }
            let node = self.get(current)?;
            cursor = node.parent_id;
            path.push(node);
        }
        Ok(path)
    }

    /// Lazily walks the subtree below `id` in pre-order.
    ///
    /// The node itself is not yielded. Children load on demand, so walking
    /// stops paying as soon as the caller stops taking.
    #[must_use]
    pub fn descendants(&self, id: StructureId) -> Descendants<'_, S> {
        Descendants {
            service: self,
            pending: vec![id],
            primed: false,
        }
    }

    /// The whole forest flattened to the narrative total order.
    ///
    /// Roots by sequence, then each root's subtree depth-first with
    /// siblings by sequence. Evidence visibility is measured against
    /// positions in this order.
    ///
    /// # Errors
    ///
    /// Returns an error if any store read fails.
    pub fn flattened_order(&self) -> Result<Vec<ContentStructure>> {
        let mut order = Vec::new();
        let roots = self.store.children_of(None)?;
        let mut stack: Vec<ContentStructure> = roots.into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            let children = self.store.children_of(Some(node.id()))?;
            stack.extend(children.into_iter().rev());
            order.push(node);
        }
        Ok(order)
    }

    /// Every unit id in narrative order.
    ///
    /// # Errors
    ///
    /// Returns an error if any store read fails.
    pub fn flattened_units(&self) -> Result<Vec<UnitId>> {
        let mut units = Vec::new();
        for node in self.flattened_order()? {
            units.extend(self.store.units_of(node.id())?.into_iter().map(|u| u.id()));
        }
        Ok(units)
    }
}

/// Lazy pre-order iterator over a subtree, excluding its root.
pub struct Descendants<'a, S: Store> {
    service: &'a StructureService<S>,
    pending: Vec<StructureId>,
    primed: bool,
}

impl<S: Store> Iterator for Descendants<'_, S> {
    type Item = Result<ContentStructure>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.primed {
            // First call replaces the root id with its children.
            self.primed = true;
            let root = self.pending.pop()?;
            match self.service.store.children_of(Some(root)) {
                Ok(children) => self.pending.extend(children.into_iter().rev().map(|c| c.id())),
                Err(e) => return Some(Err(e)),
            }
        }
        let id = self.pending.pop()?;
        let node = match self.service.get(id) {
            Ok(node) => node,
            Err(e) => return Some(Err(e)),
        };
        match self.service.store.children_of(Some(id)) {
            Ok(children) => self.pending.extend(children.into_iter().rev().map(|c| c.id())),
            Err(e) => return Some(Err(e)),
        }
        Some(Ok(node))
    }
}
