//! Context scoping and the publication boundary.
//!
//! Contexts carry worldbuilding canon, themes, and guidance at three
//! scopes: global (the whole work), structural (a node and everything
//! under it), and per content unit. Publication freezes a context; later
//! revisions append a successor rather than editing the published row.

use crate::models::{Context, ContextId, ContextScope, RecordHeader, StructureId, UnitId};
use crate::services::structure::StructureService;
use crate::storage::Store;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// What a caller wants contexts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeTarget {
    /// The work as a whole.
    Global,
    /// A structure node; ancestors' structural contexts apply too.
    Structure(StructureId),
    /// A single content unit.
    Unit(UnitId),
}

/// Service answering "which contexts are in force here".
pub struct ContextService<S: Store> {
    store: Arc<S>,
    structures: StructureService<S>,
}

impl<S: Store> ContextService<S> {
    /// Creates a service over a shared store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        let structures = StructureService::new(Arc::clone(&store));
        Self { store, structures }
    }

    /// Stores a new context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when a scoped context carries no
    /// attachment, or any store error.
    pub fn add_context(&self, context: Context) -> Result<Context> {
        match context.scope {
            ContextScope::Structural if context.structure_ids.is_empty() => {
                return Err(Error::InvalidInput(
                    "a structural context must attach to at least one node".to_string(),
                ));
            },
            ContextScope::ContentUnit if context.unit_ids.is_empty() => {
                return Err(Error::InvalidInput(
                    "a content-unit context must attach to at least one unit".to_string(),
                ));
            },
            _ => {},
        }
        self.store.store_context(&context)?;
        Ok(context)
    }

    /// Contexts in force for a target, outermost scope first.
    ///
    /// Global contexts always apply. A structure target adds the
    /// structural contexts of the node and its ancestors, root first. A
    /// unit target adds its structure chain and then the unit's own
    /// contexts. Superseded contexts drop out when their successor is in
    /// the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing target, or any store
    /// error.
    #[instrument(skip(self))]
    pub fn visible_contexts(&self, target: ScopeTarget) -> Result<Vec<Context>> {
        let mut contexts = self.store.global_contexts()?;

        match target {
            ScopeTarget::Global => {},
            ScopeTarget::Structure(id) => {
                self.collect_structural(id, &mut contexts)?;
            },
            ScopeTarget::Unit(id) => {
                let unit = self
                    .store
                    .get_unit(id)?
                    .ok_or_else(|| Error::not_found("unit", id))?;
                self.collect_structural(unit.structure_id, &mut contexts)?;
                contexts.extend(self.store.contexts_for_unit(id)?);
            },
        }

        let mut seen = HashSet::new();
        contexts.retain(|c| seen.insert(c.id()));

        let superseded: HashSet<ContextId> =
            contexts.iter().filter_map(|c| c.supersedes).collect();
        contexts.retain(|c| !superseded.contains(&c.id()));
        Ok(contexts)
    }

    fn collect_structural(&self, id: StructureId, out: &mut Vec<Context>) -> Result<()> {
        let mut path = self.structures.path_to_root(id)?;
        path.reverse();
        for node in path {
            out.extend(self.store.contexts_for_structure(node.id())?);
        }
        Ok(())
    }

    /// Marks a context published, freezing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing context, or any store
    /// error.
    pub fn publish(&self, id: ContextId) -> Result<Context> {
        let mut context = self
            .store
            .get_context(id)?
            .ok_or_else(|| Error::not_found("context", id))?;
        if !context.is_published {
            context.is_published = true;
            context.header.touch();
            self.store.store_context(&context)?;
        }
        Ok(context)
    }

    /// Revises a context's content.
    ///
    /// Before publication this edits in place. After publication the
    /// original row never changes; the revision becomes a successor
    /// context that supersedes it and wins scoping queries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing context, or any store
    /// error.
    #[instrument(skip(self, content))]
    pub fn revise(&self, id: ContextId, content: &str) -> Result<Context> {
        let mut context = self
            .store
            .get_context(id)?
            .ok_or_else(|| Error::not_found("context", id))?;

        if !context.is_published {
            context.content = content.to_string();
            context.header.touch();
            self.store.store_context(&context)?;
            return Ok(context);
        }

        let mut successor = context.clone();
        successor.header = RecordHeader::new(ContextId::generate(), context.header.source);
        successor.content = content.to_string();
        successor.is_published = false;
        successor.supersedes = Some(id);
        self.store.store_context(&successor)?;
        Ok(successor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextType, CreationSource, StructureType};
    use crate::storage::{ContentStore, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        contexts: ContextService<MemoryStore>,
        structures: StructureService<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            contexts: ContextService::new(Arc::clone(&store)),
            structures: StructureService::new(Arc::clone(&store)),
            store,
        }
    }

    fn global(title: &str) -> Context {
        Context::new(
            ContextType::Worldbuilding,
            ContextScope::Global,
            title,
            title.to_lowercase(),
            "canon",
            CreationSource::Human,
        )
    }

    #[test]
    fn test_structure_target_sees_global_and_ancestor_contexts() {
        let f = fixture();
        let book = f.structures.create_root(StructureType::Book, "Book").unwrap();
        let chapter = f
            .structures
            .insert_child(&book, StructureType::Chapter, "One", 0)
            .unwrap();

        f.contexts.add_context(global("Calendar")).unwrap();
        f.contexts
            .add_context(
                Context::new(
                    ContextType::Theme,
                    ContextScope::Structural,
                    "Decay",
                    "decay",
                    "everything rusts",
                    CreationSource::Human,
                )
                .with_structure(book.id()),
            )
            .unwrap();
        f.contexts
            .add_context(
                Context::new(
                    ContextType::Pov,
                    ContextScope::Structural,
                    "Mira POV",
                    "mira-pov",
                    "first person",
                    CreationSource::Human,
                )
                .with_structure(chapter.id()),
            )
            .unwrap();

        let visible = f
            .contexts
            .visible_contexts(ScopeTarget::Structure(chapter.id()))
            .unwrap();
        let titles: Vec<&str> = visible.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Calendar", "Decay", "Mira POV"]);

        let book_only = f
            .contexts
            .visible_contexts(ScopeTarget::Structure(book.id()))
            .unwrap();
        assert_eq!(book_only.len(), 2);
    }

    #[test]
    fn test_unit_target_adds_unit_contexts() {
        let f = fixture();
        let book = f.structures.create_root(StructureType::Book, "Book").unwrap();
        let unit = f
            .structures
            .insert_unit(book.id(), "Ash fell.", 0, CreationSource::Human)
            .unwrap();

        f.contexts
            .add_context(
                Context::new(
                    ContextType::AuthorNote,
                    ContextScope::ContentUnit,
                    "Foreshadowing",
                    "foreshadowing",
                    "the ash matters later",
                    CreationSource::Human,
                )
                .with_unit(unit.id()),
            )
            .unwrap();

        let visible = f
            .contexts
            .visible_contexts(ScopeTarget::Unit(unit.id()))
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "Foreshadowing");
    }

    #[test]
    fn test_scoped_context_requires_attachment() {
        let f = fixture();
        let loose = Context::new(
            ContextType::Theme,
            ContextScope::Structural,
            "Decay",
            "decay",
            "everything rusts",
            CreationSource::Human,
        );
        assert!(matches!(
            f.contexts.add_context(loose),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_revision_before_publish_edits_in_place() {
        let f = fixture();
        let context = f.contexts.add_context(global("Calendar")).unwrap();
        let revised = f.contexts.revise(context.id(), "years renumbered").unwrap();
        assert_eq!(revised.id(), context.id());
        assert_eq!(revised.content, "years renumbered");
    }

    #[test]
    fn test_revision_after_publish_appends_successor() {
        let f = fixture();
        let context = f.contexts.add_context(global("Calendar")).unwrap();
        f.contexts.publish(context.id()).unwrap();

        let successor = f.contexts.revise(context.id(), "years renumbered").unwrap();
        assert_ne!(successor.id(), context.id());
        assert_eq!(successor.supersedes, Some(context.id()));

        // The published original is untouched.
        let original = f.store.get_context(context.id()).unwrap().unwrap();
        assert_eq!(original.content, "canon");
        assert!(original.is_published);

        // Scoping queries see only the successor.
        let visible = f.contexts.visible_contexts(ScopeTarget::Global).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id(), successor.id());
    }
}
