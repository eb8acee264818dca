//! Spoiler-safe article projection.
//!
//! A projection renders an article as it should look to a reader who has
//! finished a given structure node. Visibility is positional: the reader
//! has seen every unit of every node up to and including the read
//! position's subtree in pre-order, and a state version is admissible only
//! when all of its evidence lies inside that set. The result is pinned as
//! an immutable [`ArticleSnapshot`].

use crate::models::{
    Article, ArticleId, ArticleSnapshot, CreationSource, EntityId, EntityState,
    RelationshipState, SnapshotEntityRef, StructureId, UnitId,
};
use crate::services::structure::StructureService;
use crate::storage::Store;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Service producing read-position-bounded article snapshots.
pub struct ProjectionService<S: Store> {
    store: Arc<S>,
    structures: StructureService<S>,
}

impl<S: Store> ProjectionService<S> {
    /// Creates a service over a shared store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        let structures = StructureService::new(Arc::clone(&store));
        Self { store, structures }
    }

    /// Units visible to a reader who has finished `read_position`.
    ///
    /// Covers every node that precedes the position in pre-order plus the
    /// position's whole subtree, with each node's units in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureResolution`] when the position is not in
    /// the hierarchy, or any store error.
    pub fn visible_units(&self, read_position: StructureId) -> Result<Vec<UnitId>> {
        let order = self.structures.flattened_order()?;
        let index = order
            .iter()
            .position(|node| node.id() == read_position)
            .ok_or_else(|| Error::StructureResolution(read_position.to_string()))?;

        let mut subtree_len = 1;
        for descendant in self.structures.descendants(read_position) {
            descendant?;
            subtree_len += 1;
        }

        let mut units = Vec::new();
        for node in &order[..index + subtree_len] {
            for unit in self.store.units_of(node.id())? {
                units.push(unit.id());
            }
        }
        Ok(units)
    }

    /// Projects an article at a read position and stores the snapshot.
    ///
    /// The subject's latest visible state becomes the primary reference.
    /// Every relationship of the subject with a visible state contributes
    /// that state plus the other endpoint's latest visible state as a
    /// secondary reference. Citations are the backing evidence units,
    /// deduplicated and ordered by narrative position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing article,
    /// [`Error::InvalidInput`] for an article without a subject,
    /// [`Error::StructureResolution`] for an unknown read position, or any
    /// store error.
    #[instrument(skip(self))]
    pub fn project(
        &self,
        article_id: ArticleId,
        read_position: StructureId,
    ) -> Result<ArticleSnapshot> {
        let started = Instant::now();
        let mut article = self
            .store
            .get_article(article_id)?
            .ok_or_else(|| Error::not_found("article", article_id))?;
        let subject = article.subject.ok_or_else(|| {
            Error::InvalidInput(format!("article '{}' has no subject entity", article.slug))
        })?;

        let ordered = self.visible_units(read_position)?;
        let visible: HashSet<UnitId> = ordered.iter().copied().collect();

        let mut snapshot =
            ArticleSnapshot::new(article_id, read_position, CreationSource::System);

        let mut cited: Vec<UnitId> = Vec::new();
        if let Some(state) = self.latest_visible_entity_state(subject, &visible)? {
            cited.extend(state.evidence.iter().copied());
            snapshot.entity_states.push(SnapshotEntityRef::primary(state.id()));
        }

        for relationship in self.store.relationships_for_entity(subject)? {
            let Some(rel_state) =
                self.latest_visible_relationship_state(&relationship, &visible)?
            else {
                continue;
            };
            cited.extend(rel_state.evidence.iter().copied());
            snapshot.relationship_states.push(rel_state.id());

            let other = if relationship.source_id == subject {
                relationship.target_id
            } else {
                relationship.source_id
            };
            if let Some(state) = self.latest_visible_entity_state(other, &visible)? {
                snapshot
                    .entity_states
                    .push(SnapshotEntityRef::secondary(state.id()));
            }
        }

        // Citations follow the narrative total order, not discovery order.
        let cited: HashSet<UnitId> = cited.into_iter().collect();
        for unit in &ordered {
            if cited.contains(unit) {
                snapshot.cite(*unit);
            }
        }

        self.store.store_snapshot(&snapshot)?;
        article.latest_snapshot_id = Some(snapshot.id());
        article.header.touch();
        self.store.store_article(&article)?;

        metrics::counter!("fabula_snapshots_generated_total").increment(1);
        metrics::histogram!("fabula_projection_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        debug!(
            article = %article.slug,
            entity_states = snapshot.entity_states.len(),
            relationship_states = snapshot.relationship_states.len(),
            citations = snapshot.citations.len(),
            "projected article"
        );
        Ok(snapshot)
    }

    /// Creates (or reuses) the article for an entity, then projects it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing entity, or anything
    /// [`Self::project`] returns.
    pub fn project_entity(
        &self,
        entity_id: EntityId,
        read_position: StructureId,
    ) -> Result<(Article, ArticleSnapshot)> {
        let entity = self
            .store
            .get_entity(entity_id)?
            .ok_or_else(|| Error::not_found("entity", entity_id))?;

        let article = match self.store.find_article_for_subject(entity_id)? {
            Some(existing) => existing,
            None => {
                let slug = crate::models::slug::slugify(&entity.name);
                let article = Article::new(
                    entity.name.clone(),
                    entity.entity_type,
                    slug,
                    CreationSource::System,
                )
                .with_subject(entity_id);
                self.store.store_article(&article)?;
                article
            },
        };

        let snapshot = self.project(article.id(), read_position)?;
        // Re-read so the returned article carries the new snapshot pointer.
        let article = self
            .store
            .get_article(article.id())?
            .ok_or_else(|| Error::not_found("article", article.id()))?;
        Ok((article, snapshot))
    }

    fn latest_visible_entity_state(
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

    fn latest_visible_relationship_state(
        &self,
        relationship: &crate::models::Relationship,
        visible: &HashSet<UnitId>,
    ) -> Result<Option<RelationshipState>> {
        Ok(self
            .store
            .relationship_states(relationship.id())?
            .into_iter()
            .rev()
            .find(|state| state.evidence_within(visible)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ContentStructure, EntityType, Knowledge, RelationshipDraft, RelationshipType,
        StateDraft, StructureType,
    };
    use crate::services::reconciliation::RelationshipEngine;
    use crate::services::registry::EntityRegistry;
    use crate::services::versioning::StateVersioningEngine;
    use crate::storage::{KnowledgeStore, MemoryStore, PresentationStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        structures: StructureService<MemoryStore>,
        projection: ProjectionService<MemoryStore>,
        registry: EntityRegistry<MemoryStore>,
        versioning: StateVersioningEngine<MemoryStore>,
        relationships: RelationshipEngine<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        Fixture {
            structures: StructureService::new(Arc::clone(&store)),
            projection: ProjectionService::new(Arc::clone(&store)),
            registry: EntityRegistry::new(Arc::clone(&store)),
            versioning: StateVersioningEngine::new(Arc::clone(&store)),
            relationships: RelationshipEngine::new(Arc::clone(&store)),
            store,
        }
    }

    /// Book with two chapters, one unit each.
    fn two_chapter_book(f: &Fixture) -> (ContentStructure, ContentStructure, UnitId, UnitId) {
        let book = f.structures.create_root(StructureType::Book, "Book").unwrap();
        let ch1 = f
            .structures
            .insert_child(&book, StructureType::Chapter, "One", 0)
            .unwrap();
        let ch2 = f
            .structures
            .insert_child(&book, StructureType::Chapter, "Two", 1)
            .unwrap();
        let u1 = f
            .structures
            .insert_unit(ch1.id(), "Mira arrives in Vael.", 0, CreationSource::Human)
            .unwrap();
        let u2 = f
            .structures
            .insert_unit(ch2.id(), "Mira is revealed as a spy.", 0, CreationSource::Human)
            .unwrap();
        (ch1, ch2, u1.id(), u2.id())
    }

    #[test]
    fn test_visible_units_cover_preorder_prefix() {
        let f = fixture();
        let (ch1, ch2, u1, u2) = two_chapter_book(&f);

        assert_eq!(f.projection.visible_units(ch1.id()).unwrap(), vec![u1]);
        assert_eq!(f.projection.visible_units(ch2.id()).unwrap(), vec![u1, u2]);
    }

    #[test]
    fn test_visible_units_unknown_position() {
        let f = fixture();
        two_chapter_book(&f);
        assert!(matches!(
            f.projection.visible_units(StructureId::generate()),
            Err(Error::StructureResolution(_))
        ));
    }

    #[test]
    fn test_projection_excludes_later_states() {
        let f = fixture();
        let (ch1, ch2, u1, u2) = two_chapter_book(&f);
        let mira = f
            .registry
            .resolve_or_create("Mira", EntityType::Character, CreationSource::Human)
            .unwrap();

        f.versioning
            .append_state(
                mira.id(),
                StateDraft::new(CreationSource::Human)
                    .with_summary("A traveler newly arrived in Vael.")
                    .with_evidence(u1),
            )
            .unwrap();
        f.versioning
            .append_state(
                mira.id(),
                StateDraft::new(CreationSource::Human)
                    .with_summary("A spy for the northern court.")
                    .with_evidence(u2),
            )
            .unwrap();

        let article = Article::new("Mira", EntityType::Character, "mira", CreationSource::System)
            .with_subject(mira.id());
        f.store.store_article(&article).unwrap();

        let early = f.projection.project(article.id(), ch1.id()).unwrap();
        let early_state = f
            .store
            .get_entity_state(early.primary_state().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(early_state.summary, "A traveler newly arrived in Vael.");
        assert_eq!(early.citations, vec![u1]);

        let late = f.projection.project(article.id(), ch2.id()).unwrap();
        let late_state = f
            .store
            .get_entity_state(late.primary_state().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(late_state.summary, "A spy for the northern court.");
    }

    #[test]
    fn test_projection_pins_relationship_and_secondary_states() {
        let f = fixture();
        let (_ch1, ch2, u1, u2) = two_chapter_book(&f);
        let mira = f
            .registry
            .resolve_or_create("Mira", EntityType::Character, CreationSource::Human)
            .unwrap();
        let bren = f
            .registry
            .resolve_or_create("Bren", EntityType::Character, CreationSource::Human)
            .unwrap();

        f.versioning
            .append_state(
                mira.id(),
                StateDraft::new(CreationSource::Human)
                    .with_summary("A traveler.")
                    .with_evidence(u1),
            )
            .unwrap();
        f.versioning
            .append_state(
                bren.id(),
                StateDraft::new(CreationSource::Human)
                    .with_summary("A dockhand.")
                    .with_evidence(u2),
            )
            .unwrap();
        f.relationships
            .upsert_relationship(
                mira.id(),
                bren.id(),
                RelationshipType::Alliance,
                RelationshipDraft::new(CreationSource::Human).with_evidence(u2),
            )
            .unwrap();

        let (article, snapshot) = f
            .projection
            .project_entity(mira.id(), ch2.id())
            .unwrap();
        assert_eq!(article.latest_snapshot_id, Some(snapshot.id()));
        assert_eq!(snapshot.relationship_states.len(), 1);
        assert_eq!(snapshot.entity_states.len(), 2);
        assert_eq!(
            snapshot.entity_states.iter().filter(|r| r.is_primary).count(),
            1
        );
        // u1 backs the subject state, u2 the relationship; narrative order.
        assert_eq!(snapshot.citations, vec![u1, u2]);
    }

    #[test]
    fn test_snapshot_stability_across_graph_growth() {
        let f = fixture();
        let (ch1, _ch2, u1, u2) = two_chapter_book(&f);
        let mira = f
            .registry
            .resolve_or_create("Mira", EntityType::Character, CreationSource::Human)
            .unwrap();
        f.versioning
            .append_state(
                mira.id(),
                StateDraft::new(CreationSource::Human)
                    .with_summary("A traveler.")
                    .with_evidence(u1),
            )
            .unwrap();

        let (article, first) = f.projection.project_entity(mira.id(), ch1.id()).unwrap();

        // The graph moves on; the stored snapshot does not.
        f.versioning
            .append_state(
                mira.id(),
                StateDraft::new(CreationSource::Human)
                    .with_summary("A spy.")
                    .with_facts(Knowledge::default())
                    .with_evidence(u2),
            )
            .unwrap();

        let stored = f.store.get_snapshot(first.id()).unwrap().unwrap();
        assert_eq!(stored, first);
        let pinned = f
            .store
            .get_entity_state(stored.primary_state().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(pinned.summary, "A traveler.");

        // Re-projecting appends a new snapshot and moves the cache.
        let second = f.projection.project(article.id(), ch1.id()).unwrap();
        assert_ne!(second.id(), first.id());
        let article = f.store.get_article(article.id()).unwrap().unwrap();
        assert_eq!(article.latest_snapshot_id, Some(second.id()));
        assert_eq!(
            f.store.snapshots_for_article(article.id()).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_evidence_free_states_never_project() {
        let f = fixture();
        let (ch1, _ch2, _u1, _u2) = two_chapter_book(&f);
        let ghost = f
            .registry
            .resolve_or_create("Ghost", EntityType::Character, CreationSource::Human)
            .unwrap();
        f.versioning
            .append_state(
                ghost.id(),
                StateDraft::new(CreationSource::Human).with_summary("Unseen."),
            )
            .unwrap();

        let (_, snapshot) = f.projection.project_entity(ghost.id(), ch1.id()).unwrap();
        assert!(snapshot.primary_state().is_none());
        assert!(snapshot.citations.is_empty());
    }
}
