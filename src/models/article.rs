//! Article and snapshot records for spoiler-safe projection.
//!
//! An article is the durable identity of a generated page (one per subject,
//! usually an entity). Snapshots are the immutable renderings: each one pins
//! a read position and the exact state versions that were visible there, so
//! a page can be re-served byte-for-byte long after the graph has moved on.

use crate::models::header::{CreationSource, RecordHeader};
use crate::models::ids::{
    ArticleId, EntityId, RelationshipStateId, SnapshotId, StateId, StructureId, UnitId,
};
use crate::models::knowledge::EntityType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable identity of one generated page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Identity and audit stamps.
    pub header: RecordHeader<ArticleId>,
    /// Display title.
    pub title: String,
    /// What kind of subject the article covers.
    pub article_type: EntityType,
    /// The entity the article is about, when it has one.
    pub subject: Option<EntityId>,
    /// URL-safe identifier, unique per work.
    pub slug: String,
    /// Most recently generated snapshot, if any.
    pub latest_snapshot_id: Option<SnapshotId>,
}

impl Article {
    /// Creates a new article with a generated id and no snapshots.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        article_type: EntityType,
        slug: impl Into<String>,
        source: CreationSource,
    ) -> Self {
        Self {
            header: RecordHeader::new(ArticleId::generate(), source),
            title: title.into(),
            article_type,
            subject: None,
            slug: slug.into(),
            latest_snapshot_id: None,
        }
    }

    /// Sets the entity this article is about.
    #[must_use]
    pub const fn with_subject(mut self, entity_id: EntityId) -> Self {
        self.subject = Some(entity_id);
        self
    }

    /// Returns the article id.
    #[must_use]
    pub const fn id(&self) -> ArticleId {
        self.header.id
    }
}

/// One entity-state reference inside a snapshot.
///
/// The primary reference is the snapshot subject's own state; secondary
/// references are the states of entities mentioned alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntityRef {
    /// The pinned state version.
    pub state_id: StateId,
    /// Whether this state belongs to the article subject itself.
    pub is_primary: bool,
}

impl SnapshotEntityRef {
    /// Reference to the subject's own state.
    #[must_use]
    pub const fn primary(state_id: StateId) -> Self {
        Self { state_id, is_primary: true }
    }

    /// Reference to a supporting entity's state.
    #[must_use]
    pub const fn secondary(state_id: StateId) -> Self {
        Self { state_id, is_primary: false }
    }
}

/// An immutable rendering of an article at one read position.
///
/// Snapshots are append-only: re-projecting at the same position produces a
/// new snapshot rather than mutating an old one, and nothing referenced here
/// is ever edited in place, so a stored snapshot stays reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSnapshot {
    /// Identity and audit stamps.
    pub header: RecordHeader<SnapshotId>,
    /// The article this snapshot renders.
    pub article_id: ArticleId,
    /// The structure node the reader has finished.
    pub read_position: StructureId,
    /// When the projection ran.
    pub generated_at: DateTime<Utc>,
    /// Pinned entity states, subject first.
    pub entity_states: Vec<SnapshotEntityRef>,
    /// Pinned relationship states.
    pub relationship_states: Vec<RelationshipStateId>,
    /// Evidence units backing the snapshot, in narrative order, deduplicated.
    pub citations: Vec<UnitId>,
}

impl ArticleSnapshot {
    /// Creates a new snapshot with a generated id.
    #[must_use]
    pub fn new(article_id: ArticleId, read_position: StructureId, source: CreationSource) -> Self {
        Self {
            header: RecordHeader::new(SnapshotId::generate(), source),
            article_id,
            read_position,
            generated_at: Utc::now(),
            entity_states: Vec::new(),
            relationship_states: Vec::new(),
            citations: Vec::new(),
        }
    }

    /// Returns the snapshot id.
    #[must_use]
    pub const fn id(&self) -> SnapshotId {
        self.header.id
    }

    /// Returns the primary state reference, if the snapshot carries one.
    #[must_use]
    pub fn primary_state(&self) -> Option<StateId> {
        self.entity_states
            .iter()
            .find(|r| r.is_primary)
            .map(|r| r.state_id)
    }

    /// Appends a citation unless it is already cited.
    pub fn cite(&mut self, unit_id: UnitId) {
        if !self.citations.contains(&unit_id) {
            self.citations.push(unit_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_article_has_no_snapshot() {
        let article = Article::new(
            "Mira Kessler",
            EntityType::Character,
            "mira-kessler",
            CreationSource::System,
        );
        assert!(article.latest_snapshot_id.is_none());
        assert!(article.subject.is_none());
    }

    #[test]
    fn test_primary_state_lookup() {
        let mut snapshot = ArticleSnapshot::new(
            ArticleId::generate(),
            StructureId::generate(),
            CreationSource::System,
        );
        assert!(snapshot.primary_state().is_none());

        let subject_state = StateId::generate();
        snapshot.entity_states.push(SnapshotEntityRef::secondary(StateId::generate()));
        snapshot.entity_states.push(SnapshotEntityRef::primary(subject_state));
        assert_eq!(snapshot.primary_state(), Some(subject_state));
    }

    #[test]
    fn test_cite_deduplicates() {
        let mut snapshot = ArticleSnapshot::new(
            ArticleId::generate(),
            StructureId::generate(),
            CreationSource::System,
        );
        let unit = UnitId::generate();
        snapshot.cite(unit);
        snapshot.cite(unit);
        assert_eq!(snapshot.citations.len(), 1);
    }
}
