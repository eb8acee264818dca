//! Presentation store trait: articles and their frozen snapshots.

use crate::Result;
use crate::models::{Article, ArticleId, ArticleSnapshot, EntityId, SnapshotId};

/// Trait for presentation backends.
///
/// Articles are upserted in place (their `latest_snapshot_id` cache moves);
/// snapshots are written once and never touched again.
pub trait PresentationStore: Send + Sync {
    /// Stores an article. An existing article with the same id is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn store_article(&self, article: &Article) -> Result<()>;

    /// Retrieves an article by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_article(&self, id: ArticleId) -> Result<Option<Article>>;

    /// Finds the article about a given entity, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn find_article_for_subject(&self, entity_id: EntityId) -> Result<Option<Article>>;

    /// Finds an article by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn find_article_by_slug(&self, slug: &str) -> Result<Option<Article>>;

    /// Every article, no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn list_articles(&self) -> Result<Vec<Article>>;

    /// Writes a snapshot. Snapshot ids never collide; a second write with
    /// the same id is a caller bug and may be rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn store_snapshot(&self, snapshot: &ArticleSnapshot) -> Result<()>;

    /// Retrieves a snapshot by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup operation fails.
    fn get_snapshot(&self, id: SnapshotId) -> Result<Option<ArticleSnapshot>>;

    /// Snapshots of an article, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query operation fails.
    fn snapshots_for_article(&self, article_id: ArticleId) -> Result<Vec<ArticleSnapshot>>;

    /// Row counts for this concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn presentation_counts(&self) -> Result<PresentationCounts>;
}

/// Row counts for the presentation concern.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentationCounts {
    /// Articles.
    pub articles: usize,
    /// Frozen snapshots.
    pub snapshots: usize,
}
