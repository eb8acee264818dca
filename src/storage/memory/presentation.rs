//! Presentation store implementation over the in-memory arenas.

use super::MemoryStore;
use crate::models::{Article, ArticleId, ArticleSnapshot, EntityId, SnapshotId};
use crate::storage::traits::{PresentationCounts, PresentationStore};
use crate::{Error, Result};

impl PresentationStore for MemoryStore {
    fn store_article(&self, article: &Article) -> Result<()> {
        let mut articles = self
            .articles
            .write()
            .map_err(|_| Error::operation("store_article", "lock poisoned"))?;
        articles.insert(article.id(), article.clone());
        Ok(())
    }

    fn get_article(&self, id: ArticleId) -> Result<Option<Article>> {
        let articles = self
            .articles
            .read()
            .map_err(|_| Error::operation("get_article", "lock poisoned"))?;
        Ok(articles.get(&id).cloned())
    }

    fn find_article_for_subject(&self, entity_id: EntityId) -> Result<Option<Article>> {
        let articles = self
            .articles
            .read()
            .map_err(|_| Error::operation("find_article_for_subject", "lock poisoned"))?;
        Ok(articles
            .values()
            .find(|a| a.subject == Some(entity_id))
            .cloned())
    }

    fn find_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let articles = self
            .articles
            .read()
            .map_err(|_| Error::operation("find_article_by_slug", "lock poisoned"))?;
        Ok(articles.values().find(|a| a.slug == slug).cloned())
    }

    fn list_articles(&self) -> Result<Vec<Article>> {
        let articles = self
            .articles
            .read()
            .map_err(|_| Error::operation("list_articles", "lock poisoned"))?;
        Ok(articles.values().cloned().collect())
    }

    fn store_snapshot(&self, snapshot: &ArticleSnapshot) -> Result<()> {
        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| Error::operation("store_snapshot", "lock poisoned"))?;
        snapshots.insert(snapshot.id(), snapshot.clone());
        Ok(())
    }

    fn get_snapshot(&self, id: SnapshotId) -> Result<Option<ArticleSnapshot>> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| Error::operation("get_snapshot", "lock poisoned"))?;
        Ok(snapshots.get(&id).cloned())
    }

    fn snapshots_for_article(&self, article_id: ArticleId) -> Result<Vec<ArticleSnapshot>> {
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| Error::operation("snapshots_for_article", "lock poisoned"))?;
        let mut owned: Vec<ArticleSnapshot> = snapshots
            .values()
            .filter(|s| s.article_id == article_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        Ok(owned)
    }

    fn presentation_counts(&self) -> Result<PresentationCounts> {
        let articles = self
            .articles
            .read()
            .map_err(|_| Error::operation("presentation_counts", "lock poisoned"))?;
        let snapshots = self
            .snapshots
            .read()
            .map_err(|_| Error::operation("presentation_counts", "lock poisoned"))?;
        Ok(PresentationCounts {
            articles: articles.len(),
            snapshots: snapshots.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreationSource, EntityType, StructureId};

    #[test]
    fn test_article_subject_and_slug_lookup() {
        let store = MemoryStore::new();
        let subject = EntityId::generate();
        let article = Article::new("Mira Kessler", EntityType::Character, "mira-kessler", CreationSource::System)
            .with_subject(subject);
        store.store_article(&article).unwrap();

        let by_subject = store.find_article_for_subject(subject).unwrap();
        assert_eq!(by_subject.as_ref().map(Article::id), Some(article.id()));
        let by_slug = store.find_article_by_slug("mira-kessler").unwrap();
        assert_eq!(by_slug.map(|a| a.id()), Some(article.id()));
        assert!(store.find_article_by_slug("nobody").unwrap().is_none());
    }

    #[test]
    fn test_snapshots_come_back_newest_first() {
        let store = MemoryStore::new();
        let article = Article::new("Mira", EntityType::Character, "mira", CreationSource::System);
        store.store_article(&article).unwrap();

        let position = StructureId::generate();
        let older = ArticleSnapshot::new(article.id(), position, CreationSource::System);
        let mut newer = ArticleSnapshot::new(article.id(), position, CreationSource::System);
        newer.generated_at = older.generated_at + chrono::Duration::seconds(5);
        store.store_snapshot(&older).unwrap();
        store.store_snapshot(&newer).unwrap();

        let all = store.snapshots_for_article(article.id()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), newer.id());
    }
}
