//! Presentation store implementation over `SQLite`.

use super::{SqliteStore, acquire_lock, bad_column, parse_source, parse_timestamp};
use crate::models::{
    Article, ArticleId, ArticleSnapshot, EntityId, EntityType, RecordHeader, SnapshotId,
    StructureId,
};
use crate::storage::traits::{PresentationCounts, PresentationStore};
use crate::{Error, Result};
use rusqlite::{OptionalExtension, Row, params};

fn parse_article_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    let id: String = row.get("id")?;
    let title: String = row.get("title")?;
    let article_type: String = row.get("article_type")?;
    let subject: Option<String> = row.get("subject")?;
    let slug: String = row.get("slug")?;
    let latest_snapshot_id: Option<String> = row.get("latest_snapshot_id")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(Article {
        header: RecordHeader::restored(
            ArticleId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        title,
        article_type: EntityType::parse(&article_type)
            .ok_or_else(|| bad_column("article_type"))?,
        subject: subject
            .map(|s| EntityId::parse(&s).ok_or_else(|| bad_column("subject")))
            .transpose()?,
        slug,
        latest_snapshot_id: latest_snapshot_id
            .map(|s| SnapshotId::parse(&s).ok_or_else(|| bad_column("latest_snapshot_id")))
            .transpose()?,
    })
}

fn parse_snapshot_row(row: &Row<'_>) -> rusqlite::Result<ArticleSnapshot> {
    let id: String = row.get("id")?;
    let article_id: String = row.get("article_id")?;
    let read_position: String = row.get("read_position")?;
    let generated_at: String = row.get("generated_at")?;
    let entity_states: String = row.get("entity_states")?;
    let relationship_states: String = row.get("relationship_states")?;
    let citations: String = row.get("citations")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(ArticleSnapshot {
        header: RecordHeader::restored(
            SnapshotId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        article_id: ArticleId::parse(&article_id).ok_or_else(|| bad_column("article_id"))?,
        read_position: StructureId::parse(&read_position)
            .ok_or_else(|| bad_column("read_position"))?,
        generated_at: parse_timestamp(&generated_at, "generated_at")?,
        entity_states: serde_json::from_str(&entity_states)
            .map_err(|_| bad_column("entity_states"))?,
        relationship_states: serde_json::from_str(&relationship_states)
            .map_err(|_| bad_column("relationship_states"))?,
        citations: serde_json::from_str(&citations).map_err(|_| bad_column("citations"))?,
    })
}

impl PresentationStore for SqliteStore {
    fn store_article(&self, article: &Article) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO articles (
                id, title, article_type, subject, slug, latest_snapshot_id,
                created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                article_type = excluded.article_type,
                subject = excluded.subject,
                slug = excluded.slug,
                latest_snapshot_id = excluded.latest_snapshot_id,
                updated_at = excluded.updated_at",
            params![
                article.id().to_string(),
                article.title,
                article.article_type.as_str(),
                article.subject.map(|s| s.to_string()),
                article.slug,
                article.latest_snapshot_id.map(|s| s.to_string()),
                article.header.created_at.to_rfc3339(),
                article.header.updated_at.to_rfc3339(),
                article.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("store_article", e))?;
        Ok(())
    }

    fn get_article(&self, id: ArticleId) -> Result<Option<Article>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM articles WHERE id = ?1",
            params![id.to_string()],
            parse_article_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_article", e))
    }

    fn find_article_for_subject(&self, entity_id: EntityId) -> Result<Option<Article>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM articles WHERE subject = ?1 LIMIT 1",
            params![entity_id.to_string()],
            parse_article_row,
        )
        .optional()
        .map_err(|e| Error::operation("find_article_for_subject", e))
    }

    fn find_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM articles WHERE slug = ?1 LIMIT 1",
            params![slug],
            parse_article_row,
        )
        .optional()
        .map_err(|e| Error::operation("find_article_by_slug", e))
    }

    fn list_articles(&self) -> Result<Vec<Article>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM articles ORDER BY title")
            .map_err(|e| Error::operation("list_articles", e))?;
        let rows = stmt
            .query_map([], parse_article_row)
            .map_err(|e| Error::operation("list_articles", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("list_articles", e))
    }

    fn store_snapshot(&self, snapshot: &ArticleSnapshot) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO snapshots (
                id, article_id, read_position, generated_at, entity_states,
                relationship_states, citations, created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                snapshot.id().to_string(),
                snapshot.article_id.to_string(),
                snapshot.read_position.to_string(),
                snapshot.generated_at.to_rfc3339(),
                serde_json::to_string(&snapshot.entity_states)
                    .map_err(|e| Error::operation("store_snapshot", e))?,
                serde_json::to_string(&snapshot.relationship_states)
                    .map_err(|e| Error::operation("store_snapshot", e))?,
                serde_json::to_string(&snapshot.citations)
                    .map_err(|e| Error::operation("store_snapshot", e))?,
                snapshot.header.created_at.to_rfc3339(),
                snapshot.header.updated_at.to_rfc3339(),
                snapshot.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("store_snapshot", e))?;
        metrics::counter!("fabula_snapshots_stored_total").increment(1);
        Ok(())
    }

    fn get_snapshot(&self, id: SnapshotId) -> Result<Option<ArticleSnapshot>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM snapshots WHERE id = ?1",
            params![id.to_string()],
            parse_snapshot_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_snapshot", e))
    }

    fn snapshots_for_article(&self, article_id: ArticleId) -> Result<Vec<ArticleSnapshot>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM snapshots WHERE article_id = ?1
                 ORDER BY generated_at DESC",
            )
            .map_err(|e| Error::operation("snapshots_for_article", e))?;
        let rows = stmt
            .query_map(params![article_id.to_string()], parse_snapshot_row)
            .map_err(|e| Error::operation("snapshots_for_article", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("snapshots_for_article", e))
    }

    fn presentation_counts(&self) -> Result<PresentationCounts> {
        let conn = acquire_lock(&self.conn);
        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| usize::try_from(n).unwrap_or_default())
            .map_err(|e| Error::operation("presentation_counts", e))
        };
        Ok(PresentationCounts {
            articles: count("articles")?,
            snapshots: count("snapshots")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreationSource, SnapshotEntityRef, StateId};

    #[test]
    fn test_article_subject_and_slug_lookup() {
        let store = SqliteStore::in_memory().unwrap();
        let subject = EntityId::generate();
        let article = Article::new(
            "Mira Kessler",
            EntityType::Character,
            "mira-kessler",
            CreationSource::System,
        )
        .with_subject(subject);
        store.store_article(&article).unwrap();

        let by_subject = store.find_article_for_subject(subject).unwrap();
        assert_eq!(by_subject.map(|a| a.id()), Some(article.id()));
        let by_slug = store.find_article_by_slug("mira-kessler").unwrap();
        assert_eq!(by_slug.map(|a| a.id()), Some(article.id()));
        assert!(store.find_article_by_slug("missing").unwrap().is_none());
    }

    #[test]
    fn test_snapshot_roundtrip_and_latest_cache() {
        let store = SqliteStore::in_memory().unwrap();
        let mut article = Article::new(
            "Mira Kessler",
            EntityType::Character,
            "mira-kessler",
            CreationSource::System,
        );
        store.store_article(&article).unwrap();

        let mut snapshot = ArticleSnapshot::new(
            article.id(),
            StructureId::generate(),
            CreationSource::System,
        );
        snapshot
            .entity_states
            .push(SnapshotEntityRef::primary(StateId::generate()));
        snapshot.cite(crate::models::UnitId::generate());
        store.store_snapshot(&snapshot).unwrap();

        article.latest_snapshot_id = Some(snapshot.id());
        store.store_article(&article).unwrap();

        let loaded = store.get_snapshot(snapshot.id()).unwrap().unwrap();
        assert_eq!(loaded.primary_state(), snapshot.primary_state());
        assert_eq!(loaded.citations, snapshot.citations);

        let cached = store.get_article(article.id()).unwrap().unwrap();
        assert_eq!(cached.latest_snapshot_id, Some(snapshot.id()));
        assert_eq!(store.snapshots_for_article(article.id()).unwrap().len(), 1);
    }
}
