//! Content store implementation over `SQLite`.
//!
//! Sibling renumbering happens inside a transaction, shifting sequences
//! through [`SEQUENCE_SHIFT`](super::SEQUENCE_SHIFT) first. `SQLite` checks
//! unique constraints per row during an `UPDATE`, so a plain
//! `sequence = sequence + 1` over trailing siblings can trip the index on a
//! transient duplicate; routing through the offset range cannot.

use super::{SEQUENCE_SHIFT, SqliteStore, acquire_lock, bad_column, parse_source, parse_timestamp};
use crate::models::{
    ContentStructure, ContentUnit, Context, ContextId, ContextScope, ContextType, RecordHeader,
    StructureId, StructureType, UnitId,
};
use crate::storage::traits::{ContentCounts, ContentStore};
use crate::{Error, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

/// Key used for the `COALESCE(parent_id, '')` unique index; roots share `''`.
fn parent_key(parent: Option<StructureId>) -> String {
    parent.map(|p| p.to_string()).unwrap_or_default()
}

fn clamp_to(count: i64, requested: u32) -> u32 {
    let tail = u32::try_from(count).unwrap_or(u32::MAX);
    requested.min(tail)
}

fn parse_structure_row(row: &Row<'_>) -> rusqlite::Result<ContentStructure> {
    let id: String = row.get("id")?;
    let structure_type: String = row.get("structure_type")?;
    let title: String = row.get("title")?;
    let slug: String = row.get("slug")?;
    let parent_id: Option<String> = row.get("parent_id")?;
    let sequence: i64 = row.get("sequence")?;
    let meta_info: String = row.get("meta_info")?;
    let ai_summary: Option<String> = row.get("ai_summary")?;
    let is_published: bool = row.get("is_published")?;
    let is_canonical: bool = row.get("is_canonical")?;
    let is_supplementary: bool = row.get("is_supplementary")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(ContentStructure {
        header: RecordHeader::restored(
            StructureId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        structure_type: StructureType::parse(&structure_type)
            .ok_or_else(|| bad_column("structure_type"))?,
        title,
        slug,
        parent_id: parent_id
            .map(|p| StructureId::parse(&p).ok_or_else(|| bad_column("parent_id")))
            .transpose()?,
        sequence: sequence as u32,
        meta_info: serde_json::from_str(&meta_info).map_err(|_| bad_column("meta_info"))?,
        ai_summary,
        is_published,
        is_canonical,
        is_supplementary,
    })
}

fn parse_unit_row(row: &Row<'_>) -> rusqlite::Result<ContentUnit> {
    let id: String = row.get("id")?;
    let structure_id: String = row.get("structure_id")?;
    let sequence: i64 = row.get("sequence")?;
    let content: String = row.get("content")?;
    let content_hash: String = row.get("content_hash")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(ContentUnit {
        header: RecordHeader::restored(
            UnitId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        structure_id: StructureId::parse(&structure_id)
            .ok_or_else(|| bad_column("structure_id"))?,
        sequence: sequence as u32,
        content,
        content_hash,
    })
}

fn parse_context_row(row: &Row<'_>) -> rusqlite::Result<Context> {
    let id: String = row.get("id")?;
    let context_type: String = row.get("context_type")?;
    let scope: String = row.get("scope")?;
    let title: String = row.get("title")?;
    let slug: String = row.get("slug")?;
    let content: String = row.get("content")?;
    let properties: String = row.get("properties")?;
    let sequence: i64 = row.get("sequence")?;
    let is_published: bool = row.get("is_published")?;
    let structure_ids: String = row.get("structure_ids")?;
    let unit_ids: String = row.get("unit_ids")?;
    let supersedes: Option<String> = row.get("supersedes")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    let structure_strings: Vec<String> =
        serde_json::from_str(&structure_ids).map_err(|_| bad_column("structure_ids"))?;
    let unit_strings: Vec<String> =
        serde_json::from_str(&unit_ids).map_err(|_| bad_column("unit_ids"))?;

    Ok(Context {
        header: RecordHeader::restored(
            ContextId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        context_type: ContextType::parse(&context_type)
            .ok_or_else(|| bad_column("context_type"))?,
        scope: ContextScope::parse(&scope).ok_or_else(|| bad_column("scope"))?,
        title,
        slug,
        content,
        properties: serde_json::from_str(&properties).map_err(|_| bad_column("properties"))?,
        sequence: sequence as u32,
        is_published,
        structure_ids: structure_strings
            .iter()
            .map(|s| StructureId::parse(s).ok_or_else(|| bad_column("structure_ids")))
            .collect::<rusqlite::Result<_>>()?,
        unit_ids: unit_strings
            .iter()
            .map(|s| UnitId::parse(s).ok_or_else(|| bad_column("unit_ids")))
            .collect::<rusqlite::Result<_>>()?,
        supersedes: supersedes
            .map(|s| ContextId::parse(&s).ok_or_else(|| bad_column("supersedes")))
            .transpose()?,
    })
}

fn structure_exists(conn: &Connection, id: StructureId, operation: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM structures WHERE id = ?1",
        params![id.to_string()],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| Error::operation(operation, e))
}

fn sibling_count(
    conn: &Connection,
    parent: Option<StructureId>,
    exclude: Option<StructureId>,
    operation: &str,
) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM structures
         WHERE COALESCE(parent_id, '') = ?1
           AND sequence < ?2
           AND id != COALESCE(?3, '')",
        params![
            parent_key(parent),
            SEQUENCE_SHIFT,
            exclude.map(|e| e.to_string()),
        ],
        |row| row.get(0),
    )
    .map_err(|e| Error::operation(operation, e))
}

/// Shifts siblings at or past `from` up by one, in two passes through the
/// offset range.
fn open_structure_gap(
    conn: &Connection,
    parent: Option<StructureId>,
    from: u32,
    exclude: Option<StructureId>,
    operation: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE structures SET sequence = sequence + ?1
         WHERE COALESCE(parent_id, '') = ?2
           AND sequence >= ?3 AND sequence < ?1
           AND id != COALESCE(?4, '')",
        params![
            SEQUENCE_SHIFT,
            parent_key(parent),
            i64::from(from),
            exclude.map(|e| e.to_string()),
        ],
    )
    .map_err(|e| Error::operation(operation, e))?;
    conn.execute(
        "UPDATE structures SET sequence = sequence - ?1 + 1
         WHERE COALESCE(parent_id, '') = ?2
           AND sequence >= ?1
           AND id != COALESCE(?3, '')",
        params![
            SEQUENCE_SHIFT,
            parent_key(parent),
            exclude.map(|e| e.to_string()),
        ],
    )
    .map_err(|e| Error::operation(operation, e))?;
    Ok(())
}

/// Shifts siblings past `after` down by one, closing a vacated position.
fn close_structure_gap(
    conn: &Connection,
    parent: Option<StructureId>,
    after: u32,
    exclude: Option<StructureId>,
    operation: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE structures SET sequence = sequence + ?1
         WHERE COALESCE(parent_id, '') = ?2
           AND sequence > ?3 AND sequence < ?1
           AND id != COALESCE(?4, '')",
        params![
            SEQUENCE_SHIFT,
            parent_key(parent),
            i64::from(after),
            exclude.map(|e| e.to_string()),
        ],
    )
    .map_err(|e| Error::operation(operation, e))?;
    conn.execute(
        "UPDATE structures SET sequence = sequence - ?1 - 1
         WHERE COALESCE(parent_id, '') = ?2
           AND sequence >= ?1
           AND id != COALESCE(?3, '')",
        params![
            SEQUENCE_SHIFT,
            parent_key(parent),
            exclude.map(|e| e.to_string()),
        ],
    )
    .map_err(|e| Error::operation(operation, e))?;
    Ok(())
}

impl ContentStore for SqliteStore {
    #[instrument(skip(self, structure), fields(structure_id = %structure.id()))]
    fn insert_structure(&self, mut structure: ContentStructure) -> Result<ContentStructure> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::operation("insert_structure", e))?;

        if let Some(parent) = structure.parent_id {
            if !structure_exists(&tx, parent, "insert_structure")? {
                return Err(Error::not_found("structure", parent.to_string()));
            }
        }

        let count = sibling_count(&tx, structure.parent_id, None, "insert_structure")?;
        structure.sequence = clamp_to(count, structure.sequence);
        open_structure_gap(
            &tx,
            structure.parent_id,
            structure.sequence,
            None,
            "insert_structure",
        )?;

        tx.execute(
            "INSERT INTO structures (
                id, structure_type, title, slug, parent_id, sequence,
                meta_info, ai_summary, is_published, is_canonical,
                is_supplementary, created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                structure.id().to_string(),
                structure.structure_type.as_str(),
                structure.title,
                structure.slug,
                structure.parent_id.map(|p| p.to_string()),
                i64::from(structure.sequence),
                serde_json::to_string(&structure.meta_info)
                    .map_err(|e| Error::operation("insert_structure", e))?,
                structure.ai_summary,
                structure.is_published,
                structure.is_canonical,
                structure.is_supplementary,
                structure.header.created_at.to_rfc3339(),
                structure.header.updated_at.to_rfc3339(),
                structure.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("insert_structure", e))?;
        tx.commit()
            .map_err(|e| Error::operation("insert_structure", e))?;
        Ok(structure)
    }

    fn update_structure(&self, structure: &ContentStructure) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let updated = conn
            .execute(
                "UPDATE structures SET
                    structure_type = ?2, title = ?3, slug = ?4, meta_info = ?5,
                    ai_summary = ?6, is_published = ?7, is_canonical = ?8,
                    is_supplementary = ?9, updated_at = ?10
                 WHERE id = ?1",
                params![
                    structure.id().to_string(),
                    structure.structure_type.as_str(),
                    structure.title,
                    structure.slug,
                    serde_json::to_string(&structure.meta_info)
                        .map_err(|e| Error::operation("update_structure", e))?,
                    structure.ai_summary,
                    structure.is_published,
                    structure.is_canonical,
                    structure.is_supplementary,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| Error::operation("update_structure", e))?;
        if updated == 0 {
            return Err(Error::not_found("structure", structure.id().to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    fn reparent_structure(
        &self,
        id: StructureId,
        new_parent: Option<StructureId>,
        new_sequence: u32,
    ) -> Result<()> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::operation("reparent_structure", e))?;

        let node = tx
            .query_row(
                "SELECT * FROM structures WHERE id = ?1",
                params![id.to_string()],
                parse_structure_row,
            )
            .optional()
            .map_err(|e| Error::operation("reparent_structure", e))?
            .ok_or_else(|| Error::not_found("structure", id.to_string()))?;

        if let Some(parent) = new_parent {
            if parent == id {
                return Err(Error::Cycle(id.to_string()));
            }
            if !structure_exists(&tx, parent, "reparent_structure")? {
                return Err(Error::not_found("structure", parent.to_string()));
            }
        }

        // Park the node below the live range so both renumbering passes can
        // treat its old slot as vacated.
        tx.execute(
            "UPDATE structures SET sequence = -1 WHERE id = ?1",
            params![id.to_string()],
        )
        .map_err(|e| Error::operation("reparent_structure", e))?;

        close_structure_gap(&tx, node.parent_id, node.sequence, Some(id), "reparent_structure")?;

        let count = sibling_count(&tx, new_parent, Some(id), "reparent_structure")?;
        let sequence = clamp_to(count, new_sequence);
        open_structure_gap(&tx, new_parent, sequence, Some(id), "reparent_structure")?;

        tx.execute(
            "UPDATE structures SET parent_id = ?2, sequence = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                new_parent.map(|p| p.to_string()),
                i64::from(sequence),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::operation("reparent_structure", e))?;
        tx.commit()
            .map_err(|e| Error::operation("reparent_structure", e))?;
        Ok(())
    }

    fn remove_structure(&self, id: StructureId) -> Result<bool> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::operation("remove_structure", e))?;

        let Some(node) = tx
            .query_row(
                "SELECT * FROM structures WHERE id = ?1",
                params![id.to_string()],
                parse_structure_row,
            )
            .optional()
            .map_err(|e| Error::operation("remove_structure", e))?
        else {
            return Ok(false);
        };

        let children: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM structures WHERE parent_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::operation("remove_structure", e))?;
        if children > 0 {
            return Err(Error::InvalidInput(format!(
                "structure {id} still has children"
            )));
        }
        let units: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM units WHERE structure_id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::operation("remove_structure", e))?;
        if units > 0 {
            return Err(Error::InvalidInput(format!(
                "structure {id} still has content units"
            )));
        }

        tx.execute(
            "DELETE FROM structures WHERE id = ?1",
            params![id.to_string()],
        )
        .map_err(|e| Error::operation("remove_structure", e))?;
        close_structure_gap(&tx, node.parent_id, node.sequence, None, "remove_structure")?;
        tx.commit()
            .map_err(|e| Error::operation("remove_structure", e))?;
        Ok(true)
    }

    fn get_structure(&self, id: StructureId) -> Result<Option<ContentStructure>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM structures WHERE id = ?1",
            params![id.to_string()],
            parse_structure_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_structure", e))
    }

    fn children_of(&self, parent: Option<StructureId>) -> Result<Vec<ContentStructure>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM structures WHERE COALESCE(parent_id, '') = ?1
                 ORDER BY sequence",
            )
            .map_err(|e| Error::operation("children_of", e))?;
        let rows = stmt
            .query_map(params![parent_key(parent)], parse_structure_row)
            .map_err(|e| Error::operation("children_of", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("children_of", e))
    }

    fn list_structures(&self) -> Result<Vec<ContentStructure>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM structures")
            .map_err(|e| Error::operation("list_structures", e))?;
        let rows = stmt
            .query_map([], parse_structure_row)
            .map_err(|e| Error::operation("list_structures", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("list_structures", e))
    }

    #[instrument(skip(self, unit), fields(structure_id = %unit.structure_id))]
    fn insert_unit(&self, mut unit: ContentUnit) -> Result<ContentUnit> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::operation("insert_unit", e))?;

        if !structure_exists(&tx, unit.structure_id, "insert_unit")? {
            return Err(Error::not_found("structure", unit.structure_id.to_string()));
        }

        let count: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM units WHERE structure_id = ?1",
                params![unit.structure_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::operation("insert_unit", e))?;
        unit.sequence = clamp_to(count, unit.sequence);

        tx.execute(
            "UPDATE units SET sequence = sequence + ?1
             WHERE structure_id = ?2 AND sequence >= ?3 AND sequence < ?1",
            params![
                SEQUENCE_SHIFT,
                unit.structure_id.to_string(),
                i64::from(unit.sequence),
            ],
        )
        .map_err(|e| Error::operation("insert_unit", e))?;
        tx.execute(
            "UPDATE units SET sequence = sequence - ?1 + 1
             WHERE structure_id = ?2 AND sequence >= ?1",
            params![SEQUENCE_SHIFT, unit.structure_id.to_string()],
        )
        .map_err(|e| Error::operation("insert_unit", e))?;

        tx.execute(
            "INSERT INTO units (
                id, structure_id, sequence, content, content_hash,
                created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                unit.id().to_string(),
                unit.structure_id.to_string(),
                i64::from(unit.sequence),
                unit.content,
                unit.content_hash,
                unit.header.created_at.to_rfc3339(),
                unit.header.updated_at.to_rfc3339(),
                unit.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("insert_unit", e))?;
        tx.commit().map_err(|e| Error::operation("insert_unit", e))?;

        metrics::counter!("fabula_units_stored_total").increment(1);
        Ok(unit)
    }

    fn get_unit(&self, id: UnitId) -> Result<Option<ContentUnit>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM units WHERE id = ?1",
            params![id.to_string()],
            parse_unit_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_unit", e))
    }

    fn units_of(&self, structure_id: StructureId) -> Result<Vec<ContentUnit>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM units WHERE structure_id = ?1 ORDER BY sequence")
            .map_err(|e| Error::operation("units_of", e))?;
        let rows = stmt
            .query_map(params![structure_id.to_string()], parse_unit_row)
            .map_err(|e| Error::operation("units_of", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("units_of", e))
    }

    fn find_unit_by_hash(
        &self,
        structure_id: StructureId,
        content_hash: &str,
    ) -> Result<Option<ContentUnit>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM units WHERE structure_id = ?1 AND content_hash = ?2 LIMIT 1",
            params![structure_id.to_string(), content_hash],
            parse_unit_row,
        )
        .optional()
        .map_err(|e| Error::operation("find_unit_by_hash", e))
    }

    fn store_context(&self, context: &Context) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let structure_ids: Vec<String> =
            context.structure_ids.iter().map(ToString::to_string).collect();
        let unit_ids: Vec<String> = context.unit_ids.iter().map(ToString::to_string).collect();
        conn.execute(
            "INSERT INTO contexts (
                id, context_type, scope, title, slug, content, properties,
                sequence, is_published, structure_ids, unit_ids, supersedes,
                created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                context_type = excluded.context_type,
                scope = excluded.scope,
                title = excluded.title,
                slug = excluded.slug,
                content = excluded.content,
                properties = excluded.properties,
                sequence = excluded.sequence,
                is_published = excluded.is_published,
                structure_ids = excluded.structure_ids,
                unit_ids = excluded.unit_ids,
                supersedes = excluded.supersedes,
                updated_at = excluded.updated_at",
            params![
                context.id().to_string(),
                context.context_type.as_str(),
                context.scope.as_str(),
                context.title,
                context.slug,
                context.content,
                serde_json::to_string(&context.properties)
                    .map_err(|e| Error::operation("store_context", e))?,
                i64::from(context.sequence),
                context.is_published,
                serde_json::to_string(&structure_ids)
                    .map_err(|e| Error::operation("store_context", e))?,
                serde_json::to_string(&unit_ids)
                    .map_err(|e| Error::operation("store_context", e))?,
                context.supersedes.map(|s| s.to_string()),
                context.header.created_at.to_rfc3339(),
                context.header.updated_at.to_rfc3339(),
                context.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("store_context", e))?;
        Ok(())
    }

    fn get_context(&self, id: ContextId) -> Result<Option<Context>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM contexts WHERE id = ?1",
            params![id.to_string()],
            parse_context_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_context", e))
    }

    fn list_contexts(&self) -> Result<Vec<Context>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM contexts")
            .map_err(|e| Error::operation("list_contexts", e))?;
        let rows = stmt
            .query_map([], parse_context_row)
            .map_err(|e| Error::operation("list_contexts", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("list_contexts", e))
    }

    fn global_contexts(&self) -> Result<Vec<Context>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM contexts WHERE scope = ?1
                 ORDER BY sequence, created_at",
            )
            .map_err(|e| Error::operation("global_contexts", e))?;
        let rows = stmt
            .query_map(params![ContextScope::Global.as_str()], parse_context_row)
            .map_err(|e| Error::operation("global_contexts", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("global_contexts", e))
    }

    fn contexts_for_structure(&self, structure_id: StructureId) -> Result<Vec<Context>> {
        // Membership lives in a JSON array column; filter in Rust the same
        // way the name search over aliases does.
        let mut contexts: Vec<Context> = self
            .list_contexts()?
            .into_iter()
            .filter(|c| c.structure_ids.contains(&structure_id))
            .collect();
        contexts.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.header.created_at.cmp(&b.header.created_at))
        });
        Ok(contexts)
    }

    fn contexts_for_unit(&self, unit_id: UnitId) -> Result<Vec<Context>> {
        let mut contexts: Vec<Context> = self
            .list_contexts()?
            .into_iter()
            .filter(|c| c.unit_ids.contains(&unit_id))
            .collect();
        contexts.sort_by(|a, b| {
            a.sequence
                .cmp(&b.sequence)
                .then_with(|| a.header.created_at.cmp(&b.header.created_at))
        });
        Ok(contexts)
    }

    fn content_counts(&self) -> Result<ContentCounts> {
        let conn = acquire_lock(&self.conn);
        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as usize)
            .map_err(|e| Error::operation("content_counts", e))
        };
        Ok(ContentCounts {
            structures: count("structures")?,
            units: count("units")?,
            contexts: count("contexts")?,
        })
    }
}
