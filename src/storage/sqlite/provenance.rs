//! Provenance store implementation over `SQLite`.

use super::{SqliteStore, acquire_lock, bad_column, parse_source, parse_timestamp};
use crate::models::{
    AgentMetadata, AgentMetadataId, EntityId, EntityMerge, MergeId, PromptMetadata,
    PromptMetadataId, RecordHeader,
};
use crate::storage::traits::{ProvenanceCounts, ProvenanceStore};
use crate::{Error, Result};
use rusqlite::{OptionalExtension, Row, params};

fn parse_agent_row(row: &Row<'_>) -> rusqlite::Result<AgentMetadata> {
    let id: String = row.get("id")?;
    let agent_kind: String = row.get("agent_kind")?;
    let agent_version: String = row.get("agent_version")?;
    let tokens_used: Option<i64> = row.get("tokens_used")?;
    let success: bool = row.get("success")?;
    let error: Option<String> = row.get("error")?;
    let extra: String = row.get("extra")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(AgentMetadata {
        header: RecordHeader::restored(
            AgentMetadataId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        agent_kind,
        agent_version,
        tokens_used: tokens_used.and_then(|t| u64::try_from(t).ok()),
        success,
        error,
        extra: serde_json::from_str(&extra).map_err(|_| bad_column("extra"))?,
    })
}

fn parse_prompt_row(row: &Row<'_>) -> rusqlite::Result<PromptMetadata> {
    let id: String = row.get("id")?;
    let agent_metadata_id: String = row.get("agent_metadata_id")?;
    let model: String = row.get("model")?;
    let parameters: String = row.get("parameters")?;
    let prompt_kind: String = row.get("prompt_kind")?;
    let prompt_version: String = row.get("prompt_version")?;
    let tokens_used: Option<i64> = row.get("tokens_used")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(PromptMetadata {
        header: RecordHeader::restored(
            PromptMetadataId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        agent_metadata_id: AgentMetadataId::parse(&agent_metadata_id)
            .ok_or_else(|| bad_column("agent_metadata_id"))?,
        model,
        parameters: serde_json::from_str(&parameters).map_err(|_| bad_column("parameters"))?,
        prompt_kind,
        prompt_version,
        tokens_used: tokens_used.and_then(|t| u64::try_from(t).ok()),
    })
}

fn parse_merge_row(row: &Row<'_>) -> rusqlite::Result<EntityMerge> {
    let id: String = row.get("id")?;
    let winner: String = row.get("winner")?;
    let loser: String = row.get("loser")?;
    let carried_aliases: String = row.get("carried_aliases")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(EntityMerge {
        header: RecordHeader::restored(
            MergeId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        winner: EntityId::parse(&winner).ok_or_else(|| bad_column("winner"))?,
        loser: EntityId::parse(&loser).ok_or_else(|| bad_column("loser"))?,
        carried_aliases: serde_json::from_str(&carried_aliases)
            .map_err(|_| bad_column("carried_aliases"))?,
    })
}

impl ProvenanceStore for SqliteStore {
    fn store_agent_metadata(&self, metadata: &AgentMetadata) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO agent_metadata (
                id, agent_kind, agent_version, tokens_used, success, error,
                extra, created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                metadata.id().to_string(),
                metadata.agent_kind,
                metadata.agent_version,
                metadata.tokens_used.map(|t| t as i64),
                metadata.success,
                metadata.error,
                serde_json::to_string(&metadata.extra)
                    .map_err(|e| Error::operation("store_agent_metadata", e))?,
                metadata.header.created_at.to_rfc3339(),
                metadata.header.updated_at.to_rfc3339(),
                metadata.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("store_agent_metadata", e))?;
        Ok(())
    }

    fn get_agent_metadata(&self, id: AgentMetadataId) -> Result<Option<AgentMetadata>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM agent_metadata WHERE id = ?1",
            params![id.to_string()],
            parse_agent_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_agent_metadata", e))
    }

    fn store_prompt_metadata(&self, metadata: &PromptMetadata) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO prompt_metadata (
                id, agent_metadata_id, model, parameters, prompt_kind,
                prompt_version, tokens_used, created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                metadata.id().to_string(),
                metadata.agent_metadata_id.to_string(),
                metadata.model,
                serde_json::to_string(&metadata.parameters)
                    .map_err(|e| Error::operation("store_prompt_metadata", e))?,
                metadata.prompt_kind,
                metadata.prompt_version,
                metadata.tokens_used.map(|t| t as i64),
                metadata.header.created_at.to_rfc3339(),
                metadata.header.updated_at.to_rfc3339(),
                metadata.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("store_prompt_metadata", e))?;
        Ok(())
    }

    fn prompts_for_agent(&self, agent_id: AgentMetadataId) -> Result<Vec<PromptMetadata>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM prompt_metadata WHERE agent_metadata_id = ?1
                 ORDER BY created_at, rowid",
            )
            .map_err(|e| Error::operation("prompts_for_agent", e))?;
        let rows = stmt
            .query_map(params![agent_id.to_string()], parse_prompt_row)
            .map_err(|e| Error::operation("prompts_for_agent", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("prompts_for_agent", e))
    }

    fn record_merge(&self, merge: &EntityMerge) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO entity_merges (
                id, winner, loser, carried_aliases, created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                merge.id().to_string(),
                merge.winner.to_string(),
                merge.loser.to_string(),
                serde_json::to_string(&merge.carried_aliases)
                    .map_err(|e| Error::operation("record_merge", e))?,
                merge.header.created_at.to_rfc3339(),
                merge.header.updated_at.to_rfc3339(),
                merge.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("record_merge", e))?;
        metrics::counter!("fabula_entity_merges_total").increment(1);
        Ok(())
    }

    fn merge_target(&self, loser: EntityId) -> Result<Option<EntityId>> {
        let conn = acquire_lock(&self.conn);
        let winner: Option<String> = conn
            .query_row(
                "SELECT winner FROM entity_merges WHERE loser = ?1
                 ORDER BY rowid DESC LIMIT 1",
                params![loser.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::operation("merge_target", e))?;
        winner
            .map(|w| {
                EntityId::parse(&w)
                    .ok_or_else(|| Error::operation("merge_target", "malformed winner column"))
            })
            .transpose()
    }

    fn list_merges(&self) -> Result<Vec<EntityMerge>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM entity_merges ORDER BY rowid")
            .map_err(|e| Error::operation("list_merges", e))?;
        let rows = stmt
            .query_map([], parse_merge_row)
            .map_err(|e| Error::operation("list_merges", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("list_merges", e))
    }

    fn provenance_counts(&self) -> Result<ProvenanceCounts> {
        let conn = acquire_lock(&self.conn);
        let count = |table: &str| -> Result<usize> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| usize::try_from(n).unwrap_or_default())
            .map_err(|e| Error::operation("provenance_counts", e))
        };
        Ok(ProvenanceCounts {
            agent_runs: count("agent_metadata")?,
            prompts: count("prompt_metadata")?,
            merges: count("entity_merges")?,
        })
    }
}
