//! Knowledge store implementation over `SQLite`.

use super::{SqliteStore, acquire_lock, bad_column, parse_source, parse_timestamp};
use crate::models::{
    Entity, EntityId, EntityState, EntityType, Knowledge, RecordHeader, RelationDirection,
    Relationship, RelationshipId, RelationshipState, RelationshipStateId, RelationshipStatus,
    RelationshipType, SignificanceLevel, StateId,
};
use crate::storage::traits::{KnowledgeCounts, KnowledgeStore};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::instrument;

fn parse_id_list<T>(raw: &str, field: &str, parse: impl Fn(&str) -> Option<T>) -> rusqlite::Result<Vec<T>> {
    let strings: Vec<String> = serde_json::from_str(raw).map_err(|_| bad_column(field))?;
    strings
        .iter()
        .map(|s| parse(s).ok_or_else(|| bad_column(field)))
        .collect()
}

fn parse_entity_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let id: String = row.get("id")?;
    let name: String = row.get("name")?;
    let entity_type: String = row.get("entity_type")?;
    let additional_types: String = row.get("additional_types")?;
    let aliases: String = row.get("aliases")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    let additional: Vec<String> =
        serde_json::from_str(&additional_types).map_err(|_| bad_column("additional_types"))?;
    Ok(Entity {
        header: RecordHeader::restored(
            EntityId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        name,
        entity_type: EntityType::parse(&entity_type).ok_or_else(|| bad_column("entity_type"))?,
        additional_types: additional
            .iter()
            .map(|s| EntityType::parse(s).ok_or_else(|| bad_column("additional_types")))
            .collect::<rusqlite::Result<_>>()?,
        aliases: serde_json::from_str(&aliases).map_err(|_| bad_column("aliases"))?,
    })
}

fn parse_entity_state_row(row: &Row<'_>) -> rusqlite::Result<EntityState> {
    let id: String = row.get("id")?;
    let entity_id: String = row.get("entity_id")?;
    let importance: i64 = row.get("importance")?;
    let summary: String = row.get("summary")?;
    let knowledge: String = row.get("knowledge")?;
    let evidence: String = row.get("evidence")?;
    let contexts: String = row.get("contexts")?;
    let provenance: Option<String> = row.get("provenance")?;
    let seq_no: i64 = row.get("seq_no")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(EntityState {
        header: RecordHeader::restored(
            StateId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        entity_id: EntityId::parse(&entity_id).ok_or_else(|| bad_column("entity_id"))?,
        importance: SignificanceLevel::from_rank(importance as u8)
            .ok_or_else(|| bad_column("importance"))?,
        summary,
        knowledge: serde_json::from_str::<Knowledge>(&knowledge)
            .map_err(|_| bad_column("knowledge"))?,
        evidence: parse_id_list(&evidence, "evidence", crate::models::UnitId::parse)?,
        contexts: parse_id_list(&contexts, "contexts", crate::models::ContextId::parse)?,
        provenance: provenance
            .map(|s| {
                crate::models::AgentMetadataId::parse(&s).ok_or_else(|| bad_column("provenance"))
            })
            .transpose()?,
        seq_no: seq_no as u64,
    })
}

fn parse_relationship_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let id: String = row.get("id")?;
    let source_id: String = row.get("source_id")?;
    let target_id: String = row.get("target_id")?;
    let direction: String = row.get("direction")?;
    let relationship_type: String = row.get("relationship_type")?;
    let subtype: Option<String> = row.get("subtype")?;
    let current_status: String = row.get("current_status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(Relationship {
        header: RecordHeader::restored(
            RelationshipId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        source_id: EntityId::parse(&source_id).ok_or_else(|| bad_column("source_id"))?,
        target_id: EntityId::parse(&target_id).ok_or_else(|| bad_column("target_id"))?,
        direction: RelationDirection::parse(&direction).ok_or_else(|| bad_column("direction"))?,
        relationship_type: RelationshipType::parse(&relationship_type)
            .ok_or_else(|| bad_column("relationship_type"))?,
        subtype,
        current_status: RelationshipStatus::parse(&current_status)
            .ok_or_else(|| bad_column("current_status"))?,
    })
}

fn parse_relationship_state_row(row: &Row<'_>) -> rusqlite::Result<RelationshipState> {
    let id: String = row.get("id")?;
    let relationship_id: String = row.get("relationship_id")?;
    let status: String = row.get("status")?;
    let strength: Option<i64> = row.get("strength")?;
    let description: String = row.get("description")?;
    let properties: String = row.get("properties")?;
    let evidence: String = row.get("evidence")?;
    let contexts: String = row.get("contexts")?;
    let provenance: Option<String> = row.get("provenance")?;
    let seq_no: i64 = row.get("seq_no")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let source: String = row.get("source")?;

    Ok(RelationshipState {
        header: RecordHeader::restored(
            RelationshipStateId::parse(&id).ok_or_else(|| bad_column("id"))?,
            parse_timestamp(&created_at, "created_at")?,
            parse_timestamp(&updated_at, "updated_at")?,
            parse_source(&source)?,
        ),
        relationship_id: RelationshipId::parse(&relationship_id)
            .ok_or_else(|| bad_column("relationship_id"))?,
        status: RelationshipStatus::parse(&status).ok_or_else(|| bad_column("status"))?,
        strength: strength.map(|s| s as u8),
        description,
        properties: serde_json::from_str(&properties).map_err(|_| bad_column("properties"))?,
        evidence: parse_id_list(&evidence, "evidence", crate::models::UnitId::parse)?,
        contexts: parse_id_list(&contexts, "contexts", crate::models::ContextId::parse)?,
        provenance: provenance
            .map(|s| {
                crate::models::AgentMetadataId::parse(&s).ok_or_else(|| bad_column("provenance"))
            })
            .transpose()?,
        seq_no: seq_no as u64,
    })
}

fn to_json<T: serde::Serialize>(value: &T, operation: &str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::operation(operation, e))
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n as usize)
    .map_err(|e| Error::operation("count_rows", e))
}

impl KnowledgeStore for SqliteStore {
    #[instrument(skip(self, entity), fields(entity_id = %entity.id()))]
    fn store_entity(&self, entity: &Entity) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        let additional: Vec<&str> = entity.additional_types.iter().map(|t| t.as_str()).collect();
        conn.execute(
            "INSERT INTO entities (
                id, name, entity_type, additional_types, aliases,
                created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                entity_type = excluded.entity_type,
                additional_types = excluded.additional_types,
                aliases = excluded.aliases,
                updated_at = excluded.updated_at",
            params![
                entity.id().to_string(),
                entity.name,
                entity.entity_type.as_str(),
                to_json(&additional, "store_entity")?,
                to_json(&entity.aliases, "store_entity")?,
                entity.header.created_at.to_rfc3339(),
                entity.header.updated_at.to_rfc3339(),
                entity.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("store_entity", e))?;
        Ok(())
    }

    fn get_entity(&self, id: EntityId) -> Result<Option<Entity>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM entities WHERE id = ?1",
            params![id.to_string()],
            parse_entity_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_entity", e))
    }

    fn list_entities(&self) -> Result<Vec<Entity>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM entities ORDER BY name")
            .map_err(|e| Error::operation("list_entities", e))?;
        let rows = stmt
            .query_map([], parse_entity_row)
            .map_err(|e| Error::operation("list_entities", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("list_entities", e))
    }

    fn find_entities_by_name(&self, name: &str) -> Result<Vec<Entity>> {
        // Aliases live in a JSON column, so the name filter happens in Rust;
        // the table is one row per durable narrative identity, which stays
        // small relative to states and units.
        Ok(self
            .list_entities()?
            .into_iter()
            .filter(|e| e.matches_name(name))
            .collect())
    }

    fn remove_entity(&self, id: EntityId) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let removed = conn
            .execute("DELETE FROM entities WHERE id = ?1", params![id.to_string()])
            .map_err(|e| Error::operation("remove_entity", e))?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, state), fields(entity_id = %state.entity_id))]
    fn append_entity_state(&self, mut state: EntityState) -> Result<EntityState> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::operation("append_entity_state", e))?;
        state.seq_no = Self::next_seq_no(&tx)?;

        let evidence: Vec<String> = state.evidence.iter().map(ToString::to_string).collect();
        let contexts: Vec<String> = state.contexts.iter().map(ToString::to_string).collect();
        tx.execute(
            "INSERT INTO entity_states (
                id, entity_id, importance, summary, knowledge, evidence,
                contexts, provenance, seq_no, created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                state.id().to_string(),
                state.entity_id.to_string(),
                i64::from(state.importance.rank()),
                state.summary,
                to_json(&state.knowledge, "append_entity_state")?,
                to_json(&evidence, "append_entity_state")?,
                to_json(&contexts, "append_entity_state")?,
                state.provenance.map(|p| p.to_string()),
                state.seq_no as i64,
                state.header.created_at.to_rfc3339(),
                state.header.updated_at.to_rfc3339(),
                state.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("append_entity_state", e))?;
        tx.commit()
            .map_err(|e| Error::operation("append_entity_state", e))?;

        metrics::counter!("fabula_entity_states_appended_total").increment(1);
        Ok(state)
    }

    fn get_entity_state(&self, id: StateId) -> Result<Option<EntityState>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM entity_states WHERE id = ?1",
            params![id.to_string()],
            parse_entity_state_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_entity_state", e))
    }

    fn entity_states(&self, entity_id: EntityId) -> Result<Vec<EntityState>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM entity_states WHERE entity_id = ?1 ORDER BY seq_no")
            .map_err(|e| Error::operation("entity_states", e))?;
        let rows = stmt
            .query_map(params![entity_id.to_string()], parse_entity_state_row)
            .map_err(|e| Error::operation("entity_states", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("entity_states", e))
    }

    fn latest_entity_state(&self, entity_id: EntityId) -> Result<Option<EntityState>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM entity_states WHERE entity_id = ?1
             ORDER BY seq_no DESC LIMIT 1",
            params![entity_id.to_string()],
            parse_entity_state_row,
        )
        .optional()
        .map_err(|e| Error::operation("latest_entity_state", e))
    }

    fn repoint_entity_states(&self, from: EntityId, to: EntityId) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE entity_states SET entity_id = ?1 WHERE entity_id = ?2",
            params![to.to_string(), from.to_string()],
        )
        .map_err(|e| Error::operation("repoint_entity_states", e))
    }

    #[instrument(skip(self, relationship), fields(relationship_id = %relationship.id()))]
    fn store_relationship(&self, relationship: &Relationship) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "INSERT INTO relationships (
                id, source_id, target_id, direction, relationship_type,
                subtype, current_status, created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                target_id = excluded.target_id,
                direction = excluded.direction,
                relationship_type = excluded.relationship_type,
                subtype = excluded.subtype,
                current_status = excluded.current_status,
                updated_at = excluded.updated_at",
            params![
                relationship.id().to_string(),
                relationship.source_id.to_string(),
                relationship.target_id.to_string(),
                relationship.direction.as_str(),
                relationship.relationship_type.as_str(),
                relationship.subtype,
                relationship.current_status.as_str(),
                relationship.header.created_at.to_rfc3339(),
                relationship.header.updated_at.to_rfc3339(),
                relationship.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("store_relationship", e))?;
        Ok(())
    }

    fn get_relationship(&self, id: RelationshipId) -> Result<Option<Relationship>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM relationships WHERE id = ?1",
            params![id.to_string()],
            parse_relationship_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_relationship", e))
    }

    fn find_relationship(
        &self,
        a: EntityId,
        b: EntityId,
        relationship_type: RelationshipType,
    ) -> Result<Option<Relationship>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM relationships
             WHERE relationship_type = ?1
               AND ((source_id = ?2 AND target_id = ?3)
                 OR (source_id = ?3 AND target_id = ?2))
             LIMIT 1",
            params![relationship_type.as_str(), a.to_string(), b.to_string()],
            parse_relationship_row,
        )
        .optional()
        .map_err(|e| Error::operation("find_relationship", e))
    }

    fn relationships_for_entity(&self, entity_id: EntityId) -> Result<Vec<Relationship>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare("SELECT * FROM relationships WHERE source_id = ?1 OR target_id = ?1")
            .map_err(|e| Error::operation("relationships_for_entity", e))?;
        let rows = stmt
            .query_map(params![entity_id.to_string()], parse_relationship_row)
            .map_err(|e| Error::operation("relationships_for_entity", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("relationships_for_entity", e))
    }

    fn remove_relationship(&self, id: RelationshipId) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        let removed = conn
            .execute(
                "DELETE FROM relationships WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(|e| Error::operation("remove_relationship", e))?;
        Ok(removed > 0)
    }

    #[instrument(skip(self, state), fields(relationship_id = %state.relationship_id))]
    fn append_relationship_state(&self, mut state: RelationshipState) -> Result<RelationshipState> {
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| Error::operation("append_relationship_state", e))?;
        state.seq_no = Self::next_seq_no(&tx)?;

        let evidence: Vec<String> = state.evidence.iter().map(ToString::to_string).collect();
        let contexts: Vec<String> = state.contexts.iter().map(ToString::to_string).collect();
        tx.execute(
            "INSERT INTO relationship_states (
                id, relationship_id, status, strength, description, properties,
                evidence, contexts, provenance, seq_no, created_at, updated_at, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                state.id().to_string(),
                state.relationship_id.to_string(),
                state.status.as_str(),
                state.strength.map(i64::from),
                state.description,
                to_json(&state.properties, "append_relationship_state")?,
                to_json(&evidence, "append_relationship_state")?,
                to_json(&contexts, "append_relationship_state")?,
                state.provenance.map(|p| p.to_string()),
                state.seq_no as i64,
                state.header.created_at.to_rfc3339(),
                state.header.updated_at.to_rfc3339(),
                state.header.source.as_str(),
            ],
        )
        .map_err(|e| Error::operation("append_relationship_state", e))?;
        tx.commit()
            .map_err(|e| Error::operation("append_relationship_state", e))?;

        metrics::counter!("fabula_relationship_states_appended_total").increment(1);
        Ok(state)
    }

    fn get_relationship_state(
        &self,
        id: RelationshipStateId,
    ) -> Result<Option<RelationshipState>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM relationship_states WHERE id = ?1",
            params![id.to_string()],
            parse_relationship_state_row,
        )
        .optional()
        .map_err(|e| Error::operation("get_relationship_state", e))
    }

    fn relationship_states(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Vec<RelationshipState>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT * FROM relationship_states WHERE relationship_id = ?1 ORDER BY seq_no",
            )
            .map_err(|e| Error::operation("relationship_states", e))?;
        let rows = stmt
            .query_map(
                params![relationship_id.to_string()],
                parse_relationship_state_row,
            )
            .map_err(|e| Error::operation("relationship_states", e))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::operation("relationship_states", e))
    }

    fn latest_relationship_state(
        &self,
        relationship_id: RelationshipId,
    ) -> Result<Option<RelationshipState>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT * FROM relationship_states WHERE relationship_id = ?1
             ORDER BY seq_no DESC LIMIT 1",
            params![relationship_id.to_string()],
            parse_relationship_state_row,
        )
        .optional()
        .map_err(|e| Error::operation("latest_relationship_state", e))
    }

    fn repoint_relationship_states(
        &self,
        from: RelationshipId,
        to: RelationshipId,
    ) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "UPDATE relationship_states SET relationship_id = ?1 WHERE relationship_id = ?2",
            params![to.to_string(), from.to_string()],
        )
        .map_err(|e| Error::operation("repoint_relationship_states", e))
    }

    fn knowledge_counts(&self) -> Result<KnowledgeCounts> {
        let conn = acquire_lock(&self.conn);
        Ok(KnowledgeCounts {
            entities: count_rows(&conn, "entities")?,
            entity_states: count_rows(&conn, "entity_states")?,
            relationships: count_rows(&conn, "relationships")?,
            relationship_states: count_rows(&conn, "relationship_states")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreationSource, Knowledge};

    fn state_for(entity_id: EntityId) -> EntityState {
        let mut knowledge = Knowledge::new();
        knowledge.explicit.push("keeps a ledger".to_string());
        EntityState {
            header: RecordHeader::new(StateId::generate(), CreationSource::Human),
            entity_id,
            importance: SignificanceLevel::Supporting,
            summary: "the quartermaster".to_string(),
            knowledge,
            evidence: vec![crate::models::UnitId::generate()],
            contexts: Vec::new(),
            provenance: None,
            seq_no: 0,
        }
    }

    #[test]
    fn test_entity_roundtrip_preserves_fields() {
        let store = SqliteStore::in_memory().unwrap();
        let entity = Entity::new("Mira Kessler", EntityType::Character, CreationSource::Ai)
            .with_alias("the Archivist")
            .with_additional_type(EntityType::Arc);
        store.store_entity(&entity).unwrap();

        let loaded = store.get_entity(entity.id()).unwrap().unwrap();
        assert_eq!(loaded.name, "Mira Kessler");
        assert_eq!(loaded.entity_type, EntityType::Character);
        assert_eq!(loaded.additional_types, vec![EntityType::Arc]);
        assert_eq!(loaded.aliases, vec!["the Archivist"]);
        assert_eq!(loaded.header.source, CreationSource::Ai);
    }

    #[test]
    fn test_state_roundtrip_and_seq_assignment() {
        let store = SqliteStore::in_memory().unwrap();
        let entity = Entity::new("Mira", EntityType::Character, CreationSource::Human);
        store.store_entity(&entity).unwrap();

        let first = store.append_entity_state(state_for(entity.id())).unwrap();
        let second = store.append_entity_state(state_for(entity.id())).unwrap();
        assert!(first.seq_no > 0);
        assert!(second.seq_no > first.seq_no);

        let loaded = store.get_entity_state(first.id()).unwrap().unwrap();
        assert_eq!(loaded.knowledge.explicit, vec!["keeps a ledger"]);
        assert_eq!(loaded.evidence, first.evidence);

        let latest = store.latest_entity_state(entity.id()).unwrap().unwrap();
        assert_eq!(latest.id(), second.id());
    }

    #[test]
    fn test_relationship_pair_lookup_ignores_order() {
        let store = SqliteStore::in_memory().unwrap();
        let a = EntityId::generate();
        let b = EntityId::generate();
        let rel = Relationship::new(
            a,
            b,
            RelationshipType::Alliance,
            RelationDirection::Bidirectional,
            CreationSource::Ai,
        );
        store.store_relationship(&rel).unwrap();

        let reverse = store
            .find_relationship(b, a, RelationshipType::Alliance)
            .unwrap();
        assert_eq!(reverse.map(|r| r.id()), Some(rel.id()));
        assert!(store
            .find_relationship(a, b, RelationshipType::Rivalry)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_repoint_moves_states_between_entities() {
        let store = SqliteStore::in_memory().unwrap();
        let from = EntityId::generate();
        let to = EntityId::generate();
        store.append_entity_state(state_for(from)).unwrap();
        store.append_entity_state(state_for(from)).unwrap();

        assert_eq!(store.repoint_entity_states(from, to).unwrap(), 2);
        assert!(store.entity_states(from).unwrap().is_empty());
        assert_eq!(store.entity_states(to).unwrap().len(), 2);
    }
}
