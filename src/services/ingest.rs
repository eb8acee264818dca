//! Chapter ingest: turning extraction output into graph writes.
//!
//! Ingest is a batch boundary. Paragraph bodies become content units
//! (deduplicated by hash so re-running a chapter is idempotent), entity
//! records flow through the registry, and every state append happens under
//! that entity's advisory lock. Extraction output is untrusted: records
//! that fail validation are skipped and reported in the [`IngestReport`],
//! never defaulted and never fatal to the rest of the batch.

use crate::models::{
    AgentMetadata, AgentMetadataId, ChapterExtraction, ContentUnit, CreationSource, Entity,
    EntityUpsert, RelationshipDraft, StateDraft, StructureId, UnitId,
    hash_content,
};
use crate::services::locks::EntityLockRegistry;
use crate::services::reconciliation::RelationshipEngine;
use crate::services::registry::EntityRegistry;
use crate::services::versioning::StateVersioningEngine;
use crate::storage::Store;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One record the batch refused, with the reason a human can act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    /// Identifier the record carried (entity name or endpoint pair).
    pub identifier: String,
    /// Why it was skipped.
    pub reason: String,
}

/// Outcome of one chapter ingest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Units newly stored for the chapter.
    pub units_created: usize,
    /// Paragraph bodies already present, matched by content hash.
    pub units_deduped: usize,
    /// Entities the registry had to create.
    pub entities_created: usize,
    /// Entity state versions appended.
    pub states_appended: usize,
    /// Relationship records created or updated.
    pub relationships_upserted: usize,
    /// Records refused, with reasons.
    pub skipped: Vec<SkippedRecord>,
}

impl IngestReport {
    /// True when nothing was refused.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    fn skip(&mut self, identifier: impl Into<String>, reason: impl Into<String>) {
        let identifier = identifier.into();
        let reason = reason.into();
        warn!(%identifier, %reason, "skipping extraction record");
        metrics::counter!("fabula_ingest_skipped_total").increment(1);
        self.skipped.push(SkippedRecord { identifier, reason });
    }
}

/// Service running the chapter ingest pipeline.
pub struct ChapterIngestService<S: Store> {
    store: Arc<S>,
    registry: EntityRegistry<S>,
    versioning: StateVersioningEngine<S>,
    relationships: RelationshipEngine<S>,
    locks: EntityLockRegistry,
}

impl<S: Store> ChapterIngestService<S> {
    /// Creates a service over a shared store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            registry: EntityRegistry::new(Arc::clone(&store)),
            versioning: StateVersioningEngine::new(Arc::clone(&store)),
            relationships: RelationshipEngine::new(Arc::clone(&store)),
            locks: EntityLockRegistry::new(),
            store,
        }
    }

    /// The registry this service resolves through.
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry<S> {
        &self.registry
    }

    /// Ingests one chapter: paragraphs, then entities, then relationships.
    ///
    /// When `agent` is given the batch is treated as AI-sourced; the agent
    /// record is stored first and every appended state carries its id.
    /// The chapter node is marked published only after the whole batch has
    /// run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for a missing chapter, or any store
    /// error. Per-record validation failures are reported in the returned
    /// [`IngestReport`], not as errors.
    #[instrument(skip(self, paragraphs, extraction, agent), fields(chapter = %chapter_id))]
    pub fn ingest_chapter(
        &self,
        chapter_id: StructureId,
        paragraphs: &[String],
        extraction: &ChapterExtraction,
        agent: Option<&AgentMetadata>,
    ) -> Result<IngestReport> {
        let mut chapter = self
            .store
            .get_structure(chapter_id)?
            .ok_or_else(|| Error::not_found("structure", chapter_id))?;

        let provenance = match agent {
            Some(metadata) => {
                self.store.store_agent_metadata(metadata)?;
                Some(metadata.id())
            },
            None => None,
        };
        let source = if provenance.is_some() {
            CreationSource::Ai
        } else {
            CreationSource::Human
        };

        let mut report = IngestReport::default();
        let evidence = self.ingest_units(chapter_id, paragraphs, &mut report)?;
        self.ingest_entities(extraction, source, provenance, &evidence, &mut report)?;
        self.ingest_relationships(extraction, source, provenance, &evidence, &mut report)?;

        chapter.is_published = true;
        chapter.header.touch();
        self.store.update_structure(&chapter)?;

        metrics::counter!("fabula_chapters_ingested_total").increment(1);
        info!(
            units_created = report.units_created,
            units_deduped = report.units_deduped,
            states_appended = report.states_appended,
            relationships = report.relationships_upserted,
            skipped = report.skipped.len(),
            "chapter ingested"
        );
        Ok(report)
    }

    /// Stores paragraph bodies as units, skipping hashes already present.
    fn ingest_units(
        &self,
        chapter_id: StructureId,
        paragraphs: &[String],
        report: &mut IngestReport,
    ) -> Result<Vec<UnitId>> {
        let mut evidence = Vec::new();
        for paragraph in paragraphs {
            let body = paragraph.trim();
            if body.is_empty() {
                continue;
            }
            let hash = hash_content(body);
            if let Some(existing) = self.store.find_unit_by_hash(chapter_id, &hash)? {
                report.units_deduped += 1;
                evidence.push(existing.id());
                continue;
            }
            let unit = self.store.insert_unit(ContentUnit::new(
                chapter_id,
                u32::MAX,
                body,
                CreationSource::Human,
            ))?;
            report.units_created += 1;
            evidence.push(unit.id());
        }
        Ok(evidence)
    }

    fn ingest_entities(
        &self,
        extraction: &ChapterExtraction,
        source: CreationSource,
        provenance: Option<AgentMetadataId>,
        evidence: &[UnitId],
        report: &mut IngestReport,
    ) -> Result<()> {
        for upsert in &extraction.entities {
            let Some(entity_type) = upsert.parsed_type() else {
                report.skip(
                    &upsert.identifier,
                    format!("unknown entity type '{}'", upsert.entity_type),
                );
                continue;
            };
            let Some(significance) = upsert.parsed_significance() else {
                report.skip(
                    &upsert.identifier,
                    format!("unknown significance level '{}'", upsert.significance_level),
                );
                continue;
            };

            let entity = match self.resolve_upsert_target(upsert, entity_type, source, report)? {
                Some(entity) => entity,
                None => continue,
            };

            let mut aliases = upsert.aliases.clone();
            if entity.name != upsert.identifier {
                aliases.push(upsert.identifier.clone());
            }
            if !aliases.is_empty() {
                self.registry.register_aliases(entity.id(), &aliases)?;
            }

            let mut draft = StateDraft::new(source)
                .with_importance(significance)
                .with_facts(upsert.facts.clone().into_knowledge());
            if !upsert.detailed_description.is_empty() {
                draft = draft.with_summary(&upsert.detailed_description);
            }
            draft.evidence = evidence.to_vec();
            draft.provenance = provenance;

            self.locks
                .with_entity(entity.id(), || self.versioning.append_state(entity.id(), draft))?;
            report.states_appended += 1;
        }
        Ok(())
    }

    /// Resolves the entity an upsert targets, creating it if needed.
    ///
    /// A rename resolves the old identifier first so the state lands on the
    /// existing record; the new identifier then joins its aliases.
    fn resolve_upsert_target(
        &self,
        upsert: &EntityUpsert,
        entity_type: crate::models::EntityType,
        source: CreationSource,
        report: &mut IngestReport,
    ) -> Result<Option<Entity>> {
        if let Some(old) = &upsert.old_identifier {
            match self.registry.resolve(old, Some(entity_type)) {
                Ok(Some(entity)) => return Ok(Some(entity)),
                Ok(None) => {},
                Err(Error::ResolutionAmbiguity { name, candidates }) => {
                    report.skip(
                        &upsert.identifier,
                        format!(
                            "previous identifier '{name}' matches {} entities",
                            candidates.len()
                        ),
                    );
                    return Ok(None);
                },
                Err(err) => return Err(err),
            }
        }

        match self.registry.resolve(&upsert.identifier, Some(entity_type)) {
            Ok(Some(entity)) => Ok(Some(entity)),
            Ok(None) => {
                let entity =
                    self.registry
                        .resolve_or_create(&upsert.identifier, entity_type, source)?;
                report.entities_created += 1;
                Ok(Some(entity))
            },
            Err(Error::ResolutionAmbiguity { name, candidates }) => {
                report.skip(
                    &upsert.identifier,
                    format!("'{name}' matches {} entities equally well", candidates.len()),
                );
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }

    fn ingest_relationships(
        &self,
        extraction: &ChapterExtraction,
        source: CreationSource,
        provenance: Option<AgentMetadataId>,
        evidence: &[UnitId],
        report: &mut IngestReport,
    ) -> Result<()> {
        for upsert in &extraction.relationships {
            let pair = format!("{} / {}", upsert.source_entity, upsert.target_entity);
            if upsert.is_self_referential() {
                report.skip(&pair, "relationship relates an entity to itself");
                continue;
            }
            let Some(relationship_type) = upsert.parsed_type() else {
                report.skip(
                    &pair,
                    format!("unknown relationship type '{}'", upsert.relationship_type),
                );
                continue;
            };
            let Some(direction) = upsert.parsed_direction() else {
                report.skip(
                    &pair,
                    format!(
                        "unknown relationship direction '{}'",
                        upsert.relationship_direction.as_deref().unwrap_or_default()
                    ),
                );
                continue;
            };
            let Some(status) = upsert.parsed_status() else {
                report.skip(
                    &pair,
                    format!("unknown relationship status '{}'", upsert.status.as_deref().unwrap_or_default()),
                );
                continue;
            };

            let Some(source_entity) = self.resolve_endpoint(&upsert.source_entity, report)? else {
                continue;
            };
            let Some(target_entity) = self.resolve_endpoint(&upsert.target_entity, report)? else {
                continue;
            };

            let mut draft = RelationshipDraft::new(source)
                .with_direction(direction)
                .with_status(status);
            if let Some(strength) = upsert.strength {
                draft = draft.with_strength(strength);
            }
            if !upsert.description.is_empty() {
                draft = draft.with_description(&upsert.description);
            }
            draft.properties = upsert.properties.clone();
            draft.evidence = evidence.to_vec();
            draft.provenance = provenance;

            self.relationships.upsert_relationship(
                source_entity.id(),
                target_entity.id(),
                relationship_type,
                draft,
            )?;
            report.relationships_upserted += 1;
        }
        Ok(())
    }

    /// Resolves a relationship endpoint by name, without creating.
    ///
    /// Relationships never mint entities; an endpoint the entity pass did
    /// not establish is a skip, not a create.
    fn resolve_endpoint(
        &self,
        name: &str,
        report: &mut IngestReport,
    ) -> Result<Option<Entity>> {
        match self.registry.resolve(name, None) {
            Ok(Some(entity)) => Ok(Some(entity)),
            Ok(None) => {
                report.skip(name, "endpoint does not resolve to a known entity");
                Ok(None)
            },
            Err(Error::ResolutionAmbiguity { name, candidates }) => {
                report.skip(
                    &name,
                    format!("endpoint matches {} entities", candidates.len()),
                );
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }
}
