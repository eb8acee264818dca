//! Collaborator payloads crossing the extraction boundary.
//!
//! Everything in this module deserializes output produced *outside* the
//! engine, so none of it is trusted: enum-valued fields arrive as raw
//! strings and are parsed record-by-record during ingest. A record whose
//! strings fail to parse is skipped and reported, never defaulted.

use crate::models::knowledge::{EntityType, Knowledge, SignificanceLevel};
use crate::models::relationship::{RelationDirection, RelationshipStatus, RelationshipType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An entity sighted by the find-entities pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoundEntity {
    /// The name the pass believes is unique within the chapter.
    pub identifier: String,
    /// Other names the entity answered to.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Raw entity type string; parse with [`FoundEntity::parsed_type`].
    pub entity_type: String,
    /// What the entity is.
    #[serde(default)]
    pub description: String,
    /// Why the entity matters to the chapter.
    #[serde(default)]
    pub narrative_significance: String,
    /// Raw significance string; parse with [`FoundEntity::parsed_significance`].
    pub significance_level: String,
    /// Identifiers of related entities sighted in the same chapter.
    #[serde(default)]
    pub related_entities: Vec<String>,
}

impl FoundEntity {
    /// Parses the raw entity type, if it names a known variant.
    #[must_use]
    pub fn parsed_type(&self) -> Option<EntityType> {
        EntityType::parse(&self.entity_type)
    }

    /// Parses the raw significance level, if it names a known variant.
    #[must_use]
    pub fn parsed_significance(&self) -> Option<SignificanceLevel> {
        SignificanceLevel::parse(&self.significance_level)
    }

    /// Whether the sighting clears the given significance floor.
    ///
    /// Unparseable significance strings never clear the floor; the ingest
    /// report is where they get surfaced.
    #[must_use]
    pub fn at_least(&self, floor: SignificanceLevel) -> bool {
        self.parsed_significance().is_some_and(|level| level >= floor)
    }
}

/// Per-category fact lists carried by an upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactDelta {
    /// Directly stated in the text.
    #[serde(default)]
    pub explicit: Vec<String>,
    /// Inferred from the text.
    #[serde(default)]
    pub implicit: Vec<String>,
    /// Temporary or contextual information.
    #[serde(default)]
    pub situational: Vec<String>,
    /// Core, persistent information.
    #[serde(default)]
    pub foundational: Vec<String>,
}

impl FactDelta {
    /// True when every category is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty()
            && self.implicit.is_empty()
            && self.situational.is_empty()
            && self.foundational.is_empty()
    }

    /// Converts the delta into engine-side fact lists.
    #[must_use]
    pub fn into_knowledge(self) -> Knowledge {
        Knowledge {
            explicit: self.explicit,
            implicit: self.implicit,
            situational: self.situational,
            foundational: self.foundational,
        }
    }
}

/// A full entity write proposed by the upsert pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityUpsert {
    /// Current identifier for the entity.
    pub identifier: String,
    /// Previous identifier, when the pass renamed the entity.
    #[serde(default)]
    pub old_identifier: Option<String>,
    /// All names the entity answers to.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Raw entity type string.
    pub entity_type: String,
    /// Raw significance string.
    pub significance_level: String,
    /// Detailed description of the entity.
    #[serde(default)]
    pub detailed_description: String,
    /// Why the entity matters to the story.
    #[serde(default)]
    pub narrative_significance: String,
    /// New facts, split by category.
    #[serde(default)]
    pub facts: FactDelta,
    /// Chronology entries for the entity.
    #[serde(default)]
    pub history: Vec<String>,
    /// Identifiers of related entities.
    #[serde(default)]
    pub related_entities: Vec<String>,
}

impl EntityUpsert {
    /// Parses the raw entity type, if it names a known variant.
    #[must_use]
    pub fn parsed_type(&self) -> Option<EntityType> {
        EntityType::parse(&self.entity_type)
    }

    /// Parses the raw significance level, if it names a known variant.
    #[must_use]
    pub fn parsed_significance(&self) -> Option<SignificanceLevel> {
        SignificanceLevel::parse(&self.significance_level)
    }
}

/// A relationship write proposed by the upsert pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipUpsert {
    /// Identifier of the source entity.
    pub source_entity: String,
    /// Identifier of the target entity.
    pub target_entity: String,
    /// Raw relationship type string.
    pub relationship_type: String,
    /// Raw direction string.
    #[serde(default)]
    pub relationship_direction: Option<String>,
    /// Description of the relationship's current state.
    #[serde(default)]
    pub description: String,
    /// Raw status string, when the pass asserted one.
    #[serde(default)]
    pub status: Option<String>,
    /// Claimed strength, clamped to 1..=5 at ingest.
    #[serde(default)]
    pub strength: Option<u8>,
    /// Free-form attributes.
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

impl RelationshipUpsert {
    /// Parses the raw relationship type, if it names a known variant.
    #[must_use]
    pub fn parsed_type(&self) -> Option<RelationshipType> {
        RelationshipType::parse(&self.relationship_type)
    }

    /// Parses the direction, defaulting to bidirectional when absent.
    ///
    /// Returns `None` only when a direction string was given and is garbage.
    #[must_use]
    pub fn parsed_direction(&self) -> Option<RelationDirection> {
        match &self.relationship_direction {
            None => Some(RelationDirection::Bidirectional),
            Some(raw) => RelationDirection::parse(raw),
        }
    }

    /// Parses the status, defaulting to unknown when absent.
    ///
    /// Returns `None` only when a status string was given and is garbage.
    #[must_use]
    pub fn parsed_status(&self) -> Option<RelationshipStatus> {
        match &self.status {
            None => Some(RelationshipStatus::Unknown),
            Some(raw) => RelationshipStatus::parse(raw),
        }
    }

    /// True when the upsert relates an entity to itself.
    #[must_use]
    pub fn is_self_referential(&self) -> bool {
        self.source_entity.trim().eq_ignore_ascii_case(self.target_entity.trim())
    }
}

/// One chapter's worth of extraction output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChapterExtraction {
    /// Entity writes, in the order the pass emitted them.
    #[serde(default)]
    pub entities: Vec<EntityUpsert>,
    /// Relationship writes, in the order the pass emitted them.
    #[serde(default)]
    pub relationships: Vec<RelationshipUpsert>,
}

impl ChapterExtraction {
    /// Total record count across both lists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len() + self.relationships.len()
    }

    /// True when the extraction carries no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Indexed view over one chapter's found entities.
///
/// Resolves intra-chapter related-entity references and yields the
/// significance-filtered batches the upsert pass is fed, so no single
/// batch outgrows the collaborator's output window.
#[derive(Debug)]
pub struct KeyEntitySet {
    entities: Vec<FoundEntity>,
    related: HashMap<String, Vec<usize>>,
}

impl KeyEntitySet {
    /// Default significance floor for upsert batching.
    pub const DEFAULT_FLOOR: SignificanceLevel = SignificanceLevel::Supporting;
    /// Default batch size for upsert batching.
    pub const DEFAULT_BATCH: usize = 5;

    /// Indexes a chapter's found entities.
    ///
    /// Related-entity references that name nothing in the same chapter are
    /// dropped here; they cannot be resolved without a registry pass.
    #[must_use]
    pub fn new(entities: Vec<FoundEntity>) -> Self {
        let by_identifier: HashMap<&str, usize> = entities
            .iter()
            .enumerate()
            .map(|(idx, entity)| (entity.identifier.as_str(), idx))
            .collect();

        let mut related: HashMap<String, Vec<usize>> = HashMap::new();
        for entity in &entities {
            for reference in &entity.related_entities {
                if let Some(&idx) = by_identifier.get(reference.as_str()) {
                    related
                        .entry(entity.identifier.clone())
                        .or_default()
                        .push(idx);
                }
            }
        }

        Self { entities, related }
    }

    /// All sighted entities, unfiltered.
    #[must_use]
    pub fn entities(&self) -> &[FoundEntity] {
        &self.entities
    }

    /// Identifiers clearing the floor, either directly or as a resolvable
    /// related entity of something that does.
    #[must_use]
    pub fn identifiers(&self, floor: SignificanceLevel) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for entity in &self.entities {
            if entity.at_least(floor) && !seen.contains(&entity.identifier) {
                seen.push(entity.identifier.clone());
            }
        }
        for indexes in self.related.values() {
            for &idx in indexes {
                let entity = &self.entities[idx];
                if entity.at_least(floor) && !seen.contains(&entity.identifier) {
                    seen.push(entity.identifier.clone());
                }
            }
        }
        seen
    }

    /// Related entities of `identifier` that clear the floor.
    #[must_use]
    pub fn significant_related(&self, identifier: &str, floor: SignificanceLevel) -> Vec<&str> {
        self.related
            .get(identifier)
            .map(|indexes| {
                indexes
                    .iter()
                    .map(|&idx| &self.entities[idx])
                    .filter(|entity| entity.at_least(floor))
                    .map(|entity| entity.identifier.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Batches of floor-clearing entities, `batch_size` at a time.
    ///
    /// Order follows the find pass; the final batch may run short.
    #[must_use]
    pub fn upsert_batches(
        &self,
        floor: SignificanceLevel,
        batch_size: usize,
    ) -> Vec<Vec<&FoundEntity>> {
        let mut batches = Vec::new();
        let mut current: Vec<&FoundEntity> = Vec::new();
        for entity in &self.entities {
            if entity.at_least(floor) {
                current.push(entity);
            }
            if current.len() == batch_size {
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(identifier: &str, level: &str, related: &[&str]) -> FoundEntity {
        FoundEntity {
            identifier: identifier.to_string(),
            aliases: Vec::new(),
            entity_type: "character".to_string(),
            description: String::new(),
            narrative_significance: String::new(),
            significance_level: level.to_string(),
            related_entities: related.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_extraction_deserializes_with_missing_optionals() {
        let raw = r#"{
            "entities": [{
                "identifier": "Mira Kessler",
                "entity_type": "character",
                "significance_level": "major",
                "facts": { "explicit": ["Runs the orbital relay"] }
            }],
            "relationships": [{
                "source_entity": "Mira Kessler",
                "target_entity": "The Relay Guild",
                "relationship_type": "membership"
            }]
        }"#;
        let extraction: ChapterExtraction =
            serde_json::from_str(raw).expect("payload should deserialize");
        assert_eq!(extraction.len(), 2);
        assert_eq!(extraction.entities[0].facts.explicit.len(), 1);
        assert!(extraction.entities[0].facts.situational.is_empty());
        assert_eq!(
            extraction.relationships[0].parsed_direction(),
            Some(RelationDirection::Bidirectional)
        );
    }

    #[test]
    fn test_unknown_enum_strings_parse_to_none() {
        let entity = found("Mira", "mega-important", &[]);
        assert_eq!(entity.parsed_significance(), None);
        assert!(!entity.at_least(SignificanceLevel::Peripheral));

        let rel = RelationshipUpsert {
            source_entity: "a".into(),
            target_entity: "b".into(),
            relationship_type: "nemesis-of".into(),
            relationship_direction: Some("sideways".into()),
            description: String::new(),
            status: Some("complicated".into()),
            strength: None,
            properties: HashMap::new(),
        };
        assert_eq!(rel.parsed_type(), None);
        assert_eq!(rel.parsed_direction(), None);
        assert_eq!(rel.parsed_status(), None);
    }

    #[test]
    fn test_self_reference_detection_ignores_case_and_whitespace() {
        let rel = RelationshipUpsert {
            source_entity: "Mira Kessler".into(),
            target_entity: "  mira kessler ".into(),
            relationship_type: "rivalry".into(),
            relationship_direction: None,
            description: String::new(),
            status: None,
            strength: None,
            properties: HashMap::new(),
        };
        assert!(rel.is_self_referential());
    }

    #[test]
    fn test_upsert_batches_filter_and_chunk() {
        let set = KeyEntitySet::new(vec![
            found("a", "central", &[]),
            found("b", "peripheral", &[]),
            found("c", "major", &[]),
            found("d", "supporting", &[]),
            found("e", "minor", &[]),
            found("f", "central", &[]),
        ]);
        let batches = set.upsert_batches(SignificanceLevel::Supporting, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[0][0].identifier, "a");
        assert_eq!(batches[0][1].identifier, "c");
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[1][1].identifier, "f");
    }

    #[test]
    fn test_related_resolution_stays_within_chapter() {
        let set = KeyEntitySet::new(vec![
            found("a", "central", &["b", "offstage"]),
            found("b", "major", &[]),
        ]);
        assert_eq!(
            set.significant_related("a", SignificanceLevel::Supporting),
            vec!["b"]
        );
        assert!(set.significant_related("b", SignificanceLevel::Peripheral).is_empty());
    }
}
