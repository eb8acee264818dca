//! Entity and entity-state types for the knowledge graph.
//!
//! Entities are the durable nodes of the graph: characters, places, items,
//! abstractions. What is *known* about an entity at a point in the story
//! lives in append-only [`EntityState`] records, never on the entity itself.
//!
//! # Entity Types
//!
//! | Type | Examples |
//! |------|----------|
//! | `Character` | protagonists, narrators, mobs |
//! | `Location` | cities, ships, dream realms |
//! | `Item` | artifacts, letters, weapons |
//! | `Event` | battles, weddings, cataclysms |
//! | `Organization` / `Group` | guilds, houses, crews |
//! | `Concept` / `Culture` / `TimePeriod` | magic systems, nations' customs, eras |
//! | `Arc` / `Theme` / `Symbolism` / `Allusion` | narrative constructs |
//!
//! # Knowledge Categories
//!
//! Facts accumulate in four buckets that differ by how the story supports
//! them: stated outright (`explicit`), inferred (`implicit`), true only in a
//! moment (`situational`), or load-bearing background (`foundational`).

use crate::models::header::{CreationSource, RecordHeader};
use crate::models::ids::{AgentMetadataId, ContextId, EntityId, StateId, UnitId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of entity in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Era, age, or other span of story time.
    TimePeriod,
    /// Something that happens: battles, festivals, disasters.
    Event,
    /// Formal institution with structure and continuity.
    Organization,
    /// Informal collection of characters acting together.
    Group,
    /// A person or person-like actor.
    Character,
    /// A place at any scale.
    Location,
    /// A physical object of narrative significance.
    Item,
    /// An abstract idea: a magic system, a law, a prophecy.
    Concept,
    /// Customs, beliefs, and practices of a people.
    Culture,
    /// A narrative arc spanning multiple chapters.
    Arc,
    /// A recurring thematic concern.
    Theme,
    /// A recurring symbol or motif.
    Symbolism,
    /// A reference to another work.
    Allusion,
    /// Anything that fits no other bucket.
    Other,
}

impl EntityType {
    /// Returns all entity type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::TimePeriod,
            Self::Event,
            Self::Organization,
            Self::Group,
            Self::Character,
            Self::Location,
            Self::Item,
            Self::Concept,
            Self::Culture,
            Self::Arc,
            Self::Theme,
            Self::Symbolism,
            Self::Allusion,
            Self::Other,
        ]
    }

    /// Returns the entity type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TimePeriod => "time_period",
            Self::Event => "event",
            Self::Organization => "organization",
            Self::Group => "group",
            Self::Character => "character",
            Self::Location => "location",
            Self::Item => "item",
            Self::Concept => "concept",
            Self::Culture => "culture",
            Self::Arc => "arc",
            Self::Theme => "theme",
            Self::Symbolism => "symbolism",
            Self::Allusion => "allusion",
            Self::Other => "other",
        }
    }

    /// Parses an entity type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "time_period" | "timeperiod" | "era" | "age" => Some(Self::TimePeriod),
            "event" | "happening" => Some(Self::Event),
            "organization" | "org" | "institution" | "faction" => Some(Self::Organization),
            "group" | "party" | "crew" => Some(Self::Group),
            "character" | "person" | "people" => Some(Self::Character),
            "location" | "place" | "setting" => Some(Self::Location),
            "item" | "object" | "artifact" => Some(Self::Item),
            "concept" | "idea" => Some(Self::Concept),
            "culture" => Some(Self::Culture),
            "arc" | "storyline" => Some(Self::Arc),
            "theme" => Some(Self::Theme),
            "symbolism" | "symbol" | "motif" => Some(Self::Symbolism),
            "allusion" | "reference" => Some(Self::Allusion),
            "other" | "misc" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

/// Narrative weight of an entity at a point in the story.
///
/// Variants are declared in ascending order so the derived `Ord` agrees
/// with [`rank`](Self::rank): `Peripheral < ... < Central`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignificanceLevel {
    /// Mentioned in passing, unlikely to recur.
    Peripheral,
    /// Set dressing with a name.
    Background,
    /// Matters locally, not to the whole story.
    Minor,
    /// Recurring support for the main threads.
    Supporting,
    /// Drives subplots or whole arcs.
    Major,
    /// The story bends around it.
    Central,
}

impl SignificanceLevel {
    /// Returns all significance variants, least to greatest.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Peripheral,
            Self::Background,
            Self::Minor,
            Self::Supporting,
            Self::Major,
            Self::Central,
        ]
    }

    /// Returns the significance level as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Peripheral => "peripheral",
            Self::Background => "background",
            Self::Minor => "minor",
            Self::Supporting => "supporting",
            Self::Major => "major",
            Self::Central => "central",
        }
    }

    /// Numeric rank, 0 (peripheral) through 5 (central).
    #[must_use]
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Peripheral => 0,
            Self::Background => 1,
            Self::Minor => 2,
            Self::Supporting => 3,
            Self::Major => 4,
            Self::Central => 5,
        }
    }

    /// Builds a significance level from its numeric rank.
    #[must_use]
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            0 => Some(Self::Peripheral),
            1 => Some(Self::Background),
            2 => Some(Self::Minor),
            3 => Some(Self::Supporting),
            4 => Some(Self::Major),
            5 => Some(Self::Central),
            _ => None,
        }
    }

    /// Parses a significance level from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "peripheral" => Some(Self::Peripheral),
            "background" => Some(Self::Background),
            "minor" => Some(Self::Minor),
            "supporting" => Some(Self::Supporting),
            "major" => Some(Self::Major),
            "central" => Some(Self::Central),
            _ => None,
        }
    }
}

impl fmt::Display for SignificanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SignificanceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown significance level: {s}"))
    }
}

/// The four evidence classes a fact can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeCategory {
    /// Stated outright in the text.
    Explicit,
    /// Inferred from the text.
    Implicit,
    /// True only in a particular moment or scene.
    Situational,
    /// Background truth the narrative relies on.
    Foundational,
}

impl KnowledgeCategory {
    /// Returns all knowledge categories.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Explicit,
            Self::Implicit,
            Self::Situational,
            Self::Foundational,
        ]
    }

    /// Returns the category as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
            Self::Situational => "situational",
            Self::Foundational => "foundational",
        }
    }

    /// Parses a category from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "explicit" => Some(Self::Explicit),
            "implicit" => Some(Self::Implicit),
            "situational" => Some(Self::Situational),
            "foundational" => Some(Self::Foundational),
            _ => None,
        }
    }
}

impl fmt::Display for KnowledgeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Categorized fact lists carried by an entity state.
///
/// Fact order within a category is first-seen order and is preserved across
/// merges; duplicates are exact-string matches only. Two facts that disagree
/// are both kept, because which one is "true" can itself be a story beat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Knowledge {
    /// Facts stated outright.
    #[serde(default)]
    pub explicit: Vec<String>,
    /// Facts inferred from the text.
    #[serde(default)]
    pub implicit: Vec<String>,
    /// Facts true only in the moment.
    #[serde(default)]
    pub situational: Vec<String>,
    /// Background truths the narrative relies on.
    #[serde(default)]
    pub foundational: Vec<String>,
}

impl Knowledge {
    /// Creates an empty knowledge set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            explicit: Vec::new(),
            implicit: Vec::new(),
            situational: Vec::new(),
            foundational: Vec::new(),
        }
    }

    /// Returns the facts in one category.
    #[must_use]
    pub fn facts(&self, category: KnowledgeCategory) -> &[String] {
        match category {
            KnowledgeCategory::Explicit => &self.explicit,
            KnowledgeCategory::Implicit => &self.implicit,
            KnowledgeCategory::Situational => &self.situational,
            KnowledgeCategory::Foundational => &self.foundational,
        }
    }

    /// Mutable access to one category's facts.
    pub fn facts_mut(&mut self, category: KnowledgeCategory) -> &mut Vec<String> {
        match category {
            KnowledgeCategory::Explicit => &mut self.explicit,
            KnowledgeCategory::Implicit => &mut self.implicit,
            KnowledgeCategory::Situational => &mut self.situational,
            KnowledgeCategory::Foundational => &mut self.foundational,
        }
    }

    /// Total fact count across categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.explicit.len() + self.implicit.len() + self.situational.len() + self.foundational.len()
    }

    /// Returns true when no category holds any fact.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unions `newer` into `self` per category.
    ///
    /// Existing facts keep their positions; incoming facts that are not
    /// exact-string duplicates are appended in their own order.
    pub fn merge_union(&mut self, newer: &Self) {
        for category in KnowledgeCategory::all() {
            let existing = self.facts_mut(*category);
            for fact in newer.facts(*category) {
                if !existing.iter().any(|f| f == fact) {
                    existing.push(fact.clone());
                }
            }
        }
    }
}

/// A durable node in the knowledge graph.
///
/// The entity row holds only identity: name, type, aliases. Everything the
/// story has revealed about it lives in [`EntityState`] history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identity and audit stamps.
    pub header: RecordHeader<EntityId>,
    /// Canonical display name.
    pub name: String,
    /// Primary classification.
    pub entity_type: EntityType,
    /// Further classifications beyond the primary.
    pub additional_types: Vec<EntityType>,
    /// Alternative names the text uses for this entity.
    pub aliases: Vec<String>,
}

impl Entity {
    /// Creates a new entity with a generated id.
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type: EntityType, source: CreationSource) -> Self {
        Self {
            header: RecordHeader::new(EntityId::generate(), source),
            name: name.into(),
            entity_type,
            additional_types: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// Adds an alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Adds multiple aliases.
    #[must_use]
    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Adds a secondary classification.
    #[must_use]
    pub fn with_additional_type(mut self, entity_type: EntityType) -> Self {
        self.additional_types.push(entity_type);
        self
    }

    /// Returns the entity id.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.header.id
    }

    /// Returns true if this entity answers to `name` (canonical or alias).
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        let name_lower = name.to_lowercase();
        self.name.to_lowercase() == name_lower
            || self.aliases.iter().any(|a| a.to_lowercase() == name_lower)
    }
}

/// One immutable observation of an entity, anchored to its evidence.
///
/// States are append-only: corrections and contradictions arrive as new
/// states, never edits. `seq_no` is assigned by the store in insertion
/// order and is the authoritative tie-break when two states share a
/// creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Identity and audit stamps.
    pub header: RecordHeader<StateId>,
    /// Entity this state describes.
    pub entity_id: EntityId,
    /// Narrative weight as of this state.
    pub importance: SignificanceLevel,
    /// Prose summary of the entity as of this state.
    pub summary: String,
    /// Accumulated categorized facts.
    pub knowledge: Knowledge,
    /// Content units that support this state.
    pub evidence: Vec<UnitId>,
    /// Contexts in force when this state was written.
    pub contexts: Vec<ContextId>,
    /// Agent invocation that produced this state, when AI-sourced.
    pub provenance: Option<AgentMetadataId>,
    /// Store-assigned insertion counter; later states get larger values.
    pub seq_no: u64,
}

impl EntityState {
    /// Returns the state id.
    #[must_use]
    pub const fn id(&self) -> StateId {
        self.header.id
    }

    /// Returns true when every evidence unit appears in `visible`.
    ///
    /// A state with no evidence has no timeline position and is never
    /// considered visible.
    #[must_use]
    pub fn evidence_within(&self, visible: &std::collections::HashSet<UnitId>) -> bool {
        !self.evidence.is_empty() && self.evidence.iter().all(|u| visible.contains(u))
    }
}

/// Input for appending a state to an entity's history.
///
/// Fields left unset carry forward from the entity's latest state: a draft
/// that only adds facts does not need to restate the summary.
#[derive(Debug, Clone, Default)]
pub struct StateDraft {
    /// How this observation was produced.
    pub source: Option<CreationSource>,
    /// New narrative weight, if it changed.
    pub importance: Option<SignificanceLevel>,
    /// Replacement summary, if it changed.
    pub summary: Option<String>,
    /// Facts to union into the accumulated knowledge.
    pub facts: Knowledge,
    /// Content units supporting this observation.
    pub evidence: Vec<UnitId>,
    /// Contexts in force for this observation.
    pub contexts: Vec<ContextId>,
    /// Agent invocation record, required when `source` is AI.
    pub provenance: Option<AgentMetadataId>,
}

impl StateDraft {
    /// Creates an empty draft with the given source.
    #[must_use]
    pub fn new(source: CreationSource) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// Sets the significance level.
    #[must_use]
    pub const fn with_importance(mut self, importance: SignificanceLevel) -> Self {
        self.importance = Some(importance);
        self
    }

    /// Sets the replacement summary.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the fact delta.
    #[must_use]
    pub fn with_facts(mut self, facts: Knowledge) -> Self {
        self.facts = facts;
        self
    }

    /// Adds an evidence unit.
    #[must_use]
    pub fn with_evidence(mut self, unit: UnitId) -> Self {
        self.evidence.push(unit);
        self
    }

    /// Adds a context reference.
    #[must_use]
    pub fn with_context(mut self, context: ContextId) -> Self {
        self.contexts.push(context);
        self
    }

    /// Attaches agent provenance.
    #[must_use]
    pub const fn with_provenance(mut self, provenance: AgentMetadataId) -> Self {
        self.provenance = Some(provenance);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_parse() {
        assert_eq!(EntityType::parse("character"), Some(EntityType::Character));
        assert_eq!(EntityType::parse("PERSON"), Some(EntityType::Character));
        assert_eq!(EntityType::parse("time-period"), Some(EntityType::TimePeriod));
        assert_eq!(EntityType::parse("artifact"), Some(EntityType::Item));
        assert_eq!(EntityType::parse("unknown"), None);
    }

    #[test]
    fn test_entity_type_roundtrip() {
        for et in EntityType::all() {
            assert_eq!(EntityType::parse(et.as_str()), Some(*et));
        }
    }

    #[test]
    fn test_significance_ordering() {
        assert!(SignificanceLevel::Central > SignificanceLevel::Major);
        assert!(SignificanceLevel::Peripheral < SignificanceLevel::Background);
        for level in SignificanceLevel::all() {
            assert_eq!(SignificanceLevel::from_rank(level.rank()), Some(*level));
        }
        assert_eq!(SignificanceLevel::from_rank(9), None);
    }

    #[test]
    fn test_entity_matches_name() {
        let entity = Entity::new("Eleanor Voss", EntityType::Character, CreationSource::Human)
            .with_alias("the Archivist")
            .with_alias("Nell");

        assert!(entity.matches_name("eleanor voss"));
        assert!(entity.matches_name("NELL"));
        assert!(entity.matches_name("the archivist"));
        assert!(!entity.matches_name("the archive"));
    }

    #[test]
    fn test_knowledge_merge_union_dedups_exact_only() {
        let mut base = Knowledge::new();
        base.explicit.push("has a limp".to_string());
        base.implicit.push("distrusts the court".to_string());

        let mut delta = Knowledge::new();
        delta.explicit.push("has a limp".to_string());
        delta.explicit.push("has a slight limp".to_string());
        delta.foundational.push("born before the schism".to_string());

        base.merge_union(&delta);

        assert_eq!(base.explicit, vec!["has a limp", "has a slight limp"]);
        assert_eq!(base.implicit, vec!["distrusts the court"]);
        assert_eq!(base.foundational, vec!["born before the schism"]);
        assert_eq!(base.len(), 4);
    }

    #[test]
    fn test_knowledge_merge_preserves_first_seen_order() {
        let mut base = Knowledge::new();
        base.explicit.push("a".to_string());
        base.explicit.push("b".to_string());

        let mut delta = Knowledge::new();
        delta.explicit.push("c".to_string());
        delta.explicit.push("a".to_string());

        base.merge_union(&delta);
        assert_eq!(base.explicit, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_state_evidence_within() {
        let mut visible = std::collections::HashSet::new();
        let unit_a = UnitId::generate();
        let unit_b = UnitId::generate();
        visible.insert(unit_a);

        let mut state = EntityState {
            header: RecordHeader::new(StateId::generate(), CreationSource::Human),
            entity_id: EntityId::generate(),
            importance: SignificanceLevel::Minor,
            summary: String::new(),
            knowledge: Knowledge::new(),
            evidence: vec![unit_a],
            contexts: Vec::new(),
            provenance: None,
            seq_no: 1,
        };
        assert!(state.evidence_within(&visible));

        state.evidence.push(unit_b);
        assert!(!state.evidence_within(&visible));

        state.evidence.clear();
        assert!(!state.evidence_within(&visible), "empty evidence is never visible");
    }
}
