//! Relationship and relationship-state types.
//!
//! A [`Relationship`] is identified by its unordered entity pair plus its
//! [`RelationshipType`]: Alice–Bob friendship is the same record no matter
//! which side the extractor named first. Direction and status changes are
//! recorded as appended [`RelationshipState`] rows on that one record, with
//! `current_status` cached on the relationship for cheap queries.

use crate::models::header::{CreationSource, RecordHeader};
use crate::models::ids::{
    AgentMetadataId, ContextId, EntityId, RelationshipId, RelationshipStateId, UnitId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of connection between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    /// Blood or adoptive kinship.
    Family,
    /// Mutual affection without kinship or romance.
    Friendship,
    /// Competitive opposition.
    Rivalry,
    /// Romantic involvement.
    Romance,
    /// Belonging to a group or organization.
    Membership,
    /// Commanding or governing.
    Leadership,
    /// Cooperation between parties.
    Alliance,
    /// Being situated at or coming from a place.
    Location,
    /// Owning or carrying something.
    Possession,
    /// Knowing about something or someone.
    Knowledge,
    /// Shaping another's behavior or beliefs.
    Influence,
    /// One thing bringing about another.
    Causation,
    /// Anything that fits no other bucket.
    Other,
}

impl RelationshipType {
    /// Returns all relationship type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Family,
            Self::Friendship,
            Self::Rivalry,
            Self::Romance,
            Self::Membership,
            Self::Leadership,
            Self::Alliance,
            Self::Location,
            Self::Possession,
            Self::Knowledge,
            Self::Influence,
            Self::Causation,
            Self::Other,
        ]
    }

    /// Returns the relationship type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Friendship => "friendship",
            Self::Rivalry => "rivalry",
            Self::Romance => "romance",
            Self::Membership => "membership",
            Self::Leadership => "leadership",
            Self::Alliance => "alliance",
            Self::Location => "location",
            Self::Possession => "possession",
            Self::Knowledge => "knowledge",
            Self::Influence => "influence",
            Self::Causation => "causation",
            Self::Other => "other",
        }
    }

    /// Parses a relationship type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "family" | "kinship" | "sibling" | "parent" => Some(Self::Family),
            "friendship" | "friend" => Some(Self::Friendship),
            "rivalry" | "rival" | "enemy" => Some(Self::Rivalry),
            "romance" | "romantic" | "lover" => Some(Self::Romance),
            "membership" | "member_of" => Some(Self::Membership),
            "leadership" | "leads" | "rules" => Some(Self::Leadership),
            "alliance" | "ally" => Some(Self::Alliance),
            "location" | "located_at" | "from" => Some(Self::Location),
            "possession" | "owns" | "carries" => Some(Self::Possession),
            "knowledge" | "knows" | "knows_of" => Some(Self::Knowledge),
            "influence" | "influences" => Some(Self::Influence),
            "causation" | "causes" | "caused" => Some(Self::Causation),
            "other" | "misc" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown relationship type: {s}"))
    }
}

/// Which way a relationship points, from the source entity's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationDirection {
    /// Source acts on target.
    Outbound,
    /// Target acts on source.
    Inbound,
    /// Symmetric.
    Bidirectional,
}

impl RelationDirection {
    /// Returns all direction variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Outbound, Self::Inbound, Self::Bidirectional]
    }

    /// Returns the direction as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
            Self::Bidirectional => "bidirectional",
        }
    }

    /// Parses a direction from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "outbound" | "out" | "forward" => Some(Self::Outbound),
            "inbound" | "in" | "reverse" => Some(Self::Inbound),
            "bidirectional" | "both" | "mutual" => Some(Self::Bidirectional),
            _ => None,
        }
    }

    /// The same direction seen from the other end of the pair.
    #[must_use]
    pub const fn flipped(&self) -> Self {
        match self {
            Self::Outbound => Self::Inbound,
            Self::Inbound => Self::Outbound,
            Self::Bidirectional => Self::Bidirectional,
        }
    }
}

impl fmt::Display for RelationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a relationship.
///
/// Any status may follow any other: serialized fiction kills characters
/// and then flashes back to when they were alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    /// Currently in force.
    Active,
    /// Paused but not ended.
    Dormant,
    /// Ended by the participants.
    Broken,
    /// Ended by a death.
    Deceased,
    /// Long over; matters only as history.
    Historical,
    /// The text has not said.
    Unknown,
}

impl RelationshipStatus {
    /// Returns all status variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Active,
            Self::Dormant,
            Self::Broken,
            Self::Deceased,
            Self::Historical,
            Self::Unknown,
        ]
    }

    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Dormant => "dormant",
            Self::Broken => "broken",
            Self::Deceased => "deceased",
            Self::Historical => "historical",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a status from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" | "current" => Some(Self::Active),
            "dormant" | "paused" => Some(Self::Dormant),
            "broken" | "ended" | "severed" => Some(Self::Broken),
            "deceased" | "dead" => Some(Self::Deceased),
            "historical" | "past" => Some(Self::Historical),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationshipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown relationship status: {s}"))
    }
}

/// A connection between two distinct entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Identity and audit stamps.
    pub header: RecordHeader<RelationshipId>,
    /// Entity the relationship is described from.
    pub source_id: EntityId,
    /// Entity on the other end.
    pub target_id: EntityId,
    /// Current direction, from the source's perspective.
    pub direction: RelationDirection,
    /// Kind of connection.
    pub relationship_type: RelationshipType,
    /// Free-text refinement of the type ("half-sister", "sworn enemy").
    pub subtype: Option<String>,
    /// Cached copy of the latest state's status.
    pub current_status: RelationshipStatus,
}

impl Relationship {
    /// Creates a new relationship with a generated id.
    #[must_use]
    pub fn new(
        source_id: EntityId,
        target_id: EntityId,
        relationship_type: RelationshipType,
        direction: RelationDirection,
        source: CreationSource,
    ) -> Self {
        Self {
            header: RecordHeader::new(RelationshipId::generate(), source),
            source_id,
            target_id,
            direction,
            relationship_type,
            subtype: None,
            current_status: RelationshipStatus::Unknown,
        }
    }

    /// Sets the subtype.
    #[must_use]
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Returns the relationship id.
    #[must_use]
    pub const fn id(&self) -> RelationshipId {
        self.header.id
    }

    /// Order-independent identity key: (lesser id, greater id, type).
    #[must_use]
    pub fn pair_key(&self) -> (EntityId, EntityId, RelationshipType) {
        pair_key(self.source_id, self.target_id, self.relationship_type)
    }

    /// Returns true if this relationship connects the given unordered pair.
    #[must_use]
    pub fn connects(&self, a: EntityId, b: EntityId) -> bool {
        (self.source_id == a && self.target_id == b)
            || (self.source_id == b && self.target_id == a)
    }
}

/// Normalizes an entity pair and type into an order-independent key.
#[must_use]
pub fn pair_key(
    a: EntityId,
    b: EntityId,
    relationship_type: RelationshipType,
) -> (EntityId, EntityId, RelationshipType) {
    if a <= b {
        (a, b, relationship_type)
    } else {
        (b, a, relationship_type)
    }
}

/// One immutable observation of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipState {
    /// Identity and audit stamps.
    pub header: RecordHeader<RelationshipStateId>,
    /// Relationship this state describes.
    pub relationship_id: RelationshipId,
    /// Status as of this observation.
    pub status: RelationshipStatus,
    /// Intensity 1 (nominal) through 5 (defining), when known.
    pub strength: Option<u8>,
    /// Prose description of the connection as of this observation.
    pub description: String,
    /// Free-form attributes.
    pub properties: HashMap<String, String>,
    /// Content units that support this observation.
    pub evidence: Vec<UnitId>,
    /// Contexts in force when this state was written.
    pub contexts: Vec<ContextId>,
    /// Agent invocation that produced this state, when AI-sourced.
    pub provenance: Option<AgentMetadataId>,
    /// Store-assigned insertion counter.
    pub seq_no: u64,
}

impl RelationshipState {
    /// Returns the state id.
    #[must_use]
    pub const fn id(&self) -> RelationshipStateId {
        self.header.id
    }

    /// Returns true when every evidence unit appears in `visible`.
    #[must_use]
    pub fn evidence_within(&self, visible: &std::collections::HashSet<UnitId>) -> bool {
        !self.evidence.is_empty() && self.evidence.iter().all(|u| visible.contains(u))
    }
}

/// Input for upserting a relationship observation.
#[derive(Debug, Clone, Default)]
pub struct RelationshipDraft {
    /// How this observation was produced.
    pub source: Option<CreationSource>,
    /// Direction from the source entity's perspective.
    pub direction: Option<RelationDirection>,
    /// New status, if observed.
    pub status: Option<RelationshipStatus>,
    /// Intensity 1-5, if observed.
    pub strength: Option<u8>,
    /// Free-text refinement of the type.
    pub subtype: Option<String>,
    /// Prose description of the connection.
    pub description: Option<String>,
    /// Free-form attributes.
    pub properties: HashMap<String, String>,
    /// Content units supporting this observation.
    pub evidence: Vec<UnitId>,
    /// Contexts in force for this observation.
    pub contexts: Vec<ContextId>,
    /// Agent invocation record, required when `source` is AI.
    pub provenance: Option<AgentMetadataId>,
}

impl RelationshipDraft {
    /// Creates an empty draft with the given source.
    #[must_use]
    pub fn new(source: CreationSource) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// Sets the direction.
    #[must_use]
    pub const fn with_direction(mut self, direction: RelationDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: RelationshipStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the strength, clamped to 1-5.
    #[must_use]
    pub fn with_strength(mut self, strength: u8) -> Self {
        self.strength = Some(strength.clamp(1, 5));
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds an evidence unit.
    #[must_use]
    pub fn with_evidence(mut self, unit: UnitId) -> Self {
        self.evidence.push(unit);
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
    fn test_relationship_type_roundtrip() {
        for rt in RelationshipType::all() {
            assert_eq!(RelationshipType::parse(rt.as_str()), Some(*rt));
        }
        assert_eq!(RelationshipType::parse("sworn"), None);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in RelationshipStatus::all() {
            assert_eq!(RelationshipStatus::parse(status.as_str()), Some(*status));
        }
    }

    #[test]
    fn test_direction_flipped() {
        assert_eq!(RelationDirection::Outbound.flipped(), RelationDirection::Inbound);
        assert_eq!(RelationDirection::Inbound.flipped(), RelationDirection::Outbound);
        assert_eq!(
            RelationDirection::Bidirectional.flipped(),
            RelationDirection::Bidirectional
        );
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        let a = EntityId::generate();
        let b = EntityId::generate();
        assert_eq!(
            pair_key(a, b, RelationshipType::Rivalry),
            pair_key(b, a, RelationshipType::Rivalry)
        );
    }

    #[test]
    fn test_connects_either_order() {
        let a = EntityId::generate();
        let b = EntityId::generate();
        let rel = Relationship::new(
            a,
            b,
            RelationshipType::Alliance,
            RelationDirection::Bidirectional,
            CreationSource::Ai,
        );
        assert!(rel.connects(a, b));
        assert!(rel.connects(b, a));
        assert!(!rel.connects(a, EntityId::generate()));
    }

    #[test]
    fn test_draft_strength_clamped() {
        let draft = RelationshipDraft::new(CreationSource::Human).with_strength(9);
        assert_eq!(draft.strength, Some(5));
        let draft = RelationshipDraft::new(CreationSource::Human).with_strength(0);
        assert_eq!(draft.strength, Some(1));
    }
}
