//! Common record header embedded in every stored record.
//!
//! The header carries the typed id, creation and update stamps, and the
//! provenance class of the record. Records embed it by composition
//! (`record.header.id`) rather than inheriting fields, so each record type
//! states its full shape in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationSource {
    /// Produced by an extraction collaborator.
    Ai,
    /// Entered by a human editor.
    Human,
    /// Human-edited AI output.
    Hybrid,
    /// Generated by the engine itself (merges, snapshots).
    System,
}

impl CreationSource {
    /// Returns all creation source variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Ai, Self::Human, Self::Hybrid, Self::System]
    }

    /// Returns the creation source as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Human => "human",
            Self::Hybrid => "hybrid",
            Self::System => "system",
        }
    }

    /// Parses a creation source from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ai" | "agent" | "llm" => Some(Self::Ai),
            "human" | "user" | "manual" => Some(Self::Human),
            "hybrid" | "mixed" => Some(Self::Hybrid),
            "system" | "engine" => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for CreationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CreationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown creation source: {s}"))
    }
}

/// Identity and audit stamps shared by every record family.
///
/// Generic over the id newtype so a header minted for one family cannot be
/// attached to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader<Id> {
    /// Typed record id.
    pub id: Id,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last modified.
    pub updated_at: DateTime<Utc>,
    /// How the record came to exist.
    pub source: CreationSource,
}

impl<Id> RecordHeader<Id> {
    /// Creates a header stamped with the current time.
    pub fn new(id: Id, source: CreationSource) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            source,
        }
    }

    /// Creates a header with explicit timestamps (store hydration path).
    pub const fn restored(
        id: Id,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        source: CreationSource,
    ) -> Self {
        Self {
            id,
            created_at,
            updated_at,
            source,
        }
    }

    /// Bumps the update stamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::EntityId;

    #[test]
    fn test_creation_source_parse() {
        assert_eq!(CreationSource::parse("ai"), Some(CreationSource::Ai));
        assert_eq!(CreationSource::parse("AI"), Some(CreationSource::Ai));
        assert_eq!(CreationSource::parse("user"), Some(CreationSource::Human));
        assert_eq!(CreationSource::parse("mixed"), Some(CreationSource::Hybrid));
        assert_eq!(CreationSource::parse("nonsense"), None);
    }

    #[test]
    fn test_creation_source_roundtrip() {
        for source in CreationSource::all() {
            assert_eq!(CreationSource::parse(source.as_str()), Some(*source));
        }
    }

    #[test]
    fn test_touch_advances_updated_at() {
        let mut header = RecordHeader::new(EntityId::generate(), CreationSource::Human);
        let created = header.created_at;
        header.touch();
        assert!(header.updated_at >= created);
        assert_eq!(header.created_at, created);
    }
}
