//! Authorial context records and their scoping rules.
//!
//! Contexts carry information *about* the narrative rather than from it:
//! themes to track, point-of-view constraints, worldbuilding canon, notes
//! to future extraction passes. Each context is attached at one of three
//! scopes and becomes immutable once published; later corrections append a
//! successor context instead of editing the published row.

use crate::models::header::{CreationSource, RecordHeader};
use crate::models::ids::{ContextId, StructureId, UnitId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of authorial context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// A theme the work develops.
    Theme,
    /// Point-of-view constraints for a span of text.
    Pov,
    /// A note from the author to readers of the graph.
    AuthorNote,
    /// Worldbuilding canon.
    Worldbuilding,
    /// Guidance for extraction or writing passes.
    WritingGuidance,
    /// Anything that fits no other bucket.
    Other,
}

impl ContextType {
    /// Returns all context type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Theme,
            Self::Pov,
            Self::AuthorNote,
            Self::Worldbuilding,
            Self::WritingGuidance,
            Self::Other,
        ]
    }

    /// Returns the context type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Theme => "theme",
            Self::Pov => "pov",
            Self::AuthorNote => "author_note",
            Self::Worldbuilding => "worldbuilding",
            Self::WritingGuidance => "writing_guidance",
            Self::Other => "other",
        }
    }

    /// Parses a context type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "theme" => Some(Self::Theme),
            "pov" | "point_of_view" => Some(Self::Pov),
            "author_note" | "note" => Some(Self::AuthorNote),
            "worldbuilding" | "lore" => Some(Self::Worldbuilding),
            "writing_guidance" | "guidance" => Some(Self::WritingGuidance),
            "other" | "misc" => Some(Self::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown context type: {s}"))
    }
}

/// Where a context applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextScope {
    /// Applies to the whole work.
    Global,
    /// Applies to the attached structure nodes and their descendants.
    Structural,
    /// Applies to the attached content units only.
    ContentUnit,
}

impl ContextScope {
    /// Returns all scope variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Global, Self::Structural, Self::ContentUnit]
    }

    /// Returns the scope as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Structural => "structural",
            Self::ContentUnit => "content_unit",
        }
    }

    /// Parses a scope from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "global" => Some(Self::Global),
            "structural" | "structure" => Some(Self::Structural),
            "content_unit" | "unit" => Some(Self::ContentUnit),
            _ => None,
        }
    }
}

impl fmt::Display for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An authorial context record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Identity and audit stamps.
    pub header: RecordHeader<ContextId>,
    /// Kind of context.
    pub context_type: ContextType,
    /// Where this context applies.
    pub scope: ContextScope,
    /// Display title.
    pub title: String,
    /// URL-safe identifier.
    pub slug: String,
    /// The context text itself.
    pub content: String,
    /// Free-form attributes.
    pub properties: HashMap<String, String>,
    /// Ordering among contexts of the same scope and attachment.
    pub sequence: u32,
    /// Immutability boundary; published contexts are never edited in place.
    pub is_published: bool,
    /// Structure attachments (meaningful for `Structural` scope).
    pub structure_ids: Vec<StructureId>,
    /// Unit attachments (meaningful for `ContentUnit` scope).
    pub unit_ids: Vec<UnitId>,
    /// Context this one supersedes, when it post-dates a publication.
    pub supersedes: Option<ContextId>,
}

impl Context {
    /// Creates a new context with a generated id.
    #[must_use]
    pub fn new(
        context_type: ContextType,
        scope: ContextScope,
        title: impl Into<String>,
        slug: impl Into<String>,
        content: impl Into<String>,
        source: CreationSource,
    ) -> Self {
        Self {
            header: RecordHeader::new(ContextId::generate(), source),
            context_type,
            scope,
            title: title.into(),
            slug: slug.into(),
            content: content.into(),
            properties: HashMap::new(),
            sequence: 0,
            is_published: false,
            structure_ids: Vec::new(),
            unit_ids: Vec::new(),
            supersedes: None,
        }
    }

    /// Attaches the context to a structure node.
    #[must_use]
    pub fn with_structure(mut self, structure_id: StructureId) -> Self {
        self.structure_ids.push(structure_id);
        self
    }

    /// Attaches the context to a content unit.
    #[must_use]
    pub fn with_unit(mut self, unit_id: UnitId) -> Self {
        self.unit_ids.push(unit_id);
        self
    }

    /// Adds a free-form attribute.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the context id.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.header.id
    }
}
