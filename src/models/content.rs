//! Content hierarchy types: structure nodes and the text units inside them.
//!
//! Structures form a strict forest (every node has at most one parent) and
//! siblings are ordered by a contiguous, zero-based `sequence`. Content
//! units hold the actual prose and carry their own `sequence` within a
//! structure node. The flattened pre-order walk of the forest, then unit
//! sequence within each node, is the narrative total order everything else
//! (evidence visibility, spoiler boundaries) is measured against.

use crate::models::header::{CreationSource, RecordHeader};
use crate::models::ids::{StructureId, UnitId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Kind of node in the content hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    /// A whole book.
    Book,
    /// A volume within a multi-volume work.
    Volume,
    /// A narrative arc grouping chapters.
    Arc,
    /// A chapter.
    Chapter,
    /// A scene within a chapter.
    Scene,
    /// A short passage below scene granularity.
    Passage,
    /// An encyclopedia entry maintained alongside the story.
    WikiEntry,
    /// Worldbuilding notes.
    Worldbuilding,
    /// A character sheet.
    CharacterSheet,
    /// A plot outline.
    PlotOutline,
    /// A top-level project container.
    Project,
    /// An ordered collection of otherwise unrelated nodes.
    Collection,
    /// A timeline document.
    Timeline,
    /// Anything that fits no other bucket.
    Other,
}

impl StructureType {
    /// Returns all structure type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Book,
            Self::Volume,
            Self::Arc,
            Self::Chapter,
            Self::Scene,
            Self::Passage,
            Self::WikiEntry,
            Self::Worldbuilding,
            Self::CharacterSheet,
            Self::PlotOutline,
            Self::Project,
            Self::Collection,
            Self::Timeline,
            Self::Other,
        ]
    }

    /// Returns the structure type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Volume => "volume",
            Self::Arc => "arc",
            Self::Chapter => "chapter",
            Self::Scene => "scene",
            Self::Passage => "passage",
            Self::WikiEntry => "wiki_entry",
            Self::Worldbuilding => "worldbuilding",
            Self::CharacterSheet => "character_sheet",
            Self::PlotOutline => "plot_outline",
            Self::Project => "project",
            Self::Collection => "collection",
            Self::Timeline => "timeline",
            Self::Other => "other",
        }
    }

    /// Parses a structure type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "book" | "novel" => Some(Self::Book),
            "volume" | "vol" => Some(Self::Volume),
            "arc" => Some(Self::Arc),
            "chapter" | "ch" => Some(Self::Chapter),
            "scene" => Some(Self::Scene),
            "passage" | "fragment" => Some(Self::Passage),
            "wiki_entry" | "wiki" => Some(Self::WikiEntry),
            "worldbuilding" | "lore" => Some(Self::Worldbuilding),
            "character_sheet" | "charsheet" => Some(Self::CharacterSheet),
            "plot_outline" | "outline" => Some(Self::PlotOutline),
            "project" => Some(Self::Project),
            "collection" | "anthology" => Some(Self::Collection),
            "timeline" => Some(Self::Timeline),
            "other" | "misc" => Some(Self::Other),
            _ => None,
        }
    }

    /// Returns true for node kinds that belong to the narrative spine.
    ///
    /// Supplementary kinds (wiki entries, outlines, sheets) hold text but
    /// do not advance the reader position.
    #[must_use]
    pub const fn is_narrative(&self) -> bool {
        matches!(
            self,
            Self::Book
                | Self::Volume
                | Self::Arc
                | Self::Chapter
                | Self::Scene
                | Self::Passage
                | Self::Project
                | Self::Collection
        )
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StructureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown structure type: {s}"))
    }
}

/// A node in the content hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentStructure {
    /// Identity and audit stamps.
    pub header: RecordHeader<StructureId>,
    /// Kind of node.
    pub structure_type: StructureType,
    /// Display title.
    pub title: String,
    /// URL-safe identifier, unique among siblings.
    pub slug: String,
    /// Parent node; `None` for roots.
    pub parent_id: Option<StructureId>,
    /// Zero-based position among siblings; contiguous per parent.
    pub sequence: u32,
    /// Free-form attributes (word counts, source file, display hints).
    pub meta_info: HashMap<String, String>,
    /// Engine-maintained summary of the node's content.
    pub ai_summary: Option<String>,
    /// Set once the node's ingestion completed; the immutability boundary.
    pub is_published: bool,
    /// Part of canon, as opposed to drafts or cut material.
    pub is_canonical: bool,
    /// Supplementary material outside the narrative spine.
    pub is_supplementary: bool,
}

impl ContentStructure {
    /// Creates a new node with a generated id.
    #[must_use]
    pub fn new(
        structure_type: StructureType,
        title: impl Into<String>,
        slug: impl Into<String>,
        parent_id: Option<StructureId>,
        sequence: u32,
        source: CreationSource,
    ) -> Self {
        Self {
            header: RecordHeader::new(StructureId::generate(), source),
            structure_type,
            title: title.into(),
            slug: slug.into(),
            parent_id,
            sequence,
            meta_info: HashMap::new(),
            ai_summary: None,
            is_published: false,
            is_canonical: true,
            is_supplementary: !structure_type.is_narrative(),
        }
    }

    /// Adds a metadata attribute.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta_info.insert(key.into(), value.into());
        self
    }

    /// Marks the node as non-canon.
    #[must_use]
    pub const fn non_canonical(mut self) -> Self {
        self.is_canonical = false;
        self
    }

    /// Returns the structure id.
    #[must_use]
    pub const fn id(&self) -> StructureId {
        self.header.id
    }

    /// Returns true for root nodes.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A block of prose inside a structure node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Identity and audit stamps.
    pub header: RecordHeader<UnitId>,
    /// Node this unit belongs to.
    pub structure_id: StructureId,
    /// Zero-based position within the node; contiguous per node.
    pub sequence: u32,
    /// The text itself.
    pub content: String,
    /// SHA-256 of `content`, hex-encoded; used for idempotent re-ingest.
    pub content_hash: String,
}

impl ContentUnit {
    /// Creates a new unit with a generated id and computed content hash.
    #[must_use]
    pub fn new(
        structure_id: StructureId,
        sequence: u32,
        content: impl Into<String>,
        source: CreationSource,
    ) -> Self {
        let content = content.into();
        let content_hash = hash_content(&content);
        Self {
            header: RecordHeader::new(UnitId::generate(), source),
            structure_id,
            sequence,
            content,
            content_hash,
        }
    }

    /// Returns the unit id.
    #[must_use]
    pub const fn id(&self) -> UnitId {
        self.header.id
    }
}

/// Computes the hex-encoded SHA-256 digest of a unit's text.
#[must_use]
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
