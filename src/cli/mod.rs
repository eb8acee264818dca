//! CLI surface: argument types and file-loading helpers.
//!
//! The derive structs live here so the binary stays a thin dispatcher.
//! Handlers that print belong to the binary; this module only parses
//! arguments, loads collaborator payloads, and resolves references.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Create the data directory and database |
//! | `structure add` | Add a node to the content hierarchy |
//! | `ingest` | Ingest a chapter from text and extraction JSON |
//! | `project` | Project a spoiler-safe article snapshot |
//! | `status` | Show store row counts |
//! | `completions` | Generate shell completions |
//!
//! # Example Usage
//!
//! ```bash
//! # Set up a work
//! fabula init
//! fabula structure add "The Winter Road" --kind book
//! fabula structure add "Ashfall" --kind chapter --parent the-winter-road
//!
//! # Ingest a chapter with extraction output
//! fabula ingest ashfall --text ashfall.txt --extraction ashfall.json
//!
//! # Project an article for a reader at a position
//! fabula project "Mira Kessler" --position ashfall
//! ```

use crate::models::{ChapterExtraction, ContentStructure};
use crate::storage::ContentStore;
use crate::{Error, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Fabula - an incremental knowledge graph engine for serialized fiction.
#[derive(Parser)]
#[command(name = "fabula")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, env = "FABULA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// The command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create the data directory and database.
    Init,

    /// Manage the content hierarchy.
    Structure {
        /// Structure subcommand.
        #[command(subcommand)]
        action: StructureAction,
    },

    /// Ingest a chapter: prose text plus extraction JSON.
    Ingest {
        /// Chapter reference (slug or id).
        chapter: String,

        /// Path to the chapter text; paragraphs separated by blank lines.
        #[arg(short, long)]
        text: Option<PathBuf>,

        /// Path to the extraction JSON produced by a collaborator.
        #[arg(short, long)]
        extraction: Option<PathBuf>,

        /// Record the batch as AI-sourced under this agent kind.
        #[arg(long)]
        agent: Option<String>,

        /// Agent implementation version, used with --agent.
        #[arg(long, default_value = "unversioned")]
        agent_version: String,
    },

    /// Project an article snapshot bounded by a read position.
    Project {
        /// Entity name the article is about.
        entity: String,

        /// Read position (structure slug or id).
        #[arg(short, long)]
        position: String,
    },

    /// Show store row counts.
    Status,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

/// Structure subcommands.
#[derive(Subcommand)]
pub enum StructureAction {
    /// Add a node to the hierarchy.
    Add {
        /// Display title.
        title: String,

        /// Node kind: book, arc, chapter, scene, ...
        #[arg(short, long, default_value = "chapter")]
        kind: String,

        /// Parent node (slug or id); omit for a root.
        #[arg(short, long)]
        parent: Option<String>,

        /// Position among siblings; appends when omitted.
        #[arg(long)]
        position: Option<u32>,
    },
}

/// Loads a `ChapterExtraction` payload from a JSON file.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] when the file cannot be read and
/// [`Error::InvalidInput`] when it is not valid extraction JSON.
pub fn load_extraction(path: &Path) -> Result<ChapterExtraction> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::operation("read_extraction_file", e))?;
    serde_json::from_str(&contents)
        .map_err(|e| Error::InvalidInput(format!("malformed extraction JSON: {e}")))
}

/// Loads chapter paragraphs from a text file.
///
/// Paragraphs are blank-line separated; internal newlines collapse to
/// spaces so hard-wrapped sources hash the same as flowed ones.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] when the file cannot be read.
pub fn load_paragraphs(path: &Path) -> Result<Vec<String>> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| Error::operation("read_text_file", e))?;
    Ok(split_paragraphs(&contents))
}

/// Splits prose into blank-line separated paragraphs.
#[must_use]
pub fn split_paragraphs(contents: &str) -> Vec<String> {
    contents
        .split("\n\n")
        .map(|block| block.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|paragraph| !paragraph.is_empty())
        .collect()
}

/// Resolves a structure reference: exact slug first, then exact id.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when nothing matches and
/// [`Error::InvalidInput`] when several nodes share the slug.
pub fn resolve_structure<S: ContentStore>(store: &S, reference: &str) -> Result<ContentStructure> {
    let structures = store.list_structures()?;
    let matches: Vec<&ContentStructure> = structures
        .iter()
        .filter(|s| s.slug == reference || s.id().to_string() == reference)
        .collect();
    match matches.as_slice() {
        [] => Err(Error::not_found("structure", reference)),
        [node] => Ok((*node).clone()),
        _ => Err(Error::InvalidInput(format!(
            "'{reference}' names {} structures; use the id",
            matches.len()
        ))),
    }
}
