//! Binary entry point for fabula.
//!
//! This binary provides the CLI interface for the fabula engine.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print macros in the main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{CommandFactory, Parser};
use fabula::cli::{self, Cli, Commands, StructureAction};
use fabula::config::FabulaConfig;
use fabula::models::{AgentMetadata, CreationSource, StructureType};
use fabula::services::{ChapterIngestService, ProjectionService, StructureService};
use fabula::storage::{SqliteStore, Store};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    let args = Cli::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        },
    }
}

fn run(args: Cli) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => FabulaConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => FabulaConfig::load_default(),
    };
    fabula::observability::init(args.json_logs || config.log_json);

    match args.command {
        Commands::Init => cmd_init(&config),
        Commands::Structure { action } => cmd_structure(&config, action),
        Commands::Ingest {
            chapter,
            text,
            extraction,
            agent,
            agent_version,
        } => cmd_ingest(&config, &chapter, text, extraction, agent, &agent_version),
        Commands::Project { entity, position } => cmd_project(&config, &entity, &position),
        Commands::Status => cmd_status(&config),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "fabula", &mut std::io::stdout());
            Ok(())
        },
    }
}

/// Opens the store, creating the data directory as needed.
fn open_store(config: &FabulaConfig) -> anyhow::Result<Arc<SqliteStore>> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;
    let store = SqliteStore::new(config.database_path()).context("opening database")?;
    Ok(Arc::new(store))
}

fn cmd_init(config: &FabulaConfig) -> anyhow::Result<()> {
    let _store = open_store(config)?;
    println!("initialized {}", config.database_path().display());
    Ok(())
}

fn cmd_structure(config: &FabulaConfig, action: StructureAction) -> anyhow::Result<()> {
    let store = open_store(config)?;
    match action {
        StructureAction::Add {
            title,
            kind,
            parent,
            position,
        } => {
            let structure_type: StructureType = kind.parse().map_err(anyhow::Error::msg)?;
            let parent_id = parent
                .map(|reference| cli::resolve_structure(store.as_ref(), &reference))
                .transpose()?
                .map(|node| node.id());
            let structures = StructureService::new(store);
            let node = structures.insert(
                structure_type,
                &title,
                parent_id,
                position.unwrap_or(u32::MAX),
                CreationSource::Human,
            )?;
            println!("added {} '{}' as {} ({})", node.structure_type, node.title, node.slug, node.id());
        },
    }
    Ok(())
}

fn cmd_ingest(
    config: &FabulaConfig,
    chapter: &str,
    text: Option<std::path::PathBuf>,
    extraction: Option<std::path::PathBuf>,
    agent: Option<String>,
    agent_version: &str,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let node = cli::resolve_structure(store.as_ref(), chapter)?;

    let paragraphs = match text {
        Some(path) => cli::load_paragraphs(&path)
            .with_context(|| format!("reading chapter text {}", path.display()))?,
        None => Vec::new(),
    };
    let payload = match extraction {
        Some(path) => cli::load_extraction(&path)
            .with_context(|| format!("reading extraction {}", path.display()))?,
        None => fabula::models::ChapterExtraction::default(),
    };
    let agent_metadata = agent.map(|kind| AgentMetadata::new(kind, agent_version));

    let ingest = ChapterIngestService::new(store);
    let report = ingest.ingest_chapter(
        node.id(),
        &paragraphs,
        &payload,
        agent_metadata.as_ref(),
    )?;

    println!(
        "ingested '{}': {} units ({} deduped), {} entities created, {} states, {} relationships",
        node.title,
        report.units_created,
        report.units_deduped,
        report.entities_created,
        report.states_appended,
        report.relationships_upserted,
    );
    for skipped in &report.skipped {
        println!("  skipped '{}': {}", skipped.identifier, skipped.reason);
    }
    Ok(())
}

fn cmd_project(config: &FabulaConfig, entity: &str, position: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let node = cli::resolve_structure(store.as_ref(), position)?;

    let ingest = ChapterIngestService::new(Arc::clone(&store));
    let resolved = ingest
        .registry()
        .resolve(entity, None)?
        .with_context(|| format!("no entity matches '{entity}'"))?;

    let projection = ProjectionService::new(store);
    let (article, snapshot) = projection.project_entity(resolved.id(), node.id())?;

    println!(
        "projected '{}' at '{}': {} entity states, {} relationship states, {} citations (snapshot {})",
        article.title,
        node.title,
        snapshot.entity_states.len(),
        snapshot.relationship_states.len(),
        snapshot.citations.len(),
        snapshot.id(),
    );
    Ok(())
}

fn cmd_status(config: &FabulaConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;
    println!("store: {}", config.database_path().display());
    println!(
        "  entities:            {} ({} states)",
        stats.knowledge.entities, stats.knowledge.entity_states
    );
    println!(
        "  relationships:       {} ({} states)",
        stats.knowledge.relationships, stats.knowledge.relationship_states
    );
    println!(
        "  structures:          {} ({} units, {} contexts)",
        stats.content.structures, stats.content.units, stats.content.contexts
    );
    println!(
        "  articles:            {} ({} snapshots)",
        stats.presentation.articles, stats.presentation.snapshots
    );
    println!(
        "  agent invocations:   {} ({} prompts, {} merges)",
        stats.provenance.agent_runs, stats.provenance.prompts, stats.provenance.merges
    );
    Ok(())
}
