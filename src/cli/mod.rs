//! Command-line interface for artvault.
//!
//! Provides commands for syncing configured sites, listing and showing
//! archived submissions, and inspecting archived files directly.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::collection::{Collection, CollectionError};
use crate::config;
use crate::domain::{SubmissionIdentifier, SubmissionMetadata};
use crate::filetypes::{self, sniff, Registry};

/// artvault - Self-describing archive of online art submissions
#[derive(Parser, Debug)]
#[command(name = "artvault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive new submissions from every configured site
    Sync,

    /// List archived submissions
    List {
        /// Only this collection
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Show one archived submission
    Show {
        /// Site name (e.g. "example.com")
        site: String,

        /// Submission ID on that site
        id: String,

        /// Only look in this collection
        #[arg(short, long)]
        collection: Option<String>,
    },

    /// Decode archived files directly, without a collection
    Inspect {
        /// Files or glob patterns
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Sync => run_sync().await,
            Commands::List { collection } => list_submissions(collection).await,
            Commands::Show {
                site,
                id,
                collection,
            } => show_submission(&site, &id, collection).await,
            Commands::Inspect { patterns } => inspect_files(&patterns).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Run every site into its targets
async fn run_sync() -> Result<()> {
    let cfg = config::config()?;
    let mut archiver = cfg.archiver().await?;

    let report = archiver.run().await?;
    eprintln!(
        "[Sync finished: {} stored, {} skipped, {} failed]",
        report.stored, report.skipped, report.failed
    );

    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// List identifiers per collection
async fn list_submissions(only: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    cfg.validate()?;
    let collections = cfg.build_collections()?;

    for (name, collection) in select_collections(&collections, only.as_deref())? {
        let identifiers = collection
            .list()
            .await
            .with_context(|| format!("Failed to list collection '{}'", name))?;

        println!("{} ({} submissions)", name, identifiers.len());
        for identifier in identifiers {
            println!(
                "  {:<30} {}",
                identifier.to_string(),
                identifier.resource.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}

/// Find a submission and print its metadata
async fn show_submission(site: &str, id: &str, only: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    cfg.validate()?;
    let collections = cfg.build_collections()?;
    let wanted = SubmissionIdentifier::new(site, id);

    for (name, collection) in select_collections(&collections, only.as_deref())? {
        match collection.get(&wanted).await {
            Ok(mut submission) => {
                let identifier = submission.identifier().clone();
                let metadata = submission.metadata().await?.clone();
                let content = submission.content().await?;
                println!("Collection: {}", name);
                print_submission(&identifier, &metadata, content);
                return Ok(());
            }
            Err(CollectionError::NotFound { .. }) => continue,
            Err(e) => return Err(e).with_context(|| format!("Failed to read collection '{}'", name)),
        }
    }

    anyhow::bail!("No such submission {}", wanted)
}

/// Every collection, or only the named one if it exists
fn select_collections<'a>(
    collections: &'a IndexMap<String, Arc<Collection>>,
    only: Option<&str>,
) -> Result<Vec<(&'a str, &'a Arc<Collection>)>> {
    match only {
        Some(name) => match collections.get_key_value(name) {
            Some((key, collection)) => Ok(vec![(key.as_str(), collection)]),
            None => anyhow::bail!("No collection named '{}'", name),
        },
        None => Ok(collections
            .iter()
            .map(|(key, collection)| (key.as_str(), collection))
            .collect()),
    }
}

/// Decode each matching file and print what it carries
async fn inspect_files(patterns: &[String]) -> Result<()> {
    let registry = Registry::default();
    let mut paths = Vec::new();
    for pattern in patterns {
        let matches: Vec<PathBuf> = glob::glob(pattern)
            .with_context(|| format!("Invalid pattern: {}", pattern))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        if matches.is_empty() {
            eprintln!("No files match {}", pattern);
        }
        paths.extend(matches);
    }

    let mut failures = 0;
    for path in &paths {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let kind = sniff::identify(&content);

        println!("{} ({})", path.display(), kind.mime);
        match filetypes::process_for_input(&registry, &content) {
            Ok(decoded) => print_submission(&decoded.identifier, &decoded.metadata, &decoded.content),
            Err(e) => {
                println!("  {}", e);
                failures += 1;
            }
        }
        println!();
    }

    if failures > 0 {
        anyhow::bail!("{} of {} files could not be decoded", failures, paths.len());
    }
    Ok(())
}

fn print_submission(identifier: &SubmissionIdentifier, metadata: &SubmissionMetadata, content: &[u8]) {
    println!("  Identifier: {}", identifier);
    if let Some(resource) = &identifier.resource {
        println!("  Resource:   {}", resource);
    }
    println!("  Title:      {}", metadata.title);
    match &metadata.artist.url {
        Some(url) => println!("  Artist:     {} <{}>", metadata.artist.name, url),
        None => println!("  Artist:     {}", metadata.artist.name),
    }
    println!("  Uploaded:   {}", metadata.date_uploaded.to_rfc3339());
    println!("  Source:     {}", metadata.image_url);
    if !metadata.tags.is_empty() {
        println!("  Tags:");
        for (key, value) in &metadata.tags {
            println!("    {}: {}", key, value);
        }
    }
    println!("  Payload:    {} bytes, sha256 {}", content.len(), hex::encode(Sha256::digest(content)));
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("artvault configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Base dir:    {}", cfg.base_dir.display());
    println!();
    println!("Collections:");
    for entry in &cfg.collections {
        println!("  {} ({})", entry.name(), entry.kind);
    }
    println!();
    println!("Sites:");
    if cfg.sites.is_empty() {
        println!("  (none)");
    }
    for entry in &cfg.sites {
        println!(
            "  {} ({}) -> {}",
            entry.plugin.name(),
            entry.plugin.kind,
            entry.target.join(", ")
        );
    }
    println!();
    println!("Sync:");
    println!("  Throttle:   {} ms", cfg.sync.throttle.as_millis());
    println!("  User agent: {}", cfg.sync.user_agent);
    println!();

    match cfg.validate() {
        Ok(()) => println!("Configuration is valid"),
        Err(e) => println!("Configuration error: {:#}", e),
    }

    Ok(())
}
