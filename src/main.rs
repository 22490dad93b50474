//! rustcsbc - consortium publication tracker
//!
//! ## Usage
//!
//! ```bash
//! # first run: create the table
//! rustcsbc pubmed --registry grants.csv --table output/publications.csv
//!
//! # later runs: append publications the table does not have yet
//! rustcsbc pubmed --registry grants.csv --table output/publications.csv --append
//!
//! # check how grant tokens are read
//! rustcsbc grant "U54 CA209997/CA/NCI NIH HHS/United States"
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustcsbc::{
    grant::GrantNormalizer,
    pipeline::{self, PipelineOptions, RunSummary},
    pubmed::{PubMedClient, PubMedConfig, MAX_ESEARCH_RESULTS},
    registry::RegistrySnapshot,
    table::{PublicationTable, TABLE_SCHEMA},
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Consortium publication tracker
#[derive(Parser)]
#[command(name = "rustcsbc")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape PubMed for consortium publications and write the publication table
    Pubmed {
        /// Grant registry export (CSV with grantNumber, id, consortium columns)
        #[arg(long)]
        registry: PathBuf,

        /// Publication table
        #[arg(long, default_value = "./output/publications.csv")]
        table: PathBuf,

        /// Append new publications to an existing table instead of creating one
        #[arg(long)]
        append: bool,

        /// Contact address for NCBI E-utilities
        #[arg(long, env = "NCBI_EMAIL")]
        email: Option<String>,

        /// NCBI API key
        #[arg(long, env = "NCBI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Concurrent requests against NCBI
        #[arg(long, default_value = "3")]
        concurrency: usize,

        /// Maximum publications returned by the search
        #[arg(long, default_value_t = MAX_ESEARCH_RESULTS)]
        max_results: usize,

        /// Only process the first N new publications
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show how grant tokens are normalized
    Grant {
        /// Raw grant tokens as listed on a publication page
        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Print the publication table schema
    Schema,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }

    match cli.command {
        Commands::Pubmed {
            registry,
            table,
            append,
            email,
            api_key,
            concurrency,
            max_results,
            limit,
        } => {
            let config = PubMedConfig {
                email,
                api_key,
                max_workers: concurrency,
                retmax: max_results,
                ..Default::default()
            };
            let options = PipelineOptions {
                concurrency,
                limit,
                ..Default::default()
            };
            run_pubmed(registry, table, append, config, options).await
        }
        Commands::Grant { tokens } => {
            print_grants(&tokens);
            Ok(())
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&TABLE_SCHEMA)?);
            Ok(())
        }
    }
}

// ============================================================================
// PubMed Run
// ============================================================================

async fn run_pubmed(
    registry_path: PathBuf,
    table_path: PathBuf,
    append: bool,
    config: PubMedConfig,
    options: PipelineOptions,
) -> Result<()> {
    let registry = RegistrySnapshot::load(&registry_path)
        .with_context(|| format!("Failed to load grant registry {}", registry_path.display()))?;

    let table = PublicationTable::new(&table_path);
    let existing = if append {
        table.load().context("Failed to read publication table")?
    } else {
        if table.exists() {
            anyhow::bail!(
                "{} already exists; pass --append to add new publications",
                table_path.display()
            );
        }
        Vec::new()
    };

    println!(
        "Registry: {} grants, table: {} existing rows",
        registry.known_grants().len(),
        existing.len()
    );

    let client = PubMedClient::new(config)?;
    let summary = pipeline::run(&client, &client, &registry, &existing, &options)
        .await
        .context("PubMed run failed")?;

    let written = if append {
        table.append(&summary.new_records)
    } else {
        table.create(&summary.new_records)
    }
    .context("Failed to write publication table")?;

    print_summary(&summary);

    if written == 0 {
        println!("\nNothing to update.");
    } else {
        println!("\n✓ Wrote {} rows to {}", written, table.path().display());
    }
    info!(written, "Done");
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n--- Summary ---");
    println!("Found in search:     {}", summary.searched);
    println!("Already in table:    {}", summary.already_persisted);
    println!("Fetched:             {}", summary.fetched);
    println!("Built:               {}", summary.extraction.records.len());
    println!("Skipped:             {}", summary.skipped_count());
    println!("New rows:            {}", summary.new_records.len());

    if summary.skipped_count() > 0 {
        println!("\nSkipped publications:");
        for skipped in summary.skipped() {
            println!("  {}: {}", skipped.publication_id, skipped.reason);
        }
    }

    if !summary.extraction.dropped_grants.is_empty() {
        println!("\nGrant tokens to check by hand:");
        for dropped in &summary.extraction.dropped_grants {
            println!(
                "  {}: {:?} ({})",
                dropped.publication_id, dropped.token, dropped.reason
            );
        }
    }
}

// ============================================================================
// Grant Token Check
// ============================================================================

fn print_grants(tokens: &[String]) {
    let normalizer = GrantNormalizer::default();
    for token in tokens {
        match normalizer.normalize_token(token) {
            Ok(citation) => println!("{:?} -> {}", token, citation),
            Err(reason) => println!("{:?} -> dropped ({})", token, reason),
        }
    }
}
