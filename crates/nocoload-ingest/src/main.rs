//! nocoload - sync NocoDB tables into content collections

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nocoload_common::logging::{init_logging, LogConfig, LogLevel};
use nocoload_ingest::config::{CollectionsFile, SourceConfig};
use nocoload_ingest::sync::Syncer;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "nocoload")]
#[command(author, version, about = "Fetch NocoDB tables into content collections")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every configured collection and write it to the output directory
    Sync {
        /// Collections file
        #[arg(short, long, default_value = "nocoload.toml", env = "NOCOLOAD_COLLECTIONS")]
        collections: PathBuf,

        /// Output directory for collection snapshots
        #[arg(short, long, default_value = "./content", env = "NOCOLOAD_OUTPUT")]
        output: PathBuf,

        /// Only sync these collections
        #[arg(long)]
        only: Vec<String>,

        /// Fail when a collection is incomplete or has invalid records
        #[arg(long)]
        strict: bool,

        /// Abort the whole run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Validate the collections file without contacting the source
    Check {
        /// Collections file
        #[arg(short, long, default_value = "nocoload.toml", env = "NOCOLOAD_COLLECTIONS")]
        collections: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("nocoload")
        .build();

    // Environment variables take precedence over flags
    let log_config = match log_config.clone().merge_env() {
        Ok(merged) => merged,
        Err(e) => {
            eprintln!("Warning: ignoring LOG_* environment settings: {:#}", e);
            log_config
        },
    };

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

async fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Sync {
            collections,
            output,
            only,
            strict,
            timeout_secs,
        } => {
            // Configuration problems surface before any request is made
            let file = CollectionsFile::load(&collections)?;
            let tables = file.table_specs(&only)?;
            let source = SourceConfig::load()?;

            info!(
                base_url = %source.base_url,
                collections = tables.len(),
                output = %output.display(),
                "Starting sync"
            );

            let syncer = Syncer::from_config(source, output)?;
            let summary = match timeout_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), syncer.sync_all(&tables))
                    .await
                    .with_context(|| format!("Sync did not finish within {}s", secs))??,
                None => syncer.sync_all(&tables).await?,
            };

            for collection in &summary.collections {
                println!(
                    "{:<24} {:>6} fetched {:>6} entries {:>4} invalid  {:?}",
                    collection.name,
                    collection.fetched,
                    collection.entries,
                    collection.report.invalid.len(),
                    collection.completion
                );
            }

            info!(entries = summary.total_entries(), "Sync complete");

            if strict && !summary.is_clean() {
                let unclean: Vec<&str> = summary.unclean().map(|c| c.name.as_str()).collect();
                error!(?unclean, "Strict mode: sync finished with problems");
                return Ok(ExitCode::FAILURE);
            }

            Ok(ExitCode::SUCCESS)
        },
        Command::Check { collections } => {
            let file = CollectionsFile::load(&collections)?;
            for (name, collection) in &file.collections {
                println!(
                    "{:<24} table={} fields={} body={}",
                    name,
                    collection.table_id,
                    if collection.fields.is_empty() {
                        "*".to_string()
                    } else {
                        collection.fields.join(",")
                    },
                    collection.body_field.as_deref().unwrap_or("-")
                );
            }
            Ok(ExitCode::SUCCESS)
        },
    }
}
