//! # KB Harness CLI (`kb`)
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb ingest [ROOT]` | Index files under ROOT that changed since the last run |
//! | `kb retrieve "<query>"` | Print the top-k chunks for a query |
//! | `kb contents` | Print every stored chunk |
//! | `kb prune [ROOT]` | Remove deleted files from the cache and index |
//!
//! Logs go to stderr (`KB_LOG` overrides `-v`/`-q`); reports and context go
//! to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use kb_harness::config;
use kb_harness::ingest;
use kb_harness::retrieve;

/// Incremental ingestion and retrieval of a document knowledge base.
#[derive(Parser)]
#[command(name = "kb", version)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it is absent.
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    /// More log output (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new and modified files.
    ///
    /// Unchanged files are skipped by fingerprint. Files that fail to load
    /// are reported and retried on the next run.
    Ingest {
        /// Directory to scan.
        #[arg(default_value = "./knowledge_base")]
        root: PathBuf,
    },

    /// Print the chunks nearest to a query, separated by blank lines.
    Retrieve {
        query: String,

        /// Number of chunks (defaults to `retrieval.k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Print every chunk stored in the index.
    Contents,

    /// Drop cache entries and index chunks for files deleted under ROOT.
    Prune {
        #[arg(default_value = "./knowledge_base")]
        root: PathBuf,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("KB_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest { root } => {
            let ingestor = ingest::open_ingestor(&cfg).await?;
            let cancel = CancellationToken::new();
            let interrupt = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, stopping");
                        cancel.cancel();
                    }
                })
            };
            let outcome = ingestor.run(&root, &cancel).await;
            interrupt.abort();
            println!("{}", outcome?);
        }
        Commands::Retrieve { query, k } => {
            println!("{}", retrieve::retrieve(&cfg, &query, k).await);
        }
        Commands::Contents => {
            let texts = retrieve::contents(&cfg).await?;
            println!("{}", texts.join("\n\n"));
        }
        Commands::Prune { root } => {
            println!("{}", ingest::prune(&cfg, &root).await?);
        }
    }

    Ok(())
}
