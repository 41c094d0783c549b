//! # Vector Bridge CLI (`vbr`)
//!
//! ## Usage
//!
//! ```bash
//! vbr --config ./config/vbr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `vbr search "<query>"` | Retrieve ranked passages for a query |
//! | `vbr stats` | Index dimension and vector counts |
//! | `vbr inspect` | Show the metadata layout of sampled vectors |
//! | `vbr adapter train` | Fit a space adapter from the live index |
//! | `vbr adapter eval` | Report adapter alignment |
//! | `vbr completions <shell>` | Print shell completions |
//!
//! ## Environment
//!
//! `PINECONE_API_KEY` is required for every index command. `HF_TOKEN` is
//! sent to the inference API when set. `RUST_LOG` overrides the log filter.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use vector_bridge::config::load_config;
use vector_bridge::context::BridgeContext;
use vector_bridge::search::SearchOptions;
use vector_bridge::{adapter_cmd, inspect, search};
use vector_bridge_core::BridgeError;

#[derive(Parser)]
#[command(name = "vbr", version, about = "Cross-space retrieval over a vector index")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = "./config/vbr.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Retrieve passages for a query.
    Search {
        /// The query text.
        query: String,

        /// Number of results to return.
        #[arg(long)]
        top_k: Option<usize>,

        /// Number of candidates requested from the index before filtering.
        #[arg(long)]
        candidate_k: Option<usize>,

        /// Restrict results to one source tag (e.g. a company).
        #[arg(long)]
        source: Option<String>,

        /// Metadata equality filter, repeatable.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Drop results scoring below this.
        #[arg(long)]
        min_score: Option<f32>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show index dimension and vector counts.
    Stats,
    /// Probe the index and print what metadata its vectors carry.
    Inspect {
        /// Number of matches to print.
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// Train or evaluate the space adapter.
    Adapter {
        #[command(subcommand)]
        action: AdapterAction,
    },
    /// Print a shell completion script.
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum AdapterAction {
    /// Sample the index, fit an adapter and save it.
    Train {
        /// Output path (defaults to `adapter.path`).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Report how well the adapter reproduces stored vectors.
    Eval {
        /// JSONL file of `{"id", "text"}` records to evaluate on.
        #[arg(long)]
        pairs: Option<PathBuf>,

        /// Size of a fresh index sample when no pairs file is given.
        #[arg(long)]
        samples: Option<usize>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<BridgeError>() {
                Some(bridge) => eprintln!("error[{}]: {:#}", bridge.kind(), err),
                None => eprintln!("Error: {:#}", err),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "vbr", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    let ctx = BridgeContext::new(config);

    match cli.command {
        Commands::Search {
            query,
            top_k,
            candidate_k,
            source,
            filters,
            min_score,
            json,
        } => {
            let opts = SearchOptions {
                top_k,
                candidate_k,
                source,
                filters,
                min_score,
                json,
            };
            search::run_search(&ctx, &query, opts).await?;
        }
        Commands::Stats => inspect::run_stats(&ctx).await?,
        Commands::Inspect { top_k } => inspect::run_inspect(&ctx, top_k).await?,
        Commands::Adapter { action } => match action {
            AdapterAction::Train { out } => adapter_cmd::run_train(&ctx, out).await?,
            AdapterAction::Eval { pairs, samples } => {
                adapter_cmd::run_eval(&ctx, pairs, samples).await?
            }
        },
        Commands::Completions { .. } => {}
    }
    Ok(())
}
