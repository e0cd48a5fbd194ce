//! ThoughtQL CLI
//!
//! - `check`: guard + parse a query, report the verdict
//! - `parse`: print the validated IR as JSON
//! - `run`: execute against a JSON graph snapshot held in a `MemoryStore`
//!
//! Every command takes the query as an argument, or `-` to read stdin.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::env;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thoughtql_query::{ExecutorConfig, QueryError, QueryResult};
use thoughtql_store::MemoryStore;
use tracing_subscriber::EnvFilter;

const DEFAULT_GRAPH_ID: &str = "local";

#[derive(Parser, Debug)]
#[command(name = "thoughtql")]
#[command(author, version, about = "ThoughtQL: Cypher-like queries over a thought graph")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug). `THOUGHTQL_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that a query is supported and well-formed.
    Check {
        /// Query text, or `-` for stdin
        query: String,
    },

    /// Print the validated IR of a query as JSON.
    Parse {
        /// Query text, or `-` for stdin
        query: String,
        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// Execute a query against a graph snapshot.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Query text, or `-` for stdin
    query: String,

    /// JSON graph snapshot (`{entities, links}`); a missing file starts empty
    #[arg(short, long)]
    graph: PathBuf,

    /// Graph id passed to the store (default: $THOUGHTQL_GRAPH_ID, then "local")
    #[arg(long)]
    graph_id: Option<String>,

    /// Write the graph back to the snapshot after a successful run
    #[arg(long)]
    save: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check { query } => cmd_check(&read_query(&query)?),
        Commands::Parse { query, compact } => cmd_parse(&read_query(&query)?, compact),
        Commands::Run(args) => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;
            let result = rt.block_on(cmd_run(&args))?;
            println!("{}", serde_json::to_string_pretty(&result.to_json())?);
            if !result.success {
                bail!("query failed");
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("THOUGHTQL_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn read_query(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("failed to read query from stdin")?;
    Ok(text)
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_check(text: &str) -> Result<()> {
    match thoughtql_query::parse(text) {
        Ok(query) => {
            println!("{} {}", "ok".green().bold(), query.action);
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {}", error_kind(&err).red().bold(), err);
            Err(anyhow!("query rejected"))
        }
    }
}

fn cmd_parse(text: &str, compact: bool) -> Result<()> {
    let query = thoughtql_query::parse(text)?;
    let json = if compact {
        serde_json::to_string(&query)?
    } else {
        serde_json::to_string_pretty(&query)?
    };
    println!("{json}");
    Ok(())
}

async fn cmd_run(args: &RunArgs) -> Result<QueryResult> {
    let text = read_query(&args.query)?;
    let query = thoughtql_query::parse(&text)?;
    let config = ExecutorConfig::from_env()?;
    let graph_id = args
        .graph_id
        .clone()
        .or_else(|| env::var("THOUGHTQL_GRAPH_ID").ok())
        .unwrap_or_else(|| DEFAULT_GRAPH_ID.to_string());

    let store = open_store(&args.graph)?;
    let result = thoughtql_query::execute_with_config(&store, &graph_id, &query, &config).await;
    tracing::info!(
        success = result.success,
        mutations = result.created.len(),
        "query finished"
    );

    if args.save && result.success && !result.created.is_empty() {
        store
            .save(&args.graph)
            .with_context(|| format!("failed to write {}", args.graph.display()))?;
        eprintln!(
            "{} {}",
            "wrote".green().bold(),
            args.graph.display().to_string().bold()
        );
    }
    Ok(result)
}

fn open_store(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "snapshot not found; starting with an empty graph");
        return Ok(MemoryStore::new());
    }
    MemoryStore::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn error_kind(err: &QueryError) -> &'static str {
    match err {
        QueryError::Empty => "empty",
        QueryError::Unsupported { .. } => "unsupported",
        QueryError::Syntax { .. } => "syntax error",
        QueryError::Validation(_) => "invalid",
    }
}
