use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

mod cli;
mod config;
mod error;
mod graph;
mod ignore;
mod impact;
mod indexer;
mod packs;
mod parser;
mod resolver;
mod store;
mod tokens;

use error::EngineError;
use indexer::CancelToken;

#[derive(Parser)]
#[command(name = "pui")]
#[command(version = "0.1.0")]
#[command(about = "Token-budgeted code intelligence index for coding agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the index
    Index {
        /// Re-parse everything, ignoring stored hashes
        #[arg(long)]
        force: bool,

        /// Count what would change without writing
        #[arg(long)]
        stats: bool,

        /// Keep watching and re-index on changes
        #[arg(long)]
        watch: bool,
    },

    /// Generate the repository map pack
    Repomap {
        /// Directory tree depth
        #[arg(long, default_value_t = 4)]
        depth: usize,

        /// Focus on a subdirectory
        #[arg(long)]
        focus: Option<String>,

        /// Token budget
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Output format: markdown|json
        #[arg(long, default_value = "markdown")]
        format: String,
    },

    /// Full-text search over symbols
    Find {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Output format: markdown|json
        #[arg(long, default_value = "markdown")]
        format: String,
    },

    /// Generate a symbol detail pack
    Zoom {
        /// Symbol id, stable id, name, or path:line
        target: String,

        /// Token budget
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Output format: markdown|json
        #[arg(long, default_value = "markdown")]
        format: String,
    },

    /// Traverse the call graph around a symbol
    Graph {
        /// Symbol id or name
        #[arg(long)]
        symbol: String,

        /// Traversal depth
        #[arg(long, default_value_t = 2)]
        depth: u32,

        /// Direction: in|out|both
        #[arg(long, default_value = "both")]
        direction: String,

        /// Output format: mermaid|dot|json
        #[arg(long, default_value = "mermaid")]
        format: String,
    },

    /// Analyze the blast radius of changes
    Impact {
        /// Changed file paths
        #[arg(long = "files", num_args = 1..)]
        files: Vec<String>,

        /// Changed symbol names
        #[arg(long = "symbols", num_args = 1..)]
        symbols: Vec<String>,

        /// Git diff range, e.g. HEAD~1..HEAD
        #[arg(long)]
        git_diff: Option<String>,

        /// Traversal depth
        #[arg(long, default_value_t = 2)]
        depth: u32,

        /// Also surface tests that import changed modules
        #[arg(long)]
        include_tests: bool,

        /// Omit per-file rationales
        #[arg(long)]
        no_explain: bool,

        /// Token budget
        #[arg(long)]
        max_tokens: Option<usize>,

        /// Output format: markdown|json
        #[arg(long, default_value = "markdown")]
        format: String,
    },

    /// Show index statistics
    Stats {
        /// Per-language breakdown
        #[arg(long)]
        detailed: bool,
    },

    /// List supported languages
    Languages,
}

fn init_logging(debug: bool, verbose: bool) {
    let level = if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.verbose);

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; finishing the current file");
                cancel.cancel();
            }
        });
    }

    let result = dispatch(cli, cancel).await;
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn dispatch(cli: Cli, cancel: CancelToken) -> Result<(), EngineError> {
    let project = cli.project.clone();
    match cli.command {
        Commands::Index {
            force,
            stats,
            watch,
        } => cli::index::run(project, force, stats, watch, cancel).await,

        Commands::Repomap {
            depth,
            focus,
            max_tokens,
            format,
        } => cli::repomap::run(project, depth, focus, max_tokens, format).await,

        Commands::Find {
            query,
            limit,
            format,
        } => cli::find::run(project, query, limit, format).await,

        Commands::Zoom {
            target,
            max_tokens,
            format,
        } => cli::zoom::run(project, target, max_tokens, format).await,

        Commands::Graph {
            symbol,
            depth,
            direction,
            format,
        } => cli::graph::run(project, symbol, depth, direction, format).await,

        Commands::Impact {
            files,
            symbols,
            git_diff,
            depth,
            include_tests,
            no_explain,
            max_tokens,
            format,
        } => {
            if files.is_empty() && symbols.is_empty() && git_diff.is_none() {
                return Err(EngineError::InvalidArgument(
                    "impact needs --files, --symbols, or --git-diff".to_string(),
                ));
            }
            cli::impact::run(
                project,
                files,
                symbols,
                git_diff,
                depth,
                include_tests,
                !no_explain,
                max_tokens,
                format,
            )
            .await
        }

        Commands::Stats { detailed } => cli::stats::run(project, detailed).await,

        Commands::Languages => {
            cli::languages::run();
            Ok(())
        }
    }
}
