//! # Syntopical CLI (`syntopical`)
//!
//! ```bash
//! syntopical init
//! syntopical upload ./papers
//! syntopical list
//! syntopical search "sparse attention" --k 5
//! syntopical chat
//! syntopical analyze "the role of attention in sequence models"
//! syntopical arxiv fetch "retrieval augmented generation" --max-results 3
//! syntopical start ./papers
//! ```
//!
//! Results go to stdout; logs go to stderr (`-v` for info, `-vv` for debug,
//! or `RUST_LOG`).

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use syntopical::{arxiv, chat, config, ingest, migrate, papers, search, start};

/// Syntopical: question answering across many academic papers at once.
#[derive(Parser)]
#[command(
    name = "syntopical",
    about = "Ask questions across a corpus of academic papers",
    version,
    long_about = "Syntopical indexes academic papers (PDF or text) into a local SQLite vector \
    store and answers questions by retrieving passages from many papers, assembling them within \
    a token budget, and asking a language model to synthesize an answer with sources."
)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/syntopical.toml")]
    config: PathBuf,

    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite database and schema. Idempotent.
    Init,

    /// Extract and index papers from files or directories.
    ///
    /// Directories are searched recursively using `[upload] include_globs`.
    /// Unchanged papers are skipped.
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Re-index even if the paper is unchanged.
        #[arg(long)]
        force: bool,
    },

    /// List indexed papers.
    List,

    /// Show one paper's metadata and abstract.
    Show {
        id: String,
    },

    /// Remove a paper and its chunks.
    Remove {
        id: String,
    },

    /// Retrieve the most relevant passages for a query (no generation).
    Search {
        query: String,

        /// Number of passages (defaults to `[retrieval] top_k`).
        #[arg(long)]
        k: Option<usize>,

        /// Restrict to these paper ids (repeatable).
        #[arg(long = "paper")]
        papers: Vec<String>,
    },

    /// Interactive question answering over the corpus.
    Chat {
        /// Restrict to these paper ids (repeatable).
        #[arg(long = "paper")]
        papers: Vec<String>,
    },

    /// Structured syntopical analysis of a topic across papers.
    Analyze {
        topic: String,

        /// Restrict to these paper ids (repeatable).
        #[arg(long = "paper")]
        papers: Vec<String>,

        /// Print the answer, sources and context as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Search and download papers from arXiv.
    Arxiv {
        #[command(subcommand)]
        action: ArxivAction,
    },

    /// Upload papers (or fetch them from arXiv), then start chatting.
    Start {
        #[arg(required_unless_present = "arxiv")]
        paths: Vec<PathBuf>,

        /// Fetch and index the hits for this arXiv query first.
        #[arg(long)]
        arxiv: Option<String>,

        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum ArxivAction {
    /// Search arXiv and print the hits.
    Search {
        query: String,
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Download the hits into `[arxiv] download_dir` and upload them.
    Fetch {
        query: String,
        #[arg(long)]
        max_results: Option<usize>,
        /// Download only.
        #[arg(long)]
        no_index: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "syntopical", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Upload { paths, force } => {
            ingest::run_upload(&cfg, &paths, force).await?;
        }
        Commands::List => {
            papers::run_list(&cfg).await?;
        }
        Commands::Show { id } => {
            papers::run_show(&cfg, &id).await?;
        }
        Commands::Remove { id } => {
            papers::run_remove(&cfg, &id).await?;
        }
        Commands::Search { query, k, papers } => {
            search::run_search(&cfg, &query, k, &papers).await?;
        }
        Commands::Chat { papers } => {
            chat::run_chat(&cfg, &papers).await?;
        }
        Commands::Analyze {
            topic,
            papers,
            json,
        } => {
            chat::run_analyze(&cfg, &topic, &papers, json).await?;
        }
        Commands::Arxiv { action } => match action {
            ArxivAction::Search { query, max_results } => {
                arxiv::run_arxiv_search(&cfg, &query, max_results).await?;
            }
            ArxivAction::Fetch {
                query,
                max_results,
                no_index,
            } => {
                arxiv::run_arxiv_fetch(&cfg, &query, max_results, no_index).await?;
            }
        },
        Commands::Start {
            paths,
            arxiv,
            max_results,
        } => {
            start::run_start(&cfg, &paths, arxiv.as_deref(), max_results).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
