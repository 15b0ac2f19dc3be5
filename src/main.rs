//! # FIT-FLIX CLI (`fitflix`)
//!
//! ## Usage
//!
//! ```bash
//! fitflix --config ./config/fitflix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fitflix index [--reset]` | Load, split, embed, and store the knowledge base |
//! | `fitflix stats` | Show store and knowledge-base statistics |
//! | `fitflix retrieve "<query>"` | Show the chunks a question would use |
//! | `fitflix ask "<question>"` | Answer one question |
//! | `fitflix chat` | Interactive question answering |
//! | `fitflix serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fitflix::{chat, config, ingest, logging, search, server, stats};

/// FIT-FLIX: answers questions about a fitness brand from its knowledge base.
#[derive(Parser)]
#[command(
    name = "fitflix",
    about = "FIT-FLIX: a retrieval-augmented fitness assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fitflix.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the knowledge base into the vector store.
    ///
    /// Existing chunk ids are kept, so re-running on unchanged files adds
    /// nothing. Use `--reset` after editing files.
    Index {
        /// Clear the collection before indexing.
        #[arg(long)]
        reset: bool,
    },

    /// Show vector store and knowledge-base statistics.
    Stats,

    /// Retrieve the chunks most similar to a query.
    Retrieve {
        /// The query text.
        query: String,

        /// Number of results. Defaults to `[retrieval].top_k`.
        #[arg(long)]
        top_k: Option<usize>,

        /// Only return chunks from this category (e.g. `nutrition`).
        #[arg(long)]
        category: Option<String>,
    },

    /// Answer a single question and exit.
    Ask {
        /// The question.
        question: String,
    },

    /// Start an interactive chat session.
    Chat,

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Index { reset } => {
            ingest::run_index(&cfg, reset).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Retrieve {
            query,
            top_k,
            category,
        } => {
            search::run_retrieve(&cfg, &query, top_k, category.as_deref()).await?;
        }
        Commands::Ask { question } => {
            chat::run_ask(&cfg, &question).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
