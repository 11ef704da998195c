use std::path::PathBuf;

use clap::{Parser, Subcommand};
use site_insights::Result;
use site_insights::commands::{search_payload, show_chunks, show_config};

#[derive(Parser)]
#[command(name = "site-insights")]
#[command(about = "Semantic store and search over scraped website content")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a scraped payload and rank its chunks against a query
    Search {
        /// Path to a scraper payload JSON file
        payload: PathBuf,
        /// Query text to rank chunks against
        query: String,
        /// Maximum number of matches to print
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        /// Optional session id scoping the stored entry
        #[arg(long)]
        session: Option<String>,
    },
    /// Show which fragments of a payload survive chunk preparation
    Chunks {
        /// Path to a scraper payload JSON file
        payload: PathBuf,
    },
    /// Show the resolved configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            payload,
            query,
            top_k,
            session,
        } => {
            search_payload(&payload, &query, top_k, session.as_deref())?;
        }
        Commands::Chunks { payload } => {
            show_chunks(&payload)?;
        }
        Commands::Config => {
            show_config()?;
        }
    }

    Ok(())
}
