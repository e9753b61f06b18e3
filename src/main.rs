use clap::{Parser, Subcommand};
use qa_search::commands::{
    QueryOptions, export, ingest_folder, list_collections, query, show_stats,
};
use qa_search::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qa-search")]
#[command(about = "Semantic search over spreadsheet question/answer pairs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, index and rewrite settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed the QA pairs of every spreadsheet in a folder
    Ingest {
        /// Folder containing .xlsx/.xls files
        folder: PathBuf,
        /// Entries embedded and written per batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// Drop the collection before ingesting
        #[arg(long)]
        clear: bool,
    },
    /// Search for answers; without a question, starts an interactive session
    Query {
        /// Question to search for
        #[arg(short, long)]
        question: Option<String>,
        /// Number of nearest entries to consider
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Minimum similarity score between 0 and 1
        #[arg(short = 's', long)]
        min_score: Option<f32>,
        /// Force interactive mode
        #[arg(short, long)]
        interactive: bool,
        /// Search the question verbatim
        #[arg(long)]
        no_rewrite: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show entry count of the active collection
    Stats,
    /// Export every indexed entry to JSON
    Export {
        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List collections in the vector database
    Collections,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest {
            folder,
            batch_size,
            clear,
        } => {
            ingest_folder(&folder, batch_size, clear).await?;
        }
        Commands::Query {
            question,
            top_k,
            min_score,
            interactive,
            no_rewrite,
            json,
        } => {
            query(QueryOptions {
                question,
                top_k,
                min_score,
                interactive,
                no_rewrite,
                json,
            })
            .await?;
        }
        Commands::Stats => {
            show_stats().await?;
        }
        Commands::Export { output } => {
            export(output).await?;
        }
        Commands::Collections => {
            list_collections().await?;
        }
    }

    Ok(())
}
