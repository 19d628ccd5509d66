use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use recall::app::App;
use recall::config;
use recall::indexer::ProgressFn;
use recall::searcher::SearchRequest;
use recall::server;

#[derive(Parser)]
#[command(
    name = "recall",
    about = "Recall — a personal knowledge retrieval engine over markdown and PDF vaults",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/recall.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize both index databases
    Init,

    /// Run an index pass in the foreground
    Index {
        /// Vault scope: all, work, or personal
        #[arg(long, default_value = "all")]
        vault: String,

        /// Drop all records first and reindex from scratch
        #[arg(long)]
        full: bool,

        /// Alternate embedding host URL for this run
        #[arg(long)]
        embedding_host: Option<String>,
    },

    /// Search the indices
    Search {
        /// Search query
        query: String,

        /// Search mode: vector, bm25, hybrid, or query
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Vault scope: all, work, or personal
        #[arg(long, default_value = "all")]
        vault: String,

        /// Filter by category
        #[arg(long)]
        category: Option<String>,

        /// Filter by person
        #[arg(long)]
        person: Option<String>,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the HTTP API server
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let app = App::build(cfg).await?;
            app.indexer.ensure_ready().await?;
            println!("Databases initialized successfully.");
        }
        Commands::Index {
            vault,
            full,
            embedding_host,
        } => {
            let app = App::build(cfg).await?;
            let progress: ProgressFn = Arc::new(|processed, total, current_file| {
                eprintln!("index  {} / {}  {}", processed, total, current_file);
            });
            let outcome = if full {
                app.indexer
                    .full_reindex(&vault, embedding_host.as_deref(), Some(&progress))
                    .await?
            } else {
                app.indexer
                    .incremental_reindex(&vault, embedding_host.as_deref(), Some(&progress))
                    .await?
            };
            println!("index {}", vault);
            println!("  chunks indexed: {}", outcome.chunks_indexed);
            println!("  files deleted: {}", outcome.files_deleted);
            if outcome.cancelled {
                println!("  cancelled: partial work committed");
            }
            println!("ok");
        }
        Commands::Search {
            query,
            mode,
            vault,
            category,
            person,
            limit,
        } => {
            let app = App::build(cfg).await?;
            let results = app
                .searcher
                .search(&SearchRequest {
                    query,
                    vault,
                    category,
                    person,
                    date_from: None,
                    date_to: None,
                    limit,
                    mode,
                })
                .await?;

            if results.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, result) in results.iter().enumerate() {
                println!(
                    "{}. [{:.2}] {} / {}",
                    i + 1,
                    result.score,
                    result.vault,
                    result.title
                );
                if let Some(date) = &result.date {
                    println!("    date: {}", date);
                }
                if !result.people.is_empty() {
                    println!("    people: {}", result.people.join(", "));
                }
                println!(
                    "    excerpt: \"{}\"",
                    result.excerpt.replace('\n', " ").trim()
                );
                println!("    path: {}", result.file_path);
                println!();
            }
        }
        Commands::Serve => {
            let app = App::build(cfg).await?;
            server::run_server(app).await?;
        }
    }

    Ok(())
}
