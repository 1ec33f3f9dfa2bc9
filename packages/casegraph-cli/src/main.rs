//! Casegraph CLI
//!
//! Ingest case evidence into Neo4j and ask grounded questions:
//!
//! ```text
//! casegraph ingest data/
//! casegraph ask "Who had a motive to kill the chef?"
//! ```
//!
//! Requires `GOOGLE_API_KEY`, `NEO4J_URI`, `NEO4J_USERNAME`, and
//! `NEO4J_PASSWORD` (read from the environment or a `.env` file).

use anyhow::{Context, Result};
use casegraph::{CaseIndex, GeminiClient, Neo4jStore};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "casegraph", about = "Evidence-grounded case question answering")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every .txt evidence file in a directory
    Ingest {
        /// Directory of case evidence files
        corpus: std::path::PathBuf,
    },

    /// Ask a question about the ingested evidence
    Ask {
        /// The question, in plain language
        question: String,

        /// Print the retrieved context alongside the answer
        #[arg(long)]
        show_context: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,casegraph=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let store = Neo4jStore::from_env().context("connecting to Neo4j")?;
    let gemini = GeminiClient::from_env().context("configuring Gemini")?;
    let index = CaseIndex::new(store.clone(), store.clone(), gemini.clone(), gemini);

    match cli.command {
        Commands::Ingest { corpus } => {
            store
                .ensure_schema()
                .await
                .context("creating Neo4j constraints and vector index")?;

            let report = index
                .ingest_dir(&corpus)
                .await
                .with_context(|| format!("ingesting {}", corpus.display()))?;

            println!("Ingest run {} (prompt {})", report.run_id, report.prompt_hash);
            println!(
                "  chunks: {} processed, {} indexed, {} already indexed",
                report.chunks_processed, report.chunks_indexed, report.chunks_already_indexed
            );
            println!(
                "  entities: {} created, {} merged",
                report.entities_created, report.entities_merged
            );
            println!(
                "  relationships: {} created, {} already known",
                report.relationships_created, report.relationships_existing
            );
            for skipped in &report.skipped_chunks {
                println!(
                    "  skipped chunk from {}: {}",
                    skipped.source_document, skipped.reason
                );
            }
        }
        Commands::Ask {
            question,
            show_context,
        } => {
            let outcome = index.ask(&question).await.context("answering question")?;

            if show_context {
                println!("--- Evidence board ---");
                println!("{}", outcome.context.render_graph_facts());
                println!("--- Case files ---");
                println!("{}", outcome.context.render_evidence());
                println!("----------------------");
            }
            println!("{}", outcome.answer);
        }
    }

    Ok(())
}
