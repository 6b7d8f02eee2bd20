//! # DocsChat CLI
//!
//! Encode a user's documents into their index and ask questions about them.
//!
//! ## Commands
//!
//! - `docschat init` - create the `data/`, `index/` and `env/` folders
//! - `docschat encode --user <USER>` - rebuild the user's index
//! - `docschat ask --user <USER> <QUESTION>` - answer from the user's index
//!
//! ## Examples
//!
//! ```bash
//! docschat --root /srv/docschat init
//! cp report.pdf /srv/docschat/data/alice/
//! echo "OPENAI_API_KEY=sk-..." > /srv/docschat/env/alice.env
//! docschat --root /srv/docschat encode --user alice
//! docschat --root /srv/docschat ask --user alice "What are the key findings?" --show-context
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docschat_rag::openai::OpenAIProviderFactory;
use docschat_rag::{Answer, DocsChat, RagConfig, UserPaths};
use tracing::info;

#[derive(Parser)]
#[command(name = "docschat")]
#[command(about = "Chat with your documents")]
#[command(version)]
struct Cli {
    /// Root folder holding data/, index/ and env/
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Path to a TOML config file (chunking, retrieval and timeout settings)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the base folders under the root
    Init,

    /// Rebuild a user's index from their documents
    Encode {
        /// User whose documents are encoded
        #[arg(short, long)]
        user: String,
    },

    /// Ask a question about a user's documents
    Ask {
        /// User whose index is queried
        #[arg(short, long)]
        user: String,

        /// The question
        question: String,

        /// Also print the retrieved passages
        #[arg(long)]
        show_context: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Only logging variables are expected here; API keys live in per-user env files.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RagConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RagConfig::default(),
    };
    let paths = UserPaths::new(&cli.root);

    match cli.command {
        Commands::Init => {
            paths.initialize().context("failed to create base folders")?;
            println!("Initialized {}", paths.root().display());
        }
        Commands::Encode { user } => {
            let chat = service(paths, config)?;
            let summary = chat
                .encode_documents(&user)
                .await
                .with_context(|| format!("failed to encode documents for '{user}'"))?;
            match cli.format {
                OutputFormat::Text => {
                    println!(
                        "Encoded {} document(s) into {} chunk(s) for '{}' in {:.1}s",
                        summary.documents,
                        summary.chunks,
                        summary.user,
                        summary.elapsed.as_secs_f64()
                    );
                    println!("Index: {}", summary.index_path.display());
                }
                OutputFormat::Json => {
                    let value = serde_json::json!({
                        "user": summary.user,
                        "documents": summary.documents,
                        "chunks": summary.chunks,
                        "index_path": summary.index_path,
                        "elapsed_ms": summary.elapsed.as_millis() as u64,
                    });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
            }
        }
        Commands::Ask { user, question, show_context } => {
            let chat = service(paths, config)?;
            info!(user = %user, "question received");
            let answer = chat
                .ask(&user, &question)
                .await
                .with_context(|| format!("failed to answer question for '{user}'"))?;
            match cli.format {
                OutputFormat::Text => print_answer(&answer, show_context),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&answer)?),
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn service(paths: UserPaths, config: RagConfig) -> Result<DocsChat> {
    DocsChat::filesystem(paths, config, Arc::new(OpenAIProviderFactory::new()))
        .context("failed to set up DocsChat")
}

fn print_answer(answer: &Answer, show_context: bool) {
    if show_context {
        for (i, hit) in answer.contexts.hits.iter().enumerate() {
            println!(
                "Context {} ({}, score {:.3}):",
                i + 1,
                hit.chunk.source_document,
                hit.score
            );
            println!("{}\n", hit.chunk.content);
        }
    }
    println!("{}", answer.text);
}
