use clap::{Parser, Subcommand};
use paper_rag::Result;
use paper_rag::commands::{AskOptions, ask_question, serve_answers, show_status};
use paper_rag::config::{run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "paper-rag")]
#[command(about = "Ask questions about a document using retrieval-augmented generation")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the embedding cache (default: ~/.paper-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection, chunking and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Answer a question about a document
    Ask {
        /// Path to a plain-text document
        #[arg(long)]
        document: PathBuf,
        /// Question to answer
        #[arg(long)]
        query: String,
        /// Number of chunks to use as context
        #[arg(long)]
        top_k: Option<usize>,
        /// Words per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Words shared by adjacent chunks
        #[arg(long)]
        overlap: Option<usize>,
        /// Do not read or write the persistent embedding cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Answer JSON-lines requests on stdio
    Serve,
    /// Show configuration, Ollama and cache status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir.as_deref();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(config_dir)?;
            } else {
                run_interactive_config(config_dir)?;
            }
        }
        Commands::Ask {
            document,
            query,
            top_k,
            chunk_size,
            overlap,
            no_cache,
        } => {
            let options = AskOptions {
                document,
                query,
                top_k,
                chunk_size,
                overlap,
                no_cache,
            };
            ask_question(config_dir, &options).await?;
        }
        Commands::Serve => {
            serve_answers(config_dir).await?;
        }
        Commands::Status => {
            show_status(config_dir).await?;
        }
    }

    Ok(())
}
