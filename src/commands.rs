use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::answer::{AnswerComposer, AnswerRequest};
use crate::config::Config;
use crate::database::{Database, KeyValueStore, MemoryStore};
use crate::embeddings::OllamaClient;
use crate::server::AnswerServer;

/// Per-invocation overrides for `ask`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AskOptions {
    pub document: PathBuf,
    pub query: String,
    pub top_k: Option<usize>,
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
    /// Keep embeddings in memory for this run instead of the SQLite cache
    pub no_cache: bool,
}

impl AskOptions {
    /// Apply the overrides on top of the loaded configuration
    #[inline]
    pub fn apply(&self, config: &mut Config) {
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunking.chunk_size = chunk_size;
        }
        if let Some(overlap) = self.overlap {
            config.chunking.overlap = overlap;
        }
    }
}

async fn open_store(config: &Config, in_memory: bool) -> Result<Arc<dyn KeyValueStore>> {
    if in_memory {
        info!("Using in-memory embedding cache");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let database = Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize embedding cache database")?;
    Ok(Arc::new(database))
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let bar = if console::user_attended_stderr() {
        let bar = ProgressBar::new_spinner()
            .with_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?);
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    Ok(bar)
}

/// Answer one question about a document file and print the answer
#[inline]
pub async fn ask_question(config_dir: Option<&Path>, options: &AskOptions) -> Result<()> {
    let mut config = Config::load_from(config_dir)?;
    options.apply(&mut config);

    let document_text = tokio::fs::read_to_string(&options.document)
        .await
        .with_context(|| format!("Failed to read document: {}", options.document.display()))?;

    let store = open_store(&config, options.no_cache).await?;
    let composer = AnswerComposer::from_config(&config, store)?;

    info!(
        "Answering question against {} ({} bytes)",
        options.document.display(),
        document_text.len()
    );

    let bar = spinner("Retrieving context and generating answer")?;
    let result = composer
        .answer_query(&AnswerRequest::new(document_text, options.query.clone()))
        .await;
    bar.finish_and_clear();

    let stats = composer.embedding_cache().stats();
    info!(
        "Embedding cache: {} hits, {} misses, {} store failures",
        stats.hits(),
        stats.misses(),
        stats.store_failures()
    );

    let response = result?;
    println!("{}", response.answer);
    Ok(())
}

/// Serve JSON-lines answer requests on stdio until EOF
#[inline]
pub async fn serve_answers(config_dir: Option<&Path>) -> Result<()> {
    let config = Config::load_from(config_dir).context("Failed to load configuration")?;

    // Verify Ollama connectivity before starting
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                info!(
                    "Ollama connected at {}:{} (embedding: {}, generation: {})",
                    config.ollama.host,
                    config.ollama.port,
                    config.ollama.embedding_model,
                    config.ollama.generation_model
                );
            }
            Err(e) => {
                warn!("Ollama is reachable but unhealthy: {}", e);
                eprintln!("Warning: Ollama may not be ready. Requests may fail.");
            }
        },
        Err(e) => {
            error!("Failed to create Ollama client: {}", e);
            eprintln!("Use 'paper-rag config' to update connection settings.");
            return Err(e);
        }
    }

    let store = open_store(&config, false).await?;
    let composer = Arc::new(AnswerComposer::from_config(&config, store)?);

    Arc::new(AnswerServer::new(composer)).serve_stdio().await
}

/// Load the configuration for a report, keeping the requested directory when the file is unusable
#[inline]
pub fn load_for_report(config_dir: Option<&Path>) -> (Config, Option<anyhow::Error>) {
    match Config::load_from(config_dir) {
        Ok(config) => (config, None),
        Err(e) => {
            let config = config_dir.map_or_else(Config::default, Config::default_in);
            (config, Some(e))
        }
    }
}

/// Print configuration, Ollama reachability and embedding cache size
#[inline]
pub async fn show_status(config_dir: Option<&Path>) -> Result<()> {
    let (config, load_error) = load_for_report(config_dir);

    println!("paper-rag status");
    println!("{}", "=".repeat(50));
    println!();

    println!("Configuration:");
    if let Some(e) = load_error {
        warn!("Failed to load configuration: {:#}", e);
        println!("   Failed to load configuration - {e:#}");
        println!("   Showing defaults");
    }
    println!("   Directory: {}", config.get_base_dir().display());
    println!(
        "   Chunking: {} words, {} overlap",
        config.chunking.chunk_size, config.chunking.overlap
    );
    println!(
        "   Retrieval: top {} chunks, {} cached document indexes",
        config.retrieval.top_k, config.retrieval.index_cache_capacity
    );
    println!();

    println!("Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match client.health_check() {
            Ok(()) => {
                println!(
                    "   Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   Embedding model: {}", config.ollama.embedding_model);
                println!("   Generation model: {}", config.ollama.generation_model);
                println!("   Batch Size: {}", config.ollama.batch_size);
            }
            Err(e) => {
                println!("   Ollama: Connected but unhealthy - {}", e);
            }
        },
        Err(e) => {
            println!("   Ollama: Failed to connect - {}", e);
        }
    }
    println!();

    println!("Embedding Cache:");
    match Database::initialize_from_config_dir(config.get_base_dir()).await {
        Ok(database) => match database.cache_summary().await {
            Ok(summary) => {
                println!("   SQLite: {}", config.database_path().display());
                println!("   Entries: {}", summary.entries);
                println!("   Size: {} bytes", summary.total_bytes);
            }
            Err(e) => println!("   Failed to read cache summary - {}", e),
        },
        Err(e) => {
            println!("   SQLite: Failed to connect - {}", e);
        }
    }

    Ok(())
}
