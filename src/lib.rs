use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Document contains no searchable content")]
    EmptyDocument,

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Short, stable name of the error category, suitable for wire responses
    #[inline]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::EmptyDocument => "empty_document",
            Self::Embedding(_) => "embedding_error",
            Self::Generation(_) => "generation_error",
            Self::InvalidConfiguration(_) => "invalid_configuration",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Config(_) => "config_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// HTTP-equivalent status code for transports sitting on top of the library.
    ///
    /// Caller-correctable problems map to 400, upstream model failures to 502
    /// and everything else to 500.
    #[inline]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::EmptyDocument => 400,
            Self::Embedding(_) | Self::Generation(_) => 502,
            _ => 500,
        }
    }

    #[inline]
    pub fn is_client_error(&self) -> bool {
        self.status_code() == 400
    }
}

pub mod answer;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod retrieval;
pub mod server;

#[cfg(test)]
pub(crate) mod test_support;

pub use answer::{AnswerComposer, AnswerRequest, AnswerResponse, Generator};
pub use embeddings::{Embedder, Embedding};
