use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] extract::ExtractError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error(transparent)]
    Upload(#[from] indexer::UploadFailure),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod extract;
pub mod history;
pub mod http;
pub mod indexer;
pub mod pipeline;
pub mod qa;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;
