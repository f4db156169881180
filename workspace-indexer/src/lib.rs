//! Wiring for the workspace indexer binary: environment configuration and
//! construction of the pipeline's collaborators.

pub mod config;

pub use config::{Dependencies, IndexerConfig};

use thiserror::Error;

/// Startup or runtime failure of the indexer process.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// A required setting is missing or unparsable.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(#[from] workspace_indexer_pipeline::PipelineError),

    #[error("Search index error: {0}")]
    SearchIndexError(#[from] workspace_indexer_repository::SearchIndexError),
}

impl IndexingError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
