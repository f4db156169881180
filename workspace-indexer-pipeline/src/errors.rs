//! Error types for the workspace indexer pipeline.

use thiserror::Error;
use workspace_indexer_repository::SearchIndexError;

/// Errors that can occur in the workspace indexer pipeline.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// No type mapping exists for an object type.
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// The workspace is unavailable or the object is missing.
    #[error("Object fetch error: {0}")]
    ObjectFetchError(String),

    /// The type-specific extractor failed, timed out, or returned garbage.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// The search engine rejected a write or query.
    #[error("Index write error: {0}")]
    IndexWriteError(#[from] SearchIndexError),

    /// The event is missing required fields or cannot be decoded.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Failed to re-emit an event.
    #[error("Producer error: {0}")]
    ProducerError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Failed to record a failure in the error sink.
    #[error("Error sink error: {0}")]
    ErrorSinkError(String),

    /// Handling did not finish before its deadline.
    #[error("Handler timed out after {0} seconds")]
    Timeout(u64),
}

impl PipelineError {
    /// Create an unknown type error.
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType(type_name.into())
    }

    /// Create an object fetch error.
    pub fn object_fetch(msg: impl Into<String>) -> Self {
        Self::ObjectFetchError(msg.into())
    }

    /// Create an extraction error.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::ExtractionError(msg.into())
    }

    /// Create a malformed event error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }

    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a producer error.
    pub fn producer(msg: impl Into<String>) -> Self {
        Self::ProducerError(msg.into())
    }

    /// Create an error sink error.
    pub fn error_sink(msg: impl Into<String>) -> Self {
        Self::ErrorSinkError(msg.into())
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownType(_) => "UnknownType",
            Self::ObjectFetchError(_) => "ObjectFetchError",
            Self::ExtractionError(_) => "ExtractionError",
            Self::IndexWriteError(_) => "IndexWriteError",
            Self::MalformedEvent(_) => "MalformedEvent",
            Self::KafkaError(_) => "KafkaError",
            Self::ProducerError(_) => "ProducerError",
            Self::ChannelError(_) => "ChannelError",
            Self::ErrorSinkError(_) => "ErrorSinkError",
            Self::Timeout(_) => "Timeout",
        }
    }
}

impl From<rdkafka::error::KafkaError> for PipelineError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}
