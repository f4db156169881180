use thiserror::Error;

/// Fragments of engine error messages that indicate a transient failure.
const TRANSIENT_MARKERS: [&str; 5] = ["rate limit", "timeout", "connection", "503", "429"];

/// Failure of a document store operation.
///
/// Operation variants carry the engine's message so callers can log it
/// unchanged.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// A document address or query was rejected before reaching the engine.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Update error: {0}")]
    UpdateError(String),

    #[error("Delete error: {0}")]
    DeleteError(String),

    /// A get, search or aggregation failed.
    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// The engine answered with a body we could not read.
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// At least one item of a bulk request failed.
    #[error("Bulk operation error: {0}")]
    BulkOperationError(String),
}

impl SearchIndexError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexError(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn bulk_operation(msg: impl Into<String>) -> Self {
        Self::BulkOperationError(msg.into())
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Connection failures always qualify. Write and query failures qualify
    /// when the engine reports throttling or unavailability.
    pub fn is_retryable(&self) -> bool {
        let message = match self {
            Self::ConnectionError(_) => return true,
            Self::IndexError(msg)
            | Self::UpdateError(msg)
            | Self::BulkOperationError(msg)
            | Self::QueryError(msg) => msg.to_lowercase(),
            _ => return false,
        };
        TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
    }
}

impl From<serde_json::Error> for SearchIndexError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_failures_are_retryable() {
        assert!(SearchIndexError::connection("refused").is_retryable());
        assert!(SearchIndexError::index("status 429 Too Many Requests").is_retryable());
        assert!(SearchIndexError::bulk_operation("503 Service Unavailable").is_retryable());
        assert!(SearchIndexError::UpdateError("version conflict, Timeout".into()).is_retryable());
    }

    #[test]
    fn test_permanent_failures_are_not_retryable() {
        assert!(!SearchIndexError::index("mapper_parsing_exception").is_retryable());
        assert!(!SearchIndexError::validation("index is required").is_retryable());
        assert!(!SearchIndexError::DeleteError("connection reset".into()).is_retryable());
    }
}
