//! Error sink: durable record of failed events.
//!
//! Every event a handler fails on is appended exactly once, with the
//! offending payload, the handler name and the error detail.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::PipelineError;

/// One failure entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Event payload as received (or the raw text, for undecodable messages).
    pub event: Value,
    /// Handler that failed.
    pub handler: String,
    /// Error kind name.
    pub kind: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(event: Value, handler: impl Into<String>, error: &PipelineError) -> Self {
        Self {
            event,
            handler: handler.into(),
            kind: error.kind().to_string(),
            detail: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only destination for failure records.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn append(&self, record: ErrorRecord) -> Result<(), PipelineError>;
}

/// Error sink writing one JSON line per record to a file.
pub struct FileErrorSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileErrorSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ErrorSink for FileErrorSink {
    async fn append(&self, record: ErrorRecord) -> Result<(), PipelineError> {
        let mut line =
            serde_json::to_vec(&record).map_err(|e| PipelineError::error_sink(e.to_string()))?;
        line.push(b'\n');

        // Keep concurrent records on separate lines
        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| PipelineError::error_sink(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(&line)
            .await
            .map_err(|e| PipelineError::error_sink(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| PipelineError::error_sink(e.to_string()))?;

        debug!(path = %self.path.display(), handler = %record.handler, "Recorded failure");
        Ok(())
    }
}

/// Error sink keeping records in memory.
#[derive(Default)]
pub struct MemoryErrorSink {
    records: Mutex<Vec<ErrorRecord>>,
}

impl MemoryErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl ErrorSink for MemoryErrorSink {
    async fn append(&self, record: ErrorRecord) -> Result<(), PipelineError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}
