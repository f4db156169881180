//! Messages passed from the consumer to the orchestrator.

use serde_json::Value;
use workspace_indexer_shared::WorkspaceEvent;

use super::offsets::StreamOffset;
use crate::errors::PipelineError;

/// Messages sent through the pipeline channel.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// A decoded workspace event.
    Event { event: WorkspaceEvent, offset: StreamOffset },
    /// A payload that could not be decoded.
    Malformed {
        payload: Value,
        error: PipelineError,
        offset: StreamOffset,
    },
    /// A transport error.
    Error(String),
    /// End of stream.
    End,
}

/// Decode one message payload into a workspace event.
pub fn decode_event(payload: &[u8]) -> Result<WorkspaceEvent, PipelineError> {
    let event: WorkspaceEvent =
        serde_json::from_slice(payload).map_err(|e| PipelineError::malformed(e.to_string()))?;
    if event.storage_code.is_empty() {
        return Err(PipelineError::malformed("strcde must not be empty"));
    }
    Ok(event)
}

/// Payload as recorded in the error sink: the JSON value when it parses,
/// the lossy text otherwise.
pub fn raw_payload(payload: &[u8]) -> Value {
    serde_json::from_slice(payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).into_owned()))
}
