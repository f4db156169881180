//! Producer module for re-emitting events onto the event stream.

mod kafka_producer;

use async_trait::async_trait;
use workspace_indexer_shared::WorkspaceEvent;

use crate::errors::PipelineError;

pub use kafka_producer::KafkaEventProducer;

/// Re-injects synthesized events for asynchronous processing.
#[async_trait]
pub trait EventProducer: Send + Sync {
    async fn emit(&self, event: &WorkspaceEvent) -> Result<(), PipelineError>;
}

/// Message key keeping one object's events on one partition.
pub fn event_key(event: &WorkspaceEvent) -> String {
    match &event.object_id {
        Some(object_id) => format!("{}:{}:{}", event.storage_code, event.access_group_id, object_id),
        None => format!("{}:{}", event.storage_code, event.access_group_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workspace_indexer_shared::{EventType, ObjectRef};

    #[test]
    fn test_event_key() {
        let event = WorkspaceEvent::new_version(&ObjectRef::new("WS", 1, "2", 3));
        assert_eq!(event_key(&event), "WS:1:2");

        let group = WorkspaceEvent::new(EventType::PublishAccessGroup, "WS", 1);
        assert_eq!(event_key(&group), "WS:1");
    }
}
