//! Fan-out of bulk operations into per-object events.

use std::sync::Arc;

use tracing::{info, instrument};
use workspace_indexer_shared::WorkspaceEvent;

use crate::errors::PipelineError;
use crate::producer::EventProducer;
use crate::workspace::WorkspaceClient;

/// Enumerates the objects of an access group and re-emits one
/// NEW_VERSION event per object for its latest version.
pub struct FanoutProducer {
    workspace: Arc<dyn WorkspaceClient>,
    producer: Arc<dyn EventProducer>,
}

impl FanoutProducer {
    pub fn new(workspace: Arc<dyn WorkspaceClient>, producer: Arc<dyn EventProducer>) -> Self {
        Self {
            workspace,
            producer,
        }
    }

    /// Emit one event per object in the access group.
    ///
    /// Emission stops at the first producer failure. Re-running re-emits
    /// every object, which is safe because indexing is idempotent.
    ///
    /// # Returns
    ///
    /// * `Ok(count)` - Number of events emitted
    #[instrument(skip(self))]
    pub async fn fan_out(&self, storage_code: &str, access_group_id: i64) -> Result<usize, PipelineError> {
        let objects = self.workspace.list_objects(access_group_id).await?;

        for info in &objects {
            let event = WorkspaceEvent::new_version(&info.object_ref(storage_code))
                .with_object_type(info.object_type(), info.type_version());
            self.producer.emit(&event).await?;
        }

        info!(count = objects.len(), "Fanned out access group");
        Ok(objects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeWorkspace, RecordingProducer};
    use workspace_indexer_shared::EventType;

    #[tokio::test]
    async fn test_emits_latest_version_of_each_object() {
        let workspace = Arc::new(FakeWorkspace::new());
        workspace.add_object(1, "2", 1, "a", "X.Foo-1.0").await;
        workspace.add_object(1, "2", 2, "a", "X.Foo-1.0").await;
        workspace.add_object(1, "3", 1, "b", "KBaseGenomes.Genome-14.2").await;
        workspace.add_object(5, "1", 1, "other", "X.Foo-1.0").await;
        let producer = Arc::new(RecordingProducer::new());

        let count = FanoutProducer::new(workspace, producer.clone())
            .fan_out("WS", 1)
            .await
            .unwrap();

        let events = producer.events().await;
        assert_eq!(count, 2);
        assert!(events.iter().all(|e| e.event_type == EventType::NewVersion));
        assert_eq!(events[0].object_id.as_deref(), Some("2"));
        assert_eq!(events[0].version, Some(2));
        assert_eq!(events[1].object_type.as_deref(), Some("KBaseGenomes.Genome"));
        assert_eq!(events[1].object_type_version, Some(14));
    }

    #[tokio::test]
    async fn test_producer_failure_is_reported() {
        let workspace = Arc::new(FakeWorkspace::new());
        workspace.add_object(1, "2", 1, "a", "X.Foo-1.0").await;
        let producer = Arc::new(RecordingProducer::new());
        producer.set_fail(true);

        let result = FanoutProducer::new(workspace, producer).fan_out("WS", 1).await;

        assert!(matches!(result, Err(PipelineError::ProducerError(_))));
    }
}
