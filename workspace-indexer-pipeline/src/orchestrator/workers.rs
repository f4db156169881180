//! Partitioned worker pool.
//!
//! Each worker owns a bounded queue. Events are routed by the hash of their
//! access group, so every event of a group (object or group-wide) lands on
//! the same worker and is handled in submission order. A message's offset
//! is released to the ledger only after its event has been dispatched.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use workspace_indexer_shared::{EventScope, WorkspaceEvent};

use crate::consumer::{OffsetLedger, StreamOffset};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::errors::PipelineError;

/// Worker index for a scope: the hash of its access group.
pub fn partition_for(scope: &EventScope, worker_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    scope.group_scope().hash(&mut hasher);
    (hasher.finish() % worker_count.max(1) as u64) as usize
}

type Job = (WorkspaceEvent, StreamOffset);

pub struct WorkerPool {
    senders: Vec<mpsc::Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` workers, each with a queue of `queue_size` events.
    pub fn start(
        dispatcher: Arc<Dispatcher>,
        ledger: Arc<OffsetLedger>,
        worker_count: usize,
        queue_size: usize,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let mut senders = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);

        for worker in 0..worker_count {
            let (tx, mut rx) = mpsc::channel::<Job>(queue_size.max(1));
            let dispatcher = dispatcher.clone();
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                while let Some((event, offset)) = rx.recv().await {
                    match dispatcher.dispatch(&event).await {
                        DispatchOutcome::Handled => {}
                        DispatchOutcome::Skipped => debug!(worker = worker, "Event skipped"),
                        DispatchOutcome::Failed(e) => {
                            debug!(worker = worker, error = %e, "Event failed")
                        }
                    }
                    // Failures are in the error sink by now
                    ledger.complete(offset);
                }
                debug!(worker = worker, "Worker queue closed");
            }));
            senders.push(tx);
        }

        info!(workers = worker_count, "Started worker pool");
        Self { senders, handles }
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Queue an event on the worker owning its access group.
    ///
    /// Waits while that worker's queue is full. `offset` must already be
    /// registered with the ledger.
    pub async fn submit(&self, event: WorkspaceEvent, offset: StreamOffset) -> Result<(), PipelineError> {
        let worker = partition_for(&event.scope(), self.senders.len());
        self.senders[worker]
            .send((event, offset))
            .await
            .map_err(|e| PipelineError::ChannelError(format!("worker {} stopped: {}", worker, e)))
    }

    /// Close every queue and wait for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.senders);
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker terminated abnormally");
            }
        }
        info!("Worker pool drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::RecordingCommitter;
    use crate::dispatcher::Collaborators;
    use crate::error_sink::MemoryErrorSink;
    use crate::extractor::ExtractorRunner;
    use crate::resolver::{TypeMapping, TypeResolver};
    use crate::test_support::{FakeWorkspace, GatedExtractor, RecordingProducer, ScriptedExtractor};
    use std::time::Duration;
    use workspace_indexer_repository::{InMemoryDocumentStore, SearchIndexClient};
    use workspace_indexer_shared::{DocumentCategory, EventType, ObjectKey, ObjectRef};

    struct Fixture {
        store: Arc<InMemoryDocumentStore>,
        workspace: Arc<FakeWorkspace>,
        sink: Arc<MemoryErrorSink>,
        committer: Arc<RecordingCommitter>,
        ledger: Arc<OffsetLedger>,
        dispatcher: Arc<Dispatcher>,
    }

    fn fixture(extractor: Arc<dyn ExtractorRunner>) -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let workspace = Arc::new(FakeWorkspace::new());
        let sink = Arc::new(MemoryErrorSink::new());
        let committer = Arc::new(RecordingCommitter::default());
        let resolver = TypeResolver::new([TypeMapping::new("KBaseGenomes.Genome")
            .with_extractor("genome_indexer", "kbase/genome")]);

        let dispatcher = Arc::new(Dispatcher::new(Collaborators {
            workspace: workspace.clone(),
            extractor,
            producer: Arc::new(RecordingProducer::new()),
            index: Arc::new(SearchIndexClient::new(Box::new(store.clone()))),
            resolver: Arc::new(resolver),
            error_sink: sink.clone(),
        }));

        Fixture {
            store,
            workspace,
            sink,
            ledger: Arc::new(OffsetLedger::new(committer.clone())),
            committer,
            dispatcher,
        }
    }

    impl Fixture {
        async fn submit(&self, pool: &WorkerPool, event: WorkspaceEvent, offset: i64) {
            let offset = StreamOffset::new(0, offset);
            self.ledger.begin(offset);
            pool.submit(event, offset).await.unwrap();
        }
    }

    #[test]
    fn test_partition_is_stable_per_access_group() {
        let object = EventScope::Object(ObjectKey::new("WS", 1, "2"));
        let group = WorkspaceEvent::new(EventType::PublishAccessGroup, "WS", 1).scope();

        let worker = partition_for(&object, 4);

        assert!(worker < 4);
        assert_eq!(partition_for(&object, 4), worker);
        assert_eq!(partition_for(&group, 4), worker);
        assert_eq!(partition_for(&object, 0), 0);
    }

    #[tokio::test]
    async fn test_pool_drains_and_keeps_object_order() {
        let f = fixture(Arc::new(ScriptedExtractor::new()));
        for object_id in ["2", "3"] {
            for version in 1..=4 {
                f.workspace.add_object(1, object_id, version, "foo", "X.Foo-1.0").await;
            }
        }
        let pool = WorkerPool::start(f.dispatcher.clone(), f.ledger.clone(), 3, 2);

        let mut offset = 0;
        for version in 1..=4 {
            for object_id in ["2", "3"] {
                let event = WorkspaceEvent::new_version(&ObjectRef::new("WS", 1, object_id, version));
                f.submit(&pool, event, offset).await;
                offset += 1;
            }
        }
        pool.shutdown().await;

        let documents = f.store.sources("generic", DocumentCategory::Data).await;
        assert_eq!(documents.len(), 8);
        let latest: Vec<(String, u64)> = documents
            .iter()
            .filter(|doc| doc["islast"] == true)
            .map(|doc| {
                (
                    doc["object_id"].as_str().unwrap().to_string(),
                    doc["version"].as_u64().unwrap(),
                )
            })
            .collect();
        assert_eq!(latest, vec![("2".to_string(), 4), ("3".to_string(), 4)]);
        assert!(f.sink.is_empty().await);
        assert_eq!(f.committer.commits().last(), Some(&(0, 8)));
        assert_eq!(f.ledger.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_offset_is_committed_only_after_dispatch() {
        let extractor = Arc::new(GatedExtractor::new());
        let f = fixture(extractor.clone());
        f.workspace.add_object(1, "3", 1, "genome", "KBaseGenomes.Genome-14.2").await;
        f.workspace.add_object(2, "4", 1, "foo", "X.Foo-1.0").await;
        let pool = WorkerPool::start(f.dispatcher.clone(), f.ledger.clone(), 1, 4);

        f.submit(&pool, WorkspaceEvent::new_version(&ObjectRef::new("WS", 1, "3", 1)), 0).await;
        f.submit(&pool, WorkspaceEvent::new_version(&ObjectRef::new("WS", 2, "4", 1)), 1).await;
        extractor.wait_entered().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(f.committer.commits().is_empty());
        assert_eq!(f.ledger.in_flight(), 2);

        extractor.release(1);
        pool.shutdown().await;

        assert_eq!(f.committer.commits(), vec![(0, 1), (0, 2)]);
        assert!(f.store.source("genome", DocumentCategory::Data, "WS:1:3:1").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_event_is_recorded_before_commit() {
        let f = fixture(Arc::new(ScriptedExtractor::new()));
        let pool = WorkerPool::start(f.dispatcher.clone(), f.ledger.clone(), 2, 2);

        f.submit(&pool, WorkspaceEvent::new_version(&ObjectRef::new("WS", 1, "9", 1)), 0).await;
        pool.shutdown().await;

        assert_eq!(f.sink.records().await.len(), 1);
        assert_eq!(f.committer.commits(), vec![(0, 1)]);
    }
}
