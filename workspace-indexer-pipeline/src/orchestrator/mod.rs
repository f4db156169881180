//! Event routing from the stream to the workers.

mod workers;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::consumer::{KafkaConsumer, OffsetLedger, StreamMessage};
use crate::dispatcher::Dispatcher;
use crate::errors::PipelineError;

pub use workers::{partition_for, WorkerPool};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Size of the consumer channel buffer.
    pub channel_buffer_size: usize,
    /// Number of partitioned workers.
    pub worker_count: usize,
    /// Queue size of each worker.
    pub worker_queue_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: 1000,
            worker_count: 4,
            worker_queue_size: 100,
        }
    }
}

/// Drives the pipeline: a background consumer feeds a routing loop that
/// hands events to partitioned workers. Undecodable messages go straight to
/// the error sink through the dispatcher.
pub struct Orchestrator {
    consumer: Arc<KafkaConsumer>,
    dispatcher: Arc<Dispatcher>,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    pub fn new(consumer: KafkaConsumer, dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_config(consumer, dispatcher, OrchestratorConfig::default())
    }

    pub fn with_config(
        consumer: KafkaConsumer,
        dispatcher: Arc<Dispatcher>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            consumer: Arc::new(consumer),
            dispatcher,
            config,
            shutdown_tx,
        }
    }

    /// Consume and index until the stream ends or ctrl-c is received.
    ///
    /// Events already queued on a worker are handled before this returns.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), PipelineError> {
        info!(
            workers = self.config.worker_count,
            "Starting workspace indexer orchestrator"
        );
        self.consumer.subscribe()?;

        let (tx, mut rx) = mpsc::channel::<StreamMessage>(self.config.channel_buffer_size);
        let consumer_handle = self.spawn_consumer(tx);
        let ledger = Arc::new(OffsetLedger::new(self.consumer.clone()));
        let pool = WorkerPool::start(
            self.dispatcher.clone(),
            ledger.clone(),
            self.config.worker_count,
            self.config.worker_queue_size,
        );

        // Keep draining the channel after ctrl-c until the consumer sends End
        let mut stopping = false;
        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(message) = received else { break };
                    if !self.route(&pool, &ledger, message).await {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c(), if !stopping => {
                    info!("Received shutdown signal");
                    stopping = true;
                    self.shutdown();
                }
            }
        }

        if let Err(e) = consumer_handle.await {
            warn!(error = %e, "Consumer task terminated abnormally");
        }
        pool.shutdown().await;
        if ledger.in_flight() > 0 {
            warn!(in_flight = ledger.in_flight(), "Uncommitted messages will be redelivered");
        }

        info!("Orchestrator shutdown complete");
        Ok(())
    }

    fn spawn_consumer(&self, tx: mpsc::Sender<StreamMessage>) -> JoinHandle<()> {
        let consumer = self.consumer.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            match consumer.run(tx, shutdown_rx).await {
                Ok(forwarded) => info!(forwarded = forwarded, "Consumer stopped"),
                Err(e) => error!(error = %e, "Consumer error"),
            }
        })
    }

    /// Handle one stream message. Returns false once the stream has ended.
    ///
    /// Every message is registered with the ledger on receipt. Workers
    /// release events after dispatch, rejected messages are released here.
    async fn route(&self, pool: &WorkerPool, ledger: &OffsetLedger, message: StreamMessage) -> bool {
        match message {
            StreamMessage::Event { event, offset } => {
                ledger.begin(offset);
                // An event that never reached a worker stays uncommitted
                if let Err(e) = pool.submit(event, offset).await {
                    error!(error = %e, offset = offset.offset, "Failed to queue event");
                }
            }
            StreamMessage::Malformed { payload, error, offset } => {
                ledger.begin(offset);
                self.dispatcher.reject(payload, error).await;
                ledger.complete(offset);
            }
            StreamMessage::Error(e) => error!(error = %e, "Received error from consumer"),
            StreamMessage::End => {
                info!("Consumer stream ended");
                return false;
            }
        }
        true
    }

    /// Ask the consumer to stop. `run` returns once queued events are handled.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
