//! Kafka event producer.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info};
use workspace_indexer_shared::WorkspaceEvent;

use super::{event_key, EventProducer};
use crate::errors::PipelineError;

/// How long a send may wait in the local queue.
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Event producer writing JSON events to a Kafka topic.
pub struct KafkaEventProducer {
    producer: FutureProducer,
    topic: String,
}

impl KafkaEventProducer {
    /// Create a producer with ZSTD compression.
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, PipelineError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("client.id", "workspace-indexer")
            .set("compression.type", "zstd")
            .set("message.timeout.ms", "5000")
            .set("queue.buffering.max.messages", "100000")
            .create()?;

        let topic = topic.into();
        info!(brokers = %brokers, topic = %topic, "Created Kafka producer");

        Ok(Self { producer, topic })
    }

    /// Wait for queued messages to be delivered.
    pub fn flush(&self, timeout: Duration) -> Result<(), PipelineError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| PipelineError::producer(e.to_string()))
    }
}

#[async_trait]
impl EventProducer for KafkaEventProducer {
    async fn emit(&self, event: &WorkspaceEvent) -> Result<(), PipelineError> {
        let payload =
            serde_json::to_vec(event).map_err(|e| PipelineError::producer(e.to_string()))?;
        let key = event_key(event);

        let record = FutureRecord::to(&self.topic)
            .key(key.as_str())
            .payload(&payload)
            .headers(OwnedHeaders::new().insert(Header {
                key: "event-type",
                value: Some(event.event_type.as_str()),
            }));

        let (partition, offset) = self
            .producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| PipelineError::producer(e.to_string()))?;

        debug!(key = %key, partition = partition, offset = offset, "Emitted event");
        Ok(())
    }
}
