//! Kafka consumer implementation for the workspace indexer.
//!
//! Consumes workspace events from Kafka and forwards them to the pipeline.
//! Offsets are not committed here: the pipeline commits them through
//! [`OffsetCommitter`] once the events are handled.

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::messages::{decode_event, raw_payload, StreamMessage};
use crate::consumer::offsets::{OffsetCommitter, StreamOffset};
use crate::errors::PipelineError;

/// Kafka consumer for workspace events.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer.
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    /// * `topic` - Topic carrying workspace events
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaConsumer)` - A new consumer instance
    /// * `Err(PipelineError)` - If consumer creation fails
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> Result<Self, PipelineError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(brokers = %brokers, group_id = %group_id, "Created Kafka consumer");

        Ok(Self {
            consumer,
            topic: topic.to_string(),
        })
    }

    /// Subscribe to the configured topic.
    pub fn subscribe(&self) -> Result<(), PipelineError> {
        self.consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(topic = %self.topic, "Subscribed to Kafka topic");
        Ok(())
    }

    /// Consume until shutdown, forwarding every message through `sender`.
    ///
    /// Sends `StreamMessage::End` before returning.
    ///
    /// # Returns
    ///
    /// * `Ok(count)` - Number of messages forwarded
    #[instrument(skip(self, sender, shutdown))]
    pub async fn run(
        &self,
        sender: mpsc::Sender<StreamMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<u64, PipelineError> {
        let mut forwarded: u64 = 0;

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!(forwarded = forwarded, "Consumer received shutdown signal");
                    break;
                }
                received = self.consumer.recv() => received,
            };

            match received {
                Ok(msg) => {
                    let Some(message) = Self::decode(&msg) else {
                        continue;
                    };
                    if sender.send(message).await.is_err() {
                        warn!("Pipeline channel closed, stopping consumer");
                        return Ok(forwarded);
                    }
                    forwarded += 1;
                }
                Err(e) => {
                    error!(error = %e, "Kafka error");
                    let _ = sender.send(StreamMessage::Error(e.to_string())).await;
                }
            }
        }

        let _ = sender.send(StreamMessage::End).await;
        Ok(forwarded)
    }

    /// Turn one Kafka message into a pipeline message.
    fn decode(msg: &BorrowedMessage<'_>) -> Option<StreamMessage> {
        debug!(
            topic = %msg.topic(),
            partition = msg.partition(),
            offset = msg.offset(),
            "Processing message"
        );

        let Some(payload) = msg.payload() else {
            debug!("Received message with empty payload");
            return None;
        };

        let offset = StreamOffset::new(msg.partition(), msg.offset());
        Some(match decode_event(payload) {
            Ok(event) => StreamMessage::Event { event, offset },
            Err(error) => StreamMessage::Malformed {
                payload: raw_payload(payload),
                error,
                offset,
            },
        })
    }
}

impl OffsetCommitter for KafkaConsumer {
    fn commit(&self, partition: i32, next_offset: i64) -> Result<(), PipelineError> {
        let mut positions = TopicPartitionList::new();
        positions
            .add_partition_offset(&self.topic, partition, Offset::Offset(next_offset))
            .map_err(|e| PipelineError::kafka(e.to_string()))?;
        self.consumer
            .commit(&positions, CommitMode::Async)
            .map_err(|e| PipelineError::kafka(e.to_string()))
    }
}
