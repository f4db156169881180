//! Consumer module for the workspace indexer pipeline.
//!
//! Provides Kafka consumer functionality for receiving workspace events.

mod kafka_consumer;
mod messages;
mod offsets;

pub use kafka_consumer::KafkaConsumer;
pub use messages::{decode_event, raw_payload, StreamMessage};
pub use offsets::{OffsetCommitter, OffsetLedger, StreamOffset};

#[cfg(test)]
pub(crate) use offsets::tests::RecordingCommitter;
