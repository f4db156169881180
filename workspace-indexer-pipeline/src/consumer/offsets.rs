//! Offset bookkeeping for at-least-once delivery.
//!
//! An offset is committed only once every message before it on its
//! partition has been handled. Messages still in flight hold the commit
//! position back, so a crash redelivers them instead of losing them.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::errors::PipelineError;

/// Position of one message in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamOffset {
    pub partition: i32,
    pub offset: i64,
}

impl StreamOffset {
    pub fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }
}

/// Commits consumer positions.
pub trait OffsetCommitter: Send + Sync {
    /// Record that consumption of `partition` may resume at `next_offset`.
    fn commit(&self, partition: i32, next_offset: i64) -> Result<(), PipelineError>;
}

#[derive(Debug)]
struct PartitionState {
    in_flight: BTreeSet<i64>,
    highest_seen: Option<i64>,
    committed: i64,
}

impl PartitionState {
    /// Lowest offset not yet handled, past every handled offset.
    fn resume_position(&self) -> Option<i64> {
        match self.in_flight.first() {
            Some(first) => Some(*first),
            None => self.highest_seen.map(|highest| highest + 1),
        }
    }
}

/// Tracks messages from receipt until they are handled.
pub struct OffsetLedger {
    partitions: DashMap<i32, PartitionState>,
    committer: Arc<dyn OffsetCommitter>,
}

impl OffsetLedger {
    pub fn new(committer: Arc<dyn OffsetCommitter>) -> Self {
        Self {
            partitions: DashMap::new(),
            committer,
        }
    }

    /// Register a received message. Must precede `complete` for the same offset.
    pub fn begin(&self, offset: StreamOffset) {
        // Consumption resumes at the first offset seen until something is handled
        let mut state = self
            .partitions
            .entry(offset.partition)
            .or_insert_with(|| PartitionState {
                in_flight: BTreeSet::new(),
                highest_seen: None,
                committed: offset.offset,
            });
        state.in_flight.insert(offset.offset);
        state.highest_seen = Some(state.highest_seen.map_or(offset.offset, |h| h.max(offset.offset)));
    }

    /// Mark a message handled and commit the partition if its position advanced.
    ///
    /// # Returns
    ///
    /// * `Some(next_offset)` - The position that was committed
    /// * `None` - Earlier messages are still in flight or the commit failed
    pub fn complete(&self, offset: StreamOffset) -> Option<i64> {
        let mut state = self.partitions.get_mut(&offset.partition)?;
        state.in_flight.remove(&offset.offset);

        let next = state.resume_position()?;
        if state.committed >= next {
            return None;
        }

        match self.committer.commit(offset.partition, next) {
            Ok(()) => {
                state.committed = next;
                debug!(partition = offset.partition, next_offset = next, "Committed offset");
                Some(next)
            }
            Err(e) => {
                warn!(partition = offset.partition, next_offset = next, error = %e, "Failed to commit offset");
                None
            }
        }
    }

    /// Messages received but not yet handled.
    pub fn in_flight(&self) -> usize {
        self.partitions.iter().map(|state| state.in_flight.len()).sum()
    }
}
