/// Batching and retry policy of a [`crate::SearchIndexClient`].
///
/// Retries apply only to errors reported as retryable, with the delay
/// doubling from `initial_retry_delay_ms` up to `max_retry_delay_ms`.
#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Maximum number of documents sent in a single bulk request. Larger
    /// writes are split into chunks of this size.
    pub max_batch_size: usize,
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            max_retries: 3,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 5000,
        }
    }
}

impl SearchIndexConfig {
    /// Default policy with bulk writes split into chunks of `max_batch_size`.
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            ..Self::default()
        }
    }

    /// Disable retries.
    pub fn without_retries(mut self) -> Self {
        self.max_retries = 0;
        self
    }
}
