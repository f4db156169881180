//! Search index client implementation.
//!
//! This module provides the main client for interacting with the document
//! store. Application code uses this to write, update and query documents.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::SearchIndexConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::DocumentStore;
use crate::types::{
    BatchOperationSummary, DocumentAddress, DocumentQuery, FieldUpdate, IndexedDocument,
};

/// The main client for interacting with the document store.
///
/// Validates addresses, splits bulk writes into batches, and retries
/// transient failures with exponential backoff. Every operation it exposes
/// is idempotent, so retrying is always safe.
pub struct SearchIndexClient {
    provider: Box<dyn DocumentStore>,
    config: SearchIndexConfig,
}

impl SearchIndexClient {
    /// Create a new SearchIndexClient with default configuration.
    pub fn new(provider: Box<dyn DocumentStore>) -> Self {
        Self {
            provider,
            config: SearchIndexConfig::default(),
        }
    }

    /// Create a new SearchIndexClient with custom configuration.
    pub fn with_config(provider: Box<dyn DocumentStore>, config: SearchIndexConfig) -> Self {
        Self { provider, config }
    }

    /// Run `operation`, retrying retryable errors with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, name: &str, mut operation: F) -> Result<T, SearchIndexError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SearchIndexError>>,
    {
        let mut delay_ms = self.config.initial_retry_delay_ms;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation = name, attempt = attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        operation = name,
                        attempt = attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = std::cmp::min(delay_ms * 2, self.config.max_retry_delay_ms);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Create or replace a single document.
    pub async fn put(&self, document: &IndexedDocument) -> Result<(), SearchIndexError> {
        document.address.validate()?;
        self.with_retry("put", move || self.provider.put_document(document))
            .await
    }

    /// Create or replace many documents.
    ///
    /// Documents are sent in chunks of at most `max_batch_size`. Individual
    /// failures are reported in the summary.
    pub async fn bulk_put(
        &self,
        documents: &[IndexedDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        for document in documents {
            document.address.validate()?;
        }

        let mut summary = BatchOperationSummary::default();
        for chunk in documents.chunks(self.config.max_batch_size) {
            let result = self
                .with_retry("bulk_put", move || self.provider.bulk_put(chunk))
                .await?;
            summary.merge(result);
        }

        debug!(
            total = summary.total,
            failed = summary.failed,
            "Bulk write completed"
        );
        Ok(summary)
    }

    /// Create or replace many documents, failing if any single write failed.
    pub async fn put_all(&self, documents: &[IndexedDocument]) -> Result<(), SearchIndexError> {
        if documents.is_empty() {
            return Ok(());
        }

        let summary = self.bulk_put(documents).await?;
        if summary.failed > 0 {
            let first_error = summary
                .results
                .iter()
                .find_map(|r| r.error.as_ref())
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(SearchIndexError::bulk_operation(format!(
                "{} of {} documents failed to index ({}): {}",
                summary.failed,
                summary.total,
                summary.failed_ids().join(", "),
                first_error
            )));
        }
        Ok(())
    }

    /// Fetch a single document's source.
    pub async fn get(&self, address: &DocumentAddress) -> Result<Option<Value>, SearchIndexError> {
        address.validate()?;
        self.with_retry("get", move || self.provider.get_document(address))
            .await
    }

    /// Apply field updates to every matching document.
    pub async fn update_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
        updates: &[FieldUpdate],
    ) -> Result<u64, SearchIndexError> {
        if indices.is_empty() || updates.is_empty() {
            return Ok(0);
        }
        self.with_retry("update_by_query", move || {
            self.provider.update_by_query(indices, routing, query, updates)
        })
        .await
    }

    /// Delete every matching document.
    pub async fn delete_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<u64, SearchIndexError> {
        if indices.is_empty() {
            return Ok(0);
        }
        self.with_retry("delete_by_query", move || {
            self.provider.delete_by_query(indices, routing, query)
        })
        .await
    }

    /// Highest version among matching documents.
    pub async fn max_version(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<Option<u64>, SearchIndexError> {
        if indices.is_empty() {
            return Ok(None);
        }
        self.with_retry("max_version", move || {
            self.provider.max_version(indices, routing, query)
        })
        .await
    }

    /// Ensure every listed index exists.
    pub async fn ensure_indices(&self, indices: &[String]) -> Result<(), SearchIndexError> {
        for index in indices {
            self.with_retry("ensure_index", move || self.provider.ensure_index(index))
                .await?;
        }
        Ok(())
    }

    /// Check if the search engine is healthy.
    pub async fn health_check(&self) -> Result<bool, SearchIndexError> {
        self.provider.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchOperationResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Mock provider for testing
    struct MockProvider {
        bulk_sizes: Arc<Mutex<Vec<usize>>>,
        put_calls: Arc<AtomicUsize>,
        transient_failures: AtomicUsize,
        reject_ids: Vec<String>,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                bulk_sizes: Arc::new(Mutex::new(Vec::new())),
                put_calls: Arc::new(AtomicUsize::new(0)),
                transient_failures: AtomicUsize::new(0),
                reject_ids: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for MockProvider {
        async fn put_document(&self, _document: &IndexedDocument) -> Result<(), SearchIndexError> {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            if self.transient_failures.load(Ordering::SeqCst) > 0 {
                self.transient_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(SearchIndexError::connection("connection reset"));
            }
            Ok(())
        }

        async fn bulk_put(
            &self,
            documents: &[IndexedDocument],
        ) -> Result<BatchOperationSummary, SearchIndexError> {
            self.bulk_sizes.lock().await.push(documents.len());
            Ok(BatchOperationSummary::from_results(
                documents
                    .iter()
                    .map(|d| {
                        let rejected = self.reject_ids.contains(&d.address.id);
                        BatchOperationResult {
                            id: d.address.id.clone(),
                            success: !rejected,
                            error: rejected.then(|| SearchIndexError::index("rejected")),
                        }
                    })
                    .collect(),
            ))
        }

        async fn get_document(
            &self,
            _address: &DocumentAddress,
        ) -> Result<Option<Value>, SearchIndexError> {
            Ok(None)
        }

        async fn update_by_query(
            &self,
            _indices: &[String],
            _routing: Option<&str>,
            _query: &DocumentQuery,
            updates: &[FieldUpdate],
        ) -> Result<u64, SearchIndexError> {
            Ok(updates.len() as u64)
        }

        async fn delete_by_query(
            &self,
            _indices: &[String],
            _routing: Option<&str>,
            _query: &DocumentQuery,
        ) -> Result<u64, SearchIndexError> {
            Ok(0)
        }

        async fn max_version(
            &self,
            _indices: &[String],
            _routing: Option<&str>,
            _query: &DocumentQuery,
        ) -> Result<Option<u64>, SearchIndexError> {
            Ok(Some(1))
        }

        async fn ensure_index(&self, _index: &str) -> Result<(), SearchIndexError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<bool, SearchIndexError> {
            Ok(true)
        }
    }

    fn create_test_document(id: &str) -> IndexedDocument {
        IndexedDocument::new(
            DocumentAddress::data("genome", "WS:1:3", id),
            &json!({"id": id}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_bulk_put_is_chunked() {
        let provider = MockProvider::new();
        let sizes = provider.bulk_sizes.clone();
        let client =
            SearchIndexClient::with_config(Box::new(provider), SearchIndexConfig::with_max_batch_size(2));

        let documents: Vec<IndexedDocument> = (0..5)
            .map(|i| create_test_document(&format!("WS:1:3:{}", i)))
            .collect();

        let summary = client.bulk_put(&documents).await.unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded, 5);
        assert_eq!(*sizes.lock().await, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_put_all_reports_failures() {
        let mut provider = MockProvider::new();
        provider.reject_ids = vec!["WS:1:3:2".to_string()];
        let client = SearchIndexClient::new(Box::new(provider));

        let documents = vec![create_test_document("WS:1:3:1"), create_test_document("WS:1:3:2")];

        let result = client.put_all(&documents).await;
        assert!(matches!(result, Err(SearchIndexError::BulkOperationError(msg)) if msg.contains("WS:1:3:2")));
    }

    #[tokio::test]
    async fn test_put_validates_address() {
        let client = SearchIndexClient::new(Box::new(MockProvider::new()));
        let document = IndexedDocument::new(DocumentAddress::data("genome", "", "x"), &json!({})).unwrap();

        assert!(matches!(
            client.put(&document).await,
            Err(SearchIndexError::ValidationError(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_retries_transient_errors() {
        let provider = MockProvider::new();
        provider.transient_failures.store(2, Ordering::SeqCst);
        let calls = provider.put_calls.clone();
        let client = SearchIndexClient::new(Box::new(provider));

        client.put(&create_test_document("WS:1:3:1")).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_put_without_retries_fails_fast() {
        let provider = MockProvider::new();
        provider.transient_failures.store(1, Ordering::SeqCst);
        let client = SearchIndexClient::with_config(
            Box::new(provider),
            SearchIndexConfig::default().without_retries(),
        );

        assert!(matches!(
            client.put(&create_test_document("WS:1:3:1")).await,
            Err(SearchIndexError::ConnectionError(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_operations_short_circuit() {
        let client = SearchIndexClient::new(Box::new(MockProvider::new()));

        assert!(client.put_all(&[]).await.is_ok());
        assert_eq!(
            client
                .update_by_query(&[], None, &DocumentQuery::new(), &[FieldUpdate::set("a", 1)])
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            client.max_version(&[], None, &DocumentQuery::new()).await.unwrap(),
            None
        );
    }
}
