//! Document store trait definition.
//!
//! This module defines the abstract interface for document store operations,
//! allowing for different backend implementations (OpenSearch, in-memory, etc.).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{
    BatchOperationSummary, DocumentAddress, DocumentQuery, FieldUpdate, IndexedDocument,
};

/// Abstracts the underlying search engine (OpenSearch, in-memory, etc.).
///
/// Implementations are injected into `SearchIndexClient` to enable dependency
/// injection and easy testing.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across worker tasks.
///
/// # Consistency
///
/// Writes must be visible to subsequent reads and queries issued by the same
/// caller (implementations refresh as part of the write).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or replace a single document.
    ///
    /// # Arguments
    ///
    /// * `document` - The address and source of the document
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was written
    /// * `Err(SearchIndexError)` - If the write fails
    async fn put_document(&self, document: &IndexedDocument) -> Result<(), SearchIndexError>;

    /// Create or replace many documents in one request.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Aggregate statistics and per-document results
    /// * `Err(SearchIndexError)` - If the bulk request fails entirely
    async fn bulk_put(
        &self,
        documents: &[IndexedDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Fetch the source of a single document.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(source))` - If the document exists
    /// * `Ok(None)` - If it does not
    async fn get_document(&self, address: &DocumentAddress) -> Result<Option<Value>, SearchIndexError>;

    /// Apply field updates to every document matching `query`.
    ///
    /// # Arguments
    ///
    /// * `indices` - Indices to search; missing indices are ignored
    /// * `routing` - Restricts the operation to one object's shard when given
    /// * `query` - Selects the documents to update
    /// * `updates` - Field modifications to apply
    ///
    /// # Returns
    ///
    /// * `Ok(count)` - Number of documents updated
    async fn update_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
        updates: &[FieldUpdate],
    ) -> Result<u64, SearchIndexError>;

    /// Delete every document matching `query`.
    ///
    /// # Returns
    ///
    /// * `Ok(count)` - Number of documents deleted
    async fn delete_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<u64, SearchIndexError>;

    /// Highest `version` field among documents matching `query`.
    async fn max_version(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<Option<u64>, SearchIndexError>;

    /// Create the index with the indexer's mappings if it does not exist.
    async fn ensure_index(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Check if the search engine is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the search engine is healthy
    /// * `Ok(false)` - If the search engine is unhealthy
    /// * `Err(SearchIndexError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchIndexError>;
}

/// Shared stores, so a caller can keep a handle on a store it hands to a client.
#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    async fn put_document(&self, document: &IndexedDocument) -> Result<(), SearchIndexError> {
        (**self).put_document(document).await
    }

    async fn bulk_put(
        &self,
        documents: &[IndexedDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        (**self).bulk_put(documents).await
    }

    async fn get_document(&self, address: &DocumentAddress) -> Result<Option<Value>, SearchIndexError> {
        (**self).get_document(address).await
    }

    async fn update_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
        updates: &[FieldUpdate],
    ) -> Result<u64, SearchIndexError> {
        (**self).update_by_query(indices, routing, query, updates).await
    }

    async fn delete_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<u64, SearchIndexError> {
        (**self).delete_by_query(indices, routing, query).await
    }

    async fn max_version(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<Option<u64>, SearchIndexError> {
        (**self).max_version(indices, routing, query).await
    }

    async fn ensure_index(&self, index: &str) -> Result<(), SearchIndexError> {
        (**self).ensure_index(index).await
    }

    async fn health_check(&self) -> Result<bool, SearchIndexError> {
        (**self).health_check().await
    }
}
