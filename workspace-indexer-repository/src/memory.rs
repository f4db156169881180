//! In-memory document store.
//!
//! Implements `DocumentStore` over a map keyed by index, category and id.
//! Queries honour routing exactly, so documents written under the wrong
//! routing key are not found. Used for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use workspace_indexer_shared::DocumentCategory;

use crate::errors::SearchIndexError;
use crate::interfaces::DocumentStore;
use crate::types::{
    BatchOperationResult, BatchOperationSummary, DocumentAddress, DocumentQuery, FieldUpdate,
    IndexedDocument,
};

type DocumentKey = (String, DocumentCategory, String);

#[derive(Debug, Clone)]
struct StoredDocument {
    routing: String,
    source: Value,
}

/// Document store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<BTreeMap<DocumentKey, StoredDocument>>,
    fail_writes: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with an index error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), SearchIndexError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SearchIndexError::index("document store rejected the write"));
        }
        Ok(())
    }

    /// Source of a document, ignoring routing.
    pub async fn source(&self, index: &str, category: DocumentCategory, id: &str) -> Option<Value> {
        self.documents
            .read()
            .await
            .get(&(index.to_string(), category, id.to_string()))
            .map(|stored| stored.source.clone())
    }

    /// Every document of the given category in an index.
    pub async fn sources(&self, index: &str, category: DocumentCategory) -> Vec<Value> {
        self.documents
            .read()
            .await
            .iter()
            .filter(|((i, c, _), _)| i == index && *c == category)
            .map(|(_, stored)| stored.source.clone())
            .collect()
    }

    /// Number of stored documents across all indices.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn selected(
        key: &DocumentKey,
        stored: &StoredDocument,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> bool {
        indices.contains(&key.0)
            && routing.map_or(true, |r| stored.routing == r)
            && query.matches(key.1, &stored.source)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put_document(&self, document: &IndexedDocument) -> Result<(), SearchIndexError> {
        self.check_writable()?;
        let address = &document.address;
        self.documents.write().await.insert(
            (address.index.clone(), address.category, address.id.clone()),
            StoredDocument {
                routing: address.routing.clone(),
                source: document.source.clone(),
            },
        );
        Ok(())
    }

    async fn bulk_put(
        &self,
        documents: &[IndexedDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            let outcome = self.put_document(document).await;
            results.push(BatchOperationResult {
                id: document.address.id.clone(),
                success: outcome.is_ok(),
                error: outcome.err(),
            });
        }
        Ok(BatchOperationSummary::from_results(results))
    }

    async fn get_document(&self, address: &DocumentAddress) -> Result<Option<Value>, SearchIndexError> {
        Ok(self
            .documents
            .read()
            .await
            .get(&(address.index.clone(), address.category, address.id.clone()))
            .filter(|stored| stored.routing == address.routing)
            .map(|stored| stored.source.clone()))
    }

    async fn update_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
        updates: &[FieldUpdate],
    ) -> Result<u64, SearchIndexError> {
        self.check_writable()?;
        let mut documents = self.documents.write().await;
        let mut updated = 0;
        for (key, stored) in documents.iter_mut() {
            if !Self::selected(key, stored, indices, routing, query) {
                continue;
            }
            let mut changed = false;
            for update in updates {
                changed |= update.apply(&mut stored.source);
            }
            if changed {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<u64, SearchIndexError> {
        self.check_writable()?;
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|key, stored| !Self::selected(key, stored, indices, routing, query));
        Ok((before - documents.len()) as u64)
    }

    async fn max_version(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<Option<u64>, SearchIndexError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|(key, stored)| Self::selected(key, stored, indices, routing, query))
            .filter_map(|(_, stored)| stored.source.get("version").and_then(Value::as_u64))
            .max())
    }

    async fn ensure_index(&self, _index: &str) -> Result<(), SearchIndexError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchIndexError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn version_doc(version: u64, deleted: bool) -> IndexedDocument {
        IndexedDocument::new(
            DocumentAddress::data("genome", "WS:1:3", format!("WS:1:3:{}", version)),
            &json!({
                "storage_code": "WS",
                "access_group_id": 1,
                "object_id": "3",
                "version": version,
                "deleted": deleted,
                "islast": false
            }),
        )
        .unwrap()
    }

    fn indices() -> Vec<String> {
        vec!["genome".to_string()]
    }

    #[tokio::test]
    async fn test_get_requires_matching_routing() {
        let store = InMemoryDocumentStore::new();
        store.put_document(&version_doc(1, false)).await.unwrap();

        let found = store
            .get_document(&DocumentAddress::data("genome", "WS:1:3", "WS:1:3:1"))
            .await
            .unwrap();
        assert!(found.is_some());

        let misrouted = store
            .get_document(&DocumentAddress::data("genome", "WS:1:4", "WS:1:3:1"))
            .await
            .unwrap();
        assert!(misrouted.is_none());
    }

    #[tokio::test]
    async fn test_max_version_honours_query() {
        let store = InMemoryDocumentStore::new();
        store
            .bulk_put(&[version_doc(1, false), version_doc(2, false), version_doc(3, true)])
            .await
            .unwrap();

        let all = store
            .max_version(&indices(), Some("WS:1:3"), &DocumentQuery::new())
            .await
            .unwrap();
        let visible = store
            .max_version(&indices(), Some("WS:1:3"), &DocumentQuery::visible())
            .await
            .unwrap();

        assert_eq!(all, Some(3));
        assert_eq!(visible, Some(2));
    }

    #[tokio::test]
    async fn test_update_by_query_counts_changed_documents() {
        let store = InMemoryDocumentStore::new();
        store
            .bulk_put(&[version_doc(1, false), version_doc(2, false)])
            .await
            .unwrap();
        let updates = [FieldUpdate::set("islast", true)];
        let query = DocumentQuery::new().term("version", 2);

        let first = store
            .update_by_query(&indices(), Some("WS:1:3"), &query, &updates)
            .await
            .unwrap();
        let second = store
            .update_by_query(&indices(), Some("WS:1:3"), &query, &updates)
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn test_delete_by_query() {
        let store = InMemoryDocumentStore::new();
        store
            .bulk_put(&[version_doc(1, false), version_doc(2, false)])
            .await
            .unwrap();

        let deleted = store
            .delete_by_query(&indices(), None, &DocumentQuery::new().term("version", 1))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_failing_writes() {
        let store = InMemoryDocumentStore::new();
        store.set_fail_writes(true);

        let summary = store.bulk_put(&[version_doc(1, false)]).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert!(store.is_empty().await);
    }
}
