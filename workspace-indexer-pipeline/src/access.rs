//! Access propagator.
//!
//! Rewrites the public flag of data documents and the public sentinel of
//! access documents with update-by-query. Every update only matches
//! documents that differ from the target state, so re-applying the same
//! state updates nothing.

use std::sync::Arc;

use tracing::{info, instrument};
use workspace_indexer_repository::{DocumentQuery, FieldUpdate, SearchIndexClient};
use workspace_indexer_shared::{DocumentCategory, ObjectKey, PUBLIC_GROUP};

use crate::errors::PipelineError;

const PUBLIC_FIELD: &str = "public";
const GROUPS_FIELD: &str = "groups";

pub struct AccessPropagator {
    index: Arc<SearchIndexClient>,
    indices: Vec<String>,
}

impl AccessPropagator {
    pub fn new(index: Arc<SearchIndexClient>, indices: Vec<String>) -> Self {
        Self { index, indices }
    }

    /// Apply the public state to every object of an access group.
    ///
    /// # Returns
    ///
    /// * `Ok(count)` - Number of documents that changed
    #[instrument(skip(self))]
    pub async fn apply_access(
        &self,
        storage_code: &str,
        access_group_id: i64,
        public: bool,
    ) -> Result<u64, PipelineError> {
        let scope = DocumentQuery::access_group(storage_code, access_group_id);
        let updated = self.apply(scope, None, public).await?;
        info!(updated = updated, "Applied access group state");
        Ok(updated)
    }

    /// Apply the public state to the documents of a single object.
    #[instrument(skip(self), fields(object = %key))]
    pub async fn apply_object_access(&self, key: &ObjectKey, public: bool) -> Result<u64, PipelineError> {
        let routing = key.routing_key();
        let updated = self
            .apply(DocumentQuery::object(key), Some(&routing), public)
            .await?;
        info!(updated = updated, "Applied object access state");
        Ok(updated)
    }

    async fn apply(
        &self,
        scope: DocumentQuery,
        routing: Option<&str>,
        public: bool,
    ) -> Result<u64, PipelineError> {
        let data = scope
            .clone()
            .category(DocumentCategory::Data)
            .not_term(PUBLIC_FIELD, public);
        let mut updated = self
            .index
            .update_by_query(
                &self.indices,
                routing,
                &data,
                &[FieldUpdate::set(PUBLIC_FIELD, public)],
            )
            .await?;

        let access = scope.category(DocumentCategory::Access);
        let (access, update) = if public {
            (
                access.not_term(GROUPS_FIELD, PUBLIC_GROUP),
                FieldUpdate::add_to_set(GROUPS_FIELD, PUBLIC_GROUP),
            )
        } else {
            (
                access.term(GROUPS_FIELD, PUBLIC_GROUP),
                FieldUpdate::remove_from_set(GROUPS_FIELD, PUBLIC_GROUP),
            )
        };
        updated += self
            .index
            .update_by_query(&self.indices, routing, &access, &[update])
            .await?;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workspace_indexer_repository::{DocumentAddress, IndexedDocument, InMemoryDocumentStore};
    use workspace_indexer_shared::{AccessDocument, ObjectRef, VersionDocument};

    struct Fixture {
        store: Arc<InMemoryDocumentStore>,
        propagator: AccessPropagator,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let client = Arc::new(SearchIndexClient::new(Box::new(store.clone())));

        let mut documents = Vec::new();
        for (group, object_id) in [(1, "2"), (1, "3"), (7, "2")] {
            let key = ObjectKey::new("WS", group, object_id);
            let version = VersionDocument::new(&ObjectRef::new("WS", group, object_id, 1), "obj", "X.Foo");
            let access = AccessDocument::new(&key, false);
            documents.push(
                IndexedDocument::new(DocumentAddress::data("foo", key.routing_key(), &version.id), &version)
                    .unwrap(),
            );
            documents.push(
                IndexedDocument::new(DocumentAddress::access("foo", key.routing_key(), &access.id), &access)
                    .unwrap(),
            );
        }
        client.put_all(&documents).await.unwrap();

        Fixture {
            store,
            propagator: AccessPropagator::new(client, vec!["foo".to_string()]),
        }
    }

    #[tokio::test]
    async fn test_publish_group_is_idempotent() {
        let f = fixture().await;

        assert_eq!(f.propagator.apply_access("WS", 1, true).await.unwrap(), 4);
        assert_eq!(f.propagator.apply_access("WS", 1, true).await.unwrap(), 0);

        let access = f.store.source("foo", DocumentCategory::Access, "WS:1:2").await.unwrap();
        let groups = access["groups"].as_array().unwrap();
        assert!(groups.contains(&serde_json::json!(PUBLIC_GROUP)));
        assert!(groups.contains(&serde_json::json!(1)));
        let other = f.store.source("foo", DocumentCategory::Data, "WS:7:2:1").await.unwrap();
        assert_eq!(other["public"], false);
    }

    #[tokio::test]
    async fn test_unpublish_round_trip() {
        let f = fixture().await;

        f.propagator.apply_access("WS", 1, true).await.unwrap();
        assert_eq!(f.propagator.apply_access("WS", 1, false).await.unwrap(), 4);

        let access = f.store.source("foo", DocumentCategory::Access, "WS:1:3").await.unwrap();
        assert_eq!(access["groups"], serde_json::json!([1]));
        let version = f.store.source("foo", DocumentCategory::Data, "WS:1:3:1").await.unwrap();
        assert_eq!(version["public"], false);
    }

    #[tokio::test]
    async fn test_object_scope() {
        let f = fixture().await;

        let updated = f
            .propagator
            .apply_object_access(&ObjectKey::new("WS", 1, "3"), true)
            .await
            .unwrap();

        assert_eq!(updated, 2);
        let untouched = f.store.source("foo", DocumentCategory::Data, "WS:1:2:1").await.unwrap();
        assert_eq!(untouched["public"], false);
    }
}
