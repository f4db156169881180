//! Latest-version bookkeeping.
//!
//! At most one visible version document per object carries `islast = true`,
//! and it is the one with the highest version number. All queries run under
//! the object's routing key.

use std::sync::Arc;

use tracing::{debug, instrument};
use workspace_indexer_repository::{DocumentQuery, FieldUpdate, SearchIndexClient};
use workspace_indexer_shared::{DocumentCategory, ObjectKey};

use crate::builder::BuiltVersion;
use crate::errors::PipelineError;

/// Field holding the latest flag.
const ISLAST_FIELD: &str = "islast";

/// Writes built versions and keeps the latest flag consistent.
pub struct LatestReconciler {
    index: Arc<SearchIndexClient>,
    indices: Vec<String>,
}

impl LatestReconciler {
    /// `indices` must cover every index an object's data documents may live in.
    pub fn new(index: Arc<SearchIndexClient>, indices: Vec<String>) -> Self {
        Self { index, indices }
    }

    fn data_query(key: &ObjectKey) -> DocumentQuery {
        DocumentQuery::object(key).category(DocumentCategory::Data)
    }

    /// Highest visible version of an object.
    pub async fn visible_max(&self, key: &ObjectKey) -> Result<Option<u64>, PipelineError> {
        let routing = key.routing_key();
        let query = Self::data_query(key).and(DocumentQuery::visible());
        Ok(self
            .index
            .max_version(&self.indices, Some(&routing), &query)
            .await?)
    }

    /// Write a built version, its features and the object's access document.
    ///
    /// The version becomes latest unless a higher visible version is already
    /// indexed. Existing feature documents of the version are replaced.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The version now carries `islast`
    /// * `Ok(false)` - A higher version exists; written with `islast = false`
    #[instrument(skip(self, built), fields(object = %built.object_ref()))]
    pub async fn commit(&self, mut built: BuiltVersion) -> Result<bool, PipelineError> {
        let object = built.object_ref();
        let routing = object.routing_key();

        let is_latest = self
            .visible_max(&object.key)
            .await?
            .map_or(true, |max| object.version >= max);
        built.set_islast(is_latest);

        if let Some(feature_index) = built.target.feature_index() {
            let stale = DocumentQuery::new()
                .category(DocumentCategory::Data)
                .term("parent_id", built.version.id.clone());
            let removed = self
                .index
                .delete_by_query(&[feature_index], Some(&routing), &stale)
                .await?;
            debug!(removed = removed, "Removed previous feature documents");
        }

        let mut documents = built.documents()?;
        documents.push(built.access_document()?);
        self.index.put_all(&documents).await?;

        if is_latest {
            self.clear_others(&object.key, object.version).await?;
        }

        debug!(islast = is_latest, documents = documents.len(), "Committed version");
        Ok(is_latest)
    }

    /// Clear the latest flag on every version of `key` other than `version`.
    async fn clear_others(&self, key: &ObjectKey, version: u64) -> Result<u64, PipelineError> {
        let routing = key.routing_key();
        let query = Self::data_query(key)
            .not_term("version", version)
            .term(ISLAST_FIELD, true);
        let cleared = self
            .index
            .update_by_query(
                &self.indices,
                Some(&routing),
                &query,
                &[FieldUpdate::set(ISLAST_FIELD, false)],
            )
            .await?;
        debug!(cleared = cleared, "Cleared previous latest flag");
        Ok(cleared)
    }

    /// Recompute the latest flag from the visible versions of an object.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(version))` - The version now flagged latest
    /// * `Ok(None)` - No visible version exists
    #[instrument(skip(self), fields(object = %key))]
    pub async fn recompute(&self, key: &ObjectKey) -> Result<Option<u64>, PipelineError> {
        let Some(max) = self.visible_max(key).await? else {
            return Ok(None);
        };

        let routing = key.routing_key();
        let query = Self::data_query(key)
            .term("version", max)
            .not_term(ISLAST_FIELD, true);
        self.index
            .update_by_query(
                &self.indices,
                Some(&routing),
                &query,
                &[FieldUpdate::set(ISLAST_FIELD, true)],
            )
            .await?;
        self.clear_others(key, max).await?;

        Ok(Some(max))
    }
}
