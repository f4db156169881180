//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `DocumentStore`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{IndicesCreateParts, IndicesExistsParts},
    params::{Conflicts, Refresh},
    BulkParts, DeleteByQueryParts, GetParts, IndexParts, OpenSearch, SearchParts,
    UpdateByQueryParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::DocumentStore;
use crate::opensearch::index_config::IndexConfig;
use crate::opensearch::queries::{
    build_delete_by_query_body, build_max_version_body, build_update_by_query_body,
    parse_max_version, CATEGORY_FIELD,
};
use crate::types::{
    BatchOperationResult, BatchOperationSummary, DocumentAddress, DocumentQuery, FieldUpdate,
    IndexedDocument,
};

/// OpenSearch client implementation.
///
/// # Example
///
/// ```ignore
/// use workspace_indexer_repository::opensearch::IndexConfig;
/// let client = OpenSearchClient::new("http://localhost:9200", IndexConfig::default()).await?;
/// client.ensure_index("genome").await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
    index_config: IndexConfig,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `index_config` - Settings used when creating indices
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str, index_config: IndexConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            shards = index_config.number_of_shards,
            replicas = index_config.number_of_replicas,
            "Created OpenSearch client"
        );

        Ok(Self {
            client,
            index_config,
        })
    }

    /// Stored source with the category field set from the address.
    fn stored_source(document: &IndexedDocument) -> Value {
        let mut source = document.source.clone();
        if let Some(object) = source.as_object_mut() {
            object.insert(
                CATEGORY_FIELD.to_string(),
                json!(document.address.category.as_str()),
            );
        }
        source
    }

    /// Turn a non-success response into an error built by `make_error`.
    async fn check_response(
        response: Response,
        operation: &str,
        make_error: fn(String) -> SearchIndexError,
    ) -> Result<Response, SearchIndexError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }
        let error_body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %error_body, operation = operation, "Request failed");
        Err(make_error(format!(
            "{} failed with status {}: {}",
            operation, status, error_body
        )))
    }

    /// Parse the per-item results of a bulk response.
    fn parse_bulk_response(body: &Value, documents: &[IndexedDocument]) -> BatchOperationSummary {
        let items = body["items"].as_array().cloned().unwrap_or_default();

        let results = documents
            .iter()
            .enumerate()
            .map(|(i, document)| {
                let item = items.get(i).map(|item| &item["index"]);
                let error = match item {
                    Some(item) if item["error"].is_null() => None,
                    Some(item) => Some(SearchIndexError::index(item["error"].to_string())),
                    None => Some(SearchIndexError::bulk_operation("missing bulk item result")),
                };
                BatchOperationResult {
                    id: document.address.id.clone(),
                    success: error.is_none(),
                    error,
                }
            })
            .collect();

        BatchOperationSummary::from_results(results)
    }
}

#[async_trait]
impl DocumentStore for OpenSearchClient {
    #[instrument(skip(self, document), fields(index = %document.address.index, id = %document.address.id))]
    async fn put_document(&self, document: &IndexedDocument) -> Result<(), SearchIndexError> {
        let address = &document.address;
        let response = self
            .client
            .index(IndexParts::IndexId(&address.index, &address.id))
            .routing(&address.routing)
            .refresh(Refresh::True)
            .body(Self::stored_source(document))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Self::check_response(response, "index", SearchIndexError::IndexError).await?;
        debug!("Document indexed");
        Ok(())
    }

    /// Index documents with the bulk API.
    ///
    /// The request as a whole fails only on transport or status errors;
    /// per-document rejections are reported in the summary.
    async fn bulk_put(
        &self,
        documents: &[IndexedDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if documents.is_empty() {
            return Ok(BatchOperationSummary::default());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for document in documents {
            let address = &document.address;
            body.push(
                json!({
                    "index": {
                        "_index": address.index,
                        "_id": address.id,
                        "routing": address.routing
                    }
                })
                .into(),
            );
            body.push(Self::stored_source(document).into());
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .refresh(Refresh::True)
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let response =
            Self::check_response(response, "bulk", SearchIndexError::BulkOperationError).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let summary = Self::parse_bulk_response(&body, documents);
        debug!(total = summary.total, failed = summary.failed, "Bulk request completed");
        Ok(summary)
    }

    async fn get_document(&self, address: &DocumentAddress) -> Result<Option<Value>, SearchIndexError> {
        let response = self
            .client
            .get(GetParts::IndexId(&address.index, &address.id))
            .routing(&address.routing)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        // 404 is acceptable - the document or index may not exist
        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }

        let response = Self::check_response(response, "get", SearchIndexError::QueryError).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        if body["found"] != json!(true) {
            return Ok(None);
        }
        let source = body["_source"].clone();
        if source[CATEGORY_FIELD] != json!(address.category.as_str()) {
            return Ok(None);
        }
        Ok(Some(source))
    }

    #[instrument(skip(self, query, updates), fields(indices = ?indices))]
    async fn update_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
        updates: &[FieldUpdate],
    ) -> Result<u64, SearchIndexError> {
        let index_names: Vec<&str> = indices.iter().map(String::as_str).collect();
        let routing_parts: Vec<&str> = routing.into_iter().collect();

        let mut request = self
            .client
            .update_by_query(UpdateByQueryParts::Index(&index_names))
            .conflicts(Conflicts::Proceed)
            .refresh(true)
            .ignore_unavailable(true)
            .allow_no_indices(true);
        if !routing_parts.is_empty() {
            request = request.routing(&routing_parts);
        }

        let response = request
            .body(build_update_by_query_body(query, updates))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let response =
            Self::check_response(response, "update_by_query", SearchIndexError::UpdateError).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        let updated = body["updated"].as_u64().unwrap_or(0);
        debug!(updated = updated, "Update by query completed");
        Ok(updated)
    }

    async fn delete_by_query(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<u64, SearchIndexError> {
        let index_names: Vec<&str> = indices.iter().map(String::as_str).collect();
        let routing_parts: Vec<&str> = routing.into_iter().collect();

        let mut request = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&index_names))
            .conflicts(Conflicts::Proceed)
            .refresh(true)
            .ignore_unavailable(true)
            .allow_no_indices(true);
        if !routing_parts.is_empty() {
            request = request.routing(&routing_parts);
        }

        let response = request
            .body(build_delete_by_query_body(query))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let response =
            Self::check_response(response, "delete_by_query", SearchIndexError::DeleteError).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        Ok(body["deleted"].as_u64().unwrap_or(0))
    }

    async fn max_version(
        &self,
        indices: &[String],
        routing: Option<&str>,
        query: &DocumentQuery,
    ) -> Result<Option<u64>, SearchIndexError> {
        let index_names: Vec<&str> = indices.iter().map(String::as_str).collect();
        let routing_parts: Vec<&str> = routing.into_iter().collect();

        let mut request = self
            .client
            .search(SearchParts::Index(&index_names))
            .ignore_unavailable(true)
            .allow_no_indices(true);
        if !routing_parts.is_empty() {
            request = request.routing(&routing_parts);
        }

        let response = request
            .body(build_max_version_body(query))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let response =
            Self::check_response(response, "search", SearchIndexError::QueryError).await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        Ok(parse_max_version(&body))
    }

    async fn ensure_index(&self, index: &str) -> Result<(), SearchIndexError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if exists.status_code().is_success() {
            debug!(index = %index, "Index already exists");
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(self.index_config.index_settings())
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if status.is_success() {
            info!(index = %index, "Created index");
            return Ok(());
        }

        let error_body = response.text().await.unwrap_or_default();
        // Another worker may have created it in the meantime
        if error_body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(SearchIndexError::IndexCreationError(format!(
            "Creating index {} failed with status {}: {}",
            index, status, error_body
        )))
    }

    async fn health_check(&self) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))?;

        Ok(matches!(body["status"].as_str(), Some("green") | Some("yellow")))
    }
}
