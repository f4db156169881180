//! JSON-RPC 1.1 client for the workspace service.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{ObjectData, ObjectInfo, WorkspaceClient, WorkspaceInfo};
use crate::errors::PipelineError;
use workspace_indexer_shared::{ObjectKey, ObjectRef};

/// Page size used when listing the objects of a workspace.
const LIST_PAGE_SIZE: u64 = 10000;

/// Workspace client speaking JSON-RPC over HTTP.
pub struct JsonRpcWorkspaceClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<Value>>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct GetObjectsResult {
    data: Vec<ObjectDataWire>,
}

#[derive(Deserialize)]
struct ObjectDataWire {
    info: ObjectInfo,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct GetObjectInfoResult {
    infos: Vec<ObjectInfo>,
}

impl JsonRpcWorkspaceClient {
    /// Create a client for the workspace service at `url`.
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::object_fetch(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            token,
        })
    }

    /// Call `Workspace.{method}` with a single parameter object and decode
    /// the first returned value.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, PipelineError> {
        let body = json!({
            "version": "1.1",
            "method": format!("Workspace.{}", method),
            "params": [params],
            "id": Uuid::new_v4().to_string()
        });

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.header("Authorization", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::object_fetch(format!("{} request failed: {}", method, e)))?;
        let status = response.status();

        // Errors come back as JSON bodies with a 500 status
        let decoded: RpcResponse = response.json().await.map_err(|e| {
            PipelineError::object_fetch(format!(
                "{} returned undecodable response (status {}): {}",
                method, status, e
            ))
        })?;

        if let Some(error) = decoded.error {
            return Err(PipelineError::object_fetch(format!(
                "{} failed: {} {}",
                method, error.name, error.message
            )));
        }

        let value = decoded
            .result
            .and_then(|mut values| (!values.is_empty()).then(|| values.swap_remove(0)))
            .ok_or_else(|| PipelineError::object_fetch(format!("{} returned no result", method)))?;

        serde_json::from_value(value)
            .map_err(|e| PipelineError::object_fetch(format!("{} result malformed: {}", method, e)))
    }
}

#[async_trait]
impl WorkspaceClient for JsonRpcWorkspaceClient {
    async fn get_workspace_info(&self, access_group_id: i64) -> Result<WorkspaceInfo, PipelineError> {
        self.call("get_workspace_info", json!({ "id": access_group_id }))
            .await
    }

    #[instrument(skip(self), fields(object = %object))]
    async fn get_object_version(&self, object: &ObjectRef) -> Result<ObjectData, PipelineError> {
        let result: GetObjectsResult = self
            .call(
                "get_objects2",
                json!({ "objects": [{ "ref": object.workspace_ref() }] }),
            )
            .await?;

        let wire = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::object_fetch(format!("object {} not found", object)))?;

        debug!("Fetched object data");
        Ok(ObjectData {
            info: wire.info,
            data: wire.data,
        })
    }

    async fn list_objects(&self, access_group_id: i64) -> Result<Vec<ObjectInfo>, PipelineError> {
        let mut objects: Vec<ObjectInfo> = Vec::new();
        let mut min_object_id: u64 = 1;

        loop {
            let page: Vec<ObjectInfo> = self
                .call(
                    "list_objects",
                    json!({
                        "ids": [access_group_id],
                        "minObjectID": min_object_id,
                        "limit": LIST_PAGE_SIZE
                    }),
                )
                .await?;

            let page_len = page.len() as u64;
            let last_id = page
                .iter()
                .filter_map(|info| info.object_id.parse::<u64>().ok())
                .max();
            objects.extend(page);

            match last_id {
                Some(last) if page_len >= LIST_PAGE_SIZE => min_object_id = last + 1,
                _ => break,
            }
        }

        debug!(access_group_id = access_group_id, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn get_object_info(&self, object: &ObjectKey) -> Result<ObjectInfo, PipelineError> {
        let result: GetObjectInfoResult = self
            .call(
                "get_object_info3",
                json!({ "objects": [{ "ref": object.workspace_ref() }] }),
            )
            .await?;

        result
            .infos
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::object_fetch(format!("object {} not found", object)))
    }
}
