//! Workspace (object store) collaborator.
//!
//! Defines the operations the indexer needs from the workspace service and
//! the metadata shapes it returns.

mod json_rpc;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PipelineError;
use workspace_indexer_shared::{ObjectKey, ObjectRef};

pub use json_rpc::JsonRpcWorkspaceClient;

/// Workspace-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WorkspaceInfoTuple")]
pub struct WorkspaceInfo {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub modified: String,
    pub max_object_id: u64,
    pub user_permission: String,
    /// Global read flag: `r`/`y` when world readable, `n` otherwise.
    pub global_read: String,
    pub lock_status: String,
    pub metadata: HashMap<String, Value>,
}

impl WorkspaceInfo {
    /// Whether the workspace is world readable.
    pub fn is_public(&self) -> bool {
        matches!(self.global_read.as_str(), "r" | "y")
    }
}

/// Wire form of workspace info: a positional tuple.
#[derive(Deserialize)]
struct WorkspaceInfoTuple(
    i64,
    String,
    String,
    String,
    u64,
    String,
    String,
    String,
    #[serde(default)] Option<HashMap<String, Value>>,
);

impl From<WorkspaceInfoTuple> for WorkspaceInfo {
    fn from(t: WorkspaceInfoTuple) -> Self {
        Self {
            id: t.0,
            name: t.1,
            owner: t.2,
            modified: t.3,
            max_object_id: t.4,
            user_permission: t.5,
            global_read: t.6,
            lock_status: t.7,
            metadata: t.8.unwrap_or_default(),
        }
    }
}

/// Metadata of one object version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ObjectInfoTuple")]
pub struct ObjectInfo {
    pub object_id: String,
    pub name: String,
    /// Versioned type string, e.g. `KBaseGenomes.Genome-14.2`.
    pub type_string: String,
    pub save_date: String,
    pub version: u64,
    pub saved_by: String,
    pub access_group_id: i64,
    pub workspace_name: String,
    pub checksum: String,
    pub size: u64,
    pub metadata: HashMap<String, Value>,
}

impl ObjectInfo {
    /// Type name without version (`KBaseGenomes.Genome`).
    pub fn object_type(&self) -> &str {
        self.type_string
            .split_once('-')
            .map_or(self.type_string.as_str(), |(name, _)| name)
    }

    /// Major version of the type, if the type string carries one.
    pub fn type_version(&self) -> Option<u32> {
        let (_, version) = self.type_string.split_once('-')?;
        version.split('.').next()?.parse().ok()
    }

    /// Identity of the object this info describes.
    pub fn object_key(&self, storage_code: &str) -> ObjectKey {
        ObjectKey::new(storage_code, self.access_group_id, self.object_id.clone())
    }

    /// Reference to the version this info describes.
    pub fn object_ref(&self, storage_code: &str) -> ObjectRef {
        self.object_key(storage_code).at_version(self.version)
    }
}

/// Wire form of object info: a positional tuple.
#[derive(Deserialize)]
struct ObjectInfoTuple(
    u64,
    String,
    String,
    String,
    u64,
    String,
    i64,
    String,
    String,
    u64,
    #[serde(default)] Option<HashMap<String, Value>>,
);

impl From<ObjectInfoTuple> for ObjectInfo {
    fn from(t: ObjectInfoTuple) -> Self {
        Self {
            object_id: t.0.to_string(),
            name: t.1,
            type_string: t.2,
            save_date: t.3,
            version: t.4,
            saved_by: t.5,
            access_group_id: t.6,
            workspace_name: t.7,
            checksum: t.8,
            size: t.9,
            metadata: t.10.unwrap_or_default(),
        }
    }
}

/// Content and metadata of one object version.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectData {
    pub info: ObjectInfo,
    pub data: Value,
}

/// Abstract interface for the workspace service.
///
/// Production code talks JSON-RPC to the real service; tests inject fakes.
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// Metadata of an access group (workspace).
    async fn get_workspace_info(&self, access_group_id: i64) -> Result<WorkspaceInfo, PipelineError>;

    /// Content and metadata of one object version.
    async fn get_object_version(&self, object: &ObjectRef) -> Result<ObjectData, PipelineError>;

    /// Latest-version info of every object in an access group.
    async fn list_objects(&self, access_group_id: i64) -> Result<Vec<ObjectInfo>, PipelineError>;

    /// Info of the latest version of an object.
    async fn get_object_info(&self, object: &ObjectKey) -> Result<ObjectInfo, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_workspace_info() {
        let info: WorkspaceInfo = serde_json::from_value(json!([
            1,
            "auser:narrative_1485560571814",
            "auser",
            "2018-10-18T00:12:42+0000",
            25,
            "a",
            "y",
            "unlocked",
            {"narrative_nice_name": "A Fancy Narrative", "is_temporary": "false"}
        ]))
        .unwrap();

        assert_eq!(info.id, 1);
        assert!(info.is_public());
        assert_eq!(info.metadata["is_temporary"], "false");

        let mut private = info.clone();
        private.global_read = "n".to_string();
        assert!(!private.is_public());
    }

    #[test]
    fn test_parse_object_info() {
        let info: ObjectInfo = serde_json::from_value(json!([
            3,
            "Rhodobacter_CACIA_14H1",
            "KBaseGenomes.Genome-14.2",
            "2018-02-08T23:23:25+0000",
            2,
            "auser",
            1,
            "auser:narrative_1485560571814",
            "ab1f5ab2bd8b2b4b2c1c4a1d4f5b9e7c",
            1024,
            null
        ]))
        .unwrap();

        assert_eq!(info.object_id, "3");
        assert_eq!(info.object_type(), "KBaseGenomes.Genome");
        assert_eq!(info.type_version(), Some(14));
        assert_eq!(info.object_ref("WS"), ObjectRef::new("WS", 1, "3", 2));
        assert!(info.metadata.is_empty());
    }

    #[test]
    fn test_unversioned_type_string() {
        let info: ObjectInfo = serde_json::from_value(json!([
            1, "x", "KBaseNarrative.Narrative", "", 1, "u", 2, "ws", "", 0, {}
        ]))
        .unwrap();

        assert_eq!(info.object_type(), "KBaseNarrative.Narrative");
        assert_eq!(info.type_version(), None);
    }
}
