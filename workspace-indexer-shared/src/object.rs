//! Object identity and version references.
//!
//! An object is identified across its versions by storage code, access group
//! and object id. All documents derived from one object share its routing key
//! so that a version and its features always live on the same shard.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an object across all of its versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Store identifier, e.g. `WS`.
    pub storage_code: String,
    /// Access group (workspace) the object lives in.
    pub access_group_id: i64,
    /// Object id within the access group.
    pub object_id: String,
}

impl ObjectKey {
    /// Create a new object key.
    pub fn new(
        storage_code: impl Into<String>,
        access_group_id: i64,
        object_id: impl Into<String>,
    ) -> Self {
        Self {
            storage_code: storage_code.into(),
            access_group_id,
            object_id: object_id.into(),
        }
    }

    /// Routing key shared by every version, feature and access document of
    /// this object.
    ///
    /// Uses format: `{storage_code}:{access_group_id}:{object_id}`.
    pub fn routing_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.storage_code, self.access_group_id, self.object_id
        )
    }

    /// The access document lives under the routing key itself.
    pub fn access_document_id(&self) -> String {
        self.routing_key()
    }

    /// Reference a specific version of this object.
    pub fn at_version(&self, version: u64) -> ObjectRef {
        ObjectRef {
            key: self.clone(),
            version,
        }
    }

    /// Workspace reference without a version (`accgrp/objid`), which the
    /// workspace resolves to the latest version.
    pub fn workspace_ref(&self) -> String {
        format!("{}/{}", self.access_group_id, self.object_id)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.routing_key())
    }
}

/// Reference to one immutable version of one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// The object this version belongs to.
    pub key: ObjectKey,
    /// Version number, monotonically increasing per object.
    pub version: u64,
}

impl ObjectRef {
    /// Create a new object reference.
    pub fn new(
        storage_code: impl Into<String>,
        access_group_id: i64,
        object_id: impl Into<String>,
        version: u64,
    ) -> Self {
        ObjectKey::new(storage_code, access_group_id, object_id).at_version(version)
    }

    /// Id of the version document for this reference.
    ///
    /// Uses format: `{storage_code}:{access_group_id}:{object_id}:{version}`.
    pub fn document_id(&self) -> String {
        format!("{}:{}", self.key.routing_key(), self.version)
    }

    /// Id of a feature document belonging to this version.
    pub fn feature_document_id(&self, feature_id: &str) -> String {
        format!("{}:{}", self.document_id(), feature_id)
    }

    /// Routing key of the parent object.
    pub fn routing_key(&self) -> String {
        self.key.routing_key()
    }

    /// Workspace reference (`accgrp/objid/ver`).
    pub fn workspace_ref(&self) -> String {
        format!("{}/{}", self.key.workspace_ref(), self.version)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.document_id())
    }
}
