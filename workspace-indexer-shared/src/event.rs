//! Workspace event record.
//!
//! Defines the event structure emitted upstream for every change to a stored
//! object and consumed by the indexer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::{ObjectKey, ObjectRef};

/// Kinds of workspace events.
///
/// Unrecognized kinds are kept as `Unknown` rather than failing
/// deserialization, so the dispatcher can log and skip them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A new version of an object was saved.
    NewVersion,
    /// Every version of an object should be (re)indexed.
    NewAllVersions,
    /// An access group was made world readable.
    PublishAccessGroup,
    /// An access group stopped being world readable.
    UnpublishAccessGroup,
    /// Publish state changed for a single object.
    PublishAllVersions,
    /// Publish state revoked for a single object.
    UnpublishAllVersions,
    /// An object was deleted.
    DeleteAllVersions,
    /// An object was restored.
    UndeleteAllVersions,
    /// An entire access group was deleted.
    DeleteAccessGroup,
    /// An object was renamed.
    RenameAllVersions,
    /// An access group was copied from another one.
    CopyAccessGroup,
    /// Every object in a workspace should be reindexed.
    ReindexWorkspace,
    /// Any event kind this indexer does not know about.
    Unknown(String),
}

impl EventType {
    /// Wire name of the event kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NewVersion => "NEW_VERSION",
            Self::NewAllVersions => "NEW_ALL_VERSIONS",
            Self::PublishAccessGroup => "PUBLISH_ACCESS_GROUP",
            Self::UnpublishAccessGroup => "UNPUBLISH_ACCESS_GROUP",
            Self::PublishAllVersions => "PUBLISH_ALL_VERSIONS",
            Self::UnpublishAllVersions => "UNPUBLISH_ALL_VERSIONS",
            Self::DeleteAllVersions => "DELETE_ALL_VERSIONS",
            Self::UndeleteAllVersions => "UNDELETE_ALL_VERSIONS",
            Self::DeleteAccessGroup => "DELETE_ACCESS_GROUP",
            Self::RenameAllVersions => "RENAME_ALL_VERSIONS",
            Self::CopyAccessGroup => "COPY_ACCESS_GROUP",
            Self::ReindexWorkspace => "REINDEX_WORKSPACE",
            Self::Unknown(name) => name,
        }
    }

    /// Whether this kind targets a single object rather than a whole access
    /// group.
    pub fn is_object_scoped(&self) -> bool {
        matches!(
            self,
            Self::NewVersion
                | Self::NewAllVersions
                | Self::PublishAllVersions
                | Self::UnpublishAllVersions
                | Self::DeleteAllVersions
                | Self::UndeleteAllVersions
                | Self::RenameAllVersions
        )
    }
}

impl From<String> for EventType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "NEW_VERSION" => Self::NewVersion,
            "NEW_ALL_VERSIONS" => Self::NewAllVersions,
            "PUBLISH_ACCESS_GROUP" => Self::PublishAccessGroup,
            "UNPUBLISH_ACCESS_GROUP" => Self::UnpublishAccessGroup,
            "PUBLISH_ALL_VERSIONS" => Self::PublishAllVersions,
            "UNPUBLISH_ALL_VERSIONS" => Self::UnpublishAllVersions,
            "DELETE_ALL_VERSIONS" => Self::DeleteAllVersions,
            "UNDELETE_ALL_VERSIONS" => Self::UndeleteAllVersions,
            "DELETE_ACCESS_GROUP" => Self::DeleteAccessGroup,
            "RENAME_ALL_VERSIONS" => Self::RenameAllVersions,
            "COPY_ACCESS_GROUP" => Self::CopyAccessGroup,
            "REINDEX_WORKSPACE" => Self::ReindexWorkspace,
            _ => Self::Unknown(name),
        }
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an event is about: one object, or a whole access group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventScope {
    Object(ObjectKey),
    AccessGroup { storage_code: String, access_group_id: i64 },
}

impl EventScope {
    /// The access group scope containing this scope.
    pub fn group_scope(&self) -> EventScope {
        match self {
            Self::Object(key) => Self::AccessGroup {
                storage_code: key.storage_code.clone(),
                access_group_id: key.access_group_id,
            },
            Self::AccessGroup { .. } => self.clone(),
        }
    }
}

/// A workspace event received from the event stream.
///
/// Field names follow the upstream producer's short wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEvent {
    /// Store identifier.
    #[serde(rename = "strcde")]
    pub storage_code: String,
    /// Access group the event applies to.
    #[serde(rename = "accgrp")]
    pub access_group_id: i64,
    /// Object id, for object-scoped events.
    #[serde(rename = "objid", default)]
    pub object_id: Option<String>,
    /// Object version, for version-scoped events.
    #[serde(rename = "ver", default)]
    pub version: Option<u64>,
    /// New object name, for rename events.
    #[serde(rename = "newname", default)]
    pub new_name: Option<String>,
    /// The kind of event.
    #[serde(rename = "evtype")]
    pub event_type: EventType,
    /// Object type name without version, e.g. `KBaseGenomes.Genome`.
    #[serde(rename = "objtype", default)]
    pub object_type: Option<String>,
    /// Major version of the object type.
    #[serde(rename = "objtypever", default)]
    pub object_type_version: Option<u32>,
    /// Public flag as reported by the producer.
    #[serde(default)]
    pub public: Option<bool>,
    /// When the event occurred upstream.
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl WorkspaceEvent {
    /// Create a bare event of the given kind for an access group.
    pub fn new(
        event_type: EventType,
        storage_code: impl Into<String>,
        access_group_id: i64,
    ) -> Self {
        Self {
            storage_code: storage_code.into(),
            access_group_id,
            object_id: None,
            version: None,
            new_name: None,
            event_type,
            object_type: None,
            object_type_version: None,
            public: None,
            time: Some(Utc::now()),
        }
    }

    /// Create a NEW_VERSION event for one object version.
    pub fn new_version(object: &ObjectRef) -> Self {
        let mut event = Self::new(
            EventType::NewVersion,
            object.key.storage_code.clone(),
            object.key.access_group_id,
        );
        event.object_id = Some(object.key.object_id.clone());
        event.version = Some(object.version);
        event
    }

    /// Set the object type on the event.
    pub fn with_object_type(mut self, object_type: impl Into<String>, version: Option<u32>) -> Self {
        self.object_type = Some(object_type.into());
        self.object_type_version = version;
        self
    }

    /// The object this event refers to, if it carries an object id.
    pub fn object_key(&self) -> Option<ObjectKey> {
        self.object_id.as_ref().map(|object_id| {
            ObjectKey::new(
                self.storage_code.clone(),
                self.access_group_id,
                object_id.clone(),
            )
        })
    }

    /// The object version this event refers to, if it carries both an
    /// object id and a version.
    pub fn object_ref(&self) -> Option<ObjectRef> {
        let version = self.version?;
        self.object_key().map(|key| key.at_version(version))
    }

    /// Scope used to serialize handling of related events.
    ///
    /// Group-level kinds are scoped to their access group even when the
    /// record carries an object id.
    pub fn scope(&self) -> EventScope {
        match self.object_key() {
            Some(key) if self.event_type.is_object_scoped() => EventScope::Object(key),
            _ => EventScope::AccessGroup {
                storage_code: self.storage_code.clone(),
                access_group_id: self.access_group_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_wire_event() {
        let payload = json!({
            "strcde": "WS",
            "accgrp": 1,
            "objid": "2",
            "ver": 3,
            "newname": null,
            "evtype": "NEW_VERSION",
            "time": "2018-02-08T23:23:25.553Z",
            "objtype": "KBaseNarrative.Narrative",
            "objtypever": 4,
            "public": false
        });

        let event: WorkspaceEvent = serde_json::from_value(payload).unwrap();

        assert_eq!(event.event_type, EventType::NewVersion);
        assert_eq!(event.object_ref(), Some(ObjectRef::new("WS", 1, "2", 3)));
        assert_eq!(event.object_type.as_deref(), Some("KBaseNarrative.Narrative"));
        assert_eq!(event.object_type_version, Some(4));
        assert_eq!(event.public, Some(false));
        assert!(event.time.is_some());
    }

    #[test]
    fn test_unknown_event_type_is_preserved() {
        let payload = json!({
            "strcde": "WS",
            "accgrp": 1,
            "evtype": "SET_GLOBAL_PERMISSION"
        });

        let event: WorkspaceEvent = serde_json::from_value(payload).unwrap();

        assert_eq!(
            event.event_type,
            EventType::Unknown("SET_GLOBAL_PERMISSION".to_string())
        );
        assert_eq!(event.event_type.as_str(), "SET_GLOBAL_PERMISSION");
        assert!(event.object_key().is_none());
    }

    #[test]
    fn test_event_scope() {
        let mut event = WorkspaceEvent::new(EventType::PublishAccessGroup, "WS", 7);
        assert_eq!(
            event.scope(),
            EventScope::AccessGroup {
                storage_code: "WS".to_string(),
                access_group_id: 7
            }
        );

        let group = event.scope();
        event.object_id = Some("9".to_string());
        assert_eq!(event.scope(), group);

        event.event_type = EventType::RenameAllVersions;
        let object = event.scope();
        assert_eq!(object, EventScope::Object(ObjectKey::new("WS", 7, "9")));
        assert_eq!(object.group_scope(), group);
        assert_eq!(group.group_scope(), group);
    }

    #[test]
    fn test_object_scoped_kinds() {
        assert!(EventType::NewVersion.is_object_scoped());
        assert!(EventType::UnpublishAllVersions.is_object_scoped());
        assert!(!EventType::PublishAccessGroup.is_object_scoped());
        assert!(!EventType::CopyAccessGroup.is_object_scoped());
        assert!(!EventType::Unknown("X".to_string()).is_object_scoped());
    }

    #[test]
    fn test_event_type_serializes_to_wire_name() {
        let event = WorkspaceEvent::new_version(&ObjectRef::new("WS", 1, "2", 3));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["evtype"], "NEW_VERSION");
        assert_eq!(value["objid"], "2");
        assert_eq!(value["ver"], 3);
    }
}
