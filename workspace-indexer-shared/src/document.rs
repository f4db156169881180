//! Document types stored in the search index.
//!
//! Every object produces one access document, one version document per
//! indexed version and, for composite types, feature documents per version.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::object::{ObjectKey, ObjectRef};

/// Group id that marks a document as world readable.
pub const PUBLIC_GROUP: i64 = -1;

/// Category of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentCategory {
    /// Version and feature documents.
    Data,
    /// Per-object access documents.
    Access,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Access => "access",
        }
    }
}

/// Document describing one version of one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDocument {
    pub id: String,
    pub storage_code: String,
    pub access_group_id: i64,
    pub object_id: String,
    pub version: u64,
    /// Object name at the time of the last rename or index.
    pub name: String,
    /// Type name without version.
    pub object_type: String,
    pub type_version: Option<u32>,
    /// Save timestamp as reported by the workspace.
    pub save_date: Option<String>,
    pub saved_by: Option<String>,
    /// Payload produced by the type-specific extractor.
    pub extracted: Value,
    /// True on the latest non-deleted version of the object.
    pub islast: bool,
    pub public: bool,
    pub deleted: bool,
    pub indexed_at: DateTime<Utc>,
}

impl VersionDocument {
    /// Create a version document for the given reference.
    ///
    /// The document starts out as the latest, visible version; access and
    /// latest bookkeeping are applied by the caller before writing.
    pub fn new(object: &ObjectRef, name: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            id: object.document_id(),
            storage_code: object.key.storage_code.clone(),
            access_group_id: object.key.access_group_id,
            object_id: object.key.object_id.clone(),
            version: object.version,
            name: name.into(),
            object_type: object_type.into(),
            type_version: None,
            save_date: None,
            saved_by: None,
            extracted: Value::Null,
            islast: true,
            public: false,
            deleted: false,
            indexed_at: Utc::now(),
        }
    }

    /// The version this document describes.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(
            self.storage_code.clone(),
            self.access_group_id,
            self.object_id.clone(),
            self.version,
        )
    }

    /// Routing key shared with the object's other documents.
    pub fn routing_key(&self) -> String {
        self.object_ref().routing_key()
    }

    /// Build a feature document that mirrors this version's flags.
    pub fn feature(&self, feature_id: impl Into<String>, extracted: Value) -> FeatureDocument {
        let feature_id = feature_id.into();
        FeatureDocument {
            id: self.object_ref().feature_document_id(&feature_id),
            parent_id: self.id.clone(),
            feature_id,
            storage_code: self.storage_code.clone(),
            access_group_id: self.access_group_id,
            object_id: self.object_id.clone(),
            version: self.version,
            name: self.name.clone(),
            object_type: self.object_type.clone(),
            extracted,
            islast: self.islast,
            public: self.public,
            deleted: self.deleted,
            indexed_at: self.indexed_at,
        }
    }
}

/// Sub-document of a composite object version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDocument {
    pub id: String,
    /// Id of the parent version document.
    pub parent_id: String,
    pub feature_id: String,
    pub storage_code: String,
    pub access_group_id: i64,
    pub object_id: String,
    pub version: u64,
    pub name: String,
    pub object_type: String,
    pub extracted: Value,
    pub islast: bool,
    pub public: bool,
    pub deleted: bool,
    pub indexed_at: DateTime<Utc>,
}

/// Per-object document listing the groups with read access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDocument {
    pub id: String,
    pub storage_code: String,
    pub access_group_id: i64,
    pub object_id: String,
    /// Groups with read access. Contains `PUBLIC_GROUP` when world readable.
    pub groups: BTreeSet<i64>,
}

impl AccessDocument {
    /// Access document for an object readable by its own access group and,
    /// when `public`, by everyone.
    pub fn new(key: &ObjectKey, public: bool) -> Self {
        let mut groups = BTreeSet::from([key.access_group_id]);
        if public {
            groups.insert(PUBLIC_GROUP);
        }
        Self {
            id: key.access_document_id(),
            storage_code: key.storage_code.clone(),
            access_group_id: key.access_group_id,
            object_id: key.object_id.clone(),
            groups,
        }
    }

    pub fn is_public(&self) -> bool {
        self.groups.contains(&PUBLIC_GROUP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_mirrors_parent() {
        let mut doc = VersionDocument::new(&ObjectRef::new("WS", 1, "3", 3), "genome", "KBaseGenomes.Genome");
        doc.islast = false;
        doc.public = true;

        let feature = doc.feature("L876_RS0116375", json!({"function": "kinase"}));

        assert_eq!(feature.id, "WS:1:3:3:L876_RS0116375");
        assert_eq!(feature.parent_id, "WS:1:3:3");
        assert!(!feature.islast);
        assert!(feature.public);
        assert!(!feature.deleted);
        assert_eq!(feature.name, "genome");
    }

    #[test]
    fn test_access_document_groups() {
        let key = ObjectKey::new("WS", 5, "1");

        let private = AccessDocument::new(&key, false);
        assert_eq!(private.groups, BTreeSet::from([5]));
        assert!(!private.is_public());

        let public = AccessDocument::new(&key, true);
        assert!(public.is_public());
        assert_eq!(serde_json::to_value(&public).unwrap()["groups"], json!([-1, 5]));
    }

    #[test]
    fn test_category_serialization() {
        assert_eq!(serde_json::to_value(DocumentCategory::Data).unwrap(), "data");
        assert_eq!(DocumentCategory::Access.as_str(), "access");
    }
}
