//! OpenSearch index configuration and mappings.
//!
//! Every index written by the indexer (type indices, feature indices and the
//! default index) shares one set of mappings for the bookkeeping fields.
//! The extracted payload is mapped dynamically.

use serde_json::{json, Value};

/// Analyzed text fields and the keyword subfield holding their exact value.
///
/// Term conditions on these fields must run against the subfield.
pub const KEYWORD_SUBFIELDS: &[(&str, &str)] = &[("name", "name.raw")];

/// Settings applied when the indexer creates an index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            number_of_shards: 3,
            number_of_replicas: 1,
        }
    }
}

impl IndexConfig {
    pub fn new(number_of_shards: u32, number_of_replicas: u32) -> Self {
        Self {
            number_of_shards,
            number_of_replicas,
        }
    }

    /// Get the index settings and mappings.
    ///
    /// - **Keyword fields**: ids, routing parts and type names, for exact filters
    /// - **Boolean flags**: `islast`, `public`, `deleted`
    /// - **groups**: integer array used for access filtering
    /// - **extracted**: dynamic object produced by the type extractor
    pub fn index_settings(&self) -> Value {
        json!({
            "settings": {
                "number_of_shards": self.number_of_shards,
                "number_of_replicas": self.number_of_replicas
            },
            "mappings": {
                "_routing": {
                    "required": true
                },
                "properties": {
                    "category": { "type": "keyword" },
                    "id": { "type": "keyword" },
                    "parent_id": { "type": "keyword" },
                    "feature_id": { "type": "keyword" },
                    "storage_code": { "type": "keyword" },
                    "access_group_id": { "type": "integer" },
                    "object_id": { "type": "keyword" },
                    "version": { "type": "long" },
                    "name": {
                        "type": "text",
                        "fields": {
                            "raw": { "type": "keyword" }
                        }
                    },
                    "object_type": { "type": "keyword" },
                    "type_version": { "type": "integer" },
                    "save_date": { "type": "keyword" },
                    "saved_by": { "type": "keyword" },
                    "islast": { "type": "boolean" },
                    "public": { "type": "boolean" },
                    "deleted": { "type": "boolean" },
                    "groups": { "type": "integer" },
                    "extracted": { "type": "object", "dynamic": true },
                    "indexed_at": { "type": "date" }
                }
            }
        })
    }
}
