//! Request and response types for document store operations.

use serde::Serialize;
use serde_json::Value;

use crate::errors::SearchIndexError;
use workspace_indexer_shared::{DocumentCategory, ObjectKey};

/// Location of a single document: index, routing key, category and id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentAddress {
    /// Target index name.
    pub index: String,
    /// Routing key; documents of one object share it.
    pub routing: String,
    /// Document category.
    pub category: DocumentCategory,
    /// Document id, unique within the index.
    pub id: String,
}

impl DocumentAddress {
    /// Create a new document address.
    pub fn new(
        index: impl Into<String>,
        routing: impl Into<String>,
        category: DocumentCategory,
        id: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            routing: routing.into(),
            category,
            id: id.into(),
        }
    }

    /// Address of a version or feature document.
    pub fn data(index: impl Into<String>, routing: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(index, routing, DocumentCategory::Data, id)
    }

    /// Address of an access document.
    pub fn access(index: impl Into<String>, routing: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(index, routing, DocumentCategory::Access, id)
    }

    /// Check that every addressing part is present.
    pub fn validate(&self) -> Result<(), SearchIndexError> {
        if self.index.is_empty() {
            return Err(SearchIndexError::validation("index is required"));
        }
        if self.routing.is_empty() {
            return Err(SearchIndexError::validation("routing is required"));
        }
        if self.id.is_empty() {
            return Err(SearchIndexError::validation("document id is required"));
        }
        Ok(())
    }
}

/// A document ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub address: DocumentAddress,
    pub source: Value,
}

impl IndexedDocument {
    /// Serialize `document` as the source stored at `address`.
    pub fn new<T: Serialize>(address: DocumentAddress, document: &T) -> Result<Self, SearchIndexError> {
        let source = serde_json::to_value(document)?;
        if !source.is_object() {
            return Err(SearchIndexError::validation(format!(
                "document {} must serialize to an object",
                address.id
            )));
        }
        Ok(Self { address, source })
    }
}

/// A single condition of a `DocumentQuery`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Document has the given category.
    Category(DocumentCategory),
    /// Field equals the value, or is an array containing it.
    Term { field: String, value: Value },
    /// Negation of `Term`. Documents missing the field match.
    NotTerm { field: String, value: Value },
}

/// Conjunction of conditions selecting documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    conditions: Vec<Condition>,
}

impl DocumentQuery {
    /// Query matching every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default visibility filter: excludes soft-deleted documents.
    pub fn visible() -> Self {
        Self::new().not_term("deleted", true)
    }

    /// Query matching the documents of one object.
    pub fn object(key: &ObjectKey) -> Self {
        Self::access_group(&key.storage_code, key.access_group_id).term("object_id", key.object_id.clone())
    }

    /// Query matching every document of one access group.
    pub fn access_group(storage_code: &str, access_group_id: i64) -> Self {
        Self::new()
            .term("storage_code", storage_code)
            .term("access_group_id", access_group_id)
    }

    /// Restrict to a document category.
    pub fn category(mut self, category: DocumentCategory) -> Self {
        self.conditions.push(Condition::Category(category));
        self
    }

    /// Require `field` to equal (or contain) `value`.
    pub fn term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Term {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Require `field` not to equal (or contain) `value`.
    pub fn not_term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::NotTerm {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Add every condition of `other`.
    pub fn and(mut self, other: DocumentQuery) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Evaluate the query against a stored document.
    pub fn matches(&self, category: DocumentCategory, source: &Value) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Category(expected) => *expected == category,
            Condition::Term { field, value } => field_matches(source, field, value),
            Condition::NotTerm { field, value } => !field_matches(source, field, value),
        })
    }
}

fn field_matches(source: &Value, field: &str, value: &Value) -> bool {
    match source.get(field) {
        Some(Value::Array(items)) => items.contains(value),
        Some(found) => found == value,
        None => false,
    }
}

/// A single field modification applied by `update_by_query`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Overwrite the field.
    Set { field: String, value: Value },
    /// Append the value to an array field unless already present.
    AddToSet { field: String, value: Value },
    /// Remove every occurrence of the value from an array field.
    RemoveFromSet { field: String, value: Value },
}

impl FieldUpdate {
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Set {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn add_to_set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::AddToSet {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn remove_from_set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::RemoveFromSet {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Apply the update to a document source, returning whether it changed.
    pub fn apply(&self, source: &mut Value) -> bool {
        let Some(object) = source.as_object_mut() else {
            return false;
        };
        match self {
            Self::Set { field, value } => {
                if object.get(field) == Some(value) {
                    return false;
                }
                object.insert(field.clone(), value.clone());
                true
            }
            Self::AddToSet { field, value } => {
                let entry = object
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                match entry {
                    Value::Array(items) if items.contains(value) => false,
                    Value::Array(items) => {
                        items.push(value.clone());
                        true
                    }
                    other => {
                        *other = Value::Array(vec![value.clone()]);
                        true
                    }
                }
            }
            Self::RemoveFromSet { field, value } => match object.get_mut(field) {
                Some(Value::Array(items)) => {
                    let before = items.len();
                    items.retain(|item| item != value);
                    items.len() != before
                }
                _ => false,
            },
        }
    }
}

/// Result of a batch operation for a single item.
#[derive(Debug, Clone)]
pub struct BatchOperationResult {
    /// The document id.
    pub id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error if the operation failed.
    pub error: Option<SearchIndexError>,
}

/// Summary of a batch operation containing aggregate statistics and individual results.
#[derive(Debug, Clone, Default)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
}

impl BatchOperationSummary {
    /// Build a summary from individual results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Fold another summary into this one.
    pub fn merge(&mut self, other: BatchOperationSummary) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.results.extend(other.results);
    }

    /// Ids of the items that failed.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_validation() {
        assert!(DocumentAddress::data("genome", "WS:1:3", "WS:1:3:3").validate().is_ok());
        assert!(matches!(
            DocumentAddress::data("", "WS:1:3", "WS:1:3:3").validate(),
            Err(SearchIndexError::ValidationError(_))
        ));
        assert!(DocumentAddress::access("genome", "", "WS:1:3").validate().is_err());
    }

    #[test]
    fn test_query_matches_terms_and_arrays() {
        let source = json!({
            "storage_code": "WS",
            "access_group_id": 1,
            "object_id": "3",
            "groups": [1, -1],
            "deleted": false
        });

        let query = DocumentQuery::object(&ObjectKey::new("WS", 1, "3"))
            .category(DocumentCategory::Access)
            .term("groups", -1);
        assert!(query.matches(DocumentCategory::Access, &source));
        assert!(!query.matches(DocumentCategory::Data, &source));

        assert!(DocumentQuery::visible().matches(DocumentCategory::Data, &source));
        assert!(!DocumentQuery::new()
            .not_term("groups", -1)
            .matches(DocumentCategory::Access, &source));
    }

    #[test]
    fn test_missing_field_matches_not_term() {
        let source = json!({"name": "x"});

        assert!(DocumentQuery::visible().matches(DocumentCategory::Data, &source));
        assert!(!DocumentQuery::new()
            .term("deleted", false)
            .matches(DocumentCategory::Data, &source));
    }

    #[test]
    fn test_field_updates_are_idempotent() {
        let mut source = json!({"groups": [1], "public": false});

        assert!(FieldUpdate::add_to_set("groups", -1).apply(&mut source));
        assert!(!FieldUpdate::add_to_set("groups", -1).apply(&mut source));
        assert_eq!(source["groups"], json!([1, -1]));

        assert!(FieldUpdate::set("public", true).apply(&mut source));
        assert!(!FieldUpdate::set("public", true).apply(&mut source));

        assert!(FieldUpdate::remove_from_set("groups", -1).apply(&mut source));
        assert!(!FieldUpdate::remove_from_set("groups", -1).apply(&mut source));
        assert_eq!(source["groups"], json!([1]));
    }

    #[test]
    fn test_summary_from_results() {
        let summary = BatchOperationSummary::from_results(vec![
            BatchOperationResult {
                id: "a".to_string(),
                success: true,
                error: None,
            },
            BatchOperationResult {
                id: "b".to_string(),
                success: false,
                error: Some(SearchIndexError::index("rejected")),
            },
        ]);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_ids(), vec!["b"]);
    }
}
