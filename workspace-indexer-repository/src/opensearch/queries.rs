//! OpenSearch query and script builders.
//!
//! Translates `DocumentQuery` conditions into bool filters and
//! `FieldUpdate`s into a painless script with parameters.

use serde_json::{json, Map, Value};

use super::index_config::KEYWORD_SUBFIELDS;
use crate::types::{Condition, DocumentQuery, FieldUpdate};

/// Field holding the document category in every stored source.
pub const CATEGORY_FIELD: &str = "category";

/// Field a term condition on `field` must target to compare exact values.
pub fn exact_field(field: &str) -> &str {
    KEYWORD_SUBFIELDS
        .iter()
        .find(|(analyzed, _)| *analyzed == field)
        .map_or(field, |(_, exact)| exact)
}

/// Build the bool query for a `DocumentQuery`.
///
/// `Term` conditions become `term` filters (which also match array members),
/// `NotTerm` conditions become `must_not` clauses. Both compare against the
/// exact value of analyzed fields.
pub fn build_query(query: &DocumentQuery) -> Value {
    let mut filter = Vec::new();
    let mut must_not = Vec::new();

    for condition in query.conditions() {
        match condition {
            Condition::Category(category) => {
                filter.push(json!({ "term": { CATEGORY_FIELD: category.as_str() } }));
            }
            Condition::Term { field, value } => {
                filter.push(json!({ "term": { exact_field(field): value } }));
            }
            Condition::NotTerm { field, value } => {
                must_not.push(json!({ "term": { exact_field(field): value } }));
            }
        }
    }

    json!({
        "bool": {
            "filter": filter,
            "must_not": must_not
        }
    })
}

/// Build a painless script applying the updates in order.
///
/// Field names and values are passed as parameters so that user-supplied
/// data (e.g. a new object name) never becomes script source.
pub fn build_update_script(updates: &[FieldUpdate]) -> Value {
    let mut source = String::new();
    let mut params = Map::new();

    for (i, update) in updates.iter().enumerate() {
        let field_param = format!("f{}", i);
        let value_param = format!("v{}", i);
        let (field, value) = match update {
            FieldUpdate::Set { field, value } => {
                source.push_str(&format!(
                    "ctx._source[params.{f}] = params.{v}; ",
                    f = field_param,
                    v = value_param
                ));
                (field, value)
            }
            FieldUpdate::AddToSet { field, value } => {
                source.push_str(&format!(
                    "if (ctx._source[params.{f}] == null) {{ ctx._source[params.{f}] = []; }} \
                     if (!ctx._source[params.{f}].contains(params.{v})) {{ ctx._source[params.{f}].add(params.{v}); }} ",
                    f = field_param,
                    v = value_param
                ));
                (field, value)
            }
            FieldUpdate::RemoveFromSet { field, value } => {
                source.push_str(&format!(
                    "if (ctx._source[params.{f}] != null) {{ ctx._source[params.{f}].removeIf(x -> x == params.{v}); }} ",
                    f = field_param,
                    v = value_param
                ));
                (field, value)
            }
        };
        params.insert(field_param, Value::String(field.clone()));
        params.insert(value_param, value.clone());
    }

    json!({
        "lang": "painless",
        "source": source.trim_end(),
        "params": params
    })
}

/// Body for an update-by-query request.
pub fn build_update_by_query_body(query: &DocumentQuery, updates: &[FieldUpdate]) -> Value {
    json!({
        "query": build_query(query),
        "script": build_update_script(updates)
    })
}

/// Body for a delete-by-query request.
pub fn build_delete_by_query_body(query: &DocumentQuery) -> Value {
    json!({ "query": build_query(query) })
}

/// Body for a max(version) aggregation.
pub fn build_max_version_body(query: &DocumentQuery) -> Value {
    json!({
        "size": 0,
        "query": build_query(query),
        "aggs": {
            "max_version": { "max": { "field": "version" } }
        }
    })
}

/// Extract the max(version) aggregation value from a search response.
pub fn parse_max_version(response: &Value) -> Option<u64> {
    response["aggregations"]["max_version"]["value"]
        .as_f64()
        .map(|v| v as u64)
}
