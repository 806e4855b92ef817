//! Filter helpers for Qdrant queries, scrolls, and deletes.

use serde_json::{Value, json};

use super::types::SearchFilterArgs;

/// Compose a `must` filter from the optional namespace and filename constraints.
///
/// Values are matched exactly as given; only absent constraints are omitted.
pub fn build_search_filter(args: &SearchFilterArgs) -> Option<Value> {
    let must: Vec<Value> = [
        ("namespace", args.namespace.as_deref()),
        ("filename", args.filename.as_deref()),
    ]
    .into_iter()
    .filter_map(|(key, value)| value.map(|value| match_clause(key, value)))
    .collect();

    if must.is_empty() {
        None
    } else {
        Some(json!({ "must": must }))
    }
}

/// Filter selecting every point of one document within one namespace.
pub fn build_document_filter(namespace: &str, filename: &str) -> Value {
    json!({
        "must": [
            match_clause("namespace", namespace),
            match_clause("filename", filename),
        ]
    })
}

fn match_clause(key: &str, value: &str) -> Value {
    json!({
        "key": key,
        "match": { "value": value }
    })
}
