//! Conversion between chunk records and Qdrant payload objects.
//!
//! The payload is flat: `text` next to every [`ChunkMetadata`] field, so that `namespace`,
//! `filename`, and `content_hash` can be indexed and filtered on directly.

use serde_json::{Map, Value};

use crate::processing::types::ChunkMetadata;

const TEXT_FIELD: &str = "text";

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_payload(
    text: &str,
    metadata: &ChunkMetadata,
) -> Result<Map<String, Value>, serde_json::Error> {
    let mut payload = match serde_json::to_value(metadata)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert(TEXT_FIELD.into(), Value::String(text.to_string()));
    Ok(payload)
}

/// Split a stored payload back into chunk text and metadata.
pub(crate) fn parse_payload(
    mut payload: Map<String, Value>,
) -> Result<(String, ChunkMetadata), serde_json::Error> {
    let text = match payload.remove(TEXT_FIELD) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    };
    let metadata = serde_json::from_value(Value::Object(payload))?;
    Ok((text, metadata))
}
