//! Normalization of provider response bodies.
//!
//! Providers answer either with an OpenAI-style object (`{"data": [{"embedding": [...]}]}`) or
//! with a bare list of vectors. Both collapse into one ordered `Vec<Vec<f32>>`; any other shape
//! is rejected.

use serde::Deserialize;

use super::EmbeddingClientError;

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Object { data: Vec<EmbeddingEntry> },
    Bare(Vec<Vec<f32>>),
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Parse a response body into vectors matching the order of `expected` inputs.
pub(crate) fn normalize_response(
    body: &[u8],
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    let parsed: EmbeddingResponse = serde_json::from_slice(body).map_err(|_| {
        EmbeddingClientError::MalformedResponse(format!(
            "expected `{{\"data\": [{{\"embedding\": [...]}}]}}` or `[[...]]`, got: {}",
            preview(body)
        ))
    })?;

    let vectors = match parsed {
        EmbeddingResponse::Bare(vectors) => vectors,
        EmbeddingResponse::Object { data } => order_by_index(data)?,
    };

    if vectors.len() != expected {
        return Err(EmbeddingClientError::CountMismatch {
            expected,
            actual: vectors.len(),
        });
    }
    if let Some(position) = vectors.iter().position(Vec::is_empty) {
        return Err(EmbeddingClientError::MalformedResponse(format!(
            "vector {position} is empty"
        )));
    }

    Ok(vectors)
}

/// Place entries at their `index` when every entry carries one; the indices must then be a
/// permutation of `0..n`.
fn order_by_index(data: Vec<EmbeddingEntry>) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if !data.iter().all(|entry| entry.index.is_some()) {
        return Ok(data.into_iter().map(|entry| entry.embedding).collect());
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; data.len()];
    for entry in data {
        let Some(index) = entry.index else {
            continue;
        };
        let slot = slots.get_mut(index).ok_or_else(|| {
            EmbeddingClientError::MalformedResponse(format!("embedding index {index} out of range"))
        })?;
        if slot.is_some() {
            return Err(EmbeddingClientError::MalformedResponse(format!(
                "duplicate embedding index {index}"
            )));
        }
        *slot = Some(entry.embedding);
    }

    Ok(slots.into_iter().flatten().collect())
}

fn preview(body: &[u8]) -> String {
    const LIMIT: usize = 200;
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_object_shape_and_orders_by_index() {
        let body = br#"{"object":"list","data":[
            {"embedding":[0.3,0.4],"index":1},
            {"embedding":[0.1,0.2],"index":0}
        ],"model":"m"}"#;
        let vectors = normalize_response(body, 2).expect("vectors");
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn rejects_duplicate_or_out_of_range_indices() {
        for body in [
            &br#"{"data":[{"embedding":[0.1],"index":0},{"embedding":[0.2],"index":0}]}"#[..],
            &br#"{"data":[{"embedding":[0.1],"index":0},{"embedding":[0.2],"index":2}]}"#[..],
        ] {
            let error = normalize_response(body, 2).unwrap_err();
            assert!(
                matches!(error, EmbeddingClientError::MalformedResponse(_)),
                "unexpected error for {:?}: {error}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn accepts_object_shape_without_index() {
        let body = br#"{"data":[{"embedding":[1.0]},{"embedding":[2.0]}]}"#;
        let vectors = normalize_response(body, 2).expect("vectors");
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn accepts_bare_vector_list() {
        let vectors = normalize_response(b"[[0.5, 0.5], [1, 0]]", 2).expect("vectors");
        assert_eq!(vectors, vec![vec![0.5, 0.5], vec![1.0, 0.0]]);
    }

    #[test]
    fn rejects_unknown_shapes() {
        for body in [
            &br#"{"embeddings":[[0.1]]}"#[..],
            &br#"{"data":[{"vector":[0.1]}]}"#[..],
            &b"not json"[..],
            &br#"[0.1, 0.2]"#[..],
        ] {
            let error = normalize_response(body, 1).unwrap_err();
            assert!(
                matches!(error, EmbeddingClientError::MalformedResponse(_)),
                "unexpected error for {:?}: {error}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn rejects_count_mismatch_and_empty_vectors() {
        let error = normalize_response(b"[[0.1]]", 2).unwrap_err();
        assert!(matches!(
            error,
            EmbeddingClientError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));

        let error = normalize_response(b"[[0.1], []]", 2).unwrap_err();
        assert!(matches!(error, EmbeddingClientError::MalformedResponse(_)));
    }
}
