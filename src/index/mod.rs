//! Vector index capability and backend selection.
//!
//! Two implementations exist: [`QdrantIndex`] delegates storage, filtering, and thresholding to
//! an external Qdrant collection, while [`MemoryIndex`] keeps records in process and scans them
//! linearly. The backend is chosen once at startup by [`connect_index`]; if Qdrant cannot be
//! reached the process keeps the in-memory index for its whole lifetime.

mod memory;
mod qdrant;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::{QdrantSettings, VectorBackend},
    processing::types::{Chunk, ChunkMetadata, SearchResult},
    qdrant::{QdrantError, QdrantService},
};

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

/// Errors raised by vector index implementations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Qdrant request failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Record or query vector does not match the index dimensionality.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was created with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Stored payload could not be converted to or from chunk metadata.
    #[error("Invalid record payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The persisted unit: one chunk and its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Unique record identifier (UUID v4).
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Chunk text.
    pub text: String,
    /// Chunk metadata, including its namespace.
    pub metadata: ChunkMetadata,
}

impl VectorRecord {
    /// Pair a chunk with its embedding under a fresh identifier.
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            text: chunk.text,
            metadata: chunk.metadata,
        }
    }
}

/// Parameters of a nearest-neighbor search.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Maximum number of candidates to return.
    pub limit: usize,
    /// Minimum cosine similarity of returned candidates.
    pub score_threshold: f32,
    /// Exact-match namespace restriction.
    pub namespace: Option<String>,
}

/// Storage and similarity search over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend implementing this index.
    fn backend(&self) -> VectorBackend;

    /// Prepare the backing store (create the collection, indexes, and so on).
    async fn init(&self) -> Result<(), IndexError>;

    /// Append records; returns the number written.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError>;

    /// Return candidates at or above the threshold, most similar first, at most `limit`.
    async fn search(&self, query: IndexQuery) -> Result<Vec<SearchResult>, IndexError>;

    /// How many candidates to request so that `top_k` survive post-filtering.
    fn candidate_limit(&self, top_k: usize) -> usize;

    /// Content hash stored for a document, if any of its records exist.
    async fn document_hash(
        &self,
        namespace: &str,
        filename: &str,
    ) -> Result<Option<String>, IndexError>;

    /// Remove every record of a document; returns how many were removed.
    async fn delete_document(&self, namespace: &str, filename: &str)
    -> Result<usize, IndexError>;
}

/// Build the index requested by configuration, falling back to memory when Qdrant is unusable.
pub async fn connect_index(
    backend: VectorBackend,
    qdrant: Option<QdrantSettings>,
    dimension: usize,
) -> Arc<dyn VectorIndex> {
    if backend == VectorBackend::Memory {
        tracing::info!(dimension, "Using in-memory vector index");
        return Arc::new(MemoryIndex::new(dimension));
    }

    let Some(settings) = qdrant else {
        tracing::warn!("Qdrant backend requested without QDRANT_URL; using in-memory index");
        return Arc::new(MemoryIndex::new(dimension));
    };

    let index = match QdrantService::new(&settings) {
        Ok(service) => QdrantIndex::new(service, settings.collection_name.clone(), dimension),
        Err(error) => {
            tracing::warn!(error = %error, "Invalid Qdrant settings; using in-memory index");
            return Arc::new(MemoryIndex::new(dimension));
        }
    };

    match index.init().await {
        Ok(()) => {
            tracing::info!(
                collection = %settings.collection_name,
                dimension,
                "Using Qdrant vector index"
            );
            Arc::new(index)
        }
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Qdrant unavailable; falling back to in-memory index for this process"
            );
            Arc::new(MemoryIndex::new(dimension))
        }
    }
}

/// Cosine similarity of two equal-length vectors; zero when either has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn cosine_similarity_of_parallel_and_orthogonal_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_degenerate_input() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn memory_backend_is_used_when_requested() {
        let index = connect_index(VectorBackend::Memory, None, 8).await;
        assert_eq!(index.backend(), VectorBackend::Memory);
    }

    #[tokio::test]
    async fn unreachable_qdrant_falls_back_to_memory() {
        let settings = QdrantSettings {
            url: "http://127.0.0.1:1".into(),
            api_key: None,
            collection_name: "documents".into(),
            vector_size: 8,
            timeout: Duration::from_secs(2),
        };
        let index = tokio::time::timeout(
            Duration::from_secs(10),
            connect_index(VectorBackend::Qdrant, Some(settings), 8),
        )
        .await
        .expect("fallback completes");
        assert_eq!(index.backend(), VectorBackend::Memory);
    }

    fn mock_settings(server: &MockServer, timeout: Duration) -> QdrantSettings {
        QdrantSettings {
            url: server.base_url(),
            api_key: None,
            collection_name: "documents".into(),
            vector_size: 8,
            timeout,
        }
    }

    #[tokio::test]
    async fn silent_qdrant_times_out_and_falls_back_to_memory() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200)
                    .delay(Duration::from_secs(30))
                    .json_body(json!({ "result": { "collections": [] } }));
            })
            .await;

        let index = tokio::time::timeout(
            Duration::from_secs(10),
            connect_index(
                VectorBackend::Qdrant,
                Some(mock_settings(&server, Duration::from_millis(200))),
                8,
            ),
        )
        .await
        .expect("fallback completes before the delayed response");
        assert_eq!(index.backend(), VectorBackend::Memory);
    }

    #[tokio::test]
    async fn incompatible_collection_falls_back_to_memory() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections");
                then.status(200).json_body(json!({
                    "result": { "collections": [ { "name": "documents" } ] }
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/documents");
                then.status(200).json_body(json!({
                    "result": {
                        "config": { "params": { "vectors": { "size": 384, "distance": "Cosine" } } }
                    }
                }));
            })
            .await;

        let index = connect_index(
            VectorBackend::Qdrant,
            Some(mock_settings(&server, Duration::from_secs(5))),
            8,
        )
        .await;
        assert_eq!(index.backend(), VectorBackend::Memory);
    }

    #[tokio::test]
    async fn qdrant_without_url_falls_back_to_memory() {
        let index = connect_index(VectorBackend::Qdrant, None, 8).await;
        assert_eq!(index.backend(), VectorBackend::Memory);
    }
}
