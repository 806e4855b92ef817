//! Qdrant-backed vector index.

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::{
    config::VectorBackend,
    processing::types::SearchResult,
    qdrant::{
        PointInsert, QdrantService, SearchFilterArgs, build_document_filter,
        build_search_filter,
        payload::{build_payload, parse_payload},
    },
};

use super::{IndexError, IndexQuery, VectorIndex, VectorRecord};

/// Candidates requested per wanted result, leaving headroom for the threshold re-check.
const CANDIDATE_MULTIPLIER: usize = 3;

/// Upper bound on candidates requested from Qdrant in one query.
const MAX_CANDIDATES: usize = 1_000;

/// Vector index stored in a single Qdrant collection.
///
/// The collection and its payload indexes are verified lazily on first use and then cached.
pub struct QdrantIndex {
    service: QdrantService,
    collection: String,
    dimension: usize,
    ready: OnceCell<()>,
}

impl QdrantIndex {
    /// Wrap a Qdrant client; no request is made until first use.
    pub fn new(service: QdrantService, collection: String, dimension: usize) -> Self {
        Self {
            service,
            collection,
            dimension,
            ready: OnceCell::new(),
        }
    }

    async fn ensure_ready(&self) -> Result<(), IndexError> {
        self.ready
            .get_or_try_init(|| async {
                self.service
                    .create_collection_if_not_exists(&self.collection, self.dimension as u64)
                    .await?;
                self.service.ensure_payload_indexes(&self.collection).await?;
                tracing::debug!(collection = %self.collection, "Collection ready");
                Ok::<(), IndexError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    fn backend(&self) -> VectorBackend {
        VectorBackend::Qdrant
    }

    async fn init(&self) -> Result<(), IndexError> {
        self.ensure_ready().await
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError> {
        self.ensure_ready().await?;
        let points = records
            .into_iter()
            .map(|record| {
                if record.vector.len() != self.dimension {
                    return Err(IndexError::DimensionMismatch {
                        expected: self.dimension,
                        actual: record.vector.len(),
                    });
                }
                Ok(PointInsert {
                    payload: build_payload(&record.text, &record.metadata)?,
                    id: record.id,
                    vector: record.vector,
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        Ok(self.service.upsert_points(&self.collection, points).await?)
    }

    async fn search(&self, query: IndexQuery) -> Result<Vec<SearchResult>, IndexError> {
        self.ensure_ready().await?;
        let filter = build_search_filter(&SearchFilterArgs {
            namespace: query.namespace,
            filename: None,
        });

        let points = self
            .service
            .search_points(
                &self.collection,
                query.vector,
                filter,
                query.limit,
                Some(query.score_threshold),
            )
            .await?;

        let mut results = Vec::with_capacity(points.len());
        for point in points {
            let Some(payload) = point.payload else {
                tracing::warn!(id = %point.id, "Skipping point without payload");
                continue;
            };
            match parse_payload(payload) {
                Ok((text, metadata)) => results.push(SearchResult {
                    text,
                    metadata,
                    similarity: point.score,
                }),
                Err(error) => {
                    tracing::warn!(id = %point.id, error = %error, "Skipping point with foreign payload");
                }
            }
        }
        Ok(results)
    }

    fn candidate_limit(&self, top_k: usize) -> usize {
        top_k
            .saturating_mul(CANDIDATE_MULTIPLIER)
            .min(MAX_CANDIDATES)
    }

    async fn document_hash(
        &self,
        namespace: &str,
        filename: &str,
    ) -> Result<Option<String>, IndexError> {
        self.ensure_ready().await?;
        let payload = self
            .service
            .first_payload(
                &self.collection,
                build_document_filter(namespace, filename),
                &["content_hash"],
            )
            .await?;
        Ok(payload.and_then(|payload| {
            payload
                .get("content_hash")
                .and_then(|value| value.as_str())
                .map(str::to_string)
        }))
    }

    async fn delete_document(
        &self,
        namespace: &str,
        filename: &str,
    ) -> Result<usize, IndexError> {
        self.ensure_ready().await?;
        let filter = build_document_filter(namespace, filename);
        let existing = self
            .service
            .count_points(&self.collection, filter.clone())
            .await?;
        if existing > 0 {
            self.service.delete_points(&self.collection, filter).await?;
        }
        Ok(existing)
    }
}
