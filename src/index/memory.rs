//! In-process vector index with brute-force cosine search.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{config::VectorBackend, processing::types::SearchResult};

use super::{IndexError, IndexQuery, VectorIndex, VectorRecord, cosine_similarity};

/// Ordered list of records guarded by a read/write lock.
///
/// Searches hold the read lock for the duration of the scan, so concurrent ingestion waits for
/// in-flight queries instead of mutating the list underneath them.
pub struct MemoryIndex {
    dimension: usize,
    records: RwLock<Vec<VectorRecord>>,
}

impl MemoryIndex {
    /// Create an empty index accepting vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the index holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_dimension(&self, actual: usize) -> Result<(), IndexError> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn backend(&self) -> VectorBackend {
        VectorBackend::Memory
    }

    async fn init(&self) -> Result<(), IndexError> {
        tracing::debug!(dimension = self.dimension, "In-memory index ready");
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, IndexError> {
        for record in &records {
            self.check_dimension(record.vector.len())?;
        }
        let count = records.len();
        self.records.write().await.extend(records);
        tracing::debug!(records = count, "Appended records to in-memory index");
        Ok(count)
    }

    async fn search(&self, query: IndexQuery) -> Result<Vec<SearchResult>, IndexError> {
        self.check_dimension(query.vector.len())?;
        let namespace = query.namespace.as_deref();

        let records = self.records.read().await;
        let mut results: Vec<SearchResult> = records
            .iter()
            .filter(|record| namespace.is_none_or(|ns| record.metadata.namespace == ns))
            .filter_map(|record| {
                let similarity = cosine_similarity(&query.vector, &record.vector);
                (similarity >= query.score_threshold).then(|| SearchResult {
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                    similarity,
                })
            })
            .collect();
        drop(records);

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(query.limit);
        Ok(results)
    }

    fn candidate_limit(&self, _top_k: usize) -> usize {
        usize::MAX
    }

    async fn document_hash(
        &self,
        namespace: &str,
        filename: &str,
    ) -> Result<Option<String>, IndexError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|record| {
                record.metadata.namespace == namespace && record.metadata.filename == filename
            })
            .map(|record| record.metadata.content_hash.clone()))
    }

    async fn delete_document(
        &self,
        namespace: &str,
        filename: &str,
    ) -> Result<usize, IndexError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| {
            !(record.metadata.namespace == namespace && record.metadata.filename == filename)
        });
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::{ChunkMetadata, MediaType};

    fn record(namespace: &str, filename: &str, text: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: format!("{namespace}/{filename}/{text}"),
            vector,
            text: text.to_string(),
            metadata: ChunkMetadata {
                namespace: namespace.into(),
                filename: filename.into(),
                chunk_index: 0,
                media_type: MediaType::Text,
                ingested_at: "2025-01-01T00:00:00Z".into(),
                content_hash: format!("hash-{filename}"),
                title: None,
                page_count: None,
            },
        }
    }

    fn query(vector: Vec<f32>, namespace: Option<&str>, threshold: f32) -> IndexQuery {
        IndexQuery {
            vector,
            limit: usize::MAX,
            score_threshold: threshold,
            namespace: namespace.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn search_filters_by_namespace_and_threshold() {
        let index = MemoryIndex::new(2);
        index
            .upsert(vec![
                record("a", "one.txt", "a-close", vec![1.0, 0.1]),
                record("b", "two.txt", "b-close", vec![1.0, 0.0]),
                record("a", "three.txt", "a-far", vec![0.0, 1.0]),
            ])
            .await
            .expect("upsert");

        let results = index
            .search(query(vec![1.0, 0.0], Some("a"), 0.5))
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "a-close");
        assert!(results.iter().all(|hit| hit.metadata.namespace == "a"));

        let unfiltered = index
            .search(query(vec![1.0, 0.0], None, 0.5))
            .await
            .expect("search");
        let texts: Vec<_> = unfiltered.iter().map(|hit| hit.text.as_str()).collect();
        assert_eq!(texts, vec!["b-close", "a-close"]);
    }

    #[tokio::test]
    async fn upsert_rejects_wrong_dimension() {
        let index = MemoryIndex::new(3);
        let error = index
            .upsert(vec![record("a", "x.txt", "bad", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn upsert_appends_without_deduplicating() {
        let index = MemoryIndex::new(2);
        let first = record("a", "x.txt", "same", vec![1.0, 0.0]);
        index.upsert(vec![first.clone()]).await.expect("upsert");
        index.upsert(vec![first]).await.expect("upsert");
        assert_eq!(index.len().await, 2);
    }

    #[tokio::test]
    async fn delete_document_and_hash_lookup_are_scoped_to_identity() {
        let index = MemoryIndex::new(2);
        index
            .upsert(vec![
                record("a", "x.txt", "one", vec![1.0, 0.0]),
                record("a", "x.txt", "two", vec![0.0, 1.0]),
                record("b", "x.txt", "other", vec![1.0, 1.0]),
            ])
            .await
            .expect("upsert");

        assert_eq!(
            index.document_hash("a", "x.txt").await.expect("hash").as_deref(),
            Some("hash-x.txt")
        );
        assert_eq!(index.delete_document("a", "x.txt").await.expect("delete"), 2);
        assert!(index.document_hash("a", "x.txt").await.expect("hash").is_none());
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn concurrent_search_and_upsert_do_not_interfere() {
        let index = std::sync::Arc::new(MemoryIndex::new(2));
        let writer = {
            let index = index.clone();
            tokio::spawn(async move {
                for n in 0..50 {
                    index
                        .upsert(vec![record("a", &format!("{n}.txt"), "w", vec![1.0, 0.0])])
                        .await
                        .expect("upsert");
                }
            })
        };
        for _ in 0..50 {
            let hits = index
                .search(query(vec![1.0, 0.0], Some("a"), 0.9))
                .await
                .expect("search");
            assert!(hits.len() <= 50);
        }
        writer.await.expect("writer");
        assert_eq!(index.len().await, 50);
    }
}
