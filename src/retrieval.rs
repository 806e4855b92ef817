//! Query-time retrieval: embed the query, search the active index, rank and truncate.

use std::sync::Arc;

use crate::{
    config::RetrievalSettings,
    embedding::EmbeddingClient,
    index::{IndexQuery, VectorIndex},
    processing::types::{SearchError, SearchResult},
};

/// Answers similarity queries against the active vector index.
///
/// [`RetrievalService::search`] never fails: embedding or index errors are logged and turned
/// into an empty result list so callers in the prompt layer degrade instead of breaking.
pub struct RetrievalService {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    settings: RetrievalSettings,
}

impl RetrievalService {
    /// Build the service from injected collaborators.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            settings,
        }
    }

    /// Return at most `top_k` passages at or above the similarity threshold, best first.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        namespace: Option<&str>,
    ) -> Vec<SearchResult> {
        if top_k == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        match self.try_search(query, top_k, namespace).await {
            Ok(results) => {
                tracing::debug!(
                    namespace = namespace.unwrap_or("*"),
                    top_k,
                    results = results.len(),
                    "Search completed"
                );
                results
            }
            Err(error) => {
                tracing::warn!(
                    namespace = namespace.unwrap_or("*"),
                    error = %error,
                    "Search failed; returning no results"
                );
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        query: &str,
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let mut vectors = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(SearchError::EmptyEmbedding)?;

        let expected = self.settings.embedding_dimension;
        let actual = vector.len();
        if actual != expected {
            return Err(SearchError::DimensionMismatch { expected, actual });
        }

        let threshold = self.settings.min_similarity;
        let mut results = self
            .index
            .search(IndexQuery {
                vector,
                limit: self.index.candidate_limit(top_k),
                score_threshold: threshold,
                namespace: namespace.map(str::to_string),
            })
            .await?;

        results.retain(|hit| hit.similarity >= threshold);
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(top_k);
        Ok(results)
    }
}
