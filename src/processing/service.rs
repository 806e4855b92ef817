//! Ingestion orchestrator coordinating download, extraction, chunking, embedding, and indexing.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    config::IngestionSettings,
    embedding::EmbeddingClient,
    index::{VectorIndex, VectorRecord},
    objects::ObjectStore,
    processing::{
        chunking::chunk_document,
        extract::extract_document,
        fingerprint::{compute_content_hash, current_timestamp_rfc3339},
        types::{
            ChunkMetadata, Document, DocumentFailure, DocumentMetadata, DocumentOutcome, MediaType,
            ProcessedDocument, ProcessingError, RunSummary,
        },
    },
    state::{ProcessingState, StateSnapshot},
};

/// Runs the per-document pipeline for single documents and whole namespace sweeps.
///
/// Documents are processed one at a time. Full runs hold an internal run lock, so a scheduled
/// run and a manual trigger never sweep the collection concurrently. Construct the service
/// once near process start and share it through an `Arc`.
pub struct IngestionService {
    store: Arc<dyn ObjectStore>,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    state: Arc<ProcessingState>,
    settings: IngestionSettings,
    run_lock: Mutex<()>,
}

/// Abstraction over the ingestion pipeline used by external surfaces (HTTP, scheduler).
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Run a full sweep unless one is already in progress.
    async fn try_process_all(&self) -> Option<RunSummary>;

    /// Process one named document, propagating any failure.
    async fn process_document(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ProcessedDocument, ProcessingError>;

    /// Retrieve the current processing state for diagnostics.
    fn state_snapshot(&self) -> StateSnapshot;
}

impl IngestionService {
    /// Build the orchestrator from injected collaborators.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        state: Arc<ProcessingState>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            state,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    /// Process every supported object in every configured namespace.
    ///
    /// Waits for an in-flight run to finish first. Per-document failures are recorded in the
    /// summary and never abort the run.
    pub async fn process_all(&self) -> RunSummary {
        let _guard = self.run_lock.lock().await;
        self.run_all().await
    }

    /// Like [`IngestionService::process_all`], but returns `None` instead of waiting when a run
    /// is already in progress.
    pub async fn try_process_all(&self) -> Option<RunSummary> {
        let _guard = self.run_lock.try_lock().ok()?;
        Some(self.run_all().await)
    }

    /// Download, extract, chunk, embed, and index one document.
    ///
    /// Unlike full runs, failures propagate to the caller.
    pub async fn process_document(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ProcessedDocument, ProcessingError> {
        match self.run_pipeline(namespace, name).await {
            Ok(document) => {
                self.state
                    .record_document(&document, current_timestamp_rfc3339());
                Ok(document)
            }
            Err(error) => {
                self.state.record_failure(DocumentFailure {
                    namespace: namespace.to_string(),
                    filename: name.to_string(),
                    error: error.to_string(),
                    occurred_at: current_timestamp_rfc3339(),
                });
                Err(error)
            }
        }
    }

    /// Return the current processing state snapshot.
    pub fn state_snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    async fn run_all(&self) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        tracing::info!(namespaces = ?self.settings.namespaces, "Starting ingestion run");

        for namespace in &self.settings.namespaces {
            let objects = match self.store.list(namespace).await {
                Ok(objects) => objects,
                Err(error) => {
                    tracing::warn!(namespace = %namespace, error = %error, "Failed to list namespace");
                    continue;
                }
            };

            for object in objects {
                if MediaType::from_filename(&object.name).is_none() {
                    tracing::debug!(namespace = %namespace, filename = %object.name, "Skipping unsupported object");
                    continue;
                }

                summary.total_documents += 1;
                match self.process_document(namespace, &object.name).await {
                    Ok(document) => match document.outcome {
                        DocumentOutcome::Indexed => {
                            summary.processed += 1;
                            summary.total_chunks += document.embeddings;
                        }
                        DocumentOutcome::Unchanged => summary.unchanged += 1,
                    },
                    Err(error) => {
                        tracing::warn!(
                            namespace = %namespace,
                            filename = %object.name,
                            error = %error,
                            "Document failed; continuing with the next one"
                        );
                        summary.failed += 1;
                        summary.failures.push(DocumentFailure {
                            namespace: namespace.clone(),
                            filename: object.name.clone(),
                            error: error.to_string(),
                            occurred_at: current_timestamp_rfc3339(),
                        });
                    }
                }
            }
        }

        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.state.record_run();
        tracing::info!(
            processed = summary.processed,
            failed = summary.failed,
            unchanged = summary.unchanged,
            total_documents = summary.total_documents,
            total_chunks = summary.total_chunks,
            duration_ms = summary.duration_ms,
            "Ingestion run finished"
        );
        summary
    }

    async fn fetch_document(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Document, ProcessingError> {
        let media_type = MediaType::from_filename(name)
            .ok_or_else(|| ProcessingError::UnsupportedDocument(name.to_string()))?;
        let content = self.store.download(namespace, name).await?;
        Ok(Document {
            namespace: namespace.to_string(),
            name: name.to_string(),
            content,
            media_type,
        })
    }

    async fn run_pipeline(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ProcessedDocument, ProcessingError> {
        let document = self.fetch_document(namespace, name).await?;
        let media_type = document.media_type;
        let size_bytes = document.content.len();
        let content_hash = compute_content_hash(&document.content);

        let stored_hash = if self.settings.deduplicate {
            self.index.document_hash(namespace, name).await?
        } else {
            None
        };
        if stored_hash.as_deref() == Some(content_hash.as_str()) {
            tracing::info!(namespace, filename = name, "Document unchanged; skipping");
            return Ok(ProcessedDocument {
                namespace: namespace.to_string(),
                filename: name.to_string(),
                chunks: 0,
                embeddings: 0,
                replaced: 0,
                outcome: DocumentOutcome::Unchanged,
                metadata: DocumentMetadata {
                    media_type,
                    title: None,
                    page_count: None,
                    content_hash,
                    size_bytes,
                },
            });
        }

        let extracted = extract_document(document.content, &document.name)
            .await?
            .ok_or_else(|| ProcessingError::UnsupportedDocument(name.to_string()))?;

        let template = ChunkMetadata {
            namespace: namespace.to_string(),
            filename: name.to_string(),
            chunk_index: 0,
            media_type: extracted.media_type,
            ingested_at: current_timestamp_rfc3339(),
            content_hash: content_hash.clone(),
            title: extracted.title.clone(),
            page_count: extracted.page_count,
        };
        let chunks = chunk_document(&extracted.text, &template, self.settings.chunking)?;
        tracing::debug!(namespace, filename = name, chunks = chunks.len(), "Document chunked");

        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect();
            self.embedder.generate_embeddings(texts).await?
        };

        let expected = self.settings.embedding_dimension;
        if let Some(vector) = embeddings.iter().find(|vector| vector.len() != expected) {
            return Err(ProcessingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let replaced = if stored_hash.is_some() {
            self.index.delete_document(namespace, name).await?
        } else {
            0
        };

        let chunk_count = chunks.len();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorRecord::from_chunk(chunk, vector))
            .collect();
        let written = if records.is_empty() {
            0
        } else {
            self.index.upsert(records).await?
        };

        tracing::info!(
            namespace,
            filename = name,
            chunks = chunk_count,
            embeddings = written,
            replaced,
            "Document indexed"
        );

        Ok(ProcessedDocument {
            namespace: namespace.to_string(),
            filename: name.to_string(),
            chunks: chunk_count,
            embeddings: written,
            replaced,
            outcome: DocumentOutcome::Indexed,
            metadata: DocumentMetadata {
                media_type: extracted.media_type,
                title: extracted.title,
                page_count: extracted.page_count,
                content_hash,
                size_bytes,
            },
        })
    }
}

#[async_trait]
impl IngestionApi for IngestionService {
    async fn try_process_all(&self) -> Option<RunSummary> {
        IngestionService::try_process_all(self).await
    }

    async fn process_document(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ProcessedDocument, ProcessingError> {
        IngestionService::process_document(self, namespace, name).await
    }

    fn state_snapshot(&self) -> StateSnapshot {
        IngestionService::state_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingSettings;
    use crate::embedding::EmbeddingClientError;
    use crate::index::MemoryIndex;
    use crate::objects::{MemoryObjectStore, ObjectStoreError};
    use std::time::Duration;

    /// Maps every text to a unit vector, optionally pausing to simulate a slow provider.
    struct StubEmbedder {
        dimension: usize,
        delay: Duration,
    }

    #[async_trait]
    impl EmbeddingClient for StubEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(texts
                .iter()
                .map(|_| {
                    let mut vector = vec![0.0; self.dimension];
                    vector[0] = 1.0;
                    vector
                })
                .collect())
        }
    }

    struct Fixture {
        store: Arc<MemoryObjectStore>,
        index: Arc<MemoryIndex>,
        service: Arc<IngestionService>,
    }

    fn fixture(deduplicate: bool, dimension: usize, delay: Duration) -> Fixture {
        let store = Arc::new(MemoryObjectStore::new());
        let index = Arc::new(MemoryIndex::new(3));
        let service = Arc::new(IngestionService::new(
            store.clone(),
            Arc::new(StubEmbedder { dimension, delay }),
            index.clone(),
            Arc::new(ProcessingState::new(10)),
            IngestionSettings {
                namespaces: vec!["docs".into()],
                chunking: ChunkingSettings {
                    chunk_size: 40,
                    chunk_overlap: 0,
                },
                embedding_dimension: 3,
                deduplicate,
            },
        ));
        Fixture {
            store,
            index,
            service,
        }
    }

    #[tokio::test]
    async fn process_document_indexes_chunks_with_metadata() {
        let fx = fixture(true, 3, Duration::ZERO);
        fx.store.insert(
            "docs",
            "guide.md",
            "# Guide\n\nFirst sentence is here. Second sentence is here. Third one.",
        );

        let processed = fx
            .service
            .process_document("docs", "guide.md")
            .await
            .expect("process");

        assert_eq!(processed.outcome, DocumentOutcome::Indexed);
        assert!(processed.chunks >= 2);
        assert_eq!(processed.embeddings, processed.chunks);
        assert_eq!(processed.metadata.title.as_deref(), Some("Guide"));
        assert_eq!(processed.metadata.media_type, MediaType::Markdown);
        assert_eq!(fx.index.len().await, processed.chunks);

        let snapshot = fx.service.state_snapshot();
        assert_eq!(snapshot.documents_processed, 1);
        assert_eq!(snapshot.recent[0].filename, "guide.md");
    }

    #[tokio::test]
    async fn process_document_propagates_failures() {
        let fx = fixture(true, 3, Duration::ZERO);

        let missing = fx.service.process_document("docs", "missing.txt").await;
        assert!(matches!(
            missing,
            Err(ProcessingError::ObjectStore(ObjectStoreError::NotFound(_)))
        ));

        fx.store.insert("docs", "image.png", vec![0u8; 4]);
        let unsupported = fx.service.process_document("docs", "image.png").await;
        assert!(matches!(
            unsupported,
            Err(ProcessingError::UnsupportedDocument(_))
        ));

        assert_eq!(fx.service.state_snapshot().failures.len(), 2);
    }

    #[tokio::test]
    async fn wrong_embedding_dimension_is_rejected() {
        let fx = fixture(true, 5, Duration::ZERO);
        fx.store.insert("docs", "a.txt", "Some text.");

        let result = fx.service.process_document("docs", "a.txt").await;
        assert!(matches!(
            result,
            Err(ProcessingError::DimensionMismatch {
                expected: 3,
                actual: 5
            })
        ));
        assert!(fx.index.is_empty().await);
    }

    #[tokio::test]
    async fn deduplication_skips_unchanged_and_replaces_changed_documents() {
        let fx = fixture(true, 3, Duration::ZERO);
        fx.store.insert("docs", "a.txt", "Alpha sentence one. Alpha sentence two.");

        let first = fx.service.process_all().await;
        assert_eq!(first.processed, 1);
        let indexed = fx.index.len().await;

        let second = fx.service.process_all().await;
        assert_eq!(second.processed, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(fx.index.len().await, indexed);

        fx.store.insert("docs", "a.txt", "Rewritten.");
        let changed = fx
            .service
            .process_document("docs", "a.txt")
            .await
            .expect("reprocess");
        assert_eq!(changed.replaced, indexed);
        assert_eq!(fx.index.len().await, 1);
    }

    #[tokio::test]
    async fn without_deduplication_reingestion_appends() {
        let fx = fixture(false, 3, Duration::ZERO);
        fx.store.insert("docs", "a.txt", "Alpha sentence one.");

        fx.service.process_all().await;
        fx.service.process_all().await;
        assert_eq!(fx.index.len().await, 2);
    }

    #[tokio::test]
    async fn process_all_skips_unsupported_objects() {
        let fx = fixture(true, 3, Duration::ZERO);
        fx.store.insert("docs", "a.txt", "Alpha.");
        fx.store.insert("docs", "photo.jpg", vec![1u8, 2, 3]);

        let summary = fx.service.process_all().await;
        assert_eq!(summary.total_documents, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(fx.service.state_snapshot().runs_completed, 1);
    }

    #[tokio::test]
    async fn try_process_all_refuses_to_overlap() {
        let fx = fixture(false, 3, Duration::from_millis(300));
        fx.store.insert("docs", "a.txt", "Slow document.");

        let running = {
            let service = fx.service.clone();
            tokio::spawn(async move { service.process_all().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(fx.service.try_process_all().await.is_none());
        let summary = running.await.expect("run");
        assert_eq!(summary.processed, 1);
        assert!(fx.service.try_process_all().await.is_some());
    }
}
