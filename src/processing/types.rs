//! Core data types and error definitions for the ingestion pipeline.

use crate::{
    embedding::EmbeddingClientError, index::IndexError, objects::ObjectStoreError,
    processing::extract::ExtractionError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Document formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Portable Document Format, text layer only.
    Pdf,
    /// Plain text.
    Text,
    /// Markdown, passed through as text.
    Markdown,
}

impl MediaType {
    /// Infer the media type from a filename extension, case-insensitively.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (_, extension) = name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// MIME string stored alongside each chunk.
    pub const fn mime(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Text => "text/plain",
            Self::Markdown => "text/markdown",
        }
    }
}

/// A namespace-scoped source object fetched from the object collection.
#[derive(Debug, Clone)]
pub struct Document {
    /// Collection the object was listed under.
    pub namespace: String,
    /// Object name, unique within its namespace.
    pub name: String,
    /// Raw object bytes.
    pub content: Vec<u8>,
    /// Format inferred from the object name.
    pub media_type: MediaType,
}

/// Metadata attached to every chunk and persisted in the vector payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Namespace of the parent document.
    pub namespace: String,
    /// Name of the parent document.
    pub filename: String,
    /// Zero-based position of the chunk within its document.
    pub chunk_index: usize,
    /// Format of the parent document.
    pub media_type: MediaType,
    /// RFC3339 timestamp of the ingestion run that produced the chunk.
    pub ingested_at: String,
    /// SHA-256 of the parent document bytes.
    pub content_hash: String,
    /// Title derived during extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Page count reported by the extractor (PDF only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

/// A bounded, sentence-aligned span of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk text.
    pub text: String,
    /// Positional and provenance metadata.
    pub metadata: ChunkMetadata,
}

/// Ranked passage returned by the retrieval service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Chunk text as indexed.
    pub text: String,
    /// Metadata stored with the chunk.
    pub metadata: ChunkMetadata,
    /// Cosine similarity between the query and the chunk.
    pub similarity: f32,
}

/// Document-level metadata reported after processing.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentMetadata {
    /// Format of the document.
    pub media_type: MediaType,
    /// Title derived during extraction.
    pub title: Option<String>,
    /// Page count reported by the extractor.
    pub page_count: Option<usize>,
    /// SHA-256 of the document bytes.
    pub content_hash: String,
    /// Size of the downloaded object.
    pub size_bytes: usize,
}

/// How a processed document affected the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOutcome {
    /// Chunks were embedded and written.
    Indexed,
    /// The stored content hash matched; nothing was written.
    Unchanged,
}

/// Result of running the pipeline for one document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedDocument {
    /// Namespace of the document.
    pub namespace: String,
    /// Name of the document.
    pub filename: String,
    /// Number of chunks produced.
    pub chunks: usize,
    /// Number of embeddings written to the index.
    pub embeddings: usize,
    /// Records removed because they belonged to an older version of the document.
    pub replaced: usize,
    /// Whether the index changed.
    pub outcome: DocumentOutcome,
    /// Document-level metadata.
    pub metadata: DocumentMetadata,
}

/// Failure captured for a single document during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentFailure {
    /// Namespace of the failing document.
    pub namespace: String,
    /// Name of the failing document.
    pub filename: String,
    /// Rendered error message.
    pub error: String,
    /// RFC3339 timestamp of the failure.
    pub occurred_at: String,
}

/// Summary returned by a full ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Documents that were embedded and written.
    pub processed: usize,
    /// Documents whose pipeline failed.
    pub failed: usize,
    /// Documents skipped because their content hash was already indexed.
    pub unchanged: usize,
    /// Documents attempted across all namespaces.
    pub total_documents: usize,
    /// Chunks written across all documents.
    pub total_chunks: usize,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
    /// Per-document failure report.
    pub failures: Vec<DocumentFailure>,
}

/// Errors produced while turning extracted text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible size budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Errors emitted by the per-document pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The document extension is not handled by the extractor.
    #[error("Unsupported document type: {0}")]
    UnsupportedDocument(String),
    /// Listing or downloading from the object collection failed.
    #[error("Object store request failed: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    /// Extraction failed for the document.
    #[error("Failed to extract document: {0}")]
    Extraction(#[from] ExtractionError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index rejected a read or write.
    #[error("Vector index request failed: {0}")]
    Index(#[from] IndexError),
    /// Provider returned vectors of the wrong size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the deployment.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Errors raised while answering a query; never escape the retrieval service.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Embedding provider failed to return vectors for the query text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index search failed.
    #[error("Vector index request failed: {0}")]
    Index(#[from] IndexError),
    /// Returned embedding dimension does not match configuration.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension configured on the server.
        expected: usize,
        /// Actual embedding dimension produced by the provider.
        actual: usize,
    },
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
}
