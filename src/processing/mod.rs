//! Document processing pipeline: extraction, chunking, embedding, and index orchestration.

pub mod chunking;
pub mod extract;
pub mod fingerprint;
mod service;
pub mod types;

pub use service::{IngestionApi, IngestionService};
pub use types::{
    Chunk, ChunkMetadata, ChunkingError, DocumentFailure, DocumentOutcome, MediaType,
    ProcessedDocument, ProcessingError, RunSummary, SearchError, SearchResult,
};
