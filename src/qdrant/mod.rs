//! Qdrant vector store integration.

pub mod client;
pub mod filters;
pub(crate) mod payload;
pub mod types;

pub use client::QdrantService;
pub use filters::{build_document_filter, build_search_filter};
pub use types::{PointInsert, QdrantError, ScoredPoint, SearchFilterArgs};
