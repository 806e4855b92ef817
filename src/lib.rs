#![deny(missing_docs)]

//! Core library for the docindex ingestion and retrieval engine.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Vector index capability with Qdrant and in-memory backends.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Namespaced object collection gateway.
pub mod objects;
/// Document processing pipeline utilities.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Query-time retrieval over the active index.
pub mod retrieval;
/// Recurring ingestion scheduler.
pub mod scheduler;
/// Ingestion state tracking.
pub mod state;
