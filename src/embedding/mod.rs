//! Embedding client abstraction and the HTTP provider adapter.

mod http;
mod response;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

pub use http::HttpEmbeddingClient;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// HTTP layer failed before a response was received (connect, timeout, body read).
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("Embedding provider responded with {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Response body matched neither accepted shape.
    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),
    /// Provider returned a different number of vectors than inputs sent.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of inputs in the batch.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Caller supplied input the client refuses to send.
    #[error("Invalid embedding request: {0}")]
    InvalidInput(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per input text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}
