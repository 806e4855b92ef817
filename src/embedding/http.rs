//! OpenAI-compatible HTTP embedding client with batching and bounded retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::config::EmbeddingSettings;

use super::{EmbeddingClient, EmbeddingClientError, response::normalize_response};

const MAX_BACKOFF_EXPONENT: u32 = 5;

/// Embedding client that posts `{model, input}` to `{base_url}/embeddings`.
pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    batch_size: usize,
    max_retries: usize,
    retry_backoff: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: EmbeddingInput<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmbeddingInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

impl HttpEmbeddingClient {
    /// Build a client from provider settings.
    pub fn new(settings: &EmbeddingSettings) -> Result<Self, EmbeddingClientError> {
        if settings.model.trim().is_empty() {
            return Err(EmbeddingClientError::InvalidInput(
                "embedding model must not be empty".to_string(),
            ));
        }
        if settings.batch_size == 0 {
            return Err(EmbeddingClientError::InvalidInput(
                "batch size must be greater than zero".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent("docindex/0.1")
            .timeout(settings.timeout)
            .build()?;
        let endpoint = format!("{}/embeddings", settings.base_url.trim_end_matches('/'));
        tracing::debug!(
            endpoint = %endpoint,
            model = %settings.model,
            batch_size = settings.batch_size,
            timeout_secs = settings.timeout.as_secs(),
            "Initialized embedding client"
        );

        Ok(Self {
            client,
            endpoint,
            api_key: settings.api_key.clone().filter(|key| !key.is_empty()),
            model: settings.model.clone(),
            batch_size: settings.batch_size,
            max_retries: settings.max_retries,
            retry_backoff: settings.retry_backoff,
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let mut attempt = 0;
        loop {
            match self.send_batch(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(error) if attempt < self.max_retries && is_transient(&error) => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying embedding request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let input = match batch {
            [single] => EmbeddingInput::Single(single.as_str()),
            many => EmbeddingInput::Batch(many),
        };
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::UnexpectedStatus { status, body });
        }

        let body = response.bytes().await?;
        normalize_response(&body, batch.len())
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let exponent = (attempt.saturating_sub(1) as u32).min(MAX_BACKOFF_EXPONENT);
        self.retry_backoff.saturating_mul(1 << exponent)
    }
}

fn is_transient(error: &EmbeddingClientError) -> bool {
    match error {
        EmbeddingClientError::UnexpectedStatus { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        EmbeddingClientError::Http(err) => err.is_timeout() || err.is_connect(),
        _ => false,
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::InvalidInput(
                "no texts provided".to_string(),
            ));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!(
                batch = batch_index,
                size = batch.len(),
                model = %self.model,
                "Requesting embeddings"
            );
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}
