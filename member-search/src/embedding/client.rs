use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tracing::{error, instrument};

use crate::{
    embedding::{Embedder, Embedding, EmbeddingError, EmbeddingModel},
    metrics_consts::{
        EMBEDDINGS_GENERATED, EMBEDDING_FAILED, EMBEDDING_INPUT_TRUNCATED, EMBEDDING_REQUEST_TIME,
    },
};

/// Calls a hosted, OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: EmbeddingModel,
}

impl HttpEmbedder {
    pub fn new(
        url: String,
        api_key: Option<String>,
        model: EmbeddingModel,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            api_key,
            model,
        })
    }
}

/// Cuts `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_input(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    #[instrument(skip_all, fields(model = %self.model, chars = text.chars().count()))]
    async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let labels = [("model".to_string(), self.model.to_string())];

        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let input = truncate_input(text, self.model.max_input_chars());
        if input.len() < text.len() {
            counter!(EMBEDDING_INPUT_TRUNCATED, &labels).increment(1);
        }

        let request_time = common_metrics::timing_guard(EMBEDDING_REQUEST_TIME, &labels);
        let result = self.request_embedding(input).await;
        match &result {
            Ok(_) => {
                request_time.label("outcome", "success").fin();
                counter!(EMBEDDINGS_GENERATED, &labels).increment(1);
            }
            Err(e) => {
                request_time.label("outcome", "failure").fin();
                counter!(EMBEDDING_FAILED, &labels).increment(1);
                error!("failed to generate embedding: {}", e);
            }
        }
        result
    }
}

impl HttpEmbedder {
    async fn request_embedding(&self, input: &str) -> Result<Embedding, EmbeddingError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&self.model.construct_request_body(input));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            // Best effort, the status alone is enough to fail the request
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response.json().await?;
        let values = self
            .model
            .extract_embedding_from_response_body(&body)
            .ok_or(EmbeddingError::MalformedResponse)?;

        Embedding::new(values)
    }
}
