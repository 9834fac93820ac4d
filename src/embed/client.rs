//! Thin HTTP client for the remote embedding endpoint (spec §4.4, §6).
//!
//! The wire shape is the OpenAI-compatible embeddings API implied by the
//! default model id `text-embedding-3-small`: POST `{model, input}`, get
//! back `{data: [{embedding}, ...]}` in request order.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::EMBED_BATCH_TIMEOUT_SECS;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Outcome of a single remote call, distinguishing retryable transport
/// failures from permanent rejections (spec §4.4).
pub enum CallOutcome {
    Ok(Vec<Vec<f32>>),
    Retryable(String),
    Permanent(String),
}

pub struct EmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(EMBED_BATCH_TIMEOUT_SECS))
            .build()
            .expect("reqwest client builds with static config");
        EmbeddingClient {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// POST one batch. Returns vectors in request order on success;
    /// classifies failures per spec §4.4's retryable/non-retryable table
    /// (network errors and 408/429/5xx are retryable; other 4xx are
    /// permanent).
    pub async fn embed_batch(&self, texts: &[String]) -> CallOutcome {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return CallOutcome::Retryable(e.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<EmbeddingResponse>().await {
                Ok(parsed) => {
                    CallOutcome::Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
                }
                Err(e) => CallOutcome::Retryable(format!("malformed response body: {e}")),
            };
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        if is_retryable_status(status) {
            CallOutcome::Retryable(format!("{status}: {body}"))
        } else {
            CallOutcome::Permanent(format!("{status}: {body}"))
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_classification() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
