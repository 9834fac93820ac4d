//! Batching, truncation, retry/backoff, and backpressure for
//! `EmbeddingService` (spec §4.4).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tiktoken_rs::CoreBPE;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

use crate::constants::{
    EMBED_BATCH_MAX_ITEMS, EMBED_BATCH_MAX_TOKENS, EMBED_BATCH_TIMEOUT_SECS,
    EMBED_MAX_CONCURRENT_BATCHES, EMBED_RETRY_BASE_MS, EMBED_RETRY_CAP_MS, EMBED_RETRY_FACTOR,
    EMBED_RETRY_JITTER, EMBED_RETRY_MAX_ATTEMPTS,
};
use crate::embed::client::{CallOutcome, EmbeddingClient};

/// One miss-set item: its content fingerprint (hex) and the text to embed.
#[derive(Debug, Clone)]
pub struct EmbedItem {
    pub fingerprint: String,
    pub text: String,
}

/// Result of running the whole miss set through the batcher.
#[derive(Debug, Default)]
pub struct BatchRunResult {
    pub embeddings: Vec<(String, Vec<f32>)>,
    /// Fingerprints permanently rejected this run (spec §4.4); callers
    /// should not re-request them until content changes.
    pub permanent_failures: Vec<String>,
}

pub struct BatchEmbedder {
    client: Arc<EmbeddingClient>,
    tokenizer: CoreBPE,
    semaphore: Arc<Semaphore>,
}

impl BatchEmbedder {
    pub fn new(client: Arc<EmbeddingClient>) -> Self {
        BatchEmbedder {
            client,
            tokenizer: tiktoken_rs::cl100k_base().expect("cl100k_base ships with tiktoken-rs"),
            semaphore: Arc::new(Semaphore::new(EMBED_MAX_CONCURRENT_BATCHES)),
        }
    }

    /// Group `items` into batches bounded by item count and token count,
    /// truncate oversized items to a line boundary, and embed every batch
    /// concurrently (bounded by `C_CONCURRENT`), returning embeddings and
    /// any permanently-failed fingerprints.
    pub async fn embed_all(&self, items: Vec<EmbedItem>) -> BatchRunResult {
        let items: Vec<EmbedItem> = items
            .into_iter()
            .map(|item| EmbedItem {
                fingerprint: item.fingerprint,
                text: self.truncate_to_token_limit(&item.text),
            })
            .collect();

        let batches = self.group_into_batches(items);

        let mut handles = Vec::new();
        for batch in batches {
            let semaphore = self.semaphore.clone();
            let client = self.client.clone();
            let tokenizer_max = EMBED_BATCH_MAX_TOKENS;
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let _ = tokenizer_max;
                run_batch_with_retry(client, batch).await
            }));
        }

        let mut result = BatchRunResult::default();
        for handle in handles {
            match handle.await {
                Ok(partial) => {
                    result.embeddings.extend(partial.embeddings);
                    result.permanent_failures.extend(partial.permanent_failures);
                }
                Err(e) => warn!("embedding batch task panicked: {e}"),
            }
        }
        result
    }

    fn truncate_to_token_limit(&self, text: &str) -> String {
        let tokens = self.tokenizer.encode_ordinary(text);
        if tokens.len() <= EMBED_BATCH_MAX_TOKENS {
            return text.to_string();
        }
        let truncated_tokens = tokens[..EMBED_BATCH_MAX_TOKENS].to_vec();
        let decoded = self
            .tokenizer
            .decode(truncated_tokens)
            .unwrap_or_else(|_| text.to_string());
        truncate_to_line_boundary(&decoded)
    }

    fn group_into_batches(&self, items: Vec<EmbedItem>) -> Vec<Vec<EmbedItem>> {
        let mut batches = Vec::new();
        let mut current: Vec<EmbedItem> = Vec::new();
        let mut current_tokens = 0usize;

        for item in items {
            let item_tokens = self.tokenizer.encode_ordinary(&item.text).len();
            let would_overflow_items = current.len() + 1 > EMBED_BATCH_MAX_ITEMS;
            let would_overflow_tokens = current_tokens + item_tokens > EMBED_BATCH_MAX_TOKENS
                && !current.is_empty();

            if would_overflow_items || would_overflow_tokens {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current_tokens += item_tokens;
            current.push(item);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}

/// Truncate to the last full line boundary (drop a trailing partial
/// line), per spec §4.4's truncation rule.
fn truncate_to_line_boundary(text: &str) -> String {
    match text.rfind('\n') {
        Some(pos) => text[..=pos].to_string(),
        None => text.to_string(),
    }
}

fn make_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(EMBED_RETRY_BASE_MS),
        multiplier: EMBED_RETRY_FACTOR,
        randomization_factor: EMBED_RETRY_JITTER,
        max_interval: Duration::from_millis(EMBED_RETRY_CAP_MS),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

/// Run one batch with the exponential-backoff retry schedule (spec §4.4:
/// base 500ms, factor 2, ±25% jitter, cap 30s, max 6 attempts), a hard
/// 60s per-attempt timeout (spec §5), and batch-splitting on permanent
/// 4xx rejection so a single bad item doesn't sink its batch-mates.
fn run_batch_with_retry(
    client: Arc<EmbeddingClient>,
    batch: Vec<EmbedItem>,
) -> Pin<Box<dyn Future<Output = BatchRunResult> + Send>> {
    Box::pin(async move {
        if batch.is_empty() {
            return BatchRunResult::default();
        }

        let mut backoff = make_backoff();
        let texts: Vec<String> = batch.iter().map(|i| i.text.clone()).collect();

        for attempt in 1..=EMBED_RETRY_MAX_ATTEMPTS {
            let call = timeout(
                Duration::from_secs(EMBED_BATCH_TIMEOUT_SECS),
                client.embed_batch(&texts),
            )
            .await;

            let outcome = match call {
                Ok(outcome) => outcome,
                Err(_) => CallOutcome::Retryable("embedding call timed out".to_string()),
            };

            match outcome {
                CallOutcome::Ok(vectors) => {
                    let embeddings = batch
                        .iter()
                        .zip(vectors.into_iter())
                        .map(|(item, vector)| (item.fingerprint.clone(), vector))
                        .collect();
                    return BatchRunResult {
                        embeddings,
                        permanent_failures: Vec::new(),
                    };
                }
                CallOutcome::Retryable(reason) => {
                    if attempt == EMBED_RETRY_MAX_ATTEMPTS {
                        warn!(
                            "embedding batch of {} items exhausted retries: {reason}",
                            batch.len()
                        );
                        return BatchRunResult {
                            embeddings: Vec::new(),
                            permanent_failures: Vec::new(),
                        };
                    }
                    let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(30));
                    warn!(
                        "embedding batch attempt {attempt} retryable failure ({reason}), retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                CallOutcome::Permanent(reason) => {
                    if batch.len() == 1 {
                        warn!(
                            "embedding fingerprint {} permanently rejected: {reason}",
                            batch[0].fingerprint
                        );
                        return BatchRunResult {
                            embeddings: Vec::new(),
                            permanent_failures: vec![batch[0].fingerprint.clone()],
                        };
                    }
                    // Split and retry each half independently so the
                    // permanent failure is isolated to the offending item(s).
                    let mid = batch.len() / 2;
                    let mut left = batch;
                    let right = left.split_off(mid);
                    let client_left = client.clone();
                    let client_right = client.clone();
                    let (left_result, right_result) = tokio::join!(
                        run_batch_with_retry(client_left, left),
                        run_batch_with_retry(client_right, right)
                    );
                    let mut combined = left_result;
                    combined.embeddings.extend(right_result.embeddings);
                    combined
                        .permanent_failures
                        .extend(right_result.permanent_failures);
                    return combined;
                }
            }
        }

        BatchRunResult::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_to_line_boundary_drops_partial_trailing_line() {
        let text = "line one\nline two\npartial";
        assert_eq!(truncate_to_line_boundary(text), "line one\nline two\n");
    }

    #[test]
    fn truncate_to_line_boundary_no_newline_keeps_text() {
        assert_eq!(truncate_to_line_boundary("no newline here"), "no newline here");
    }
}
