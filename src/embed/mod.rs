//! EmbeddingService (spec §4.4): cache-first, batched, retried remote
//! embedding calls.

mod batch;
mod cache;
mod client;

pub use batch::EmbedItem;
pub use cache::EmbeddingStore;
pub use client::EmbeddingClient;

use std::sync::Arc;

use crate::config::Config;

use batch::BatchEmbedder;
use cache::EmbeddingCache;

/// Public entry point: a single source for both the one-shot indexer and
/// live re-indexing to request embeddings, transparently skipping whatever
/// is already cached.
pub struct EmbeddingService<S: EmbeddingStore> {
    cache: EmbeddingCache<S>,
    batcher: BatchEmbedder,
}

impl<S: EmbeddingStore> EmbeddingService<S> {
    pub fn new(config: &Config, store: Arc<S>) -> Self {
        let client = Arc::new(EmbeddingClient::new(
            config.embedding_base_url.clone(),
            config.embedding_api_key.clone(),
            config.embedding_model.clone(),
        ));
        EmbeddingService {
            cache: EmbeddingCache::new(store),
            batcher: BatchEmbedder::new(client),
        }
    }

    /// Resolve embeddings for every `(fingerprint, text)` pair, hitting the
    /// cache first and only sending the miss set over the network. Returns
    /// one vector per input fingerprint that was successfully resolved;
    /// permanently-rejected fingerprints (spec §4.4) are simply absent.
    pub async fn embed(&self, items: Vec<EmbedItem>) -> Vec<(String, Vec<f32>)> {
        let fingerprints: Vec<String> = items.iter().map(|i| i.fingerprint.clone()).collect();
        let (mut resolved, miss_fingerprints) = self.cache.lookup(&fingerprints);

        if miss_fingerprints.is_empty() {
            return resolved;
        }

        let miss_set: Vec<EmbedItem> = items
            .into_iter()
            .filter(|item| miss_fingerprints.contains(&item.fingerprint))
            .collect();

        let run = self.batcher.embed_all(miss_set).await;
        if !run.embeddings.is_empty() {
            self.cache.record(&run.embeddings);
        }
        resolved.extend(run.embeddings);
        resolved
    }
}
