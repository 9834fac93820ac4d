//! Searcher (spec §4.7): hybrid lexical + semantic query over a running
//! `IndexStore`, fused by `crate::rerank::rrf_fusion`.

use std::collections::HashMap;
use std::sync::Arc;

use moka::sync::Cache;

use crate::catalog::hash_bytes;
use crate::constants::{QUERY_CACHE_CAPACITY, RRF_POOL_MULTIPLIER};
use crate::embed::{EmbedItem, EmbeddingService, EmbeddingStore};
use crate::error::Result;
use crate::extract::ObjectKind;
use crate::rerank::{rrf_fusion, FusedResult, RankedCandidate};
use crate::source::Language;
use crate::store::catalog::ObjectRow;
use crate::store::IndexStore;

/// Optional narrowing applied to both sub-queries (spec §4.7 "optional
/// filters"). `None` in any field means unfiltered on that dimension.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub language: Option<Language>,
    pub kind: Option<ObjectKind>,
    pub path_prefix: Option<String>,
}

impl SearchFilters {
    fn matches(&self, row: &ObjectRow) -> bool {
        if let Some(language) = self.language {
            if row.language != language {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if row.kind != kind {
                return false;
            }
        }
        if let Some(prefix) = &self.path_prefix {
            if !row.path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One fused, body-populated result (spec §4.7: "object metadata, the
/// object's body text ... and both sub-scores for diagnostics").
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub object: ObjectRow,
    pub body: String,
    pub rrf_score: f64,
    pub lexical_score: f64,
    pub semantic_score: f64,
}

pub struct Searcher<S: EmbeddingStore> {
    repo_root: std::path::PathBuf,
    store: Arc<IndexStore>,
    embeddings: Arc<EmbeddingService<S>>,
    query_cache: Cache<String, Arc<Vec<f32>>>,
}

impl<S: EmbeddingStore + 'static> Searcher<S> {
    pub fn new(repo_root: impl Into<std::path::PathBuf>, store: Arc<IndexStore>, embeddings: Arc<EmbeddingService<S>>) -> Self {
        Searcher {
            repo_root: repo_root.into(),
            store,
            embeddings,
            query_cache: Cache::new(QUERY_CACHE_CAPACITY),
        }
    }

    /// Run both sub-queries concurrently, fuse, and hydrate the top
    /// `limit` results' body text from disk (spec §4.7).
    pub async fn search(&self, query: &str, limit: usize, filters: &SearchFilters) -> Result<Vec<SearchResult>> {
        let pool_size = limit.saturating_mul(RRF_POOL_MULTIPLIER).max(limit);

        let lexical_fut = self.lexical_candidates(query, pool_size);
        let semantic_fut = self.semantic_candidates(query, pool_size);
        let (lexical, semantic) = tokio::join!(lexical_fut, semantic_fut);
        let lexical = lexical?;
        let semantic = semantic?;

        let conn = self.store.open_reader()?;
        let mut rows: HashMap<i64, ObjectRow> = HashMap::new();
        for id in lexical.iter().chain(semantic.iter()).map(|c| c.object_id) {
            if rows.contains_key(&id) {
                continue;
            }
            if let Some(row) = crate::store::catalog::get_object(&conn, id)? {
                if filters.matches(&row) {
                    rows.insert(id, row);
                }
            }
        }

        let lexical: Vec<RankedCandidate> = lexical.into_iter().filter(|c| rows.contains_key(&c.object_id)).collect();
        let semantic: Vec<RankedCandidate> = semantic.into_iter().filter(|c| rows.contains_key(&c.object_id)).collect();

        let byte_range_len: HashMap<i64, usize> = rows
            .values()
            .map(|r| (r.id, (r.byte_end - r.byte_start).max(0) as usize))
            .collect();
        let path: HashMap<i64, String> = rows.values().map(|r| (r.id, r.path.clone())).collect();

        // Over-fetch past `limit` so a result dropped for a stale byte
        // range can be replaced by the next candidate (spec §4.7).
        let fused = rrf_fusion(&lexical, &semantic, &byte_range_len, &path, pool_size);

        let mut results = Vec::with_capacity(limit);
        for candidate in fused {
            if results.len() >= limit {
                break;
            }
            let Some(row) = rows.get(&candidate.object_id) else { continue };
            if let Some(body) = self.read_body(row) {
                results.push(self.to_result(row.clone(), body, candidate));
            }
            // A row whose byte range no longer validates is dropped and
            // the next fused candidate is tried in its place.
        }

        Ok(results)
    }

    fn to_result(&self, object: ObjectRow, body: String, candidate: FusedResult) -> SearchResult {
        SearchResult {
            object,
            body,
            rrf_score: candidate.rrf_score,
            lexical_score: candidate.lexical_score,
            semantic_score: candidate.semantic_score,
        }
    }

    /// Read `object`'s body text directly from disk at its recorded byte
    /// range. Returns `None` if the file is gone or has shrunk past the
    /// recorded range, which the caller treats as "fingerprint changed,
    /// drop and promote the next candidate" (spec §4.7).
    fn read_body(&self, object: &ObjectRow) -> Option<String> {
        let absolute = self.repo_root.join(&object.path);
        let bytes = std::fs::read(&absolute).ok()?;
        let start = object.byte_start as usize;
        let end = object.byte_end as usize;
        if end > bytes.len() || start > end {
            return None;
        }
        Some(String::from_utf8_lossy(&bytes[start..end]).to_string())
    }

    async fn lexical_candidates(&self, query: &str, pool_size: usize) -> Result<Vec<RankedCandidate>> {
        let conn = self.store.open_reader()?;
        let hits = crate::store::fts::search(&conn, query, pool_size)?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, (object_id, bm25))| RankedCandidate { object_id, rank, sub_score: bm25 })
            .collect())
    }

    async fn semantic_candidates(&self, query: &str, pool_size: usize) -> Result<Vec<RankedCandidate>> {
        let vector = self.embed_query(query).await;
        let Some(vector) = vector else { return Ok(Vec::new()) };
        let hits = self.store.ann().search(&vector, pool_size)?;
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(rank, (id, score))| RankedCandidate { object_id: id as i64, rank, sub_score: score as f64 })
            .collect())
    }

    /// Embed the query text, short-circuiting through a ≤128-entry
    /// process-local LRU keyed by the query string itself (spec §4.7),
    /// distinct from `EmbeddingService`'s content-fingerprint cache.
    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        if let Some(cached) = self.query_cache.get(query) {
            return Some(cached.as_ref().clone());
        }

        let fingerprint = hex::encode(hash_bytes(query.as_bytes()));
        let item = EmbedItem { fingerprint: fingerprint.clone(), text: query.to_string() };
        let resolved = self.embeddings.embed(vec![item]).await;
        let vector = resolved.into_iter().find(|(fp, _)| *fp == fingerprint).map(|(_, v)| v)?;

        self.query_cache.insert(query.to_string(), Arc::new(vector.clone()));
        Some(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::extract::{Coordinates, Object, ObjectKind};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct NullStore {
        data: Mutex<StdHashMap<String, Vec<f32>>>,
    }

    impl EmbeddingStore for NullStore {
        fn get_embeddings(&self, fingerprints: &[String]) -> StdHashMap<String, Vec<f32>> {
            let data = self.data.lock().unwrap();
            fingerprints.iter().filter_map(|f| data.get(f).map(|v| (f.clone(), v.clone()))).collect()
        }
        fn put_embeddings(&self, items: &[(String, Vec<f32>)]) {
            let mut data = self.data.lock().unwrap();
            for (f, v) in items {
                data.insert(f.clone(), v.clone());
            }
        }
    }

    fn test_config() -> Config {
        Config {
            embedding_api_key: "k".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 4,
            editor_command: None,
            index_root: None,
            embedding_base_url: "http://localhost".to_string(),
        }
    }

    fn sample_object(name: &str, body: &str) -> Object {
        Object {
            id: 0,
            path: "a.rs".to_string(),
            name: name.to_string(),
            language: Language::Rust,
            kind: ObjectKind::Function,
            byte_range: 0..body.len(),
            coordinates: Coordinates::default(),
            context_before: String::new(),
            context_after: String::new(),
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn lexical_only_search_finds_committed_object_and_reads_body_from_disk() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn authenticate_user() {}\n").unwrap();

        let index_dir = tempfile::tempdir().unwrap();
        let (store, _) = IndexStore::open(index_dir.path(), &test_config()).unwrap();
        let store = Arc::new(store);

        let object = sample_object("authenticate_user", "fn authenticate_user() {}");
        store
            .commit_revision(
                "a.rs",
                &[object],
                crate::catalog::Fingerprint {
                    path: "a.rs".to_string(),
                    size: 10,
                    mtime_ns: 1,
                    content_hash: [0u8; 32],
                },
                &StdHashMap::new(),
            )
            .unwrap();

        let embed_store = Arc::new(NullStore { data: Mutex::new(StdHashMap::new()) });
        let service = Arc::new(EmbeddingService::new(&test_config(), embed_store));
        let searcher = Searcher::new(repo.path(), store, service);

        let results = searcher.search("authenticate", 10, &SearchFilters::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].body.contains("authenticate_user"));
    }

    #[tokio::test]
    async fn result_dropped_when_file_shrinks_past_byte_range() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn authenticate_user() {}\n").unwrap();

        let index_dir = tempfile::tempdir().unwrap();
        let (store, _) = IndexStore::open(index_dir.path(), &test_config()).unwrap();
        let store = Arc::new(store);

        let mut object = sample_object("authenticate_user", "fn authenticate_user() {}");
        object.byte_range = 0..10_000; // force an out-of-range byte_end

        store
            .commit_revision(
                "a.rs",
                &[object],
                crate::catalog::Fingerprint {
                    path: "a.rs".to_string(),
                    size: 10,
                    mtime_ns: 1,
                    content_hash: [0u8; 32],
                },
                &StdHashMap::new(),
            )
            .unwrap();

        let embed_store = Arc::new(NullStore { data: Mutex::new(StdHashMap::new()) });
        let service = Arc::new(EmbeddingService::new(&test_config(), embed_store));
        let searcher = Searcher::new(repo.path(), store, service);

        let results = searcher.search("authenticate", 10, &SearchFilters::default()).await.unwrap();
        assert!(results.is_empty());
    }
}
