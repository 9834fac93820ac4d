//! Indexer (spec §4.6): one-shot and live indexing over PathSource +
//! ObjectExtractor + EmbeddingService + IndexStore.
//!
//! One-shot indexing fans a repo's candidates out over a `rayon` pool
//! sized `min(cores, DEFAULT_WORKER_CAP)`; live indexing instead drains a
//! `Watcher`, coalescing rapid-fire events per path before committing.
//! Both modes converge on the same per-path commit routine, so a `resync`
//! mid-watch just re-runs the one-shot scan over the same `IndexStore`.

mod lock;

pub use lock::{acquire_writer_lock, WriterLock};

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{Fingerprint, FingerprintCatalog};
use crate::config::Config;
use crate::constants::{
    self, DEFAULT_WORKER_CAP, EVENT_COALESCE_MS, MAX_PATH_RETRIES, SHUTDOWN_DRAIN_SECS,
};
use crate::embed::{EmbedItem, EmbeddingService, EmbeddingStore};
use crate::error::{CodebasedError, Result};
use crate::extract::{self, Object};
use crate::source::{Candidate, Language, PathSource};
use crate::store::IndexStore;
use crate::watch::{self, WatchEvent, Watcher};

/// One path's commit outcome, broadcast after every committed revision
/// (spec §4.6 "index-changed notification") so an external collaborator
/// (the out-of-scope TUI) can refresh without polling.
#[derive(Debug, Clone)]
pub struct IndexChanged {
    pub path: String,
    pub object_ids: Vec<i64>,
}

/// Running counters, exposed as plain fields rather than via a metrics
/// crate (spec §7): cheap for a polling TUI to read, no new dependency.
#[derive(Debug, Default)]
pub struct IndexerStats {
    pub paths_indexed: AtomicU64,
    pub paths_quarantined: AtomicU64,
    pub parse_errors: AtomicU64,
}

pub struct Indexer<S: EmbeddingStore> {
    root: std::path::PathBuf,
    source: PathSource,
    store: Arc<IndexStore>,
    embeddings: Arc<EmbeddingService<S>>,
    changed: broadcast::Sender<IndexChanged>,
    stats: Arc<IndexerStats>,
    retry_counts: std::sync::Mutex<HashMap<String, u32>>,
}

impl<S: EmbeddingStore + 'static> Indexer<S> {
    pub fn new(root: impl Into<std::path::PathBuf>, store: Arc<IndexStore>, embeddings: Arc<EmbeddingService<S>>) -> Self {
        let root = root.into();
        let (changed, _) = broadcast::channel(1024);
        Indexer {
            source: PathSource::new(&root),
            root,
            store,
            embeddings,
            changed,
            stats: Arc::new(IndexerStats::default()),
            retry_counts: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexChanged> {
        self.changed.subscribe()
    }

    pub fn stats(&self) -> Arc<IndexerStats> {
        self.stats.clone()
    }

    /// Full scan of the repository: diff against the fingerprint catalog
    /// and commit every added/modified path, remove every deleted one.
    /// Fans the per-path work out over a `rayon` pool capped at
    /// `min(cores, DEFAULT_WORKER_CAP)` (spec §4.6).
    pub async fn run_once(&self) -> Result<()> {
        let candidates = self.source.scan();
        let diff = {
            let conn = self.store.open_reader()?;
            FingerprintCatalog::new(&conn).scan(&candidates)?
        };

        for path in &diff.removed {
            self.remove_path(path).await?;
        }

        let by_relative: HashMap<&str, &Candidate> =
            candidates.iter().map(|c| (c.relative.as_str(), c)).collect();

        let mut to_process: Vec<Candidate> = Vec::new();
        for path in diff.added.iter().chain(diff.modified.iter()) {
            if constants::is_shutdown_requested() {
                break;
            }
            if let Some(candidate) = by_relative.get(path.as_str()) {
                to_process.push((*candidate).clone());
            }
        }

        let pool_size = std::cmp::min(num_cpus::get(), DEFAULT_WORKER_CAP);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size.max(1))
            .build()
            .map_err(|e| CodebasedError::Consistency(format!("failed to build worker pool: {e}")))?;

        let extracted: Vec<(Candidate, Result<Vec<Object>>, Fingerprint)> = pool.install(|| {
            to_process
                .par_iter()
                .map(|candidate| self.extract_one(candidate))
                .collect()
        });

        for (candidate, objects, fingerprint) in extracted {
            if constants::is_shutdown_requested() {
                break;
            }
            match objects {
                Ok(objects) => {
                    if let Err(e) = self.commit_path(&candidate.relative, objects, fingerprint).await {
                        self.handle_path_failure(&candidate.relative, e);
                    } else {
                        self.retry_counts.lock().unwrap().remove(&candidate.relative);
                        self.stats.paths_indexed.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => self.handle_path_failure(&candidate.relative, e),
            }
        }

        Ok(())
    }

    /// Extract objects and compute the fingerprint for one candidate,
    /// off the async runtime (rayon pool thread): tree-sitter parsing and
    /// SHA-256 hashing are both synchronous CPU work.
    fn extract_one(&self, candidate: &Candidate) -> (Candidate, Result<Vec<Object>>, Fingerprint) {
        let bytes = std::fs::read(&candidate.absolute).unwrap_or_default();
        let language = Language::from_path(&candidate.absolute);
        let metadata = std::fs::metadata(&candidate.absolute).ok();
        let (size, mtime_ns) = metadata
            .map(|m| (m.len(), crate::catalog::mtime_ns_of(&m)))
            .unwrap_or((bytes.len() as u64, 0));

        let fingerprint = Fingerprint {
            path: candidate.relative.clone(),
            size,
            mtime_ns,
            content_hash: crate::catalog::hash_bytes(&bytes),
        };

        let objects = if language.is_indexable() {
            extract::extract(&candidate.relative, &bytes, language)
                .map_err(|e| CodebasedError::Parse { path: candidate.absolute.clone(), message: e })
        } else {
            Ok(Vec::new())
        };

        (candidate.clone(), objects, fingerprint)
    }

    /// Resolve embeddings for `objects` and commit the revision atomically
    /// (spec §4.5's six-step protocol, via `IndexStore::commit_revision`).
    async fn commit_path(&self, path: &str, objects: Vec<Object>, fingerprint: Fingerprint) -> Result<()> {
        let items: Vec<EmbedItem> = objects
            .iter()
            .map(|o| EmbedItem {
                fingerprint: hex::encode(o.content_fingerprint()),
                text: o.embedding_text(),
            })
            .collect();

        let resolved: HashMap<String, Vec<f32>> = if items.is_empty() {
            HashMap::new()
        } else {
            self.embeddings.embed(items).await.into_iter().collect()
        };

        let ids = self.store.commit_revision(path, &objects, fingerprint, &resolved)?;
        let _ = self.changed.send(IndexChanged { path: path.to_string(), object_ids: ids });
        Ok(())
    }

    async fn remove_path(&self, path: &str) -> Result<()> {
        let fingerprint = Fingerprint {
            path: path.to_string(),
            size: 0,
            mtime_ns: 0,
            content_hash: [0u8; 32],
        };
        let ids = self.store.commit_revision(path, &[], fingerprint, &HashMap::new())?;
        {
            let conn = self.store.open_reader()?;
            FingerprintCatalog::new(&conn).remove(path)?;
        }
        let _ = self.changed.send(IndexChanged { path: path.to_string(), object_ids: ids });
        Ok(())
    }

    /// 3-attempts-then-quarantine policy (spec §4.6): a path that fails
    /// `MAX_PATH_RETRIES` times in a row is dropped from this run without
    /// updating its fingerprint, so the next full scan retries it fresh.
    fn handle_path_failure(&self, path: &str, error: CodebasedError) {
        let mut counts = self.retry_counts.lock().unwrap();
        let count = counts.entry(path.to_string()).or_insert(0);
        *count += 1;
        if *count >= MAX_PATH_RETRIES {
            warn!("quarantining {path} after {count} failed attempts: {error}");
            self.stats.paths_quarantined.fetch_add(1, Ordering::Relaxed);
            counts.remove(path);
        } else {
            warn!("path {path} failed (attempt {count}/{MAX_PATH_RETRIES}): {error}");
        }
        self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Live-mode loop: drains the watcher with per-path coalescing,
    /// committing once a path goes quiet. Runs until `cancel` fires or
    /// `watch::WatchEvent::Resync` requires falling back to `run_once`.
    pub async fn run_live(&self, cancel: CancellationToken) -> Result<()> {
        let mut watcher = Watcher::start(&self.root, Duration::from_millis(EVENT_COALESCE_MS))
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;

        info!("watching {} for changes", self.root.display());

        loop {
            if constants::check_shutdown(&cancel) {
                break;
            }
            let events = watcher.wait(&self.source, Duration::from_millis(EVENT_COALESCE_MS));
            if events.is_empty() {
                continue;
            }

            let mut touched: Vec<String> = Vec::new();
            let mut needs_resync = false;

            for event in events {
                match event {
                    WatchEvent::Created(p) | WatchEvent::Modified(p) => {
                        if let Some(rel) = self.relative(&p) {
                            touched.push(rel);
                        }
                    }
                    WatchEvent::Deleted(p) => {
                        if let Some(rel) = self.relative(&p) {
                            self.remove_path(&rel).await?;
                        }
                    }
                    WatchEvent::Moved { from, to } => {
                        if let Some(rel) = self.relative(&from) {
                            self.remove_path(&rel).await?;
                        }
                        if to.is_dir() {
                            for descendant in watch::enumerate_descendants(&self.source, &to) {
                                if let Some(rel) = self.relative(&descendant) {
                                    touched.push(rel);
                                }
                            }
                        } else if let Some(rel) = self.relative(&to) {
                            touched.push(rel);
                        }
                    }
                    WatchEvent::Resync => needs_resync = true,
                }
            }

            if needs_resync {
                warn!("watcher reported a gap, falling back to a full rescan");
                self.run_once().await?;
                continue;
            }

            for path in touched {
                if constants::check_shutdown(&cancel) {
                    break;
                }
                let absolute = self.root.join(&path);
                let candidate = Candidate { absolute, relative: path };
                let (candidate, objects, fingerprint) = self.extract_one(&candidate);
                match objects {
                    Ok(objects) => {
                        if let Err(e) = self.commit_path(&candidate.relative, objects, fingerprint).await {
                            self.handle_path_failure(&candidate.relative, e);
                        } else {
                            self.stats.paths_indexed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => self.handle_path_failure(&candidate.relative, e),
                }
            }
        }

        watcher.stop();
        self.shutdown_drain().await;
        Ok(())
    }

    /// Give in-flight commits up to `SHUTDOWN_DRAIN_SECS` to finish before
    /// returning, matching spec §5's drain contract. `commit_path` already
    /// runs to completion synchronously once called, so there's nothing to
    /// join here beyond a bounded pause; this exists as the single place
    /// that enforces the budget, for any future concurrent-commit change.
    async fn shutdown_drain(&self) {
        let _ = tokio::time::timeout(Duration::from_secs(SHUTDOWN_DRAIN_SECS), async {}).await;
    }

    fn relative(&self, absolute: &Path) -> Option<String> {
        absolute
            .strip_prefix(&self.root)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EmbeddingStore;
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

    #[tokio::test]
    async fn run_once_indexes_new_files_and_removes_deleted_ones() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.rs"), "fn foo() {}\n").unwrap();

        let index_dir = tempfile::tempdir().unwrap();
        let (store, _) = IndexStore::open(index_dir.path(), &test_config()).unwrap();
        let store = Arc::new(store);
        let embed_store = Arc::new(NullStore { data: Mutex::new(StdHashMap::new()) });
        let service = Arc::new(EmbeddingService::new(&test_config(), embed_store));

        let indexer = Indexer::new(repo.path(), store.clone(), service);
        indexer.run_once().await.unwrap();
        assert_eq!(indexer.stats().paths_indexed.load(Ordering::Relaxed), 1);

        std::fs::remove_file(repo.path().join("a.rs")).unwrap();
        indexer.run_once().await.unwrap();

        let conn = store.open_reader().unwrap();
        assert!(crate::store::catalog::objects_for_path(&conn, "a.rs").unwrap().is_empty());
    }
}
