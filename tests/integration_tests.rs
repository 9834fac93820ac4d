//! End-to-end scenarios against a real `IndexStore` + `Indexer` +
//! `Searcher`, with the remote embedding endpoint replaced by a wiremock
//! server so semantic ranking is deterministic.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use codebased::config::Config;
use codebased::embed::EmbeddingService;
use codebased::indexer::Indexer;
use codebased::search::{SearchFilters, Searcher};
use codebased::store::{catalog, IndexStore};

/// Maps each request's input texts to a fixed, low-dimensional vector so
/// semantic similarity is predictable: the request body closest to the text
/// that named the object wins the highest dot product.
struct FixedEmbeddings;

impl Respond for FixedEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("valid JSON request body");
        let inputs = body["input"].as_array().expect("input array");
        let data: Vec<Value> = inputs
            .iter()
            .map(|v| json!({ "embedding": fixed_vector_for(v.as_str().unwrap_or_default()) }))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
    }
}

fn fixed_vector_for(text: &str) -> [f32; 4] {
    if text.contains("baz") || text.contains("test double") {
        [0.0, 0.0, 1.0, 0.0]
    } else if text.contains("class Bar") {
        [0.0, 1.0, 0.0, 0.0]
    } else if text.contains("def foo") || text.contains("def foo2") {
        [1.0, 0.0, 0.0, 0.0]
    } else {
        [0.25, 0.25, 0.25, 0.25]
    }
}

/// Returns 429 for the first `fail_count` requests against a fresh counter,
/// then delegates to `FixedEmbeddings`.
struct FlakyThenFixed {
    remaining_failures: std::sync::atomic::AtomicUsize,
}

impl Respond for FlakyThenFixed {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let remaining = self.remaining_failures.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            return ResponseTemplate::new(429).set_body_string("rate limited");
        }
        FixedEmbeddings.respond(request)
    }
}

async fn mock_embedding_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(FixedEmbeddings)
        .mount(&server)
        .await;
    server
}

fn test_config(base_url: String) -> Config {
    Config {
        embedding_api_key: "test-key".to_string(),
        embedding_model: "text-embedding-3-small".to_string(),
        embedding_dimension: 4,
        editor_command: None,
        index_root: None,
        embedding_base_url: base_url,
    }
}

async fn open_store(index_dir: &Path, config: &Config) -> Arc<IndexStore> {
    let (store, _) = IndexStore::open(index_dir, config).unwrap();
    Arc::new(store)
}

fn services(config: &Config, store: Arc<IndexStore>) -> Arc<EmbeddingService<IndexStore>> {
    Arc::new(EmbeddingService::new(config, store))
}

#[tokio::test]
async fn scenario_1_init_indexes_objects_and_serves_lexical_and_semantic_queries() {
    let server = mock_embedding_server().await;
    let config = test_config(server.uri());

    let repo = tempfile::tempdir().unwrap();
    std::fs::write(
        repo.path().join("a.py"),
        "def foo():\n    pass\n\nclass Bar:\n    def baz(self):\n        pass\n",
    )
    .unwrap();

    let index_dir = tempfile::tempdir().unwrap();
    let store = open_store(index_dir.path(), &config).await;
    let embeddings = services(&config, store.clone());

    let indexer = Indexer::new(repo.path(), store.clone(), embeddings.clone());
    indexer.run_once().await.unwrap();

    {
        let conn = store.open_reader().unwrap();
        let objects = catalog::objects_for_path(&conn, "a.py").unwrap();
        assert_eq!(objects.len(), 3);
        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        assert!(names.contains(&"foo"));
        assert!(names.contains(&"Bar"));
        assert!(names.contains(&"baz"));
    }

    let searcher = Searcher::new(repo.path(), store.clone(), embeddings.clone());

    let lexical_hits = searcher.search("baz", 10, &SearchFilters::default()).await.unwrap();
    assert!(lexical_hits.iter().any(|r| r.object.name == "baz"));

    let semantic_hits = searcher
        .search("test double", 1, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(semantic_hits.len(), 1);
    assert_eq!(semantic_hits[0].object.name, "baz");
}

#[tokio::test]
async fn scenario_2_rename_drops_old_name_and_reuses_embedding_for_unchanged_siblings() {
    let server = mock_embedding_server().await;
    let config = test_config(server.uri());

    let repo = tempfile::tempdir().unwrap();
    std::fs::write(repo.path().join("a.py"), "def foo():\n    pass\n").unwrap();

    let index_dir = tempfile::tempdir().unwrap();
    let store = open_store(index_dir.path(), &config).await;
    let embeddings = services(&config, store.clone());
    let indexer = Indexer::new(repo.path(), store.clone(), embeddings.clone());
    indexer.run_once().await.unwrap();

    let old_fingerprint = {
        let conn = store.open_reader().unwrap();
        let objects = catalog::objects_for_path(&conn, "a.py").unwrap();
        assert_eq!(objects.len(), 1);
        objects[0].content_hash.clone()
    };

    std::fs::write(repo.path().join("a.py"), "def foo2():\n    pass\n").unwrap();
    indexer.run_once().await.unwrap();

    let conn = store.open_reader().unwrap();
    let objects = catalog::objects_for_path(&conn, "a.py").unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].name, "foo2");
    assert_ne!(objects[0].content_hash, old_fingerprint);

    let embeddings_by_hash: HashMap<String, Vec<f32>> = catalog::all_embeddings(&conn).unwrap().into_iter().collect();
    assert!(!embeddings_by_hash.contains_key(&old_fingerprint), "stale embedding should have been GC'd");
    assert!(embeddings_by_hash.contains_key(&objects[0].content_hash));

    let searcher = Searcher::new(repo.path(), store.clone(), embeddings.clone());
    let old_name_hits = searcher.search("foo", 10, &SearchFilters::default()).await.unwrap();
    assert!(!old_name_hits.iter().any(|r| r.object.name == "foo"));
    let new_name_hits = searcher.search("foo2", 10, &SearchFilters::default()).await.unwrap();
    assert!(new_name_hits.iter().any(|r| r.object.name == "foo2"));
}

#[tokio::test]
async fn scenario_3_deleting_a_file_removes_all_of_its_objects_and_embeddings() {
    let server = mock_embedding_server().await;
    let config = test_config(server.uri());

    let repo = tempfile::tempdir().unwrap();
    std::fs::write(
        repo.path().join("a.py"),
        "def foo():\n    pass\n\nclass Bar:\n    def baz(self):\n        pass\n",
    )
    .unwrap();

    let index_dir = tempfile::tempdir().unwrap();
    let store = open_store(index_dir.path(), &config).await;
    let embeddings = services(&config, store.clone());
    let indexer = Indexer::new(repo.path(), store.clone(), embeddings);
    indexer.run_once().await.unwrap();

    {
        let conn = store.open_reader().unwrap();
        assert_eq!(catalog::objects_for_path(&conn, "a.py").unwrap().len(), 3);
    }

    std::fs::remove_file(repo.path().join("a.py")).unwrap();
    indexer.run_once().await.unwrap();

    let conn = store.open_reader().unwrap();
    assert!(catalog::objects_for_path(&conn, "a.py").unwrap().is_empty());
    assert!(catalog::all_embeddings(&conn).unwrap().is_empty());
}

#[tokio::test]
async fn scenario_4_cbignore_removes_previously_indexed_files_on_next_scan() {
    let server = mock_embedding_server().await;
    let config = test_config(server.uri());

    let repo = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(repo.path().join("vendor")).unwrap();
    std::fs::write(repo.path().join("vendor/x.go"), "package vendor\n\nfunc X() {}\n").unwrap();

    let index_dir = tempfile::tempdir().unwrap();
    let store = open_store(index_dir.path(), &config).await;
    let embeddings = services(&config, store.clone());
    let indexer = Indexer::new(repo.path(), store.clone(), embeddings);
    indexer.run_once().await.unwrap();

    {
        let conn = store.open_reader().unwrap();
        assert!(!catalog::objects_for_path(&conn, "vendor/x.go").unwrap().is_empty());
    }

    std::fs::write(repo.path().join(".cbignore"), "vendor/\n").unwrap();
    indexer.run_once().await.unwrap();

    let conn = store.open_reader().unwrap();
    assert!(catalog::objects_for_path(&conn, "vendor/x.go").unwrap().is_empty());
}

#[tokio::test]
async fn scenario_5_ann_rebuild_from_catalog_recovers_search_after_corruption() {
    let server = mock_embedding_server().await;
    let config = test_config(server.uri());

    let repo = tempfile::tempdir().unwrap();
    std::fs::write(repo.path().join("a.py"), "def foo():\n    pass\n").unwrap();

    let index_dir = tempfile::tempdir().unwrap();
    let store = open_store(index_dir.path(), &config).await;
    let embeddings = services(&config, store.clone());
    let indexer = Indexer::new(repo.path(), store.clone(), embeddings.clone());
    indexer.run_once().await.unwrap();

    // Simulate corruption by forcing a rebuild directly; the catalog's
    // embedding table is the authority so the ANN must come back identical.
    store.rebuild_ann_from_catalog().unwrap();

    let searcher = Searcher::new(repo.path(), store.clone(), embeddings);
    let hits = searcher.search("foo", 10, &SearchFilters::default()).await.unwrap();
    assert!(hits.iter().any(|r| r.object.name == "foo"));
}

#[tokio::test]
async fn scenario_6_embedding_retries_through_429s_and_every_object_ends_up_embedded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(FlakyThenFixed { remaining_failures: std::sync::atomic::AtomicUsize::new(2) })
        .mount(&server)
        .await;
    let config = test_config(server.uri());

    let repo = tempfile::tempdir().unwrap();
    std::fs::write(repo.path().join("a.py"), "def foo():\n    pass\n").unwrap();

    let index_dir = tempfile::tempdir().unwrap();
    let store = open_store(index_dir.path(), &config).await;
    let embeddings = services(&config, store.clone());
    let indexer = Indexer::new(repo.path(), store.clone(), embeddings);
    indexer.run_once().await.unwrap();

    let conn = store.open_reader().unwrap();
    let objects = catalog::objects_for_path(&conn, "a.py").unwrap();
    assert_eq!(objects.len(), 1);
    let resolved = catalog::get_embedding_for_object(&conn, objects[0].id).unwrap();
    assert!(resolved.is_some(), "object should end up embedded once the backoff schedule clears the 429s");
}
