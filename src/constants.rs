//! Central constants for codebased configuration
//!
//! All string literals for paths, filenames, and tunables shared between
//! PathSource and Watcher live here so the two never disagree about what is
//! indexable.

use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag, set by the CTRL-C handler.
///
/// Uses a raw `AtomicBool` instead of relying solely on `CancellationToken`
/// because extraction and embedding work is partly synchronous (tree-sitter
/// parsing, file I/O) and the flag must be visible from any thread without
/// async polling. Checked between files and between embedding mini-batches.
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check whether a graceful shutdown has been requested (CTRL-C).
#[inline]
pub fn is_shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Check shutdown via either the global flag or a cancellation token.
#[inline]
pub fn check_shutdown(cancel_token: &tokio_util::sync::CancellationToken) -> bool {
    is_shutdown_requested() || cancel_token.is_cancelled()
}

/// Name of the index directory under a repository root.
pub const INDEX_DIR_NAME: &str = ".codebased";

/// Name of the global config directory in the user's home.
pub const CONFIG_DIR_NAME: &str = ".codebased";

/// Name of the config file within the global config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// SQLite database file holding the catalog and FTS index.
pub const CATALOG_DB_NAME: &str = "index.db";

/// Serialized ANN index file.
pub const ANN_FILE_NAME: &str = "ann.bin";

/// Schema/model metadata file.
pub const META_FILE_NAME: &str = "meta.toml";

/// Lock file name indicating an active single writer.
pub const WRITER_LOCK_FILE: &str = ".writer.lock";

/// Log directory name within the index root.
pub const LOG_DIR_NAME: &str = "logs";

/// Default log file name.
pub const LOG_FILE_NAME: &str = "codebased.log";

/// Default embedding model id.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension for the default model.
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Bytes of context captured before/after an extracted object (§4.3).
pub const CONTEXT_WINDOW_BYTES: usize = 512;

/// Bytes sniffed from the head of a file for binary detection (§4.1).
pub const BINARY_SNIFF_BYTES: usize = 8192;

/// Maximum items per embedding batch (B_MAX, §4.4).
pub const EMBED_BATCH_MAX_ITEMS: usize = 96;

/// Maximum total input tokens per embedding batch (T_MAX, §4.4).
pub const EMBED_BATCH_MAX_TOKENS: usize = 8_000;

/// Wall-clock flush interval for live batching (§4.4).
pub const EMBED_FLUSH_INTERVAL_MS: u64 = 200;

/// Retry schedule: base backoff.
pub const EMBED_RETRY_BASE_MS: u64 = 500;

/// Retry schedule: backoff multiplier.
pub const EMBED_RETRY_FACTOR: f64 = 2.0;

/// Retry schedule: jitter fraction (±25%).
pub const EMBED_RETRY_JITTER: f64 = 0.25;

/// Retry schedule: cap on any single backoff.
pub const EMBED_RETRY_CAP_MS: u64 = 30_000;

/// Retry schedule: maximum attempts per batch.
pub const EMBED_RETRY_MAX_ATTEMPTS: u32 = 6;

/// Hard per-batch embedding call timeout (§5).
pub const EMBED_BATCH_TIMEOUT_SECS: u64 = 60;

/// Maximum in-flight embedding batches (C_CONCURRENT, §4.4).
pub const EMBED_MAX_CONCURRENT_BATCHES: usize = 4;

/// Query-side embedding LRU size (§4.7).
pub const QUERY_CACHE_CAPACITY: u64 = 128;

/// In-process memo cache size for content-fingerprint -> embedding lookups,
/// sitting in front of the durable cache in the catalog's embedding table.
pub const EMBED_MEMO_CACHE_CAPACITY: u64 = 10_000;

/// Per-path event coalescing window for live indexing (§4.6).
pub const EVENT_COALESCE_MS: u64 = 100;

/// Maximum per-path retry attempts before quarantine (§4.6).
pub const MAX_PATH_RETRIES: u32 = 3;

/// Indexer shutdown drain budget (§5).
pub const SHUTDOWN_DRAIN_SECS: u64 = 5;

/// ANN rebuild threshold: fraction of tombstoned entries that forces a rebuild (§4.5).
pub const ANN_REBUILD_TOMBSTONE_FRACTION: f64 = 0.20;

/// Default result count for search (§6).
pub const DEFAULT_RESULT_COUNT: usize = 10;

/// RRF fusion constant (§4.7, §9).
pub const RRF_K: f64 = 60.0;

/// Candidate pool multiplier per sub-query (§4.7, §9): pool size is `POOL_MULTIPLIER * k`.
pub const RRF_POOL_MULTIPLIER: usize = 3;

/// Default worker pool size cap used when `min(cores, CAP)` is computed (§4.6).
pub const DEFAULT_WORKER_CAP: usize = 8;

/// Directories and files that are always excluded from indexing, regardless
/// of `.gitignore`/`.cbignore` contents.
pub const ALWAYS_EXCLUDED: &[&str] = &[
    ".codebased",
    ".git",
    ".svn",
    ".hg",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "__pycache__",
    ".pytest_cache",
    ".tox",
    "venv",
    ".venv",
    ".bundle",
    ".gradle",
    ".m2",
    ".idea",
    ".vscode",
    ".vs",
    "coverage",
    ".nyc_output",
    ".cache",
];

/// Extensions that are never indexed, regardless of content (binary/generated).
pub const ALWAYS_SKIP_EXTENSIONS: &[&str] = &[
    "tmp", "temp", "bak", "swp", "swo", "map", "lock", "sum", "pyc", "pyo", "pyd", "class", "o",
    "obj", "a", "lib", "so", "dll", "exe", "pdb", "ilk", "zip", "tar", "gz", "bz2", "xz", "7z",
    "rar", "png", "jpg", "jpeg", "gif", "bmp", "ico", "svg", "webp", "tiff", "mp3", "mp4", "wav",
    "ogg", "avi", "mov", "mkv", "woff", "woff2", "ttf", "otf", "eot", "db", "sqlite", "sqlite3",
    "mdb", "ldb", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "pem", "crt", "cer", "key",
    "p12", "pfx",
];
