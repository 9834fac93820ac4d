//! CLI entry point (spec §6): enough of the documented surface to drive
//! the library end-to-end. The interactive TUI is an external
//! collaborator and out of scope; omitting `QUERY` just prints a hint.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use codebased::config::Config;
use codebased::constants::{self, LOG_DIR_NAME, LOG_FILE_NAME};
use codebased::doctor;
use codebased::embed::EmbeddingService;
use codebased::indexer::{acquire_writer_lock, Indexer};
use codebased::search::{SearchFilters, Searcher};
use codebased::store::IndexStore;

#[derive(Debug, Parser)]
#[command(name = "codebased")]
#[command(version)]
#[command(about = "Local, interactive code search")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a full one-shot index of a repository.
    Init {
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Run a frozen-store query and print results to stdout.
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

fn main() {
    let code = run();
    std::process::exit(code);
}

fn run() -> i32 {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        eprintln!("interactive mode is not implemented by this binary; pass `init` or `search QUERY`");
        return 1;
    };

    ctrlc::set_handler(|| {
        constants::SHUTDOWN_REQUESTED.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .expect("failed to install ctrl-c handler");

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {e}", "config error:".red().bold());
            return 1;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{} {e}", "failed to start async runtime:".red().bold());
            return 2;
        }
    };

    let result = match command {
        Command::Init { root } => runtime.block_on(run_init(&root, &config)),
        Command::Search { query, count, root } => runtime.block_on(run_search(&root, &query, count, &config)),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            if constants::is_shutdown_requested() {
                130
            } else {
                2
            }
        }
    }
}

fn init_logging(index_root: &std::path::Path) {
    let log_dir = index_root.join(LOG_DIR_NAME);
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Leak the guard: this process lives only as long as this command run,
    // and dropping it early would cut off flushing before exit.
    std::mem::forget(guard);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .try_init();
}

async fn run_init(root: &std::path::Path, config: &Config) -> anyhow::Result<i32> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let index_root = config.index_root_for(&root);
    std::fs::create_dir_all(&index_root)?;
    init_logging(&index_root);

    // Held for the rest of this command so a second concurrent `init`/live
    // process against the same index fails fast instead of interleaving
    // commits with this one (spec §5 single-writer catalog).
    let _writer_lock = acquire_writer_lock(&index_root).ok_or_else(|| {
        anyhow::anyhow!(
            "another codebased process is already indexing {}",
            index_root.display()
        )
    })?;

    let (store, action) = doctor::diagnose_and_open(&index_root, config)?;
    tracing::info!("opened index at {} ({:?})", index_root.display(), action);
    let store = Arc::new(store);

    let embed_store = store.clone();
    let embeddings = Arc::new(EmbeddingService::new(config, embed_store));
    let indexer = Indexer::new(&root, store, embeddings);

    indexer.run_once().await?;

    let stats = indexer.stats();
    println!(
        "{} {} paths indexed, {} quarantined",
        "done:".green().bold(),
        stats.paths_indexed.load(std::sync::atomic::Ordering::Relaxed),
        stats.paths_quarantined.load(std::sync::atomic::Ordering::Relaxed),
    );

    Ok(if constants::is_shutdown_requested() { 130 } else { 0 })
}

async fn run_search(root: &std::path::Path, query: &str, count: usize, config: &Config) -> anyhow::Result<i32> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let index_root = config.index_root_for(&root);

    let (store, _) = IndexStore::open(&index_root, config)?;
    let store = Arc::new(store);
    let embed_store = store.clone();
    let embeddings = Arc::new(EmbeddingService::new(config, embed_store));
    let searcher = Searcher::new(&root, store, embeddings);

    let results = searcher.search(query, count, &SearchFilters::default()).await?;
    if results.is_empty() {
        println!("no results for {query:?}");
        return Ok(0);
    }

    for result in results {
        println!(
            "{} {}:{}  (rrf {:.4}, lexical {:.2}, semantic {:.2})",
            result.object.name.cyan().bold(),
            result.object.path,
            result.object.coordinates.start_line + 1,
            result.rrf_score,
            result.lexical_score,
            result.semantic_score,
        );
    }

    Ok(0)
}
