//! Guided rebuild path (spec §7/§9): diagnoses `meta.toml`/`ann.bin`/
//! `index.db` consistency on startup and drives the ANN-from-catalog
//! rebuild described in §4.5's rebuild policy and §8 scenario 5 ("ANN
//! corruption... rebuild from the embedding table").
//!
//! Fatal store errors (corruption, dimension mismatch) are the only
//! trigger spec.md names for this path; a clean startup never runs it.

use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::store::{IndexStore, OpenOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisAction {
    /// Index opened cleanly; no action taken.
    None,
    /// `meta.toml` was stale/missing; `IndexStore::open` already wiped and
    /// rebuilt the schema, so the caller must run a full index.
    FullReindexRequired,
    /// The catalog's embedding table disagreed with the ANN structure
    /// (corruption or a crash between a SQLite commit and its paired
    /// `publish()`); the ANN was rebuilt from the catalog in place,
    /// indexing does not need to re-run.
    AnnRebuilt,
}

/// Open `index_root`, checking for the staleness/corruption conditions
/// spec §8 scenario 5 describes and repairing what can be repaired
/// in-place. Returns the opened store and what, if anything, was done.
pub fn diagnose_and_open(index_root: &Path, config: &Config) -> Result<(IndexStore, DiagnosisAction)> {
    let (store, outcome) = IndexStore::open(index_root, config)?;

    if outcome == OpenOutcome::FullRebuildRequired {
        warn!("index metadata missing or incompatible; schema was reset, a full reindex is required");
        return Ok((store, DiagnosisAction::FullReindexRequired));
    }

    if ann_looks_stale(&store)? {
        warn!("ANN index looks stale relative to the catalog; rebuilding from the embedding table");
        store.rebuild_ann_from_catalog()?;
        return Ok((store, DiagnosisAction::AnnRebuilt));
    }

    info!("index opened cleanly at {}", index_root.display());
    Ok((store, DiagnosisAction::None))
}

/// Cheap corruption/staleness heuristic: every live object with a
/// resolved embedding should be reachable from an ANN search over its own
/// vector. A crash between a commit and its `publish()` call leaves
/// exactly this gap, since the catalog side is ahead of the ANN side.
fn ann_looks_stale(store: &IndexStore) -> Result<bool> {
    let conn = store.open_reader()?;
    let objects = crate::store::catalog::all_objects(&conn)?;
    if objects.is_empty() {
        return Ok(false);
    }
    let embeddings: std::collections::HashMap<String, Vec<f32>> =
        crate::store::catalog::all_embeddings(&conn)?.into_iter().collect();

    let sample = objects
        .iter()
        .filter(|o| embeddings.contains_key(&o.content_hash))
        .take(8)
        .collect::<Vec<_>>();
    if sample.is_empty() {
        return Ok(false);
    }

    for object in sample {
        let vector = &embeddings[&object.content_hash];
        let hits = store.ann().search(vector, 1)?;
        if !hits.iter().any(|(id, _)| *id as i64 == object.id) {
            return Ok(true);
        }
    }
    Ok(false)
}
