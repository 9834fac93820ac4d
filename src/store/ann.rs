//! ANN (approximate nearest neighbor) half of `IndexStore` (spec §4.5 item 3).
//!
//! `arroy` + `heed` (LMDB) exactly as the upstream vector store uses them,
//! but over L2-normalized vectors with `arroy::distances::DotProduct`: spec
//! calls for inner-product/HNSW, and dot product over normalized vectors is
//! cosine similarity, so this realizes both at once with one metric.
//!
//! Writes are staged in memory (`AnnWriter`) and only applied to LMDB when
//! the caller's SQLite transaction has actually committed — `publish()` is
//! the only thing that opens an LMDB write transaction. A caller that rolls
//! back its SQLite transaction just drops the `AnnWriter` instead, so LMDB
//! never runs ahead of the catalog. This isn't a real two-phase commit
//! across the two engines: a crash between the SQLite commit and the
//! `publish()` call leaves the ANN stale, which is exactly what the
//! stale-on-startup rebuild trigger (`crate::doctor`) exists to catch.

use std::collections::HashSet;
use std::path::Path;

use arroy::distances::DotProduct;
use arroy::{Database as ArroyDatabase, ItemId, Reader, Writer};
use heed::{Env, EnvOpenOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{CodebasedError, Result};

const ANN_MAP_SIZE_MB: usize = 1024;

pub struct AnnIndex {
    env: Env,
    database: ArroyDatabase<DotProduct>,
    dimension: usize,
}

impl AnnIndex {
    pub fn open(dir: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| CodebasedError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(ANN_MAP_SIZE_MB * 1024 * 1024)
                .max_dbs(4)
                .open(dir)
        }
        .map_err(|e| CodebasedError::Consistency(format!("failed to open ANN env: {e}")))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        let database: ArroyDatabase<DotProduct> = env
            .create_database(&mut wtxn, Some("ann"))
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;

        Ok(AnnIndex {
            env,
            database,
            dimension,
        })
    }

    pub fn writer(&self) -> AnnWriter {
        AnnWriter {
            pending_deletes: HashSet::new(),
            pending_adds: Vec::new(),
        }
    }

    /// Top `limit` nearest neighbors to `query` by dot-product similarity
    /// over a freshly-opened LMDB read transaction — under MVCC this always
    /// sees the latest committed `publish()`, never a writer's in-progress
    /// one, so callers don't need any extra snapshot bookkeeping.
    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(ItemId, f32)>> {
        let normalized = normalize(query);
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        let reader = match Reader::open(&rtxn, 0, self.database) {
            Ok(r) => r,
            Err(_) => return Ok(Vec::new()), // not built yet
        };
        let results = reader
            .nns(limit)
            .by_vector(&rtxn, &normalized)
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        Ok(results
            .into_iter()
            .map(|(id, distance)| (id, 1.0 - distance))
            .collect())
    }

    /// Fraction of the index's live entries that are tombstoned — feeds the
    /// 20% rebuild-threshold policy in `crate::store::IndexStore`.
    pub fn tombstone_fraction(&self, tombstoned: usize) -> Result<f64> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        let live = self
            .database
            .len(&rtxn)
            .map_err(|e| CodebasedError::Consistency(e.to_string()))? as usize;
        if live == 0 {
            return Ok(0.0);
        }
        Ok(tombstoned as f64 / live as f64)
    }

    /// Drop and recreate the whole structure, re-inserting `items` fresh —
    /// used by the stale-on-startup / 20%-tombstone rebuild path, where
    /// rebuilding from the embedding table is cheaper than compacting.
    pub fn rebuild(&self, items: &[(ItemId, Vec<f32>)]) -> Result<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        self.database
            .clear(&mut wtxn)
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        let writer = Writer::new(self.database, 0, self.dimension);
        for (id, vector) in items {
            writer
                .add_item(&mut wtxn, *id, &normalize(vector))
                .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        }
        let mut rng = StdRng::seed_from_u64(0x636f646562617365);
        writer
            .builder(&mut rng)
            .build(&mut wtxn)
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        Ok(())
    }
}

/// In-memory staging area for one revision's ANN mutations (spec §4.5 step
/// 2/4/6). Created fresh per revision; never reused across `publish()` calls.
pub struct AnnWriter {
    pending_deletes: HashSet<ItemId>,
    pending_adds: Vec<(ItemId, Vec<f32>)>,
}

impl AnnWriter {
    pub fn stage_delete(&mut self, id: ItemId) {
        self.pending_deletes.insert(id);
        self.pending_adds.retain(|(pending_id, _)| *pending_id != id);
    }

    pub fn stage_add(&mut self, id: ItemId, vector: Vec<f32>) {
        self.pending_deletes.remove(&id);
        self.pending_adds.push((id, vector));
    }

    pub fn is_empty(&self) -> bool {
        self.pending_deletes.is_empty() && self.pending_adds.is_empty()
    }

    /// Apply staged deletes and additions to LMDB and rebuild the tree in
    /// one write transaction. Only call this after the paired SQLite
    /// transaction has committed.
    pub fn publish(self, index: &AnnIndex) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let mut wtxn = index
            .env
            .write_txn()
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        let writer = Writer::new(index.database, 0, index.dimension);

        for id in &self.pending_deletes {
            writer
                .del_item(&mut wtxn, *id)
                .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        }
        for (id, vector) in &self.pending_adds {
            writer
                .add_item(&mut wtxn, *id, &normalize(vector))
                .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        }

        let mut rng = StdRng::seed_from_u64(0x636f646562617365);
        writer
            .builder(&mut rng)
            .build(&mut wtxn)
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| CodebasedError::Consistency(e.to_string()))?;
        Ok(())
    }

    /// Discard staged mutations without touching LMDB (paired SQLite
    /// transaction rolled back).
    pub fn discard(self) {}
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}
