//! IndexStore (spec §4.5): the catalog, FTS5 and ANN kept in lockstep
//! behind one write protocol.
//!
//! The catalog is the authority (spec §9): every mutation starts from a
//! SQLite transaction over the `file`/`object`/`embedding` tables and the
//! contentless `object_fts` table, and only once that transaction commits
//! are the staged ANN mutations published. A reader never observes a
//! partial revision (spec §5 "Writes to the three stores for a single path
//! are atomic from readers' perspective").

pub mod ann;
pub mod catalog;
pub mod fts;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rusqlite::Connection;

use crate::catalog::{Fingerprint, FingerprintCatalog};
use crate::config::{Config, IndexMeta};
use crate::constants::{ANN_FILE_NAME, ANN_REBUILD_TOMBSTONE_FRACTION, CATALOG_DB_NAME, META_FILE_NAME};
use crate::embed::EmbeddingStore;
use crate::error::Result;
use crate::extract::Object;

pub use catalog::ObjectRow;

/// Why `IndexStore::open` requires the caller to re-extract from disk
/// before serving queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// Existing index was compatible; ready to serve/append immediately.
    Reused,
    /// `meta.toml` was missing, absent, or incompatible (schema version or
    /// embedding model/dimension changed) — every table was wiped and the
    /// caller must run a full one-shot index before trusting results
    /// (spec §6 "Mismatch triggers full rebuild").
    FullRebuildRequired,
}

pub struct IndexStore {
    writer: Mutex<Connection>,
    db_path: PathBuf,
    ann_dir: PathBuf,
    ann: ann::AnnIndex,
    dimension: usize,
    tombstones_since_rebuild: AtomicUsize,
}

impl IndexStore {
    /// Open (creating if absent) the three stores under `index_root`,
    /// per spec §6's persisted layout. Wipes and rebuilds schema if
    /// `meta.toml` is absent or incompatible with `config`.
    pub fn open(index_root: &Path, config: &Config) -> Result<(Self, OpenOutcome)> {
        std::fs::create_dir_all(index_root).map_err(|e| crate::error::CodebasedError::Io {
            path: index_root.to_path_buf(),
            source: e,
        })?;

        let db_path = index_root.join(CATALOG_DB_NAME);
        let ann_dir = index_root.join(ANN_FILE_NAME).with_extension("");
        let meta_path = index_root.join(META_FILE_NAME);

        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        FingerprintCatalog::create_schema(&conn)?;
        catalog::create_schema(&conn)?;
        fts::create_schema(&conn)?;

        let current_meta = IndexMeta::current(config);
        let existing_meta = IndexMeta::load(&meta_path)?;
        let outcome = match &existing_meta {
            Some(m) if m.compatible_with(&current_meta) => OpenOutcome::Reused,
            _ => OpenOutcome::FullRebuildRequired,
        };

        if outcome == OpenOutcome::FullRebuildRequired {
            conn.execute_batch(
                "DELETE FROM object; DELETE FROM embedding; DELETE FROM file;
                 INSERT INTO object_fts(object_fts) VALUES ('delete-all');",
            )
            .or_else(|_| conn.execute_batch("DELETE FROM object; DELETE FROM embedding; DELETE FROM file;"))?;
            let _ = std::fs::remove_dir_all(&ann_dir);
        }
        std::fs::create_dir_all(&ann_dir).map_err(|e| crate::error::CodebasedError::Io {
            path: ann_dir.clone(),
            source: e,
        })?;
        current_meta.save(&meta_path)?;

        let ann = ann::AnnIndex::open(&ann_dir, config.embedding_dimension)?;

        Ok((
            IndexStore {
                writer: Mutex::new(conn),
                db_path,
                ann_dir,
                ann,
                dimension: config.embedding_dimension,
                tombstones_since_rebuild: AtomicUsize::new(0),
            },
            outcome,
        ))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn ann_dir(&self) -> &Path {
        &self.ann_dir
    }

    pub fn ann(&self) -> &ann::AnnIndex {
        &self.ann
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// A fresh read-only connection to the same database file, for
    /// concurrent readers (Searcher) that must never block on the writer
    /// (spec §5 single-writer/multi-reader discipline). WAL mode lets this
    /// proceed even while `commit_revision` holds the writer lock.
    pub fn open_reader(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }

    /// The six-step write protocol of spec §4.5, for one path's revision.
    /// `resolved_embeddings` maps each object's hex content fingerprint to
    /// its vector for every fingerprint that was successfully resolved
    /// (cache hit or fresh remote embedding); fingerprints absent from the
    /// map get no embedding/ANN entry for this revision (permanent
    /// rejection, spec §4.4).
    pub fn commit_revision(
        &self,
        path: &str,
        objects: &[Object],
        fingerprint: Fingerprint,
        resolved_embeddings: &HashMap<String, Vec<f32>>,
    ) -> Result<Vec<i64>> {
        let mut conn = self.writer.lock().expect("writer mutex poisoned");
        let tx = conn.transaction()?;

        // Step 1/2: delete prior objects + FTS rows; stage ANN tombstones.
        let old_ids = catalog::object_ids_for_path(&tx, path)?;
        for id in &old_ids {
            fts::delete(&tx, *id)?;
        }
        catalog::delete_objects_for_path(&tx, path)?;

        let mut ann_writer = self.ann.writer();
        for id in &old_ids {
            ann_writer.stage_delete(*id as u32);
        }

        // Step 3: insert new objects + FTS rows.
        let mut new_ids = Vec::with_capacity(objects.len());
        for object in objects {
            let content_hash = hex::encode(object.content_fingerprint());
            let id = catalog::insert_object(&tx, path, object, &content_hash)?;
            fts::insert(&tx, id, path, &object.name, &object.body)?;
            new_ids.push((id, content_hash));
        }

        // Step 4: insert resolved embeddings, stage ANN additions.
        for (object, (id, content_hash)) in objects.iter().zip(new_ids.iter()) {
            let _ = object;
            if let Some(vector) = resolved_embeddings.get(content_hash) {
                catalog::put_embedding(&tx, content_hash, vector)?;
                ann_writer.stage_add(*id as u32, vector.clone());
            }
        }

        // Step 5: update fingerprint.
        FingerprintCatalog::new(&tx).put(&fingerprint)?;

        // Step 6: commit, then publish ANN mutations. A transaction
        // failure anywhere above returns before this point and the
        // in-memory `ann_writer` is simply dropped, discarding its staged
        // mutations (spec §4.5 "On rollback, discard pending ANN mutations").
        tx.commit()?;
        let tombstoned = old_ids.len();
        ann_writer.publish(&self.ann)?;
        catalog::gc_embeddings(&conn)?;
        drop(conn);

        self.maybe_rebuild_ann(tombstoned)?;

        Ok(new_ids.into_iter().map(|(id, _)| id).collect())
    }

    /// Tombstone-fraction rebuild trigger (spec §4.5 "If tombstones exceed
    /// 20% of live entries... the ANN is rebuilt from the embedding table
    /// in one pass").
    fn maybe_rebuild_ann(&self, tombstoned_this_revision: usize) -> Result<()> {
        let total = self
            .tombstones_since_rebuild
            .fetch_add(tombstoned_this_revision, Ordering::SeqCst)
            + tombstoned_this_revision;
        let fraction = self.ann.tombstone_fraction(total)?;
        if fraction > ANN_REBUILD_TOMBSTONE_FRACTION {
            self.rebuild_ann_from_catalog()?;
            self.tombstones_since_rebuild.store(0, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Rebuild the ANN structure from the catalog's live objects and
    /// embedding table in one pass (spec §4.5, §7, §8 scenario 5). Used
    /// both by the tombstone-fraction trigger above and by `crate::doctor`
    /// on a detected startup staleness/corruption.
    pub fn rebuild_ann_from_catalog(&self) -> Result<()> {
        let conn = self.writer.lock().expect("writer mutex poisoned");
        let objects = catalog::all_objects(&conn)?;
        let embeddings: HashMap<String, Vec<f32>> = catalog::all_embeddings(&conn)?.into_iter().collect();
        let items: Vec<(u32, Vec<f32>)> = objects
            .into_iter()
            .filter_map(|o| embeddings.get(&o.content_hash).map(|v| (o.id as u32, v.clone())))
            .collect();
        drop(conn);
        self.ann.rebuild(&items)
    }
}

impl EmbeddingStore for IndexStore {
    fn get_embeddings(&self, fingerprints: &[String]) -> HashMap<String, Vec<f32>> {
        let conn = self.writer.lock().expect("writer mutex poisoned");
        catalog::embeddings_by_content_hash(&conn, fingerprints)
            .unwrap_or_default()
            .into_iter()
            .collect()
    }

    fn put_embeddings(&self, items: &[(String, Vec<f32>)]) {
        let conn = self.writer.lock().expect("writer mutex poisoned");
        for (hash, vector) in items {
            if let Err(e) = catalog::put_embedding(&conn, hash, vector) {
                tracing::warn!("failed to persist embedding for {hash}: {e}");
            }
        }
    }
}
