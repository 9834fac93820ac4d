//! FingerprintCatalog (spec §4.2): a durable `path -> fingerprint` mapping,
//! diffed cheaply against disk via a (size, mtime_ns) prefilter before
//! paying for a SHA-256 content hash.

use std::fs;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::source::Candidate;

/// `(path, size, mtime_ns, content_hash)` — at most one per path (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub path: String,
    pub size: u64,
    pub mtime_ns: i64,
    pub content_hash: [u8; 32],
}

impl Fingerprint {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }
}

/// Partition of a scan against stored state.
#[derive(Debug, Default)]
pub struct ScanDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

pub struct FingerprintCatalog<'c> {
    conn: &'c Connection,
}

impl<'c> FingerprintCatalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        FingerprintCatalog { conn }
    }

    pub fn create_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS file (
                path TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                mtime_ns INTEGER NOT NULL,
                hash BLOB NOT NULL
            );",
        )?;
        Ok(())
    }

    /// `scan(paths) -> {added, modified, removed, unchanged}` (spec §4.2).
    /// Only computes `content_hash` when the (size, mtime_ns) prefilter
    /// disagrees with the stored fingerprint.
    pub fn scan(&self, candidates: &[Candidate]) -> Result<ScanDiff> {
        let mut diff = ScanDiff::default();
        let mut seen = std::collections::HashSet::new();

        for candidate in candidates {
            seen.insert(candidate.relative.clone());
            let stored = self.get(&candidate.relative)?;
            let metadata = fs::metadata(&candidate.absolute);
            let (size, mtime_ns) = match &metadata {
                Ok(m) => (m.len(), mtime_ns_of(m)),
                Err(_) => {
                    // Path vanished between scan and stat; treat as removed.
                    if stored.is_some() {
                        diff.removed.push(candidate.relative.clone());
                    }
                    continue;
                }
            };

            match stored {
                None => diff.added.push(candidate.relative.clone()),
                Some(fp) if fp.size == size && fp.mtime_ns == mtime_ns => {
                    diff.unchanged.push(candidate.relative.clone());
                }
                Some(fp) => {
                    // Prefilter disagreed; confirm with content hash so a
                    // touched-but-unchanged file (same bytes, new mtime)
                    // still counts as unchanged for embedding-reuse purposes.
                    let hash = hash_file(&candidate.absolute)?;
                    if hash == fp.content_hash {
                        diff.unchanged.push(candidate.relative.clone());
                    } else {
                        diff.modified.push(candidate.relative.clone());
                    }
                }
            }
        }

        for path in self.all_paths()? {
            if !seen.contains(&path) {
                diff.removed.push(path);
            }
        }

        Ok(diff)
    }

    pub fn get(&self, path: &str) -> Result<Option<Fingerprint>> {
        let result = self
            .conn
            .query_row(
                "SELECT path, size, mtime_ns, hash FROM file WHERE path = ?1",
                params![path],
                |row| {
                    let hash: Vec<u8> = row.get(3)?;
                    let mut arr = [0u8; 32];
                    arr.copy_from_slice(&hash[..32.min(hash.len())]);
                    Ok(Fingerprint {
                        path: row.get(0)?,
                        size: row.get(1)?,
                        mtime_ns: row.get(2)?,
                        content_hash: arr,
                    })
                },
            )
            .optional()?;
        Ok(result)
    }

    pub fn all_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM file")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Upsert a fingerprint. Callers (`IndexStore::commit_revision`) only
    /// call this after the corresponding object/embedding writes for the
    /// same transaction have succeeded (spec §4.2 `commit`).
    pub fn put(&self, fp: &Fingerprint) -> Result<()> {
        self.conn.execute(
            "INSERT INTO file (path, size, mtime_ns, hash) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET size = excluded.size, mtime_ns = excluded.mtime_ns, hash = excluded.hash",
            params![fp.path, fp.size as i64, fp.mtime_ns, fp.content_hash.to_vec()],
        )?;
        Ok(())
    }

    pub fn remove(&self, path: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM file WHERE path = ?1", params![path])?;
        Ok(())
    }
}

pub fn hash_file(path: &Path) -> Result<[u8; 32]> {
    let bytes = fs::read(path).map_err(|e| crate::error::CodebasedError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(hash_bytes(&bytes))
}

pub fn hash_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

#[cfg(unix)]
pub fn mtime_ns_of(metadata: &fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    metadata.mtime() * 1_000_000_000 + metadata.mtime_nsec()
}

#[cfg(not(unix))]
pub fn mtime_ns_of(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn memory_catalog() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        FingerprintCatalog::create_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn scan_partitions_added_modified_removed_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let conn = memory_catalog();
        let catalog = FingerprintCatalog::new(&conn);

        let path_a = dir.path().join("a.rs");
        fs::write(&path_a, "fn a() {}").unwrap();
        let candidates = vec![Candidate {
            absolute: path_a.clone(),
            relative: "a.rs".to_string(),
        }];

        let diff = catalog.scan(&candidates).unwrap();
        assert_eq!(diff.added, vec!["a.rs".to_string()]);

        let meta = fs::metadata(&path_a).unwrap();
        catalog
            .put(&Fingerprint {
                path: "a.rs".to_string(),
                size: meta.len(),
                mtime_ns: mtime_ns_of(&meta),
                content_hash: hash_file(&path_a).unwrap(),
            })
            .unwrap();

        let diff = catalog.scan(&candidates).unwrap();
        assert_eq!(diff.unchanged, vec!["a.rs".to_string()]);
        assert!(diff.modified.is_empty());

        fs::write(&path_a, "fn a() { changed() }").unwrap();
        // force mtime forward in case the filesystem clock has coarse resolution
        std::thread::sleep(std::time::Duration::from_millis(5));
        filetime::set_file_mtime(&path_a, filetime::FileTime::now()).ok();
        let diff = catalog.scan(&candidates).unwrap();
        assert_eq!(diff.modified, vec!["a.rs".to_string()]);

        let diff = catalog.scan(&[]).unwrap();
        assert!(diff.removed.is_empty(), "not committed yet, so nothing stored to remove");
    }

    #[test]
    fn removed_path_detected_after_commit() {
        let conn = memory_catalog();
        let catalog = FingerprintCatalog::new(&conn);
        catalog
            .put(&Fingerprint {
                path: "gone.rs".to_string(),
                size: 1,
                mtime_ns: 1,
                content_hash: [0u8; 32],
            })
            .unwrap();
        let diff = catalog.scan(&[]).unwrap();
        assert_eq!(diff.removed, vec!["gone.rs".to_string()]);
    }

    #[test]
    fn same_bytes_same_hash_different_path_reuses_nothing_in_catalog_alone() {
        let a = hash_bytes(b"identical");
        let b = hash_bytes(b"identical");
        assert_eq!(a, b);
    }
}
