//! Object and embedding tables of `IndexStore` (spec §4.5 item 1).
//!
//! Lives on the same `rusqlite::Connection` as `crate::catalog`'s `file`
//! table — one physical `index.db`, per the single-logical-store design.
//!
//! The `embedding` table is keyed by content fingerprint, not object id
//! (spec §3: "Embedding... Keyed by content fingerprint; attached to each
//! Object by its id"). This is what makes a rename free: deleting the old
//! object row never touches the embedding row its content_hash still
//! resolves to, so the new object at the new path resolves the same
//! embedding without a network round-trip. `gc_embeddings` is the explicit
//! sweep spec §4.5 describes ("embeddings whose content_hash has no
//! referring object are deleted"), run after a revision's object rows have
//! changed.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::extract::{Coordinates, Object, ObjectKind};
use crate::source::Language;

/// A persisted object row: same shape as `extract::Object` but with a
/// durable rowid instead of the per-extraction-run transient id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRow {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub language: Language,
    pub kind: ObjectKind,
    pub byte_start: i64,
    pub byte_end: i64,
    pub coordinates: Coordinates,
    pub context_before: String,
    pub context_after: String,
    pub content_hash: String,
}

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS object (
            id INTEGER PRIMARY KEY,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            language TEXT NOT NULL,
            kind TEXT NOT NULL,
            byte_start INTEGER NOT NULL,
            byte_end INTEGER NOT NULL,
            start_line INTEGER NOT NULL,
            start_col INTEGER NOT NULL,
            end_line INTEGER NOT NULL,
            end_col INTEGER NOT NULL,
            context_before TEXT NOT NULL,
            context_after TEXT NOT NULL,
            content_hash TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS object_path_idx ON object(path);
        CREATE INDEX IF NOT EXISTS object_content_hash_idx ON object(content_hash);

        -- Keyed by content fingerprint, decoupled from any single object's
        -- lifetime, per spec §3/§9 content-addressed caching.
        CREATE TABLE IF NOT EXISTS embedding (
            content_hash TEXT PRIMARY KEY,
            vector BLOB NOT NULL
        );",
    )?;
    Ok(())
}

/// Object ids for `path`, for callers that need to tombstone their FTS/ANN
/// counterparts before the row delete.
pub fn object_ids_for_path(conn: &Connection, path: &str) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM object WHERE path = ?1")?;
    let rows = stmt.query_map(params![path], |row| row.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn delete_objects_for_path(conn: &Connection, path: &str) -> Result<()> {
    conn.execute("DELETE FROM object WHERE path = ?1", params![path])?;
    Ok(())
}

/// Insert one object, returning its assigned persistent id. `content_hash`
/// is the hex-encoded content fingerprint (spec §3), stored on the object
/// row so `gc_embeddings` can determine liveness without re-hashing.
pub fn insert_object(conn: &Connection, path: &str, object: &Object, content_hash: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO object (
            path, name, language, kind, byte_start, byte_end,
            start_line, start_col, end_line, end_col,
            context_before, context_after, content_hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            path,
            object.name,
            object.language.tag(),
            object.kind.tag(),
            object.byte_range.start as i64,
            object.byte_range.end as i64,
            object.coordinates.start_line as i64,
            object.coordinates.start_col as i64,
            object.coordinates.end_line as i64,
            object.coordinates.end_col as i64,
            object.context_before,
            object.context_after,
            content_hash,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_object(conn: &Connection, id: i64) -> Result<Option<ObjectRow>> {
    let row = conn
        .query_row(
            "SELECT id, path, name, language, kind, byte_start, byte_end,
                    start_line, start_col, end_line, end_col, context_before, context_after, content_hash
             FROM object WHERE id = ?1",
            params![id],
            map_object_row,
        )
        .optional()?;
    Ok(row)
}

pub fn objects_for_path(conn: &Connection, path: &str) -> Result<Vec<ObjectRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, name, language, kind, byte_start, byte_end,
                start_line, start_col, end_line, end_col, context_before, context_after, content_hash
         FROM object WHERE path = ?1",
    )?;
    let rows = stmt.query_map(params![path], map_object_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn map_object_row(row: &rusqlite::Row) -> rusqlite::Result<ObjectRow> {
    let language: String = row.get(3)?;
    let kind: String = row.get(4)?;
    Ok(ObjectRow {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        language: Language::from_tag(&language),
        kind: ObjectKind::from_tag(&kind),
        byte_start: row.get(5)?,
        byte_end: row.get(6)?,
        coordinates: Coordinates {
            start_line: row.get::<_, i64>(7)? as usize,
            start_col: row.get::<_, i64>(8)? as usize,
            end_line: row.get::<_, i64>(9)? as usize,
            end_col: row.get::<_, i64>(10)? as usize,
        },
        context_before: row.get(11)?,
        context_after: row.get(12)?,
        content_hash: row.get(13)?,
    })
}

pub fn put_embedding(conn: &Connection, content_hash: &str, vector: &[f32]) -> Result<()> {
    conn.execute(
        "INSERT INTO embedding (content_hash, vector) VALUES (?1, ?2)
         ON CONFLICT(content_hash) DO UPDATE SET vector = excluded.vector",
        params![content_hash, vector_to_blob(vector)],
    )?;
    Ok(())
}

pub fn get_embedding_for_object(conn: &Connection, object_id: i64) -> Result<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT e.vector FROM embedding e
             JOIN object o ON o.content_hash = e.content_hash
             WHERE o.id = ?1",
            params![object_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(blob.map(|b| blob_to_vector(&b)))
}

/// Distinct `content_hash -> vector` pairs among `hashes` (the durable
/// layer `EmbeddingStore::get_embeddings` reads from).
pub fn embeddings_by_content_hash(
    conn: &Connection,
    hashes: &[String],
) -> Result<Vec<(String, Vec<f32>)>> {
    if hashes.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = hashes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("SELECT content_hash, vector FROM embedding WHERE content_hash IN ({placeholders})");
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> =
        hashes.iter().map(|h| h as &dyn rusqlite::ToSql).collect();
    let rows = stmt.query_map(params.as_slice(), |row| {
        let hash: String = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        Ok((hash, blob))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (hash, blob) = row?;
        out.push((hash, blob_to_vector(&blob)));
    }
    Ok(out)
}

/// Delete embedding rows with no referencing object (spec §4.5 "Embedding
/// GC"), returning the deleted content hashes so the caller can tombstone
/// their ANN entries too. Run after a revision's object rows settle.
pub fn gc_embeddings(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT content_hash FROM embedding
         WHERE content_hash NOT IN (SELECT DISTINCT content_hash FROM object)",
    )?;
    let orphans: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if !orphans.is_empty() {
        conn.execute(
            "DELETE FROM embedding WHERE content_hash NOT IN (SELECT DISTINCT content_hash FROM object)",
            [],
        )?;
    }
    Ok(orphans)
}

/// All `(content_hash, vector)` pairs, for the ANN-from-catalog rebuild
/// path (`crate::doctor`).
pub fn all_embeddings(conn: &Connection) -> Result<Vec<(String, Vec<f32>)>> {
    let mut stmt = conn.prepare("SELECT content_hash, vector FROM embedding")?;
    let rows = stmt.query_map([], |row| {
        let hash: String = row.get(0)?;
        let blob: Vec<u8> = row.get(1)?;
        Ok((hash, blob))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (hash, blob) = row?;
        out.push((hash, blob_to_vector(&blob)));
    }
    Ok(out)
}

pub fn all_objects(conn: &Connection) -> Result<Vec<ObjectRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, path, name, language, kind, byte_start, byte_end,
                start_line, start_col, end_line, end_col, context_before, context_after, content_hash
         FROM object",
    )?;
    let rows = stmt.query_map([], map_object_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
