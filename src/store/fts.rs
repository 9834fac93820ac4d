//! The `object_fts` contentless FTS5 index (spec §4.5 item 2).
//!
//! `content=''` means FTS5 stores only the trigram postings, not the
//! original text — `rowid` is pinned to `object.id` via explicit inserts so
//! a lexical hit maps straight back to its catalog row.

use rusqlite::{params, Connection};

use crate::error::Result;

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS object_fts USING fts5(
            path, name, body,
            content='',
            tokenize='trigram'
        );",
    )?;
    Ok(())
}

pub fn insert(conn: &Connection, object_id: i64, path: &str, name: &str, body: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO object_fts(rowid, path, name, body) VALUES (?1, ?2, ?3, ?4)",
        params![object_id, path, name, body],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, object_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO object_fts(object_fts, rowid, path, name, body) VALUES ('delete', ?1, '', '', '')",
        params![object_id],
    )?;
    Ok(())
}

/// Top candidates by FTS5's built-in `bm25()` ranking (lower is better;
/// negated so callers can treat higher-is-better like the ANN side).
pub fn search(conn: &Connection, query: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT rowid, bm25(object_fts) FROM object_fts WHERE object_fts MATCH ?1
         ORDER BY bm25(object_fts) LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![query, limit as i64], |row| {
        let rowid: i64 = row.get(0)?;
        let bm25: f64 = row.get(1)?;
        Ok((rowid, -bm25))
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
