// crates/memoir-server/src/db/chunks.rs
// Chunk row storage and retrieval operations

use crate::error::{MemoirError, Result};
use crate::id::mint_chunk_id;
use memoir_types::{Chunk, ChunkContent, ChunkStatus};
use rusqlite::{Connection, OptionalExtension, params};

pub(crate) const CHUNK_COLUMNS: &str = "id, session_id, parent_id, depth, child_refs, content, \
     summary, status, created_at, finalized_at, compacted_at";

/// Input for creating a chunk. Status starts as `active`; the finalized,
/// compacted, child_refs, and embedding columns start null.
#[derive(Debug, Clone)]
pub struct NewChunk<'a> {
    pub session_id: &'a str,
    pub content: &'a ChunkContent,
    pub parent_id: Option<&'a str>,
    pub depth: i64,
    pub summary: Option<&'a str>,
}

impl<'a> NewChunk<'a> {
    /// A depth-0 leaf with no parent or summary.
    pub fn leaf(session_id: &'a str, content: &'a ChunkContent) -> Self {
        Self {
            session_id,
            content,
            parent_id: None,
            depth: 0,
            summary: None,
        }
    }
}

/// Fields to change on an existing chunk. An all-`None` patch is a no-op
/// that returns the existing row.
#[derive(Debug, Clone, Default)]
pub struct ChunkPatch {
    pub content: Option<ChunkContent>,
    pub summary: Option<String>,
    pub status: Option<ChunkStatus>,
    pub child_refs: Option<Vec<String>>,
    pub finalized_at: Option<i64>,
    pub compacted_at: Option<i64>,
}

impl ChunkPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.summary.is_none()
            && self.status.is_none()
            && self.child_refs.is_none()
            && self.finalized_at.is_none()
            && self.compacted_at.is_none()
    }
}

fn column_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, message.into())
}

/// Parse a Chunk from a row selected with CHUNK_COLUMNS order:
/// (id, session_id, parent_id, depth, child_refs, content, summary, status,
///  created_at, finalized_at, compacted_at)
pub fn parse_chunk_row(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let child_refs: Option<String> = row.get(4)?;
    let child_refs = child_refs
        .map(|raw| {
            serde_json::from_str::<Vec<String>>(&raw)
                .map_err(|e| column_error(4, format!("malformed child_refs JSON: {e}")))
        })
        .transpose()?;

    let content_raw: String = row.get(5)?;
    let content = serde_json::from_str::<ChunkContent>(&content_raw)
        .map_err(|e| column_error(5, format!("malformed content JSON: {e}")))?;

    let status_str: String = row.get(7)?;
    let status = ChunkStatus::parse(&status_str)
        .ok_or_else(|| column_error(7, format!("unknown chunk status: {status_str}")))?;

    Ok(Chunk {
        id: row.get(0)?,
        session_id: row.get(1)?,
        parent_id: row.get(2)?,
        depth: row.get(3)?,
        child_refs,
        content,
        summary: row.get(6)?,
        status,
        created_at: row.get(8)?,
        finalized_at: row.get(9)?,
        compacted_at: row.get(10)?,
    })
}

/// Insert a new chunk and return the stored row.
pub fn create_chunk_sync(conn: &Connection, new: NewChunk) -> Result<Chunk> {
    let id = mint_chunk_id();
    let content_json = serde_json::to_string(new.content)?;

    conn.execute(
        "INSERT INTO chunks (id, session_id, parent_id, depth, content, summary, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', unixepoch())",
        params![
            id,
            new.session_id,
            new.parent_id,
            new.depth,
            content_json,
            new.summary
        ],
    )?;

    get_chunk_sync(conn, &id)?
        .ok_or_else(|| MemoirError::Other(format!("chunk {id} vanished after insert")))
}

/// Fetch a chunk by id; None when absent.
pub fn get_chunk_sync(conn: &Connection, id: &str) -> Result<Option<Chunk>> {
    conn.query_row(
        &format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?1"),
        [id],
        parse_chunk_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Apply a partial update and return the new row; None when missing.
pub fn update_chunk_sync(conn: &Connection, id: &str, patch: ChunkPatch) -> Result<Option<Chunk>> {
    let Some(existing) = get_chunk_sync(conn, id)? else {
        return Ok(None);
    };
    if patch.is_empty() {
        return Ok(Some(existing));
    }

    let mut assignments: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(content) = patch.content {
        assignments.push("content = ?");
        values.push(Box::new(serde_json::to_string(&content)?));
    }
    if let Some(summary) = patch.summary {
        assignments.push("summary = ?");
        values.push(Box::new(summary));
    }
    if let Some(status) = patch.status {
        assignments.push("status = ?");
        values.push(Box::new(status.as_str().to_string()));
    }
    if let Some(child_refs) = patch.child_refs {
        assignments.push("child_refs = ?");
        values.push(Box::new(serde_json::to_string(&child_refs)?));
    }
    if let Some(finalized_at) = patch.finalized_at {
        assignments.push("finalized_at = ?");
        values.push(Box::new(finalized_at));
    }
    if let Some(compacted_at) = patch.compacted_at {
        assignments.push("compacted_at = ?");
        values.push(Box::new(compacted_at));
    }
    values.push(Box::new(id.to_string()));

    let sql = format!("UPDATE chunks SET {} WHERE id = ?", assignments.join(", "));
    conn.execute(&sql, rusqlite::params_from_iter(values))?;

    get_chunk_sync(conn, id)
}

/// Delete a chunk by id. False when nothing matched. Children referencing
/// it get their parent_id nulled by the FK action.
pub fn delete_chunk_sync(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM chunks WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

/// Chunks of a session in chronological order, optionally by status.
pub fn get_session_chunks_sync(
    conn: &Connection,
    session_id: &str,
    status: Option<ChunkStatus>,
) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunks
         WHERE session_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at ASC, rowid ASC"
    ))?;

    let rows = stmt.query_map(
        params![session_id, status.map(|s| s.as_str())],
        parse_chunk_row,
    )?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Active chunks of a session in chronological order.
pub fn get_active_chunks_sync(conn: &Connection, session_id: &str) -> Result<Vec<Chunk>> {
    get_session_chunks_sync(conn, session_id, Some(ChunkStatus::Active))
}

/// Direct children of a chunk in chronological order.
pub fn get_child_chunks_sync(conn: &Connection, parent_id: &str) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunks
         WHERE parent_id = ?1
         ORDER BY created_at ASC, rowid ASC"
    ))?;

    let rows = stmt.query_map([parent_id], parse_chunk_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Count chunks, optionally for one session.
pub fn count_chunks_sync(conn: &Connection, session_id: Option<&str>) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM chunks WHERE (?1 IS NULL OR session_id = ?1)",
        params![session_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Most recent compaction summaries across all sessions.
pub fn recent_summaries_sync(conn: &Connection, limit: usize) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CHUNK_COLUMNS} FROM chunks
         WHERE depth > 0 AND summary IS NOT NULL
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?1"
    ))?;

    let rows = stmt.query_map([limit as i64], parse_chunk_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Delete every chunk of a session; returns the number removed.
pub fn delete_session_chunks_sync(conn: &Connection, session_id: &str) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM chunks WHERE session_id = ?1", [session_id])?;
    Ok(deleted)
}
