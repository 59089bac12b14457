// crates/memoir-server/src/db/tree.rs
// Chunk tree traversal and atomic compaction
//
// Traversal stays in recursive CTEs at the database layer rather than
// materializing intermediate lists in application code.

use crate::db::chunks::{CHUNK_COLUMNS, get_chunk_sync, parse_chunk_row};
use crate::error::{MemoirError, Result};
use crate::id::mint_chunk_id;
use memoir_types::{Chunk, ChunkContent, CompactResult};
use rusqlite::{Connection, params};

/// A chunk tagged with its distance from the traversal start.
#[derive(Debug, Clone, PartialEq)]
pub struct LeveledChunk {
    pub chunk: Chunk,
    /// 0 at the start chunk; increases toward the root for ancestors and
    /// with depth for descendants.
    pub level: i64,
}

fn qualified_columns(alias: &str) -> String {
    CHUNK_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_leveled_row(row: &rusqlite::Row) -> rusqlite::Result<LeveledChunk> {
    Ok(LeveledChunk {
        chunk: parse_chunk_row(row)?,
        level: row.get(11)?,
    })
}

/// Ascend from a chunk through parent links, returned root-first.
///
/// The start chunk is included at level 0; levels increase toward the
/// root. A missing start id yields an empty sequence.
pub fn chunk_ancestors_sync(conn: &Connection, id: &str) -> Result<Vec<LeveledChunk>> {
    let sql = format!(
        "WITH RECURSIVE ancestors AS (
            SELECT {cols}, 0 AS level FROM chunks WHERE id = ?1
            UNION ALL
            SELECT {parent_cols}, a.level + 1
            FROM chunks p JOIN ancestors a ON p.id = a.parent_id
        )
        SELECT {cols}, level FROM ancestors ORDER BY level DESC",
        cols = CHUNK_COLUMNS,
        parent_cols = qualified_columns("p"),
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([id], parse_leveled_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Descend from a chunk through child links, returned level-ascending.
///
/// The start chunk is included at level 0. A missing start id yields an
/// empty sequence.
pub fn chunk_descendants_sync(conn: &Connection, id: &str) -> Result<Vec<LeveledChunk>> {
    let sql = format!(
        "WITH RECURSIVE descendants AS (
            SELECT {cols}, 0 AS level FROM chunks WHERE id = ?1
            UNION ALL
            SELECT {child_cols}, d.level + 1
            FROM chunks c JOIN descendants d ON c.parent_id = d.id
        )
        SELECT {cols}, level FROM descendants ORDER BY level ASC, created_at ASC",
        cols = CHUNK_COLUMNS,
        child_cols = qualified_columns("c"),
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([id], parse_leveled_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// The root-to-target path of a chunk, with levels stripped.
pub fn chunk_path_sync(conn: &Connection, id: &str) -> Result<Vec<Chunk>> {
    Ok(chunk_ancestors_sync(conn, id)?
        .into_iter()
        .map(|leveled| leveled.chunk)
        .collect())
}

/// Atomically bind a set of active chunks under a new summary chunk.
///
/// All-or-nothing: every id must resolve before anything is written, and
/// the summary insert plus the children's status flip commit in one
/// transaction. The summary's depth is one greater than the deepest child;
/// its child_refs preserve the argument order.
pub fn compact_chunks_sync(
    conn: &Connection,
    session_id: &str,
    chunk_ids: &[String],
    summary: &str,
) -> Result<CompactResult> {
    if chunk_ids.is_empty() {
        return Err(MemoirError::EmptyCompaction);
    }

    let mut children = Vec::with_capacity(chunk_ids.len());
    let mut missing = Vec::new();
    for id in chunk_ids {
        match get_chunk_sync(conn, id)? {
            Some(chunk) => children.push(chunk),
            None => missing.push(id.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(MemoirError::MissingChunks(missing));
    }

    let summary_depth = children.iter().map(|c| c.depth).max().unwrap_or(0) + 1;
    let summary_id = mint_chunk_id();
    let child_refs_json = serde_json::to_string(chunk_ids)?;
    let empty_content = serde_json::to_string(&ChunkContent::default())?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO chunks (id, session_id, parent_id, depth, child_refs, content, summary, status, created_at)
         VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, 'active', unixepoch())",
        params![summary_id, session_id, summary_depth, child_refs_json, empty_content, summary],
    )?;
    for id in chunk_ids {
        tx.execute(
            "UPDATE chunks SET parent_id = ?1, status = 'compacted', compacted_at = unixepoch()
             WHERE id = ?2",
            params![summary_id, id],
        )?;
    }
    tx.commit()?;

    let summary_chunk = get_chunk_sync(conn, &summary_id)?
        .ok_or_else(|| MemoirError::Other(format!("summary chunk {summary_id} vanished")))?;
    let mut reloaded = Vec::with_capacity(chunk_ids.len());
    for id in chunk_ids {
        reloaded.push(
            get_chunk_sync(conn, id)?
                .ok_or_else(|| MemoirError::Other(format!("compacted chunk {id} vanished")))?,
        );
    }

    Ok(CompactResult {
        summary: summary_chunk,
        children: reloaded,
    })
}
