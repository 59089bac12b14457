// crates/memoir-server/src/db/search.rs
// FTS5-backed ranked search over memories and chunks
//
// User text is never interpolated into a MATCH expression directly; it is
// re-tokenized by compile_match_query() first, which leaves no operator
// characters behind.

use crate::db::chunks::parse_chunk_row;
use crate::db::memory::parse_memory_row;
use crate::error::Result;
use memoir_types::{Chunk, Memory, MemoryType};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, params};

/// Words FTS5 treats as query operators.
const RESERVED_WORDS: [&str; 4] = ["AND", "OR", "NOT", "NEAR"];

#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
static WORD_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Compile free text into a safe FTS5 match expression.
///
/// Extracts maximal word-character runs, drops runs shorter than 2
/// characters and reserved operator words, quotes each survivor, and joins
/// with OR. Returns None when nothing survives; the caller must then
/// return an empty result set without executing a query.
pub fn compile_match_query(input: &str) -> Option<String> {
    let terms: Vec<String> = WORD_RUN_RE
        .find_iter(input)
        .map(|m| m.as_str())
        .filter(|run| run.len() >= 2)
        .filter(|run| !RESERVED_WORDS.iter().any(|word| word.eq_ignore_ascii_case(run)))
        .map(|run| format!("\"{run}\""))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Ranked memory search. `match_expr` must come from compile_match_query.
///
/// Rank is bm25(), where lower is more relevant; rows come back
/// rank-ascending.
pub fn search_memories_sync(
    conn: &Connection,
    match_expr: &str,
    memory_type: Option<MemoryType>,
    limit: usize,
) -> Result<Vec<(Memory, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.content, m.type, m.tags, m.source, m.created_at, m.updated_at,
                bm25(memories_fts) AS rank
         FROM memories_fts f
         JOIN memories m ON m.rowid = f.rowid
         WHERE memories_fts MATCH ?1 AND (?2 IS NULL OR m.type = ?2)
         ORDER BY rank ASC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(
        params![match_expr, memory_type.map(|t| t.as_str()), limit as i64],
        |row| Ok((parse_memory_row(row)?, row.get::<_, f64>(7)?)),
    )?;

    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Ranked chunk search with optional session and minimum-depth filters.
pub fn search_chunks_sync(
    conn: &Connection,
    match_expr: &str,
    session_id: Option<&str>,
    min_depth: Option<i64>,
    limit: usize,
) -> Result<Vec<(Chunk, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.session_id, c.parent_id, c.depth, c.child_refs, c.content,
                c.summary, c.status, c.created_at, c.finalized_at, c.compacted_at,
                bm25(chunks_fts) AS rank
         FROM chunks_fts f
         JOIN chunks c ON c.rowid = f.rowid
         WHERE chunks_fts MATCH ?1
           AND (?2 IS NULL OR c.session_id = ?2)
           AND (?3 IS NULL OR c.depth >= ?3)
         ORDER BY rank ASC
         LIMIT ?4",
    )?;

    let rows = stmt.query_map(
        params![match_expr, session_id, min_depth, limit as i64],
        |row| Ok((parse_chunk_row(row)?, row.get::<_, f64>(11)?)),
    )?;

    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Memories of one type, newest first (no FTS involved).
pub fn memories_by_type_sync(
    conn: &Connection,
    memory_type: MemoryType,
    limit: usize,
) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT id, content, type, tags, source, created_at, updated_at
         FROM memories
         WHERE type = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(params![memory_type.as_str(), limit as i64], parse_memory_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Most recent memories regardless of type.
pub fn recent_memories_sync(conn: &Connection, limit: usize) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT id, content, type, tags, source, created_at, updated_at
         FROM memories
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map([limit as i64], parse_memory_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}
