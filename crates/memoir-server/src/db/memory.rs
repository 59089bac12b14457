// crates/memoir-server/src/db/memory.rs
// Memory row storage and retrieval operations
//
// Sync functions taking &Connection, for use through DatabasePool::run().

use crate::error::{MemoirError, Result};
use crate::id::mint_memory_id;
use memoir_types::{Memory, MemorySource, MemoryType};
use rusqlite::{Connection, OptionalExtension, params};

const MEMORY_COLUMNS: &str = "id, content, type, tags, source, created_at, updated_at";

/// Input for creating a memory.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub memory_type: MemoryType,
    pub tags: Option<Vec<String>>,
    /// Defaults to `user` when absent.
    pub source: Option<MemorySource>,
}

/// Fields to change on an existing memory. Untouched fields stay as-is;
/// an all-`None` patch is a no-op that returns the existing row.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub tags: Option<Vec<String>>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.memory_type.is_none() && self.tags.is_none()
    }
}

/// Listing filters; defaults to the first 100 rows, newest first.
#[derive(Debug, Clone)]
pub struct MemoryListOptions {
    pub limit: usize,
    pub offset: usize,
    pub memory_type: Option<MemoryType>,
}

impl Default for MemoryListOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            memory_type: None,
        }
    }
}

fn column_error(
    index: usize,
    message: String,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

/// Parse a Memory from a row selected with MEMORY_COLUMNS order:
/// (id, content, type, tags, source, created_at, updated_at)
pub fn parse_memory_row(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let type_str: String = row.get(2)?;
    let memory_type = MemoryType::parse(&type_str)
        .ok_or_else(|| column_error(2, format!("unknown memory type: {type_str}")))?;

    let tags: Option<String> = row.get(3)?;
    let tags = tags
        .map(|raw| {
            serde_json::from_str::<Vec<String>>(&raw)
                .map_err(|e| column_error(3, format!("malformed tags JSON: {e}")))
        })
        .transpose()?;

    let source: Option<String> = row.get(4)?;
    let source = source
        .as_deref()
        .and_then(MemorySource::parse)
        .unwrap_or_default();

    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        memory_type,
        tags,
        source,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Insert a new memory and return the stored row.
pub fn create_memory_sync(conn: &Connection, new: NewMemory) -> Result<Memory> {
    if new.content.trim().is_empty() {
        return Err(MemoirError::InvalidInput(
            "memory content must not be empty".to_string(),
        ));
    }

    let id = mint_memory_id();
    let tags_json = new.tags.map(|t| serde_json::to_string(&t)).transpose()?;
    let source = new.source.unwrap_or_default();

    conn.execute(
        "INSERT INTO memories (id, content, type, tags, source, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, unixepoch())",
        params![id, new.content, new.memory_type.as_str(), tags_json, source.as_str()],
    )?;

    get_memory_sync(conn, &id)?
        .ok_or_else(|| MemoirError::Other(format!("memory {id} vanished after insert")))
}

/// Fetch a memory by id; None when absent.
pub fn get_memory_sync(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    conn.query_row(
        &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1"),
        [id],
        parse_memory_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Apply a partial update and return the new row.
///
/// Returns None when the row is missing. Any real change also stamps
/// `updated_at`; an empty patch leaves the row untouched.
pub fn update_memory_sync(
    conn: &Connection,
    id: &str,
    patch: MemoryPatch,
) -> Result<Option<Memory>> {
    let Some(existing) = get_memory_sync(conn, id)? else {
        return Ok(None);
    };
    if patch.is_empty() {
        return Ok(Some(existing));
    }

    let mut assignments: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(content) = patch.content {
        if content.trim().is_empty() {
            return Err(MemoirError::InvalidInput(
                "memory content must not be empty".to_string(),
            ));
        }
        assignments.push("content = ?");
        values.push(Box::new(content));
    }
    if let Some(memory_type) = patch.memory_type {
        assignments.push("type = ?");
        values.push(Box::new(memory_type.as_str().to_string()));
    }
    if let Some(tags) = patch.tags {
        assignments.push("tags = ?");
        values.push(Box::new(serde_json::to_string(&tags)?));
    }
    assignments.push("updated_at = unixepoch()");
    values.push(Box::new(id.to_string()));

    let sql = format!(
        "UPDATE memories SET {} WHERE id = ?",
        assignments.join(", ")
    );
    conn.execute(&sql, rusqlite::params_from_iter(values))?;

    get_memory_sync(conn, id)
}

/// Delete a memory by id. False when nothing matched.
pub fn delete_memory_sync(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM memories WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

/// List memories, newest first (rowid disambiguates same-second inserts).
pub fn list_memories_sync(conn: &Connection, opts: MemoryListOptions) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEMORY_COLUMNS} FROM memories
         WHERE (?1 IS NULL OR type = ?1)
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2 OFFSET ?3"
    ))?;

    let rows = stmt.query_map(
        params![
            opts.memory_type.map(|t| t.as_str()),
            opts.limit as i64,
            opts.offset as i64
        ],
        parse_memory_row,
    )?;

    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Count memories, optionally by type.
pub fn count_memories_sync(conn: &Connection, memory_type: Option<MemoryType>) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM memories WHERE (?1 IS NULL OR type = ?1)",
        params![memory_type.map(|t| t.as_str())],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::open_test_conn;

    fn fixture(content: &str, memory_type: MemoryType) -> NewMemory {
        NewMemory {
            content: content.to_string(),
            memory_type,
            tags: None,
            source: None,
        }
    }

    #[test]
    fn test_create_returns_full_row() {
        let conn = open_test_conn();
        let memory = create_memory_sync(
            &conn,
            NewMemory {
                content: "Always use strict mode".to_string(),
                memory_type: MemoryType::Preference,
                tags: Some(vec!["typescript".to_string(), "style".to_string()]),
                source: None,
            },
        )
        .unwrap();

        assert!(memory.id.starts_with("mem_"));
        assert_eq!(memory.id.len(), 4 + 12);
        assert_eq!(memory.content, "Always use strict mode");
        assert_eq!(memory.memory_type, MemoryType::Preference);
        assert_eq!(
            memory.tags,
            Some(vec!["typescript".to_string(), "style".to_string()])
        );
        assert_eq!(memory.source, MemorySource::User);
        assert!(memory.created_at > 0);
        assert_eq!(memory.updated_at, None);
    }

    #[test]
    fn test_create_rejects_blank_content() {
        let conn = open_test_conn();
        let result = create_memory_sync(&conn, fixture("   ", MemoryType::Fact));
        assert!(matches!(result, Err(MemoirError::InvalidInput(_))));
    }

    #[test]
    fn test_get_round_trip() {
        let conn = open_test_conn();
        let created = create_memory_sync(&conn, fixture("a fact", MemoryType::Fact)).unwrap();
        let fetched = get_memory_sync(&conn, &created.id).unwrap().unwrap();
        assert_eq!(created, fetched);
    }

    #[test]
    fn test_get_missing_is_none() {
        let conn = open_test_conn();
        assert!(get_memory_sync(&conn, "mem_000000000000").unwrap().is_none());
    }

    #[test]
    fn test_update_stamps_updated_at() {
        let conn = open_test_conn();
        let created =
            create_memory_sync(&conn, fixture("Always use strict mode", MemoryType::Preference))
                .unwrap();
        assert_eq!(created.updated_at, None);

        let updated = update_memory_sync(
            &conn,
            &created.id,
            MemoryPatch {
                content: Some("Use strict mode".to_string()),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();

        assert_eq!(updated.content, "Use strict mode");
        let updated_at = updated.updated_at.expect("updated_at set");
        assert!(updated_at >= created.created_at);
    }

    #[test]
    fn test_update_only_touches_given_fields() {
        let conn = open_test_conn();
        let created = create_memory_sync(
            &conn,
            NewMemory {
                content: "original".to_string(),
                memory_type: MemoryType::Gotcha,
                tags: Some(vec!["keep".to_string()]),
                source: Some(MemorySource::Auto),
            },
        )
        .unwrap();

        let updated = update_memory_sync(
            &conn,
            &created.id,
            MemoryPatch {
                memory_type: Some(MemoryType::Learned),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();

        assert_eq!(updated.memory_type, MemoryType::Learned);
        assert_eq!(updated.content, "original");
        assert_eq!(updated.tags, Some(vec!["keep".to_string()]));
        assert_eq!(updated.source, MemorySource::Auto);
    }

    #[test]
    fn test_empty_patch_is_noop() {
        let conn = open_test_conn();
        let created = create_memory_sync(&conn, fixture("x", MemoryType::Fact)).unwrap();
        let result = update_memory_sync(&conn, &created.id, MemoryPatch::default())
            .unwrap()
            .unwrap();
        assert_eq!(result, created);
        assert_eq!(result.updated_at, None);
    }

    #[test]
    fn test_update_missing_is_none() {
        let conn = open_test_conn();
        let result = update_memory_sync(
            &conn,
            "mem_000000000000",
            MemoryPatch {
                content: Some("x".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_delete_twice() {
        let conn = open_test_conn();
        let created = create_memory_sync(&conn, fixture("x", MemoryType::Fact)).unwrap();
        assert!(delete_memory_sync(&conn, &created.id).unwrap());
        assert!(get_memory_sync(&conn, &created.id).unwrap().is_none());
        assert!(!delete_memory_sync(&conn, &created.id).unwrap());
    }

    #[test]
    fn test_list_orders_newest_first() {
        let conn = open_test_conn();
        let first = create_memory_sync(&conn, fixture("first", MemoryType::Fact)).unwrap();
        let second = create_memory_sync(&conn, fixture("second", MemoryType::Fact)).unwrap();
        let third = create_memory_sync(&conn, fixture("third", MemoryType::Fact)).unwrap();

        // Same-second inserts fall back to rowid ordering
        let listed = list_memories_sync(&conn, MemoryListOptions::default()).unwrap();
        let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![&third.id[..], &second.id[..], &first.id[..]]);
    }

    #[test]
    fn test_list_filters_by_type() {
        let conn = open_test_conn();
        create_memory_sync(&conn, fixture("a", MemoryType::Fact)).unwrap();
        create_memory_sync(&conn, fixture("b", MemoryType::Gotcha)).unwrap();
        create_memory_sync(&conn, fixture("c", MemoryType::Gotcha)).unwrap();

        let gotchas = list_memories_sync(
            &conn,
            MemoryListOptions {
                memory_type: Some(MemoryType::Gotcha),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(gotchas.len(), 2);
        assert!(gotchas.iter().all(|m| m.memory_type == MemoryType::Gotcha));
    }

    #[test]
    fn test_list_limit_and_offset() {
        let conn = open_test_conn();
        for i in 0..5 {
            create_memory_sync(&conn, fixture(&format!("m{i}"), MemoryType::Fact)).unwrap();
        }

        let page = list_memories_sync(
            &conn,
            MemoryListOptions {
                limit: 2,
                offset: 1,
                memory_type: None,
            },
        )
        .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].content, "m3");
        assert_eq!(page[1].content, "m2");
    }

    #[test]
    fn test_count() {
        let conn = open_test_conn();
        create_memory_sync(&conn, fixture("a", MemoryType::Fact)).unwrap();
        create_memory_sync(&conn, fixture("b", MemoryType::Pattern)).unwrap();

        assert_eq!(count_memories_sync(&conn, None).unwrap(), 2);
        assert_eq!(
            count_memories_sync(&conn, Some(MemoryType::Pattern)).unwrap(),
            1
        );
        assert_eq!(
            count_memories_sync(&conn, Some(MemoryType::Gotcha)).unwrap(),
            0
        );
    }

    #[test]
    fn test_type_check_constraint_surfaces() {
        let conn = open_test_conn();
        // The typed API cannot produce this; exercise the CHECK directly.
        let result = conn.execute(
            "INSERT INTO memories (id, content, type) VALUES ('mem_bad000000000', 'x', 'bogus')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tags_round_trip_preserves_order() {
        let conn = open_test_conn();
        let tags = vec!["z".to_string(), "a".to_string(), "m".to_string()];
        let created = create_memory_sync(
            &conn,
            NewMemory {
                content: "ordered".to_string(),
                memory_type: MemoryType::Fact,
                tags: Some(tags.clone()),
                source: None,
            },
        )
        .unwrap();
        let fetched = get_memory_sync(&conn, &created.id).unwrap().unwrap();
        assert_eq!(fetched.tags, Some(tags));
    }
}
