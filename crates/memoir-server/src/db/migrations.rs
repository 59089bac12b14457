// crates/memoir-server/src/db/migrations.rs
// Versioned, checksummed schema migrations per subsystem
//
// Migrations are embedded at compile time via include_str! and applied in
// version order, each inside its own transaction — a failure rolls back
// that step and leaves the subsystem at the previous version. The
// per-subsystem tracking table records (version, filename, applied_at,
// checksum); validate() detects drift between applied rows and the
// embedded files.

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// The two logical schemas. Both may share one physical database file;
/// their tracking tables keep the applied sets disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Memory,
    History,
}

impl Subsystem {
    pub const ALL: [Subsystem; 2] = [Subsystem::Memory, Subsystem::History];

    pub fn name(&self) -> &'static str {
        match self {
            Subsystem::Memory => "memory",
            Subsystem::History => "history",
        }
    }

    pub fn tracking_table(&self) -> &'static str {
        match self {
            Subsystem::Memory => "x_memory_migrations",
            Subsystem::History => "x_history_migrations",
        }
    }

    fn embedded(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Subsystem::Memory => MEMORY_MIGRATIONS,
            Subsystem::History => HISTORY_MIGRATIONS,
        }
    }
}

const MEMORY_MIGRATIONS: &[(&str, &str)] = &[(
    "0001_create_memories.sql",
    include_str!("migrations/memory/0001_create_memories.sql"),
)];

const HISTORY_MIGRATIONS: &[(&str, &str)] = &[(
    "0001_create_chunks.sql",
    include_str!("migrations/history/0001_create_chunks.sql"),
)];

/// Filename grammar: NNNN_snake_case_description.sql, NNNN >= 4 digits.
#[allow(clippy::unwrap_used)] // pattern is a compile-time constant
static FILENAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4,})_([a-z0-9]+(?:_[a-z0-9]+)*)\.sql$").unwrap());

/// A single embedded migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub filename: &'static str,
    /// Human-readable form of the filename's description words.
    pub description: String,
    pub sql: &'static str,
}

impl Migration {
    fn parse(filename: &'static str, sql: &'static str) -> Result<Self> {
        let captures = FILENAME_RE
            .captures(filename)
            .with_context(|| format!("invalid migration filename: {filename}"))?;
        let version: i64 = captures[1]
            .parse()
            .with_context(|| format!("invalid migration version in {filename}"))?;
        let description = captures[2].replace('_', " ");
        Ok(Migration {
            version,
            filename,
            description,
            sql,
        })
    }

    /// Content checksum of the embedded SQL, as lowercase hex.
    ///
    /// Detects accidental edits to already-applied files; collision
    /// resistance is not required.
    pub fn checksum(&self) -> String {
        checksum_hex(self.sql)
    }
}

fn checksum_hex(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// The embedded migrations of a subsystem, sorted by version.
///
/// Fails on malformed filenames or duplicate versions; the embedded set
/// is a compile-time constant, so this is fatal at startup.
pub fn migrations_for(subsystem: Subsystem) -> Result<Vec<Migration>> {
    let mut migrations = subsystem
        .embedded()
        .iter()
        .map(|(filename, sql)| Migration::parse(filename, sql))
        .collect::<Result<Vec<_>>>()?;
    migrations.sort_by_key(|m| m.version);
    for pair in migrations.windows(2) {
        if pair[0].version == pair[1].version {
            bail!(
                "duplicate migration version {} in {} subsystem",
                pair[0].version,
                subsystem.name()
            );
        }
    }
    Ok(migrations)
}

/// Check if a table exists in the database
pub fn table_exists(conn: &Connection, table_name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
        [table_name],
        |_| Ok(true),
    )
    .unwrap_or(false)
}

/// Highest applied version for a subsystem, or 0 when nothing has run
/// (including when the tracking table itself is absent).
pub fn current_version(conn: &Connection, subsystem: Subsystem) -> rusqlite::Result<i64> {
    if !table_exists(conn, subsystem.tracking_table()) {
        return Ok(0);
    }
    conn.query_row(
        &format!(
            "SELECT COALESCE(MAX(version), 0) FROM {}",
            subsystem.tracking_table()
        ),
        [],
        |row| row.get(0),
    )
}

fn ensure_tracking_table(conn: &Connection, subsystem: Subsystem) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            version INTEGER PRIMARY KEY,
            filename TEXT NOT NULL,
            applied_at INTEGER NOT NULL DEFAULT (unixepoch()),
            checksum TEXT NOT NULL
        );",
        subsystem.tracking_table()
    ))
}

/// Apply every embedded migration newer than the current version.
///
/// Each migration runs in its own transaction together with its tracking
/// row, so a failure aborts that step, leaves the subsystem at the
/// previous version, and skips the rest. Returns the number applied.
pub fn apply_pending(conn: &Connection, subsystem: Subsystem) -> Result<u32> {
    ensure_tracking_table(conn, subsystem)?;
    let current = current_version(conn, subsystem)?;
    let mut applied = 0;

    for migration in migrations_for(subsystem)? {
        if migration.version <= current {
            debug!(
                subsystem = subsystem.name(),
                version = migration.version,
                "migration already applied, skipping"
            );
            continue;
        }

        info!(
            subsystem = subsystem.name(),
            version = migration.version,
            description = %migration.description,
            "applying migration"
        );

        let tx = conn.unchecked_transaction().with_context(|| {
            format!(
                "failed to begin transaction for {} v{}",
                subsystem.name(),
                migration.version
            )
        })?;
        tx.execute_batch(migration.sql).with_context(|| {
            format!(
                "migration {} v{} ({}) failed",
                subsystem.name(),
                migration.version,
                migration.filename
            )
        })?;
        tx.execute(
            &format!(
                "INSERT INTO {} (version, filename, applied_at, checksum)
                 VALUES (?1, ?2, unixepoch(), ?3)",
                subsystem.tracking_table()
            ),
            rusqlite::params![migration.version, migration.filename, migration.checksum()],
        )
        .with_context(|| {
            format!(
                "failed to record {} v{}",
                subsystem.name(),
                migration.version
            )
        })?;
        tx.commit().with_context(|| {
            format!(
                "failed to commit {} v{}",
                subsystem.name(),
                migration.version
            )
        })?;

        applied += 1;
    }

    if applied > 0 {
        info!(subsystem = subsystem.name(), applied, "migrations complete");
    }

    Ok(applied)
}

/// A stored checksum that no longer matches the embedded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub version: i64,
    pub filename: String,
    /// Checksum of the embedded file as currently compiled in.
    pub expected: String,
    /// Checksum recorded when the migration was applied.
    pub stored: String,
}

/// Compare stored checksums of applied migrations against the embedded
/// files. The caller decides policy; applied versions with no embedded
/// counterpart are logged and skipped.
pub fn validate(conn: &Connection, subsystem: Subsystem) -> Result<Vec<ChecksumMismatch>> {
    if !table_exists(conn, subsystem.tracking_table()) {
        return Ok(Vec::new());
    }

    let embedded = migrations_for(subsystem)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT version, filename, checksum FROM {} ORDER BY version",
        subsystem.tracking_table()
    ))?;
    let applied: Vec<(i64, String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut mismatches = Vec::new();
    for (version, filename, stored) in applied {
        match embedded.iter().find(|m| m.version == version) {
            Some(migration) => {
                let expected = migration.checksum();
                if expected != stored {
                    mismatches.push(ChecksumMismatch {
                        version,
                        filename,
                        expected,
                        stored,
                    });
                }
            }
            None => {
                warn!(
                    subsystem = subsystem.name(),
                    version, "applied migration has no embedded counterpart"
                );
            }
        }
    }
    Ok(mismatches)
}
