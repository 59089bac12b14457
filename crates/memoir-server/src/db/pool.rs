// crates/memoir-server/src/db/pool.rs
// Async connection pool using deadpool-sqlite
//
// All row-level database code in this crate is synchronous and takes a
// `&rusqlite::Connection`; services reach it through `interact()` (anyhow
// boundary) or `run()` (MemoirError boundary), which execute the closure
// on a blocking thread so the async runtime is never stalled. Writes
// serialize through SQLite itself: WAL journaling plus a busy timeout on
// every pooled connection.

use crate::db::migrations::{self, Subsystem};
use crate::error::MemoirError;
use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Registers the sqlite-vec extension globally (once per process).
/// Must be called before any SQLite connections are opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
pub(crate) fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init has the signature expected by
        // sqlite3_auto_extension; the transmute converts the fn pointer to
        // the Option<extern "C" fn()> it accepts. The pointer targets a
        // statically-linked symbol, so it stays valid for the process
        // lifetime. This is the standard registration pattern for SQLite
        // extensions through the Rust FFI.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Which subsystems to migrate when opening a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationScope {
    All,
    Memory,
    History,
    None,
}

impl MigrationScope {
    pub fn subsystems(&self) -> &'static [Subsystem] {
        match self {
            MigrationScope::All => &Subsystem::ALL,
            MigrationScope::Memory => &[Subsystem::Memory],
            MigrationScope::History => &[Subsystem::History],
            MigrationScope::None => &[],
        }
    }
}

/// Whether to use a file path or a shared in-memory URI.
enum DbStorage {
    File(PathBuf),
    InMemory,
}

/// Database pool wrapper with per-connection setup and subsystem migrations.
#[derive(Debug)]
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
    /// URI for in-memory databases (used to share state in tests)
    memory_uri: Option<String>,
}

impl DatabasePool {
    /// Open a pooled database at the given path and migrate the requested
    /// subsystems.
    pub async fn open(path: &Path, scope: MigrationScope) -> Result<Self> {
        Self::open_internal(DbStorage::File(path.to_path_buf()), scope).await
    }

    /// Open a pooled in-memory database with both subsystems migrated.
    ///
    /// Uses a shared-cache URI so every pooled connection sees the same
    /// in-memory database - without it each connection would get its own.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_internal(DbStorage::InMemory, MigrationScope::All).await
    }

    async fn open_internal(storage: DbStorage, scope: MigrationScope) -> Result<Self> {
        ensure_sqlite_vec_registered();

        let (conn_str, path, memory_uri, hook) = match storage {
            DbStorage::File(p) => {
                ensure_parent_directory(&p)?;
                let s = p.to_string_lossy().into_owned();
                let hook = make_file_post_create_hook(p.clone());
                (s, Some(p), None, hook)
            }
            DbStorage::InMemory => {
                let uri = format!("file:memdb_{:?}?mode=memory&cache=shared", uuid::Uuid::new_v4());
                let hook = make_memory_post_create_hook();
                (uri.clone(), None, Some(uri), hook)
            }
        };

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("Failed to create pool builder")?
            .max_size(8)
            .post_create(hook)
            .build()
            .context("Failed to build connection pool")?;

        let db_pool = Self {
            pool,
            path,
            memory_uri,
        };

        db_pool.initialize(scope).await?;

        Ok(db_pool)
    }

    /// Probe the vector extension, run migrations for the scope, and warn
    /// on checksum drift of already-applied migrations.
    async fn initialize(&self, scope: MigrationScope) -> Result<()> {
        self.interact(move |conn| {
            // Best-effort: vector search is reserved, so a missing
            // extension only costs the embedding columns their backing.
            match conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0)) {
                Ok(version) => tracing::debug!("sqlite-vec available: {version}"),
                Err(e) => tracing::warn!("vector extension unavailable, continuing without: {e}"),
            }

            for subsystem in scope.subsystems() {
                for mismatch in migrations::validate(conn, *subsystem)? {
                    tracing::warn!(
                        subsystem = subsystem.name(),
                        version = mismatch.version,
                        filename = %mismatch.filename,
                        "applied migration checksum diverges from embedded file"
                    );
                }
                migrations::apply_pending(conn, *subsystem)?;
            }

            if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                tracing::debug!("PRAGMA optimize skipped: {}", e);
            }
            Ok(())
        })
        .await
    }

    /// Get the memory URI (for sharing state in tests)
    pub fn memory_uri(&self) -> Option<&str> {
        self.memory_uri.as_deref()
    }

    /// Get the database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure with a connection from the pool.
    ///
    /// The closure runs on a blocking thread pool, so it won't block the
    /// async runtime.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Run a closure on a pooled connection, logging errors at debug but not
    /// propagating. Use for low-priority best-effort operations.
    pub async fn try_interact<F, R>(&self, label: &str, f: F) -> Option<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let label = label.to_string();
        match self.interact(move |conn| f(conn)).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("{}: {}", label, e);
                None
            }
        }
    }

    /// Run a closure and surface failures as `MemoirError`.
    ///
    /// This is the preferred method for service and adapter code; it
    /// handles the error conversion boilerplate in one place.
    pub async fn run<F, R, E>(&self, f: F) -> Result<R, MemoirError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<MemoirError> + Send + 'static,
    {
        self.pool
            .get()
            .await
            .map_err(|e| MemoirError::Other(format!("Failed to get connection: {}", e)))?
            .interact(move |conn| f(conn).map_err(Into::into))
            .await
            .map_err(|e| MemoirError::Other(format!("Database error: {}", e)))?
    }
}

/// Ensure parent directory exists with secure permissions (0o700 on Unix).
fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            let mut perms = std::fs::metadata(parent)?.permissions();
            perms.set_mode(0o700); // rwx------
            std::fs::set_permissions(parent, perms)?;
        }
        #[cfg(not(unix))]
        tracing::debug!(
            "Skipping directory permission restriction on non-Unix platform: {}",
            parent.display()
        );
    }
    Ok(())
}

/// Create a post_create hook for file-based databases.
///
/// Applies the connection PRAGMAs and restricts file permissions to 0o600.
fn make_file_post_create_hook(path: PathBuf) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let path_for_perms = path.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                setup_connection(conn)?;

                #[cfg(unix)]
                if let Ok(metadata) = std::fs::metadata(&path_for_perms) {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600); // rw-------
                    if let Err(e) = std::fs::set_permissions(&path_for_perms, perms) {
                        tracing::warn!("Failed to set database file permissions to 0600: {}", e);
                    }
                }
                #[cfg(not(unix))]
                tracing::debug!(
                    "Skipping DB file permission restriction on non-Unix platform: {}",
                    path_for_perms.display()
                );

                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Create a post_create hook for in-memory databases.
///
/// WAL mode is not applicable to in-memory databases.
fn make_memory_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys=ON; \
                     PRAGMA busy_timeout=5000;",
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Configure a connection after it's created (from the post_create hook).
fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    // WAL for concurrent readers, foreign keys for parent_id integrity,
    // busy timeout as the write-contention window, NORMAL sync (safe
    // under WAL).
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=5000; \
         PRAGMA synchronous=NORMAL; \
         PRAGMA journal_size_limit=32768;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_in_memory() {
        let pool = DatabasePool::open_in_memory()
            .await
            .expect("Failed to open in-memory pool");

        let count: i64 = pool
            .interact(|conn| {
                conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .await
            .expect("Failed to query");

        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_pool_shares_state_across_connections() {
        let pool = DatabasePool::open_in_memory()
            .await
            .expect("Failed to open pool");

        pool.interact(|conn| {
            conn.execute(
                "INSERT INTO memories (id, content, type) VALUES ('mem_000000000001', 'x', 'fact')",
                [],
            )?;
            Ok(())
        })
        .await
        .expect("Failed to insert");

        // A different pooled connection must see the row (shared cache)
        let content: String = pool
            .interact(|conn| {
                conn.query_row(
                    "SELECT content FROM memories WHERE id = 'mem_000000000001'",
                    [],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .await
            .expect("Failed to query");

        assert_eq!(content, "x");
    }

    #[tokio::test]
    async fn test_scope_limits_migrations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = DatabasePool::open(&dir.path().join("memoir.db"), MigrationScope::Memory)
            .await
            .expect("Failed to open pool");

        let (has_memories, has_chunks) = pool
            .interact(|conn| {
                Ok((
                    migrations::table_exists(conn, "memories"),
                    migrations::table_exists(conn, "chunks"),
                ))
            })
            .await
            .expect("Failed to query");

        assert!(has_memories);
        assert!(!has_chunks);
    }

    #[tokio::test]
    async fn test_open_is_idempotent_on_existing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memoir.db");

        {
            let pool = DatabasePool::open(&path, MigrationScope::All)
                .await
                .expect("first open");
            pool.interact(|conn| {
                conn.execute(
                    "INSERT INTO memories (id, content, type) VALUES ('mem_000000000001', 'x', 'fact')",
                    [],
                )?;
                Ok(())
            })
            .await
            .expect("insert");
        }

        let pool = DatabasePool::open(&path, MigrationScope::All)
            .await
            .expect("second open");
        let count: i64 = pool
            .interact(|conn| {
                conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .await
            .expect("query");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_try_interact_swallows_errors() {
        let pool = DatabasePool::open_in_memory()
            .await
            .expect("Failed to open pool");

        let result: Option<()> = pool
            .try_interact("broken query", |conn| {
                conn.execute("INSERT INTO nonexistent_table VALUES (1)", [])?;
                Ok(())
            })
            .await;

        assert!(result.is_none());
    }
}
