// crates/memoir-server/src/db/test_support.rs
// Shared helpers for db-layer unit tests

use super::migrations::{Subsystem, apply_pending};
use rusqlite::Connection;

/// In-memory connection with both subsystems migrated.
pub fn open_test_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .expect("enable foreign keys");
    for subsystem in Subsystem::ALL {
        apply_pending(&conn, subsystem).expect("apply migrations");
    }
    conn
}
