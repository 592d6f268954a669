#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod migration;
pub mod ops;
pub mod schema;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryStore;
pub use store::{SqliteStore, SyncStore};

use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the database at the given path and run migrations.
pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database for testing.
pub fn open_memory_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}
