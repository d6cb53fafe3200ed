//! Database module for message and settings persistence

pub mod message;
mod schema;
pub mod settings;

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::{Error, Result};

pub use message::{Message, MessageKind, MessageRepo, Sender};
pub use schema::SCHEMA_VERSION;
pub use settings::{SettingsRepo, keys};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Initialize the database
///
/// # Errors
///
/// Returns error if database cannot be opened or initialized
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    if let Some(parent) = path.as_ref().parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    // Run migrations on first connection
    let conn = checkout(&pool)?;
    schema::init(&conn)?;

    tracing::info!(version = SCHEMA_VERSION, "database initialized");
    Ok(pool)
}

/// Initialize an in-memory database (for testing)
///
/// The pool holds a single connection: every in-memory connection is its
/// own database, so a larger pool would see empty tables.
///
/// # Errors
///
/// Returns error if database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = checkout(&pool)?;
    schema::init(&conn)?;

    Ok(pool)
}

/// Check a connection out of the pool
///
/// The connection returns to the pool when dropped, on every exit path.
///
/// # Errors
///
/// Returns error if no connection becomes available
pub(crate) fn checkout(pool: &DbPool) -> Result<DbConn> {
    pool.get().map_err(|e| Error::Database(e.to_string()))
}
