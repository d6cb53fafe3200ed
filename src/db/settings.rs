//! Key/value settings storage

use super::{DbPool, checkout};
use crate::Result;

/// Setting keys understood by the engine or passed through for front ends
pub mod keys {
    /// Provider credential (secret)
    pub const PROVIDER_API_KEY: &str = "providerApiKey";
    /// Path to the user's avatar image, opaque to the engine
    pub const USER_AVATAR_PATH: &str = "userAvatarPath";
    /// Path to the assistant's avatar image, opaque to the engine
    pub const ASSISTANT_AVATAR_PATH: &str = "assistantAvatarPath";
}

/// Settings repository
///
/// Values are stored as-is; validating them is the caller's job.
#[derive(Clone)]
pub struct SettingsRepo {
    pool: DbPool,
}

impl SettingsRepo {
    /// Create a new settings repository backed by the given pool
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Retrieve a setting, or `None` if it was never set
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = checkout(&self.pool)?;
        let result = conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or replace a setting
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = checkout(&self.pool)?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        tracing::debug!(key, "setting stored");
        Ok(())
    }

    /// Remove a setting
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = checkout(&self.pool)?;
        conn.execute("DELETE FROM settings WHERE key = ?1", rusqlite::params![key])?;
        Ok(())
    }

    /// Return all keys that have a stored value
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn list_keys(&self) -> Result<Vec<String>> {
        let conn = checkout(&self.pool)?;
        let mut stmt = conn.prepare("SELECT key FROM settings ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }
}
