//! Generation and registry operations.
//!
//! A generation is a named partition of the entries table. Deleting the
//! generation row cascades to every entry it holds.

use super::connection::CacheDb;
use super::entries::insert_entry;
use super::hash::RequestKey;
use super::{CURRENT_GENERATION_KEY, REFRESH_RECORD_KEY};
use crate::Error;
use crate::http::Response;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Handle to an opened generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationHandle {
    name: String,
}

impl GenerationHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CacheDb {
    /// Open a generation, creating it if needed.
    pub async fn open_generation(&self, name: &str, prefix: &str, now_ms: i64) -> Result<GenerationHandle, Error> {
        let name = name.to_string();
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<GenerationHandle, Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (name, prefix, created_at) VALUES (?1, ?2, ?3)",
                    params![name, prefix, now_ms],
                )?;
                Ok(GenerationHandle::new(name))
            })
            .await
            .map_err(Error::from)
    }

    pub async fn generation_exists(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every stored generation, oldest first.
    pub async fn list_generations(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and all of its entries.
    ///
    /// Returns false if no such generation existed.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Create a generation holding `entries` and the refresh record in one
    /// transaction, and point the registry at it.
    ///
    /// Either everything is written or nothing is.
    pub async fn install_generation(
        &self, name: &str, prefix: &str, entries: Vec<(RequestKey, Response)>, now_ms: i64,
    ) -> Result<GenerationHandle, Error> {
        let name = name.to_string();
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<GenerationHandle, Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO generations (name, prefix, created_at) VALUES (?1, ?2, ?3)",
                    params![name, prefix, now_ms],
                )?;
                for (key, response) in &entries {
                    insert_entry(&tx, &name, key, response, now_ms, None)?;
                }
                let record = Response::text(REFRESH_RECORD_KEY, &now_ms.to_string());
                insert_entry(&tx, &name, &RequestKey::reserved(REFRESH_RECORD_KEY), &record, now_ms, None)?;
                tx.execute(
                    "INSERT INTO registry (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![CURRENT_GENERATION_KEY, name, now_ms],
                )?;
                tx.commit()?;
                Ok(GenerationHandle::new(name))
            })
            .await
            .map_err(Error::from)
    }

    pub async fn get_registry(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT value FROM registry WHERE key = ?1", params![key], |row| row.get(0));
                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    pub async fn set_registry(&self, key: &str, value: &str, now_ms: i64) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO registry (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, now_ms],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    pub async fn clear_registry(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM registry WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}
