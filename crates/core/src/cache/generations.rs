//! Generation bookkeeping: creation, enumeration, deletion and the
//! persisted active-generation marker.

use std::collections::BTreeSet;

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::{params, rusqlite};

impl CacheDb {
    /// Create the named generation if it does not exist yet.
    pub async fn open_generation(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// All generations currently present in the store.
    pub async fn list_generations(&self) -> Result<BTreeSet<String>, Error> {
        self.conn
            .call(|conn| -> Result<BTreeSet<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Permanently delete a generation and every entry in it.
    ///
    /// Returns the number of entries removed. Deleting an unknown
    /// generation is a no-op.
    pub async fn delete_generation(&self, name: &str) -> Result<u64, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction()?;
                let entries = tx.query_row(
                    "SELECT COUNT(*) FROM entries WHERE generation = ?1",
                    params![name],
                    |row| row.get::<_, i64>(0),
                )?;
                // entries and the active marker cascade
                tx.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                tx.commit()?;
                Ok(entries as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Name of the generation that was last activated, if it still exists.
    pub async fn active_marker(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| -> Result<Option<String>, Error> {
                match conn.query_row("SELECT name FROM active_generation WHERE id = 1", [], |row| row.get(0)) {
                    Ok(name) => Ok(Some(name)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Record `name` as the active generation.
    ///
    /// The generation must already exist.
    pub async fn set_active_marker(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let known: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                if !known {
                    return Err(Error::InvalidInput(format!("unknown generation: {name}")));
                }
                conn.execute(
                    "INSERT INTO active_generation (id, name, activated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name, activated_at = excluded.activated_at",
                    params![name, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
