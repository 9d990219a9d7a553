//! Persisted UI preferences.
//!
//! A small key-value table in SQLite, accessed through tokio-rusqlite so
//! queries run on a background thread. The only preference the application
//! reads is the sort mode; it is read when a session starts and written when
//! the user toggles it.

pub mod migrations;

use std::path::Path;

use tokio_rusqlite::{Connection, params, rusqlite};

use crate::Error;
use crate::sort::SortMode;

/// Key under which the sort mode is stored.
pub const SORT_MODE_KEY: &str = "sort_mode";

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

/// Preference database handle.
#[derive(Clone, Debug)]
pub struct PrefsDb {
    conn: Connection,
}

impl PrefsDb {
    /// Open (creating if needed) the preference database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Read a raw preference value.
    pub async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT value FROM preferences WHERE key = ?1", params![key], |row| {
                    row.get(0)
                });

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace a raw preference value.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let updated_at = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
                    ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, value, updated_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Stored sort mode; [`SortMode::ByPublisher`] when unset or unreadable.
    pub async fn sort_mode(&self) -> Result<SortMode, Error> {
        let stored = self.get(SORT_MODE_KEY).await?;
        Ok(match stored.as_deref() {
            None => SortMode::default(),
            Some(raw) => SortMode::parse(raw).unwrap_or_else(|| {
                tracing::warn!(value = raw, "ignoring unknown stored sort mode");
                SortMode::default()
            }),
        })
    }

    pub async fn set_sort_mode(&self, mode: SortMode) -> Result<(), Error> {
        self.set(SORT_MODE_KEY, mode.as_str()).await
    }
}
