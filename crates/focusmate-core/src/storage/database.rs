//! SQLite-backed storage.
//!
//! Provides persistent storage for:
//! - Key-value store for timer and badge state
//! - Local cache of recorded focus sessions

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::{DatabaseError, LedgerError, StoreError};
use crate::ledger::{FocusSession, SessionLedger};

use super::data_dir;
use super::kv::KvStore;
use super::migrations;

/// SQLite database holding the kv table and the local session cache.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/focusmate.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, crate::error::CoreError> {
        let path = data_dir()?.join("focusmate.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Poisoned)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let conn = self.conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Store a session in the local cache under `user_id`.
    pub fn insert_session(
        &self,
        id: &str,
        user_id: &str,
        session: &FocusSession,
    ) -> Result<(), DatabaseError> {
        self.conn()?.execute(
            "INSERT INTO sessions (id, user_id, duration_minutes, end_timestamp_ms)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                user_id,
                session.duration_minutes as i64,
                session.end_timestamp_epoch_ms as i64,
            ],
        )?;
        Ok(())
    }

    /// All cached sessions for `user_id`, oldest first.
    pub fn sessions_for(&self, user_id: &str) -> Result<Vec<FocusSession>, DatabaseError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT duration_minutes, end_timestamp_ms
             FROM sessions
             WHERE user_id = ?1
             ORDER BY end_timestamp_ms ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(FocusSession {
                duration_minutes: row.get::<_, i64>(0)? as u64,
                end_timestamp_epoch_ms: row.get::<_, i64>(1)? as u64,
            })
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}

impl KvStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.kv_get(key)?)
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(DatabaseError::from)?;
        }
        tx.commit().map_err(DatabaseError::from)?;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(DatabaseError::from)?;
        }
        tx.commit().map_err(DatabaseError::from)?;
        Ok(())
    }

    fn remove_many_if(
        &self,
        guard: &str,
        expected: &str,
        keys: &[&str],
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        // Take the write lock before reading so another process cannot
        // replace the guard between the check and the delete.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        let current: Option<String> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![guard], |row| {
                row.get(0)
            })
            .optional()
            .map_err(DatabaseError::from)?;
        if current.as_deref() != Some(expected) {
            return Ok(false);
        }
        for key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(DatabaseError::from)?;
        }
        tx.commit().map_err(DatabaseError::from)?;
        Ok(true)
    }

    fn add_i64(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(DatabaseError::from)?;
        let current: Option<String> = tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(DatabaseError::from)?;
        let current = match current {
            Some(raw) => raw.parse::<i64>().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                value: raw,
            })?,
            None => 0,
        };
        let next = current.saturating_add(delta);
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, next.to_string()],
        )
        .map_err(DatabaseError::from)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(next)
    }
}

impl SessionLedger for Database {
    fn append(&self, user_id: &str, session: &FocusSession) -> Result<String, LedgerError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.insert_session(&id, user_id, session)?;
        Ok(id)
    }

    fn fetch_all(&self, user_id: &str) -> Result<Vec<FocusSession>, LedgerError> {
        Ok(self.sessions_for(user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }

    #[test]
    fn set_many_and_remove_many() {
        let db = Database::open_memory().unwrap();
        db.set_many(&[("a", "1".into()), ("b", "2".into())]).unwrap();
        assert_eq!(KvStore::get(&db, "b").unwrap().as_deref(), Some("2"));
        db.remove_many(&["a", "b", "never-set"]).unwrap();
        assert!(KvStore::get(&db, "a").unwrap().is_none());
    }

    #[test]
    fn remove_many_if_checks_guard() {
        let db = Database::open_memory().unwrap();
        db.set_many(&[("end", "100".into()), ("flag", "true".into())])
            .unwrap();
        assert!(!db.remove_many_if("end", "200", &["end", "flag"]).unwrap());
        assert_eq!(db.kv_get("flag").unwrap().as_deref(), Some("true"));

        assert!(db.remove_many_if("end", "100", &["end", "flag"]).unwrap());
        assert!(db.kv_get("end").unwrap().is_none());
        assert!(db.kv_get("flag").unwrap().is_none());
    }

    #[test]
    fn add_i64_accumulates() {
        let db = Database::open_memory().unwrap();
        assert_eq!(db.add_i64("total", 25).unwrap(), 25);
        assert_eq!(db.add_i64("total", 5).unwrap(), 30);
        assert_eq!(db.kv_get("total").unwrap().as_deref(), Some("30"));
    }

    #[test]
    fn session_cache_is_per_user_and_ordered() {
        let db = Database::open_memory().unwrap();
        let late = FocusSession {
            duration_minutes: 10,
            end_timestamp_epoch_ms: 2_000,
        };
        let early = FocusSession {
            duration_minutes: 25,
            end_timestamp_epoch_ms: 1_000,
        };
        db.append("alice", &late).unwrap();
        db.append("alice", &early).unwrap();
        db.append("bob", &late).unwrap();

        let sessions = db.fetch_all("alice").unwrap();
        assert_eq!(sessions, vec![early, late]);
        assert_eq!(db.fetch_all("bob").unwrap().len(), 1);
        assert!(db.fetch_all("carol").unwrap().is_empty());
    }

    #[test]
    fn reopening_file_keeps_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusmate.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.kv_set("timer.isRunning", "true").unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.kv_get("timer.isRunning").unwrap().as_deref(), Some("true"));
    }
}
