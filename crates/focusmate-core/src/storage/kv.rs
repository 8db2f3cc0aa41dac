//! Durable key-value store contract.
//!
//! Values are strings; typed access lives in [`super::timer_store`] so key
//! names and encodings are defined in exactly one place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;

/// Small typed records that survive process death.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write all entries atomically.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;

    /// Remove all keys atomically. Missing keys are not an error.
    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;

    /// Remove `keys` atomically, but only while `guard` holds `expected`.
    /// Returns whether anything was removed.
    fn remove_many_if(
        &self,
        guard: &str,
        expected: &str,
        keys: &[&str],
    ) -> Result<bool, StoreError>;

    /// Atomically add `delta` to an integer value (absent counts as 0) and
    /// return the new value.
    fn add_i64(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_many(&[(key, value.to_string())])
    }
}

/// In-memory store.
///
/// `fail_writes` makes every mutation fail, which is how the degraded
/// (in-memory only) timer path is exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.values.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.values
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".into()))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut values = self.lock()?;
        for (key, value) in entries {
            values.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut values = self.lock()?;
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }

    fn remove_many_if(
        &self,
        guard: &str,
        expected: &str,
        keys: &[&str],
    ) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut values = self.lock()?;
        if values.get(guard).map(String::as_str) != Some(expected) {
            return Ok(false);
        }
        for key in keys {
            values.remove(*key);
        }
        Ok(true)
    }

    fn add_i64(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.check_writable()?;
        let mut values = self.lock()?;
        let current = match values.get(key) {
            Some(raw) => raw.parse::<i64>().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                value: raw.clone(),
            })?,
            None => 0,
        };
        let next = current.saturating_add(delta);
        values.insert(key.to_string(), next.to_string());
        Ok(next)
    }
}
