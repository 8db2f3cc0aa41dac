use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::LedgerError;

use super::{FocusSession, SessionLedger};

/// In-process ledger. `set_failing(true)` makes every call fail.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<String, Vec<(String, FocusSession)>>>,
    failing: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of records appended for `user_id`.
    pub fn count(&self, user_id: &str) -> usize {
        self.records
            .lock()
            .map(|r| r.get(user_id).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn check(&self) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger offline".into()));
        }
        Ok(())
    }
}

impl SessionLedger for MemoryLedger {
    fn append(&self, user_id: &str, session: &FocusSession) -> Result<String, LedgerError> {
        self.check()?;
        let key = uuid::Uuid::new_v4().to_string();
        self.records
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger mutex poisoned".into()))?
            .entry(user_id.to_string())
            .or_default()
            .push((key.clone(), *session));
        Ok(key)
    }

    fn fetch_all(&self, user_id: &str) -> Result<Vec<FocusSession>, LedgerError> {
        self.check()?;
        let records = self
            .records
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger mutex poisoned".into()))?;
        Ok(records
            .get(user_id)
            .map(|r| r.iter().map(|(_, s)| *s).collect())
            .unwrap_or_default())
    }
}
