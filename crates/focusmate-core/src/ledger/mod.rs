//! Append-only session ledger.
//!
//! The remote ledger is the source of truth for historical analytics; the
//! local [`crate::storage::Database`] cache implements the same trait so the
//! engine keeps working offline.

mod http;
mod memory;

pub use http::HttpLedger;
pub use memory::MemoryLedger;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// One completed (or manually stopped) countdown. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    #[serde(rename = "durationMinutes")]
    pub duration_minutes: u64,
    #[serde(rename = "endTimestamp")]
    pub end_timestamp_epoch_ms: u64,
}

/// Every session store implements this trait. Records are keyed by an
/// opaque per-user identifier and are never mutated after `append`.
pub trait SessionLedger: Send + Sync {
    /// Append a session and return the generated record key.
    fn append(&self, user_id: &str, session: &FocusSession) -> Result<String, LedgerError>;

    /// Every session recorded for `user_id`, in no particular order.
    fn fetch_all(&self, user_id: &str) -> Result<Vec<FocusSession>, LedgerError>;
}

/// Load the session history from `remote`, falling back to `cache` when the
/// remote is unavailable.
pub fn load_history(
    remote: &dyn SessionLedger,
    cache: &dyn SessionLedger,
    user_id: &str,
) -> Result<Vec<FocusSession>, LedgerError> {
    match remote.fetch_all(user_id) {
        Ok(sessions) => Ok(sessions),
        Err(e) => {
            tracing::warn!("remote ledger unavailable, using local cache: {e}");
            cache.fetch_all(user_id)
        }
    }
}

/// Sum of all session minutes.
pub fn total_focus_minutes(sessions: &[FocusSession]) -> u64 {
    sessions.iter().map(|s| s.duration_minutes).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_camel_case_names() {
        let session = FocusSession {
            duration_minutes: 25,
            end_timestamp_epoch_ms: 1_700_000_000_000,
        };
        let json = serde_json::to_value(session).unwrap();
        assert_eq!(json["durationMinutes"], 25);
        assert_eq!(json["endTimestamp"], 1_700_000_000_000u64);
    }

    #[test]
    fn history_falls_back_to_cache() {
        let remote = MemoryLedger::new();
        remote.set_failing(true);
        let cache = MemoryLedger::new();
        let session = FocusSession {
            duration_minutes: 5,
            end_timestamp_epoch_ms: 10,
        };
        cache.append("u", &session).unwrap();

        let history = load_history(&remote, &cache, "u").unwrap();
        assert_eq!(history, vec![session]);
    }

    #[test]
    fn history_prefers_remote() {
        let remote = MemoryLedger::new();
        let cache = MemoryLedger::new();
        let session = FocusSession {
            duration_minutes: 30,
            end_timestamp_epoch_ms: 99,
        };
        remote.append("u", &session).unwrap();
        cache
            .append(
                "u",
                &FocusSession {
                    duration_minutes: 1,
                    end_timestamp_epoch_ms: 1,
                },
            )
            .unwrap();

        assert_eq!(load_history(&remote, &cache, "u").unwrap(), vec![session]);
    }

    #[test]
    fn totals_sum_minutes() {
        let sessions = [
            FocusSession {
                duration_minutes: 25,
                end_timestamp_epoch_ms: 0,
            },
            FocusSession {
                duration_minutes: 40,
                end_timestamp_epoch_ms: 0,
            },
        ];
        assert_eq!(total_focus_minutes(&sessions), 65);
        assert_eq!(total_focus_minutes(&[]), 0);
    }
}
