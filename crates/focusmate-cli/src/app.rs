//! Wiring shared by every command: configuration, the database, the ledger.

use std::sync::Arc;
use std::time::Duration;

use focusmate_core::storage::Database;
use focusmate_core::{
    load_history, spawn_timer, BadgeTotals, Config, CoreError, FocusSession, HttpLedger,
    LedgerError, SessionLedger, SessionRecorder, SystemClock, TimerEngine, TimerHandle,
    TimerStateStore,
};
use tokio::task::JoinHandle;

pub struct App {
    pub config: Config,
    pub db: Arc<Database>,
    clock: Arc<SystemClock>,
    remote: Option<Arc<HttpLedger>>,
}

impl App {
    pub fn open() -> Result<Self, CoreError> {
        let config = Config::load()?;
        config.validate()?;
        let db = Arc::new(Database::open()?);

        let remote = if config.ledger.base_url.trim().is_empty() {
            None
        } else {
            match HttpLedger::from_config(&config.ledger) {
                Ok(ledger) => Some(Arc::new(ledger)),
                Err(e) => {
                    tracing::warn!("remote ledger disabled: {e}");
                    None
                }
            }
        };

        Ok(Self {
            config,
            db,
            clock: Arc::new(SystemClock),
            remote,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.config.ledger.user_id
    }

    /// Where new sessions are appended: the remote ledger when configured,
    /// otherwise the local cache alone.
    fn ledger(&self) -> Arc<dyn SessionLedger> {
        match &self.remote {
            Some(remote) => Arc::clone(remote) as Arc<dyn SessionLedger>,
            None => Arc::clone(&self.db) as Arc<dyn SessionLedger>,
        }
    }

    pub fn recorder(&self) -> SessionRecorder {
        let recorder = SessionRecorder::new(
            self.clock.clone(),
            self.ledger(),
            BadgeTotals::new(self.db.clone()),
            self.user_id(),
        );
        if self.remote.is_some() {
            recorder.with_cache(self.db.clone())
        } else {
            recorder
        }
    }

    pub fn totals(&self) -> BadgeTotals {
        BadgeTotals::new(self.db.clone())
    }

    pub fn history(&self) -> Result<Vec<FocusSession>, LedgerError> {
        load_history(self.ledger().as_ref(), self.db.as_ref(), self.user_id())
    }

    /// Spawn the timer actor on the current runtime.
    pub fn timer(&self) -> (TimerHandle, JoinHandle<()>) {
        let engine = TimerEngine::new(self.clock.clone(), TimerStateStore::new(self.db.clone()));
        spawn_timer(
            engine,
            Some(self.recorder()),
            Duration::from_millis(self.config.timer.tick_interval_ms),
        )
    }
}
