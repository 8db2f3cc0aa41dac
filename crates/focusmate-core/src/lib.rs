//! # FocusMate Core Library
//!
//! This library provides the core logic for the FocusMate focus timer: a
//! single-instance countdown that survives process restarts, plus the
//! session history and the statistics derived from it. It follows a
//! CLI-first philosophy: every operation is reachable from the standalone
//! `focusmate-cli` binary over this same library.
//!
//! ## Architecture
//!
//! - **Timer**: a wall-clock state machine ([`TimerEngine`]) owned by a
//!   single tokio actor ([`spawn_timer`]) that publishes [`Event`]s on a
//!   broadcast channel
//! - **Storage**: SQLite key-value records for crash recovery and badge
//!   totals, a local session cache, TOML configuration
//! - **Ledger**: append-only session history, remote over HTTP or local
//! - **Stats**: streaks, period analytics and badges, all recomputed from
//!   the history on demand
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Countdown state machine
//! - [`SessionRecorder`]: Turns a finished countdown into a ledger entry
//! - [`Database`]: Durable key-value store and session cache
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod ledger;
pub mod presenter;
pub mod recorder;
pub mod stats;
pub mod storage;
pub mod timer;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{
    ConfigError, CoreError, DatabaseError, EngineError, LedgerError, RecordError, StoreError,
};
pub use events::Event;
pub use ledger::{load_history, total_focus_minutes, FocusSession, HttpLedger, SessionLedger};
pub use presenter::{format_remaining, run_presenter, NotificationPresenter};
pub use recorder::SessionRecorder;
pub use stats::{
    AnalyticsAggregator, AnalyticsReport, Badge, BadgeCriterion, BadgeEvaluator, Period,
    StreakCalculator, StreakResult,
};
pub use storage::{BadgeTotals, Config, Database, KvStore, TimerStateStore};
pub use timer::{
    spawn_timer, ElapsedMs, TimerConfig, TimerEngine, TimerHandle, TimerSnapshot, TimerState,
};
