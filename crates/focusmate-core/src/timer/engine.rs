//! Timer engine implementation.
//!
//! The timer engine is a wall-clock-based state machine. It does not use
//! internal threads - the caller (normally the timer actor) is responsible
//! for calling `tick()` periodically.
//!
//! Remaining time is always derived from the persisted end time, never from
//! the number of ticks seen, so a countdown survives process restarts.
//!
//! The durable record is also the ownership token. Several processes may
//! hold an engine over the same store; before ticking, finishing or stopping
//! a persisted countdown the engine checks that the store still holds *its*
//! end time. If another process stopped or replaced the countdown, this
//! engine drops back to idle without emitting `Finish` or yielding time to
//! record.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = TimerEngine::new(clock, store);
//! engine.start(TimerConfig::from_minutes(25)?)?;
//! // In a loop:
//! engine.tick(); // Tick { remaining_ms } or Finish
//! ```

use std::sync::Arc;

use crate::clock::ClockSource;
use crate::error::EngineError;
use crate::events::Event;
use crate::storage::TimerStateStore;

use super::state::{TimerConfig, TimerSnapshot, TimerState};

/// Milliseconds focused in a countdown: target minus remaining.
pub type ElapsedMs = u64;

/// Core timer engine. Owns at most one countdown.
pub struct TimerEngine {
    clock: Arc<dyn ClockSource>,
    store: TimerStateStore,
    state: TimerState,
    target_ms: u64,
    persisted: bool,
}

impl TimerEngine {
    /// Create an idle engine. Call [`TimerEngine::recover`] to pick up a
    /// countdown left behind by a previous process.
    pub fn new(clock: Arc<dyn ClockSource>, store: TimerStateStore) -> Self {
        Self {
            clock,
            store,
            state: TimerState::Idle,
            target_ms: 0,
            persisted: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn target_ms(&self) -> u64 {
        self.target_ms
    }

    /// Remaining time, clamped at zero.
    pub fn remaining_ms(&self) -> u64 {
        match self.state {
            TimerState::Running { end_at_epoch_ms } => {
                end_at_epoch_ms.saturating_sub(self.clock.now_epoch_ms())
            }
            TimerState::Idle | TimerState::Finished => 0,
        }
    }

    pub fn elapsed_ms(&self) -> ElapsedMs {
        match self.state {
            TimerState::Idle => 0,
            TimerState::Running { .. } | TimerState::Finished => {
                self.target_ms.saturating_sub(self.remaining_ms())
            }
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            state: self.state,
            remaining_ms: self.remaining_ms(),
            target_ms: self.target_ms,
            persisted: self.persisted,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a countdown. Returns the first `Tick`.
    ///
    /// Fails with `AlreadyRunning` when this engine, or the durable store,
    /// holds a countdown that has not reached its end time. A failed
    /// persistence write is not an error: the countdown runs in memory only
    /// and [`TimerSnapshot::persisted`] reports false.
    pub fn start(&mut self, config: TimerConfig) -> Result<Event, EngineError> {
        if self.state.is_running() {
            return Err(EngineError::AlreadyRunning);
        }

        let now = self.clock.now_epoch_ms();
        match self.store.get() {
            Ok(Some(persisted)) if persisted.end_at_epoch_ms > now => {
                return Err(EngineError::AlreadyRunning);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("could not read persisted timer state: {e}"),
        }

        let target_ms = config.target_duration_ms();
        let end_at_epoch_ms = now.saturating_add(target_ms);
        self.persisted = match self.store.set_running(end_at_epoch_ms, target_ms) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "{}; continuing in memory only",
                    EngineError::PersistenceWriteFailed(e)
                );
                false
            }
        };

        self.state = TimerState::Running { end_at_epoch_ms };
        self.target_ms = target_ms;
        tracing::info!(target_ms, end_at_epoch_ms, "focus countdown started");
        Ok(Event::Tick {
            remaining_ms: target_ms,
        })
    }

    /// Call periodically while running. Returns `Tick` with the remaining
    /// time, or `Finish` (exactly once) when the end time has passed.
    ///
    /// Returns `None` and goes idle when another process has taken the
    /// countdown over.
    pub fn tick(&mut self) -> Option<Event> {
        match self.state {
            TimerState::Running { end_at_epoch_ms } => {
                if !self.still_owns(end_at_epoch_ms) {
                    self.relinquish();
                    return None;
                }
                let remaining_ms = self.remaining_ms();
                if remaining_ms == 0 {
                    self.finish();
                    return Some(Event::Finish);
                }
                Some(Event::Tick { remaining_ms })
            }
            TimerState::Idle | TimerState::Finished => None,
        }
    }

    /// Stop the countdown and return the focused time.
    ///
    /// Valid from `Running` and `Finished`; a no-op returning 0 while idle,
    /// so a second `stop` never yields time to record twice. Also returns 0
    /// when another process already stopped or replaced the countdown.
    pub fn stop(&mut self) -> ElapsedMs {
        match self.state {
            TimerState::Idle => return 0,
            TimerState::Running { end_at_epoch_ms } if !self.still_owns(end_at_epoch_ms) => {
                self.relinquish();
                return 0;
            }
            TimerState::Running { .. } | TimerState::Finished => {}
        }
        let elapsed = self.elapsed_ms();
        self.clear_persisted();
        self.state = TimerState::Idle;
        self.target_ms = 0;
        self.persisted = false;
        tracing::info!(elapsed_ms = elapsed, "focus countdown stopped");
        elapsed
    }

    /// Pick up a countdown from the durable store.
    ///
    /// Returns the resulting state and the event to publish: `Tick` when the
    /// countdown resumes, `Finish` when its end time passed while nobody was
    /// watching. Calling this while a countdown is already held in memory
    /// does not touch the store.
    pub fn recover(&mut self) -> (TimerState, Option<Event>) {
        if self.state == TimerState::Idle {
            match self.store.get() {
                Ok(Some(persisted)) => {
                    let now = self.clock.now_epoch_ms();
                    self.state = TimerState::Running {
                        end_at_epoch_ms: persisted.end_at_epoch_ms,
                    };
                    self.target_ms = persisted
                        .target_duration_ms
                        .unwrap_or_else(|| persisted.end_at_epoch_ms.saturating_sub(now));
                    self.persisted = true;
                    tracing::info!(
                        end_at_epoch_ms = persisted.end_at_epoch_ms,
                        "recovered persisted countdown"
                    );
                }
                Ok(None) => return (TimerState::Idle, None),
                Err(e) => {
                    tracing::warn!("could not read persisted timer state: {e}");
                    return (TimerState::Idle, None);
                }
            }
        }

        let event = self.tick();
        (self.state, event)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn finish(&mut self) {
        self.clear_persisted();
        self.state = TimerState::Finished;
        tracing::info!(target_ms = self.target_ms, "focus countdown finished");
    }

    /// Whether the durable record still describes this countdown. An
    /// in-memory-only countdown has no record to lose; an unreadable store
    /// is not proof that someone else took over.
    fn still_owns(&self, end_at_epoch_ms: u64) -> bool {
        if !self.persisted {
            return true;
        }
        match self.store.get() {
            Ok(Some(persisted)) => persisted.end_at_epoch_ms == end_at_epoch_ms,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("could not read persisted timer state: {e}");
                true
            }
        }
    }

    fn relinquish(&mut self) {
        tracing::info!("countdown was stopped or replaced by another process");
        self.state = TimerState::Idle;
        self.target_ms = 0;
        self.persisted = false;
    }

    /// Clear the durable record, but only while it still holds this
    /// countdown's end time.
    fn clear_persisted(&self) {
        let TimerState::Running { end_at_epoch_ms } = self.state else {
            return;
        };
        match self.store.clear_if(end_at_epoch_ms) {
            Ok(true) => {}
            Ok(false) => tracing::debug!("persisted timer state belongs to another countdown"),
            Err(e) => tracing::warn!("could not clear persisted timer state: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{KvStore, MemoryStore, PersistedTimer};

    const T0: u64 = 1_700_000_000_000;

    fn engine_with(kv: Arc<MemoryStore>, clock: &ManualClock) -> TimerEngine {
        TimerEngine::new(Arc::new(clock.clone()), TimerStateStore::new(kv))
    }

    fn setup() -> (Arc<MemoryStore>, ManualClock, TimerEngine) {
        let kv = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(T0);
        let engine = engine_with(kv.clone(), &clock);
        (kv, clock, engine)
    }

    #[test]
    fn start_persists_end_time() {
        let (kv, _clock, mut engine) = setup();
        let first = engine.start(TimerConfig::new(60_000).unwrap()).unwrap();
        assert_eq!(first, Event::Tick { remaining_ms: 60_000 });
        assert_eq!(
            engine.state(),
            TimerState::Running {
                end_at_epoch_ms: T0 + 60_000
            }
        );
        assert_eq!(
            TimerStateStore::new(kv).get().unwrap(),
            Some(PersistedTimer {
                end_at_epoch_ms: T0 + 60_000,
                target_duration_ms: Some(60_000),
            })
        );
        assert!(engine.snapshot().persisted);
    }

    #[test]
    fn start_while_running_fails_without_state_change() {
        let (_kv, clock, mut engine) = setup();
        engine.start(TimerConfig::new(60_000).unwrap()).unwrap();
        clock.advance(1_000);
        assert!(matches!(
            engine.start(TimerConfig::new(5_000).unwrap()),
            Err(EngineError::AlreadyRunning)
        ));
        assert_eq!(engine.target_ms(), 60_000);
        assert_eq!(engine.remaining_ms(), 59_000);
    }

    #[test]
    fn start_refuses_when_store_holds_live_countdown() {
        let kv = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(T0);
        let mut first = engine_with(kv.clone(), &clock);
        first.start(TimerConfig::new(60_000).unwrap()).unwrap();

        let mut second = engine_with(kv, &clock);
        assert!(matches!(
            second.start(TimerConfig::new(60_000).unwrap()),
            Err(EngineError::AlreadyRunning)
        ));
    }

    #[test]
    fn start_overwrites_expired_persisted_countdown() {
        let (kv, _clock, mut engine) = setup();
        TimerStateStore::new(kv.clone())
            .set_running(T0 - 1, 10_000)
            .unwrap();
        engine.start(TimerConfig::new(30_000).unwrap()).unwrap();
        assert_eq!(engine.remaining_ms(), 30_000);
    }

    #[test]
    fn persistence_failure_degrades_to_memory() {
        let (kv, clock, mut engine) = setup();
        kv.set_fail_writes(true);
        engine.start(TimerConfig::new(10_000).unwrap()).unwrap();
        assert!(!engine.snapshot().persisted);
        assert!(kv.is_empty());

        clock.advance(4_000);
        assert_eq!(engine.tick(), Some(Event::Tick { remaining_ms: 6_000 }));
        clock.advance(6_000);
        assert_eq!(engine.tick(), Some(Event::Finish));
    }

    #[test]
    fn ticks_follow_wall_clock_not_tick_count() {
        let (_kv, clock, mut engine) = setup();
        engine.start(TimerConfig::new(10_000).unwrap()).unwrap();
        clock.advance(7_500);
        assert_eq!(engine.tick(), Some(Event::Tick { remaining_ms: 2_500 }));
    }

    #[test]
    fn finish_is_emitted_once_and_clears_store() {
        let (kv, clock, mut engine) = setup();
        engine.start(TimerConfig::new(3_000).unwrap()).unwrap();
        clock.advance(5_000);
        assert_eq!(engine.tick(), Some(Event::Finish));
        assert_eq!(engine.state(), TimerState::Finished);
        assert_eq!(engine.tick(), None);
        assert!(kv.is_empty());
    }

    #[test]
    fn stop_returns_elapsed_and_goes_idle() {
        let (kv, clock, mut engine) = setup();
        engine.start(TimerConfig::new(120_000).unwrap()).unwrap();
        clock.advance(45_000);
        assert_eq!(engine.stop(), 45_000);
        assert_eq!(engine.state(), TimerState::Idle);
        assert!(kv.is_empty());
    }

    #[test]
    fn second_stop_returns_zero() {
        let (_kv, clock, mut engine) = setup();
        engine.start(TimerConfig::new(120_000).unwrap()).unwrap();
        clock.advance(90_000);
        assert_eq!(engine.stop(), 90_000);
        assert_eq!(engine.stop(), 0);
    }

    #[test]
    fn stop_while_idle_is_noop() {
        let (_kv, _clock, mut engine) = setup();
        assert_eq!(engine.stop(), 0);
        assert_eq!(engine.state(), TimerState::Idle);
    }

    #[test]
    fn stop_after_finish_returns_full_target() {
        let (_kv, clock, mut engine) = setup();
        engine.start(TimerConfig::new(60_000).unwrap()).unwrap();
        clock.advance(61_000);
        assert_eq!(engine.tick(), Some(Event::Finish));
        assert_eq!(engine.stop(), 60_000);
        assert_eq!(engine.stop(), 0);
    }

    #[test]
    fn start_then_recover_in_same_process_keeps_running() {
        let (_kv, clock, mut engine) = setup();
        engine.start(TimerConfig::new(90_000).unwrap()).unwrap();
        clock.advance(200);
        let (state, event) = engine.recover();
        assert!(state.is_running());
        assert_eq!(event, Some(Event::Tick { remaining_ms: 89_800 }));
    }

    #[test]
    fn recover_after_restart_resumes_from_end_time() {
        let kv = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(T0);
        engine_with(kv.clone(), &clock)
            .start(TimerConfig::new(60_000).unwrap())
            .unwrap();

        clock.advance(20_000);
        let mut restarted = engine_with(kv, &clock);
        let (state, event) = restarted.recover();
        assert_eq!(
            state,
            TimerState::Running {
                end_at_epoch_ms: T0 + 60_000
            }
        );
        assert_eq!(event, Some(Event::Tick { remaining_ms: 40_000 }));
        assert_eq!(restarted.target_ms(), 60_000);
        assert_eq!(restarted.stop(), 20_000);
    }

    #[test]
    fn recover_expired_countdown_finishes_instead_of_negative_tick() {
        let (kv, _clock, mut engine) = setup();
        TimerStateStore::new(kv.clone())
            .set_running(T0 - 5_000, 25 * 60_000)
            .unwrap();

        let (state, event) = engine.recover();
        assert_eq!(state, TimerState::Finished);
        assert_eq!(event, Some(Event::Finish));
        assert!(kv.is_empty());
        assert_eq!(engine.stop(), 25 * 60_000);
    }

    #[test]
    fn recover_legacy_record_uses_remaining_as_target() {
        let (kv, clock, mut engine) = setup();
        kv.set("timer.isRunning", "true").unwrap();
        kv.set("timer.endAtEpochMs", &(T0 + 30_000).to_string())
            .unwrap();

        engine.recover();
        assert_eq!(engine.target_ms(), 30_000);
        clock.advance(10_000);
        assert_eq!(engine.stop(), 10_000);
    }

    #[test]
    fn recover_twice_is_idempotent() {
        let (kv, _clock, mut engine) = setup();
        assert_eq!(engine.recover(), (TimerState::Idle, None));
        assert_eq!(engine.recover(), (TimerState::Idle, None));

        TimerStateStore::new(kv).set_running(T0 + 10_000, 10_000).unwrap();
        let (first, _) = engine.recover();
        let (second, _) = engine.recover();
        assert_eq!(first, second);
    }

    #[test]
    fn recover_with_unreadable_store_stays_idle() {
        let (kv, _clock, mut engine) = setup();
        kv.set("timer.isRunning", "maybe").unwrap();
        assert_eq!(engine.recover(), (TimerState::Idle, None));
    }

    #[test]
    fn tick_after_other_process_restarts_goes_idle_without_finish() {
        let kv = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(T0);
        let mut first = engine_with(kv.clone(), &clock);
        first.start(TimerConfig::from_minutes(25).unwrap()).unwrap();

        let mut second = engine_with(kv.clone(), &clock);
        second.recover();
        clock.advance(10 * 60_000);
        assert_eq!(second.stop(), 10 * 60_000);
        second.start(TimerConfig::from_minutes(50).unwrap()).unwrap();

        clock.advance(15 * 60_000 + 1);
        assert_eq!(first.tick(), None);
        assert_eq!(first.state(), TimerState::Idle);
        assert_eq!(first.stop(), 0);
        assert_eq!(
            TimerStateStore::new(kv).get().unwrap().map(|p| p.end_at_epoch_ms),
            Some(T0 + 60 * 60_000)
        );
    }

    #[test]
    fn stop_after_other_process_stopped_returns_zero() {
        let kv = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(T0);
        let mut first = engine_with(kv.clone(), &clock);
        first.start(TimerConfig::from_minutes(25).unwrap()).unwrap();

        clock.advance(5 * 60_000);
        let mut second = engine_with(kv, &clock);
        second.recover();
        assert_eq!(second.stop(), 5 * 60_000);
        assert_eq!(first.stop(), 0);
    }

    #[test]
    fn finish_leaves_a_newer_countdown_in_the_store() {
        let (kv, clock, mut engine) = setup();
        kv.set_fail_writes(true);
        engine.start(TimerConfig::new(10_000).unwrap()).unwrap();
        kv.set_fail_writes(false);

        // Someone else persisted their own countdown meanwhile.
        TimerStateStore::new(kv.clone())
            .set_running(T0 + 90_000, 90_000)
            .unwrap();
        clock.advance(10_000);
        assert_eq!(engine.tick(), Some(Event::Finish));
        assert!(TimerStateStore::new(kv).get().unwrap().is_some());
    }

    #[test]
    fn snapshot_reports_remaining() {
        let (_kv, clock, mut engine) = setup();
        engine.start(TimerConfig::new(10_000).unwrap()).unwrap();
        clock.advance(2_500);
        let snap = engine.snapshot();
        assert_eq!(snap.remaining_ms, 7_500);
        assert_eq!(snap.target_ms, 10_000);
    }
}
