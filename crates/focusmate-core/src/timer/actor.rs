//! Single-owner timer actor.
//!
//! One task owns the [`TimerEngine`]. Commands arrive over an mpsc channel
//! and are answered over oneshot channels; events fan out over a broadcast
//! channel. Because every mutation happens on this task, a finished
//! countdown is recorded exactly once no matter how `stop` and the final
//! tick interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::EngineError;
use crate::events::Event;
use crate::recorder::SessionRecorder;

use super::engine::{ElapsedMs, TimerEngine};
use super::state::{TimerConfig, TimerSnapshot, TimerState};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;

enum Command {
    Start {
        config: TimerConfig,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Stop {
        reply: oneshot::Sender<ElapsedMs>,
    },
    Recover {
        reply: oneshot::Sender<TimerState>,
    },
    Snapshot {
        reply: oneshot::Sender<TimerSnapshot>,
    },
    Shutdown,
}

/// Cloneable handle to a running timer actor.
#[derive(Clone)]
pub struct TimerHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
}

impl TimerHandle {
    /// Start a countdown.
    pub async fn start(&self, config: TimerConfig) -> Result<(), EngineError> {
        self.request(|reply| Command::Start { config, reply }).await?
    }

    /// Stop the countdown, record it, and return the focused time.
    /// Returns 0 when nothing was running.
    pub async fn stop(&self) -> Result<ElapsedMs, EngineError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Resume a persisted countdown. Resolves once any finish side effects
    /// have completed.
    pub async fn recover(&self) -> Result<TimerState, EngineError> {
        self.request(|reply| Command::Recover { reply }).await
    }

    pub async fn snapshot(&self) -> Result<TimerSnapshot, EngineError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Ask the actor to exit. A running countdown stays persisted and can be
    /// recovered by the next process.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| EngineError::ActorStopped)?;
        rx.await.map_err(|_| EngineError::ActorStopped)
    }
}

/// Spawn the actor on the current tokio runtime.
///
/// Finished and stopped countdowns are handed to `recorder` (when given)
/// on the blocking pool before the timer accepts its next command.
pub fn spawn_timer(
    engine: TimerEngine,
    recorder: Option<SessionRecorder>,
    tick_interval: Duration,
) -> (TimerHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
    let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = TimerActor {
        engine,
        recorder: recorder.map(Arc::new),
        events: events_tx.clone(),
        tick_interval: tick_interval.max(Duration::from_millis(1)),
        next_tick: None,
    };
    let join = tokio::spawn(actor.run(commands_rx));

    (
        TimerHandle {
            commands: commands_tx,
            events: events_tx,
        },
        join,
    )
}

struct TimerActor {
    engine: TimerEngine,
    recorder: Option<Arc<SessionRecorder>>,
    events: broadcast::Sender<Event>,
    tick_interval: Duration,
    next_tick: Option<Instant>,
}

impl TimerActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                () = wait_until(self.next_tick) => self.on_tick().await,
            }
        }
        tracing::debug!("timer actor stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Start { config, reply } => {
                match self.engine.start(config) {
                    Ok(event) => {
                        self.publish(event);
                        self.schedule_after(event, None);
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Stop { reply } => {
                self.next_tick = None;
                let elapsed = self.engine.stop();
                self.record(elapsed).await;
                let _ = reply.send(elapsed);
            }
            Command::Recover { reply } => {
                let already_ticking = self.next_tick.is_some();
                let (_, event) = self.engine.recover();
                match event {
                    // The pending deadline already covers a live countdown.
                    Some(Event::Tick { .. }) if already_ticking => {}
                    Some(event) => self.apply(event).await,
                    None => self.next_tick = None,
                }
                let _ = reply.send(self.engine.state());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.engine.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    async fn on_tick(&mut self) {
        match self.engine.tick() {
            Some(event) => self.apply(event).await,
            None => self.next_tick = None,
        }
    }

    async fn apply(&mut self, event: Event) {
        self.publish(event);
        match event {
            Event::Tick { .. } => {
                let previous = self.next_tick;
                self.schedule_after(event, previous);
            }
            Event::Finish => {
                self.next_tick = None;
                let elapsed = self.engine.stop();
                self.record(elapsed).await;
            }
        }
    }

    fn publish(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Next wake-up: one interval after the previous deadline so ticks do
    /// not drift, but never past the end of the countdown.
    fn schedule_after(&mut self, event: Event, previous: Option<Instant>) {
        let Event::Tick { remaining_ms } = event else {
            self.next_tick = None;
            return;
        };
        let now = Instant::now();
        let mut next = match previous {
            Some(deadline) if deadline + self.tick_interval > now => deadline + self.tick_interval,
            _ => now + self.tick_interval,
        };
        let end = now + Duration::from_millis(remaining_ms);
        if end < next {
            next = end;
        }
        self.next_tick = Some(next);
    }

    async fn record(&self, elapsed: ElapsedMs) {
        if elapsed == 0 {
            return;
        }
        let Some(recorder) = self.recorder.clone() else {
            return;
        };
        match tokio::task::spawn_blocking(move || recorder.record(elapsed)).await {
            Ok(Ok(Some(session))) => {
                tracing::debug!(minutes = session.duration_minutes, "recorded countdown")
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => tracing::warn!("{e}"),
            Err(e) => tracing::error!("recording task failed: {e}"),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::{MemoryLedger, SessionLedger};
    use crate::storage::{BadgeTotals, MemoryStore, TimerStateStore};
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    const T0: u64 = 1_700_000_000_000;
    const FAST: Duration = Duration::from_millis(10);

    struct Fixture {
        clock: ManualClock,
        kv: Arc<MemoryStore>,
        ledger: Arc<MemoryLedger>,
        handle: TimerHandle,
        join: JoinHandle<()>,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(T0);
        let kv = Arc::new(MemoryStore::new());
        fixture_on(clock, kv)
    }

    fn fixture_on(clock: ManualClock, kv: Arc<MemoryStore>) -> Fixture {
        fixture_sharing(clock, kv, Arc::new(MemoryLedger::new()))
    }

    fn fixture_sharing(
        clock: ManualClock,
        kv: Arc<MemoryStore>,
        ledger: Arc<MemoryLedger>,
    ) -> Fixture {
        let clock_src: Arc<ManualClock> = Arc::new(clock.clone());
        let engine = TimerEngine::new(clock_src.clone(), TimerStateStore::new(kv.clone()));
        let recorder = SessionRecorder::new(
            clock_src,
            ledger.clone(),
            BadgeTotals::new(kv.clone()),
            "u",
        );
        let (handle, join) = spawn_timer(engine, Some(recorder), FAST);
        Fixture {
            clock,
            kv,
            ledger,
            handle,
            join,
        }
    }

    async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
        loop {
            let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for event");
            match received {
                Ok(event) => return event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    }

    async fn wait_for_finish(rx: &mut broadcast::Receiver<Event>) {
        while next_event(rx).await != Event::Finish {}
    }

    #[tokio::test]
    async fn start_publishes_first_tick() {
        let f = fixture();
        let mut rx = f.handle.subscribe();
        f.handle.start(TimerConfig::new(60_000).unwrap()).await.unwrap();
        assert_eq!(next_event(&mut rx).await, Event::Tick { remaining_ms: 60_000 });

        f.clock.advance(15_000);
        loop {
            if let Event::Tick { remaining_ms } = next_event(&mut rx).await {
                if remaining_ms == 45_000 {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn finish_records_once_even_with_late_stop() {
        let f = fixture();
        let mut rx = f.handle.subscribe();
        f.handle.start(TimerConfig::from_minutes(25).unwrap()).await.unwrap();

        f.clock.advance(25 * 60_000 + 1);
        wait_for_finish(&mut rx).await;

        let snapshot = f.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, TimerState::Idle);
        assert_eq!(f.handle.stop().await.unwrap(), 0);

        let sessions = f.ledger.fetch_all("u").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes, 25);
        assert_eq!(BadgeTotals::new(f.kv.clone()).total_minutes().unwrap(), 25);
    }

    #[tokio::test]
    async fn stop_records_elapsed_minutes() {
        let f = fixture();
        f.handle.start(TimerConfig::from_minutes(25).unwrap()).await.unwrap();
        f.clock.advance(2 * 60_000 + 30_000);

        assert_eq!(f.handle.stop().await.unwrap(), 150_000);
        let sessions = f.ledger.fetch_all("u").unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes, 2);
        assert_eq!(TimerStateStore::new(f.kv.clone()).get().unwrap(), None);
    }

    #[tokio::test]
    async fn stop_under_a_minute_records_nothing() {
        let f = fixture();
        f.handle.start(TimerConfig::from_minutes(25).unwrap()).await.unwrap();
        f.clock.advance(45_000);
        assert_eq!(f.handle.stop().await.unwrap(), 45_000);
        assert_eq!(f.ledger.count("u"), 0);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let f = fixture();
        f.handle.start(TimerConfig::new(60_000).unwrap()).await.unwrap();
        assert!(matches!(
            f.handle.start(TimerConfig::new(60_000).unwrap()).await,
            Err(EngineError::AlreadyRunning)
        ));
    }

    #[tokio::test]
    async fn recover_expired_countdown_finishes_and_records() {
        let clock = ManualClock::new(T0);
        let kv = Arc::new(MemoryStore::new());
        TimerStateStore::new(kv.clone())
            .set_running(T0 - 5_000, 25 * 60_000)
            .unwrap();

        let f = fixture_on(clock, kv);
        let mut rx = f.handle.subscribe();
        assert_eq!(f.handle.recover().await.unwrap(), TimerState::Idle);
        assert_eq!(next_event(&mut rx).await, Event::Finish);
        assert_eq!(f.ledger.count("u"), 1);
    }

    #[tokio::test]
    async fn recover_live_countdown_keeps_ticking() {
        let clock = ManualClock::new(T0);
        let kv = Arc::new(MemoryStore::new());
        TimerStateStore::new(kv.clone())
            .set_running(T0 + 30_000, 60_000)
            .unwrap();

        let f = fixture_on(clock, kv);
        let mut rx = f.handle.subscribe();
        assert!(f.handle.recover().await.unwrap().is_running());
        assert_eq!(next_event(&mut rx).await, Event::Tick { remaining_ms: 30_000 });
        assert!(f.handle.recover().await.unwrap().is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn recover_while_running_keeps_tick_cadence() {
        let f = fixture();
        let mut rx = f.handle.subscribe();
        f.handle.start(TimerConfig::new(60_000).unwrap()).await.unwrap();
        assert_eq!(next_event(&mut rx).await, Event::Tick { remaining_ms: 60_000 });
        let started = Instant::now();

        tokio::time::sleep(FAST / 2).await;
        assert!(f.handle.recover().await.unwrap().is_running());

        // Nothing extra is published; the next tick lands on the original
        // schedule, and the one after follows one interval later.
        next_event(&mut rx).await;
        let first = started.elapsed();
        assert!(first >= FAST && first < FAST + FAST / 2, "first tick at {first:?}");
        next_event(&mut rx).await;
        let second = started.elapsed();
        assert!(second >= FAST * 2 && second < FAST * 2 + FAST / 2, "second tick at {second:?}");
    }

    #[tokio::test]
    async fn countdown_taken_over_elsewhere_is_not_recorded_twice() {
        let clock = ManualClock::new(T0);
        let kv = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let first = fixture_sharing(clock.clone(), kv.clone(), ledger.clone());
        let second = fixture_sharing(clock.clone(), kv.clone(), ledger.clone());

        let mut first_events = first.handle.subscribe();
        first.handle.start(TimerConfig::from_minutes(25).unwrap()).await.unwrap();
        assert!(second.handle.recover().await.unwrap().is_running());

        clock.advance(10 * 60_000);
        assert_eq!(second.handle.stop().await.unwrap(), 10 * 60_000);
        second.handle.start(TimerConfig::from_minutes(50).unwrap()).await.unwrap();
        clock.advance(15 * 60_000 + 1);

        let mut idle = false;
        for _ in 0..500 {
            if first.handle.snapshot().await.unwrap().state == TimerState::Idle {
                idle = true;
                break;
            }
            tokio::time::sleep(FAST).await;
        }
        assert!(idle, "first timer never let go of the countdown");
        assert_eq!(first.handle.stop().await.unwrap(), 0);

        loop {
            match first_events.try_recv() {
                Ok(event) => assert_ne!(event, Event::Finish),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        let minutes: Vec<u64> = ledger
            .fetch_all("u")
            .unwrap()
            .iter()
            .map(|s| s.duration_minutes)
            .collect();
        assert_eq!(minutes, vec![10]);
        assert_eq!(BadgeTotals::new(kv.clone()).total_minutes().unwrap(), 10);
        assert_eq!(
            TimerStateStore::new(kv).get().unwrap().map(|p| p.end_at_epoch_ms),
            Some(T0 + 60 * 60_000)
        );
    }

    #[tokio::test]
    async fn idle_timer_publishes_nothing() {
        let f = fixture();
        let mut rx = f.handle.subscribe();
        tokio::time::sleep(FAST * 5).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn commands_fail_after_shutdown() {
        let f = fixture();
        f.handle.shutdown().await;
        f.join.await.unwrap();
        assert!(matches!(
            f.handle.snapshot().await,
            Err(EngineError::ActorStopped)
        ));
    }
}
