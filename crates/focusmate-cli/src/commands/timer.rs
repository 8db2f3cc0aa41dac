use std::error::Error;
use std::io::Write;
use std::time::Duration;

use clap::Subcommand;
use focusmate_core::{
    format_remaining, run_presenter, Event, NotificationPresenter, TimerConfig, TimerHandle,
};
use tokio::sync::broadcast;

use crate::app::App;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a countdown and return; it survives this process
    Start {
        /// Countdown length (defaults to timer.default_duration_min)
        #[arg(long)]
        minutes: Option<u64>,
    },
    /// Print the current countdown as JSON
    Status,
    /// Stop the countdown and record the focused time
    Stop,
    /// Render the live countdown until it finishes (Ctrl-C detaches)
    Watch,
    /// Start a countdown and watch it
    Run {
        #[arg(long)]
        minutes: Option<u64>,
    },
}

/// Writes `MM:SS remaining` on one terminal line.
struct TerminalPresenter;

impl NotificationPresenter for TerminalPresenter {
    fn show_remaining(&mut self, remaining_ms: u64) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r{} remaining ", format_remaining(remaining_ms));
        let _ = out.flush();
    }

    fn finished(&mut self) {
        println!("\rFocus session complete.   ");
    }
}

pub fn run(action: TimerAction) -> CliResult {
    let app = App::open()?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(&app, action))
}

async fn dispatch(app: &App, action: TimerAction) -> CliResult {
    let (timer, join) = app.timer();
    let result = match action {
        TimerAction::Start { minutes } => start(app, &timer, minutes).await,
        TimerAction::Status => status(&timer).await,
        TimerAction::Stop => stop(&timer).await,
        TimerAction::Watch => {
            let events = timer.subscribe();
            let state = timer.recover().await?;
            if state.is_running() {
                watch(app, &timer, events).await
            } else {
                report_idle(events);
                Ok(())
            }
        }
        TimerAction::Run { minutes } => {
            let events = timer.subscribe();
            start(app, &timer, minutes).await?;
            watch(app, &timer, events).await
        }
    };

    // A running countdown stays persisted for the next invocation.
    timer.shutdown().await;
    let _ = join.await;
    result
}

fn countdown_config(app: &App, minutes: Option<u64>) -> Result<TimerConfig, Box<dyn Error>> {
    let minutes = minutes.unwrap_or(app.config.timer.default_duration_min);
    Ok(TimerConfig::from_minutes(minutes)?)
}

async fn start(app: &App, timer: &TimerHandle, minutes: Option<u64>) -> CliResult {
    let config = countdown_config(app, minutes)?;
    // Settle a countdown that ended while nobody was running.
    timer.recover().await?;
    timer.start(config).await?;
    let snapshot = timer.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn status(timer: &TimerHandle) -> CliResult {
    timer.recover().await?;
    let snapshot = timer.snapshot().await?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn stop(timer: &TimerHandle) -> CliResult {
    timer.recover().await?;
    let elapsed_ms = timer.stop().await?;
    let out = serde_json::json!({
        "type": "timer_stopped",
        "elapsed_ms": elapsed_ms,
        "recorded_minutes": elapsed_ms / 60_000,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn watch(app: &App, timer: &TimerHandle, events: broadcast::Receiver<Event>) -> CliResult {
    let poll = Duration::from_millis(app.config.timer.tick_interval_ms);
    tokio::select! {
        // Finish is published before the timer goes idle, so the presenter
        // must win when both are ready.
        biased;
        _ = run_presenter(events, TerminalPresenter) => {
            // Recording follows Finish; a round trip waits for it.
            timer.snapshot().await?;
        }
        () = until_idle(timer, poll) => {
            println!("\rCountdown was stopped elsewhere.   ");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\ndetached; the countdown keeps running");
        }
    }
    Ok(())
}

/// Resolves once the timer no longer holds a running countdown, e.g. after
/// another process stopped it.
async fn until_idle(timer: &TimerHandle, poll: Duration) {
    loop {
        tokio::time::sleep(poll).await;
        match timer.snapshot().await {
            Ok(snapshot) if snapshot.state.is_running() => {}
            _ => return,
        }
    }
}

fn report_idle(mut events: broadcast::Receiver<Event>) {
    if matches!(events.try_recv(), Ok(Event::Finish)) {
        println!("Focus session complete.");
    } else {
        println!("No countdown running.");
    }
}
