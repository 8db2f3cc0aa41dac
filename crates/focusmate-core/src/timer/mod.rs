mod actor;
mod engine;
mod state;

pub use actor::{spawn_timer, TimerHandle, DEFAULT_TICK_INTERVAL};
pub use engine::{ElapsedMs, TimerEngine};
pub use state::{TimerConfig, TimerSnapshot, TimerState};
