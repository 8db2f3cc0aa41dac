use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod app;
mod commands;

#[derive(Parser)]
#[command(name = "focusmate-cli", version, about = "FocusMate CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus countdown control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Streaks, analytics and badges
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Logs go to stderr so JSON on stdout stays machine-readable.
/// `FOCUSMATE_LOG` wins over `RUST_LOG`; the default is `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("FOCUSMATE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
