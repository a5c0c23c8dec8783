use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "schedalarm-cli", version, about = "Schedalarm CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule management
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// Schedule group management
    Group {
        #[command(subcommand)]
        action: commands::group::GroupAction,
    },
    /// Show the next wake-up time and its schedule
    Next,
    /// Normalize a start/end pair into a duration within one recurrence unit
    Duration {
        /// Start time (RFC 3339, "YYYY-MM-DD HH:MM" or "HH:MM")
        start: String,
        /// End time (same formats)
        end: String,
        /// Repeat kind: hourly, daily, weekly, monthly, yearly
        repeat: String,
    },
    /// Keep states fresh: recompute, print changes, sleep until the next
    /// transition, repeat
    Watch,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Schedule { action } => commands::schedule::run(action),
        Commands::Group { action } => commands::group::run(action),
        Commands::Next => commands::status::run(),
        Commands::Duration { start, end, repeat } => {
            commands::duration::run(&start, &end, &repeat)
        }
        Commands::Watch => commands::watch::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
