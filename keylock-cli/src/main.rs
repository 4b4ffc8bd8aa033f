//! keylock — disable function keys while the screen is locked.
//!
//! # Usage
//!
//! ```text
//! keylock start [PIDFILE]
//! keylock stop [PIDFILE]
//! keylock restart [PIDFILE]
//! ```
//!
//! `PIDFILE` defaults to `~/.keylock.pid`. Daemon logs go to `~/.keylock.log`.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::lifecycle::PidfileArgs;
use keylock_daemon::paths;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "keylock",
    version,
    about = "Swap out function-key bindings while xscreensaver holds the screen locked",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch the locker and detach the watcher into the background.
    Start(PidfileArgs),

    /// Terminate the running watcher recorded in the pidfile.
    Stop(PidfileArgs),

    /// Stop, then start again.
    Restart(PidfileArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = dirs::home_dir().context("could not determine home directory")?;
    keylock_daemon::init_tracing(&paths::log_file(&home));

    match cli.command {
        Commands::Start(args) => commands::lifecycle::start(&args.daemon(&home)),
        Commands::Stop(args) => commands::lifecycle::stop(&args.daemon(&home)),
        Commands::Restart(args) => commands::lifecycle::restart(&args.daemon(&home)),
    }
}
