//! `keylock start|stop|restart [PIDFILE]`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use keylock_daemon::{paths, Collaborators, Daemon, DaemonError, LockWatcher, StopOutcome};

#[derive(Args, Debug)]
pub struct PidfileArgs {
    /// Pidfile recording the running watcher (default: ~/.keylock.pid).
    pub pidfile: Option<PathBuf>,
}

impl PidfileArgs {
    pub fn daemon(&self, home: &Path) -> Daemon {
        let pidfile = self
            .pidfile
            .clone()
            .unwrap_or_else(|| paths::default_pidfile(home));
        Daemon::new(pidfile)
    }
}

/// Only returns in the detached watcher once its event loop ends, or in the
/// invoking process when starting fails.
pub fn start(daemon: &Daemon) -> Result<()> {
    let mut watcher = LockWatcher::new(Collaborators::from_env());
    report_start(daemon.start(&mut watcher))
}

pub fn stop(daemon: &Daemon) -> Result<()> {
    match daemon.stop().context("failed to stop keylock daemon")? {
        StopOutcome::NotRunning => {
            eprintln!(
                "pidfile {} does not exist. Daemon not running?",
                daemon.pidfile().display()
            );
        }
        StopOutcome::Stopped { pid } => println!("keylock daemon stopped (pid {pid})"),
    }
    Ok(())
}

pub fn restart(daemon: &Daemon) -> Result<()> {
    let mut watcher = LockWatcher::new(Collaborators::from_env());
    report_start(daemon.restart(&mut watcher))
}

fn report_start(result: Result<(), DaemonError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err @ DaemonError::PidfilePresent { .. }) => {
            println!("{err}");
            Ok(())
        }
        Err(err) => Err(err).context("failed to start keylock daemon"),
    }
}
