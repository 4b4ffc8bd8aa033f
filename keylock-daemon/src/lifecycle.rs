//! Generic pidfile-driven daemon lifecycle: start, stop, restart.
//!
//! `start` runs the service's setup hook in the invoking process, detaches
//! with the classic double fork, records the pidfile and hands control to the
//! service. `stop` signals the recorded pid until it disappears.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, sigprocmask, SigSet, SigmaskHow, Signal};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, dup2, fork, setsid, ForkResult, Pid};

use crate::error::{errno, io_err, DaemonError};
use crate::paths::{NULL_DEVICE, STOP_POLL_INTERVAL};
use crate::pidfile::{self, read_pid, PidFile};

/// Behaviour plugged into [`Daemon`].
pub trait Service {
    /// Setup performed in the invoking process, before the pidfile check and
    /// detachment.
    fn pre_start(&mut self, _pidfile: &Path) -> Result<(), DaemonError> {
        Ok(())
    }

    /// Undo whatever `pre_start` acquired. Called when starting fails before
    /// the service runs.
    fn post_failure_cleanup(&mut self) {}

    /// Daemon body, executed in the detached process.
    fn run(&mut self) -> Result<(), DaemonError>;
}

/// Result of [`Daemon::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No readable pid was recorded; nothing to do.
    NotRunning,
    /// The recorded process is gone and the pidfile was removed.
    Stopped { pid: i32 },
}

/// Start/stop/restart control around a single pidfile.
#[derive(Debug, Clone)]
pub struct Daemon {
    pidfile: PathBuf,
    poll_interval: Duration,
}

impl Daemon {
    /// Relative paths are resolved against the current directory, since the
    /// detached process runs from `/`.
    pub fn new(pidfile: impl Into<PathBuf>) -> Self {
        let pidfile = pidfile.into();
        let pidfile = if pidfile.is_relative() {
            std::env::current_dir()
                .map(|cwd| cwd.join(&pidfile))
                .unwrap_or(pidfile)
        } else {
            pidfile
        };
        Self {
            pidfile,
            poll_interval: STOP_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn pidfile(&self) -> &Path {
        &self.pidfile
    }

    /// Start the daemon.
    ///
    /// Returns only in the detached process once `service.run()` finishes;
    /// the invoking process and the intermediate session leader exit with
    /// status 0 as soon as their child is forked.
    pub fn start<S: Service + ?Sized>(&self, service: &mut S) -> Result<(), DaemonError> {
        if let Err(err) = service.pre_start(&self.pidfile) {
            service.post_failure_cleanup();
            return Err(err);
        }

        let guard = match self.detach() {
            Ok(guard) => guard,
            Err(err) => {
                tracing::error!(error = %err, "daemon start failed");
                service.post_failure_cleanup();
                return Err(err);
            }
        };

        tracing::info!(pid = guard.pid().as_raw(), "daemon running");
        let result = service.run();
        if let Err(err) = &result {
            tracing::error!(error = %err, "daemon exited with error");
        }
        drop(guard);
        result
    }

    /// Stop a running daemon. A missing pidfile is not an error.
    pub fn stop(&self) -> Result<StopOutcome, DaemonError> {
        let Some(pid) = read_pid(&self.pidfile) else {
            tracing::info!(pidfile = %self.pidfile.display(), "no pid recorded; daemon not running");
            return Ok(StopOutcome::NotRunning);
        };

        let mut signals_sent = 0u32;
        loop {
            match kill(pid, Signal::SIGTERM) {
                Ok(()) if is_zombie(pid) => break,
                Ok(()) => {
                    signals_sent += 1;
                    sleep(self.poll_interval);
                }
                Err(Errno::ESRCH) => break,
                Err(source) => {
                    return Err(DaemonError::Signal {
                        pid: pid.as_raw(),
                        source,
                    })
                }
            }
        }

        pidfile::remove(&self.pidfile)?;
        tracing::info!(pid = pid.as_raw(), signals_sent, "daemon stopped");
        Ok(StopOutcome::Stopped { pid: pid.as_raw() })
    }

    /// `stop` followed by `start`.
    pub fn restart<S: Service + ?Sized>(&self, service: &mut S) -> Result<(), DaemonError> {
        self.stop()?;
        self.start(service)
    }

    fn detach(&self) -> Result<PidFile, DaemonError> {
        if let Some(pid) = read_pid(&self.pidfile) {
            return Err(DaemonError::AlreadyRunning {
                pidfile: self.pidfile.clone(),
                pid: pid.as_raw(),
            });
        }

        daemonize()?;
        // Held until the service installs its own handler; a `stop` racing the
        // pidfile must not kill the process with the default action.
        mask_termination(SigmaskHow::SIG_BLOCK)?;
        PidFile::create(&self.pidfile)
    }
}

/// Block or unblock `SIGTERM` for the calling thread. A signal that arrives
/// while blocked stays pending and is delivered on unblock.
pub(crate) fn mask_termination(how: SigmaskHow) -> Result<(), DaemonError> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGTERM);
    sigprocmask(how, Some(&set), None).map_err(errno("sigprocmask"))
}

/// An exited process whose parent has not reaped it still accepts signals.
fn is_zombie(pid: Pid) -> bool {
    fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .map(|(_, rest)| rest.trim_start().starts_with('Z'))
        })
        .unwrap_or(false)
}

/// Double-fork detach from the controlling terminal and session.
fn daemonize() -> Result<(), DaemonError> {
    fork_and_exit_parent("fork #1")?;

    chdir("/").map_err(errno("chdir"))?;
    setsid().map_err(errno("setsid"))?;
    umask(Mode::empty());

    fork_and_exit_parent("fork #2")?;
    redirect_standard_streams()
}

fn fork_and_exit_parent(context: &'static str) -> Result<(), DaemonError> {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    // SAFETY: the process is single-threaded here; no runtime exists before
    // detachment completes.
    match unsafe { fork() }.map_err(errno(context))? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

fn redirect_standard_streams() -> Result<(), DaemonError> {
    let null = OpenOptions::new()
        .read(true)
        .append(true)
        .open(NULL_DEVICE)
        .map_err(|e| io_err(NULL_DEVICE, e))?;

    for fd in [
        nix::libc::STDIN_FILENO,
        nix::libc::STDOUT_FILENO,
        nix::libc::STDERR_FILENO,
    ] {
        dup2(null.as_raw_fd(), fd).map_err(errno("dup2"))?;
    }
    Ok(())
}
