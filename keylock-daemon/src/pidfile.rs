//! Pidfile helpers: liveness record and single-instance guard.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::error::{io_err, DaemonError};

/// Read the pid recorded in `path`.
///
/// A missing, unreadable or non-positive value yields `None`: the daemon is
/// treated as not running. Pids ≤ 0 would address process groups in `kill`.
pub fn read_pid(path: &Path) -> Option<Pid> {
    let raw = fs::read_to_string(path).ok()?;
    match raw.trim().parse::<i32>() {
        Ok(pid) if pid > 0 => Some(Pid::from_raw(pid)),
        Ok(pid) => {
            tracing::warn!(pidfile = %path.display(), pid, "ignoring non-positive pid");
            None
        }
        Err(err) => {
            tracing::warn!(pidfile = %path.display(), error = %err, "pidfile is not a pid");
            None
        }
    }
}

/// Remove `path`, treating an already-missing file as success.
pub fn remove(path: &Path) -> Result<(), DaemonError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}

/// The running daemon's pidfile entry. Removed when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: Pid,
}

impl PidFile {
    /// Record the current process id in `path` as `"<pid>\n"`.
    pub fn create(path: &Path) -> Result<Self, DaemonError> {
        let pid = Pid::this();
        let mut file = fs::File::create(path).map_err(|e| io_err(path, e))?;
        writeln!(file, "{pid}").map_err(|e| io_err(path, e))?;
        file.sync_all().map_err(|e| io_err(path, e))?;

        tracing::info!(pidfile = %path.display(), pid = pid.as_raw(), "pidfile written");
        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // A forked copy of the guard must not remove the live owner's entry.
        if Pid::this() != self.pid {
            return;
        }
        if let Err(err) = remove(&self.path) {
            tracing::warn!(pidfile = %self.path.display(), error = %err, "failed to remove pidfile");
        }
    }
}
