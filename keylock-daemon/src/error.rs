use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the daemon lifecycle, the watcher and external tools.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context} failed: {source}")]
    Errno {
        context: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("keymap error: {0}")]
    Keymap(#[from] keylock_core::KeymapError),

    #[error("pidfile {} already exists with pid {pid}; daemon already running?", .pidfile.display())]
    AlreadyRunning { pidfile: PathBuf, pid: i32 },

    #[error("daemon is still alive! Otherwise try to delete file '{}'", .pidfile.display())]
    PidfilePresent { pidfile: PathBuf },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: nix::Error,
    },

    #[error("{program} failed ({status}): {stderr}")]
    Tool {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{0} is unavailable; was the service started?")]
    MissingHandle(&'static str),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn errno(context: &'static str) -> impl FnOnce(nix::Error) -> DaemonError {
    move |source| DaemonError::Errno { context, source }
}
