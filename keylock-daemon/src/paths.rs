use std::path::{Path, PathBuf};
use std::time::Duration;

pub const PIDFILE_NAME: &str = ".keylock.pid";
pub const LOG_FILE_NAME: &str = ".keylock.log";
pub const NULL_DEVICE: &str = "/dev/null";

/// Delay between termination signals sent by `stop`.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn default_pidfile(home: &Path) -> PathBuf {
    home.join(PIDFILE_NAME)
}

pub fn log_file(home: &Path) -> PathBuf {
    home.join(LOG_FILE_NAME)
}

pub fn rotated_log_file(log: &Path) -> PathBuf {
    let name = log
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(LOG_FILE_NAME);
    log.with_file_name(format!("{name}.old"))
}
