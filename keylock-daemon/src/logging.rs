//! Tracing setup. The detached daemon has no terminal, so events go to an
//! append-only log file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use crate::paths::rotated_log_file;

/// Log size above which the file is moved aside at startup (1 MiB).
pub const MAX_LOG_BYTES: u64 = 1024 * 1024;

/// Install the global subscriber writing to `log_path`.
///
/// Falls back to stderr when the log file cannot be opened. Filtering follows
/// `RUST_LOG`, defaulting to `info`.
pub fn init_tracing(log_path: &Path) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Err(err) = rotate_if_needed(log_path, MAX_LOG_BYTES) {
        eprintln!("log rotation failed for {}: {err}", log_path.display());
    }

    match open_log(log_path) {
        Ok(file) => {
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(err) => {
            eprintln!("cannot open log file {}: {err}", log_path.display());
            let _ = fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(io::stderr)
                .try_init();
        }
    }
}

fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Move `log_path` to `<name>.old` once it reaches `max_bytes`, replacing any
/// previous backup. Returns whether a rotation happened.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    fs::rename(log_path, rotated_log_file(log_path))?;
    Ok(true)
}
