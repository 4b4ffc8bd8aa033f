use std::io::Write;
use std::process::{Command, Stdio};

use keylock_core::{Encoding, KeyMap};

use crate::error::{io_err, DaemonError};

/// Dump the live keyboard mapping table (`<program> -pke`).
pub fn query_keymap(program: &str) -> Result<String, DaemonError> {
    let output = Command::new(program)
        .arg("-pke")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| io_err(program, e))?;

    if !output.status.success() {
        return Err(DaemonError::Tool {
            program: format!("{program} -pke"),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Destination for keymap switches.
pub trait KeymapSink {
    fn apply(&mut self, map: &KeyMap) -> Result<(), DaemonError>;
}

/// Applies tables through `xmodmap -`.
#[derive(Debug, Clone)]
pub struct Xmodmap {
    program: String,
    encoding: Encoding,
}

impl Xmodmap {
    pub fn new(program: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            program: program.into(),
            encoding,
        }
    }

    /// Feed `map` to the utility on stdin and wait for it; its output is
    /// discarded.
    ///
    /// Only a failure to run or feed the utility is an error. A non-zero exit
    /// status is logged and the watcher keeps going.
    pub fn switch_xmodmap(&self, map: &KeyMap, encoding: Encoding) -> Result<(), DaemonError> {
        let payload = encoding.encode(&map.render())?;

        let mut child = Command::new(&self.program)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| io_err(&self.program, e))?;

        let write_result = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&payload),
            None => Ok(()),
        };
        let status = child.wait().map_err(|e| io_err(&self.program, e))?;

        if !status.success() {
            // A utility that bails out early may also break the pipe.
            tracing::warn!(
                program = %self.program,
                %status,
                write_error = ?write_result.err(),
                "keymap utility rejected the table"
            );
            return Ok(());
        }
        write_result.map_err(|e| io_err(&self.program, e))?;

        tracing::debug!(program = %self.program, entries = map.len(), %encoding, "keymap applied");
        Ok(())
    }
}

impl KeymapSink for Xmodmap {
    fn apply(&mut self, map: &KeyMap) -> Result<(), DaemonError> {
        self.switch_xmodmap(map, self.encoding)
    }
}
