//! Lock-event watcher: keeps the screen locker and its `-watch` stream alive
//! and swaps the function-key mapping on every lock/unlock transition.

use std::future::Future;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, SigmaskHow, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};

use keylock_core::{Encoding, FunctionKey, KeyMap, LockEvent};

use crate::error::{io_err, DaemonError};
use crate::lifecycle::{mask_termination, Service};
use crate::xmodmap::{query_keymap, KeymapSink, Xmodmap};

pub const LOCKER_ENV: &str = "KEYLOCK_LOCKER";
pub const LOCKER_COMMAND_ENV: &str = "KEYLOCK_LOCKER_COMMAND";
pub const XMODMAP_ENV: &str = "KEYLOCK_XMODMAP";
pub const ENCODING_ENV: &str = "KEYLOCK_ENCODING";

const REAP_ATTEMPTS: u32 = 10;
const REAP_INTERVAL: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External programs the watcher drives, and how it feeds them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collaborators {
    /// Screen locker, launched without arguments.
    pub locker: String,
    /// Status companion, launched with `-watch`.
    pub locker_command: String,
    /// Keymap utility, used with `-pke` (query) and `-` (apply).
    pub xmodmap: String,
    pub encoding: Encoding,
    /// Key whose bindings every function key takes while locked.
    pub reference: FunctionKey,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            locker: "xscreensaver".to_string(),
            locker_command: "xscreensaver-command".to_string(),
            xmodmap: "xmodmap".to_string(),
            encoding: Encoding::Utf8,
            reference: FunctionKey::LOCK_REFERENCE,
        }
    }
}

impl Collaborators {
    /// Defaults, with program paths and the table encoding overridable
    /// through `KEYLOCK_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, default: String| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(default)
        };
        let encoding = match lookup(ENCODING_ENV).filter(|value| !value.trim().is_empty()) {
            Some(name) => Encoding::from_name(&name).unwrap_or_else(|| {
                tracing::warn!(%name, fallback = %defaults.encoding, "unknown {ENCODING_ENV}");
                defaults.encoding
            }),
            None => defaults.encoding,
        };
        Self {
            locker: pick(LOCKER_ENV, defaults.locker),
            locker_command: pick(LOCKER_COMMAND_ENV, defaults.locker_command),
            xmodmap: pick(XMODMAP_ENV, defaults.xmodmap),
            encoding,
            ..defaults
        }
    }
}

// ---------------------------------------------------------------------------
// Keymap pair
// ---------------------------------------------------------------------------

/// The mapping scanned at startup and its locked variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeymapPair {
    pub origin: KeyMap,
    pub lock: KeyMap,
}

impl KeymapPair {
    pub fn derive(origin: KeyMap, reference: FunctionKey) -> Result<Self, DaemonError> {
        let lock = origin.derive_lock_map(reference)?;
        Ok(Self { origin, lock })
    }

    pub fn for_event(&self, event: LockEvent) -> &KeyMap {
        match event {
            LockEvent::Lock => &self.lock,
            LockEvent::Unblank => &self.origin,
        }
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Why [`watch_events`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown future resolved (termination signal).
    Signalled,
    /// The status stream reached end of file.
    StreamClosed,
    /// Reading the status stream failed.
    ReadFailed,
    /// The keymap utility could not be run or fed.
    ApplyFailed,
}

/// Forward status lines to `sink` until `shutdown` resolves or the stream
/// ends. `LOCK…` applies the lock map, `UNBLANK…` the origin map; every other
/// line is ignored.
pub async fn watch_events<R, S, F>(reader: R, maps: &KeymapPair, sink: &mut S, shutdown: F) -> LoopExit
where
    R: AsyncBufRead + Unpin,
    S: KeymapSink + ?Sized,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut reader = reader;
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("termination requested; leaving event loop");
                return LoopExit::Signalled;
            }
            read = reader.read_until(b'\n', &mut line) => read,
        };

        match read {
            Ok(0) => {
                tracing::info!("status stream closed");
                return LoopExit::StreamClosed;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to read status stream");
                return LoopExit::ReadFailed;
            }
        }

        let text = String::from_utf8_lossy(&line);
        let Some(event) = LockEvent::classify(&line) else {
            tracing::debug!(line = %text.trim_end(), "ignoring status line");
            continue;
        };

        tracing::info!(line = %text.trim_end(), ?event, "switching keymap");
        if let Err(err) = sink.apply(maps.for_event(event)) {
            tracing::error!(error = %err, ?event, "keymap switch failed");
            return LoopExit::ApplyFailed;
        }
    }
}

// ---------------------------------------------------------------------------
// Watcher service
// ---------------------------------------------------------------------------

/// [`Service`] that supervises the screen locker.
#[derive(Debug)]
pub struct LockWatcher {
    collaborators: Collaborators,
    locker: Option<Child>,
    status_stream: Option<Child>,
    maps: Option<KeymapPair>,
}

impl LockWatcher {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            locker: None,
            status_stream: None,
            maps: None,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Tables built during `pre_start`.
    pub fn maps(&self) -> Option<&KeymapPair> {
        self.maps.as_ref()
    }

    /// Pids of the spawned locker and status stream, in that order.
    pub fn child_ids(&self) -> Vec<u32> {
        [&self.locker, &self.status_stream]
            .into_iter()
            .flatten()
            .map(Child::id)
            .collect()
    }

    /// Scan the live mapping and derive the origin/lock pair.
    pub fn scan_fkeys(&self) -> Result<KeymapPair, DaemonError> {
        let dump = query_keymap(&self.collaborators.xmodmap)?;
        let origin = KeyMap::scrape(&dump);
        tracing::info!(entries = origin.len(), "scanned function-key mapping");
        KeymapPair::derive(origin, self.collaborators.reference)
    }

    /// Terminate both children. Safe to call repeatedly.
    pub fn halt(&mut self) {
        if let Some(child) = self.locker.take() {
            terminate("locker", child);
        }
        if let Some(child) = self.status_stream.take() {
            terminate("status stream", child);
        }
    }

    fn spawn_children(&mut self) -> Result<(), DaemonError> {
        let locker = &self.collaborators.locker;
        let child = Command::new(locker)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| io_err(locker, e))?;
        tracing::info!(program = %locker, pid = child.id(), "locker started");
        self.locker = Some(child);

        let command = &self.collaborators.locker_command;
        let child = Command::new(command)
            .arg("-watch")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| io_err(command, e))?;
        tracing::info!(program = %command, pid = child.id(), "status stream started");
        self.status_stream = Some(child);
        Ok(())
    }

    async fn event_loop(&mut self) -> Result<LoopExit, DaemonError> {
        let stdout = self
            .status_stream
            .as_mut()
            .and_then(|child| child.stdout.take())
            .ok_or(DaemonError::MissingHandle("status stream output"))?;
        let maps = self
            .maps
            .as_ref()
            .ok_or(DaemonError::MissingHandle("keymap tables"))?;

        let stdout = tokio::process::ChildStdout::from_std(stdout)
            .map_err(|e| io_err("status stream output", e))?;
        let mut terminate = signal(SignalKind::terminate())
            .map_err(|e| io_err("SIGTERM handler", e))?;
        mask_termination(SigmaskHow::SIG_UNBLOCK)?;
        let mut sink = Xmodmap::new(&self.collaborators.xmodmap, self.collaborators.encoding);

        let exit = watch_events(BufReader::new(stdout), maps, &mut sink, async move {
            terminate.recv().await;
        })
        .await;
        Ok(exit)
    }
}

impl Service for LockWatcher {
    fn pre_start(&mut self, pidfile: &Path) -> Result<(), DaemonError> {
        if pidfile.exists() {
            return Err(DaemonError::PidfilePresent {
                pidfile: pidfile.to_path_buf(),
            });
        }

        self.spawn_children()?;
        self.maps = Some(self.scan_fkeys()?);
        Ok(())
    }

    fn post_failure_cleanup(&mut self) {
        self.halt();
    }

    fn run(&mut self) -> Result<(), DaemonError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| io_err("tokio-runtime", e));

        let result = runtime.and_then(|runtime| runtime.block_on(self.event_loop()));
        self.halt();

        let exit = result?;
        tracing::info!(?exit, "watcher stopped");
        Ok(())
    }
}

impl Drop for LockWatcher {
    fn drop(&mut self) {
        self.halt();
    }
}

fn terminate(name: &str, mut child: Child) {
    let pid = child.id();
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => tracing::info!(pid, "{name} terminated"),
        Err(Errno::ESRCH) => tracing::debug!(pid, "{name} already gone"),
        Err(err) => tracing::warn!(pid, error = %err, "failed to terminate {name}"),
    }

    // Only reapable before detachment; afterwards the child belongs to init.
    for _ in 0..REAP_ATTEMPTS {
        match child.try_wait() {
            Ok(None) => sleep(REAP_INTERVAL),
            Ok(Some(_)) | Err(_) => return,
        }
    }
}
