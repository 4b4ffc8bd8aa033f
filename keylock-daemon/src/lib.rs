//! keylock daemon: pidfile lifecycle, detachment, and the lock-event watcher.

mod error;
pub mod lifecycle;
pub mod logging;
pub mod paths;
pub mod pidfile;
pub mod watcher;
pub mod xmodmap;

pub use error::DaemonError;
pub use lifecycle::{Daemon, Service, StopOutcome};
pub use logging::init_tracing;
pub use watcher::{watch_events, Collaborators, KeymapPair, LockWatcher, LoopExit};
pub use xmodmap::{query_keymap, KeymapSink, Xmodmap};
