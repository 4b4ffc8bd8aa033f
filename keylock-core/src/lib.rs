//! keylock core library — keymap tables and screen-lock status events.
//!
//! - [`keymap`] — scrape, lock-map derivation, rendering
//! - [`event`] — classification of status-stream lines
//! - [`error`] — [`KeymapError`]

pub mod error;
pub mod event;
pub mod keymap;

pub use error::KeymapError;
pub use event::LockEvent;
pub use keymap::{Encoding, FunctionKey, KeyMap, KeymapEntry};
