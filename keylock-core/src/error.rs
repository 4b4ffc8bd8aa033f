//! Error types for keylock-core.

use thiserror::Error;

/// Errors raised while deriving or encoding keymap tables.
#[derive(Debug, Error)]
pub enum KeymapError {
    /// The scraped table has no function-key entries at all.
    #[error("keymap table is empty; no function-key bindings were found")]
    Empty,

    /// No entry is bound to the function key used as the lock reference.
    #[error("no keymap entry bound to {key}; cannot derive the lock map")]
    MissingReference { key: String },

    /// A character cannot be represented in the requested encoding.
    #[error("character {ch:?} cannot be encoded as {encoding}")]
    Unencodable { ch: char, encoding: &'static str },
}
