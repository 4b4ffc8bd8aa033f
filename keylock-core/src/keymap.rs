//! Keyboard mapping tables as dumped by `xmodmap -pke`.
//!
//! Only function-key rows are kept. A row is split into a `head` (keycode and
//! the `=` assignment column) and its keysym columns; the lock map is built by
//! keeping every head and swapping in the keysyms of one reference key.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::KeymapError;

const ASSIGNMENT: &str = "=";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A function key identified by its number (`F1`, `F6`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionKey(pub u8);

impl FunctionKey {
    /// Key whose bindings every function key takes over while locked.
    pub const LOCK_REFERENCE: FunctionKey = FunctionKey(6);

    fn keysym(&self) -> String {
        self.to_string()
    }
}

impl Default for FunctionKey {
    fn default() -> Self {
        Self::LOCK_REFERENCE
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeymapEntry {
    /// Keycode and assignment columns, e.g. `["keycode", "67", "="]`.
    pub head: Vec<String>,
    /// Keysym names bound under each modifier state.
    pub keysyms: Vec<String>,
}

impl KeymapEntry {
    /// Split a token row after its `=` column.
    ///
    /// Rows without an `=` token keep their first two tokens as the head.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let split = tokens
            .iter()
            .position(|t| t == ASSIGNMENT)
            .map(|idx| idx + 1)
            .unwrap_or(2)
            .min(tokens.len());
        let keysyms = tokens.split_off(split);
        Self {
            head: tokens,
            keysyms,
        }
    }

    /// All tokens of the row in order.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.head.iter().chain(self.keysyms.iter()).map(String::as_str)
    }

    fn is_bound_to(&self, key: FunctionKey) -> bool {
        self.keysyms.first().is_some_and(|sym| *sym == key.keysym())
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Ordered sequence of function-key entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMap(pub Vec<KeymapEntry>);

fn fkey_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // `[ \t]` rather than `\s` so a match never runs into the next line.
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^(.+=[ \t]F\d+[ \t].+)$").expect("function-key pattern is valid")
    })
}

impl KeyMap {
    /// Scrape the function-key rows out of an `xmodmap -pke` dump.
    pub fn scrape(dump: &str) -> Self {
        let entries = fkey_line()
            .captures_iter(dump)
            .filter_map(|caps| caps.get(1))
            .map(|m| KeymapEntry::from_tokens(m.as_str().split_whitespace()))
            .collect();
        Self(entries)
    }

    /// Build a table from raw token rows.
    pub fn from_rows<R, I, S>(rows: R) -> Self
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(rows.into_iter().map(KeymapEntry::from_tokens).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[KeymapEntry] {
        &self.0
    }

    /// Derive the table applied while the screen is locked.
    ///
    /// Every entry keeps its head; its keysym columns are replaced by those of
    /// the entry bound to `reference`. The reference row is found by its first
    /// keysym, not by position, so `F6` is used even when rows are missing.
    pub fn derive_lock_map(&self, reference: FunctionKey) -> Result<KeyMap, KeymapError> {
        if self.is_empty() {
            return Err(KeymapError::Empty);
        }

        let source = self
            .0
            .iter()
            .find(|entry| entry.is_bound_to(reference))
            .ok_or_else(|| KeymapError::MissingReference {
                key: reference.to_string(),
            })?;

        let entries = self
            .0
            .iter()
            .map(|entry| KeymapEntry {
                head: entry.head.clone(),
                keysyms: source.keysyms.clone(),
            })
            .collect();
        Ok(KeyMap(entries))
    }

    /// Text fed to `xmodmap -`: space-joined tokens, newline-joined rows.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|entry| entry.tokens().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Byte encoding of the rendered table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, KeymapError> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => text
                .chars()
                .map(|ch| {
                    u8::try_from(u32::from(ch)).map_err(|_| KeymapError::Unencodable {
                        ch,
                        encoding: self.name(),
                    })
                })
                .collect(),
        }
    }

    /// Parse a codec name as accepted by `KEYLOCK_ENCODING`, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Encoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Some(Encoding::Latin1),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Latin1 => "latin-1",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
