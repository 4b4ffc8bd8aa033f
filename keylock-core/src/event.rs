//! Lines reported by the screen locker's `-watch` stream.
//!
//! The stream emits one status token per line followed by free-form data,
//! e.g. `LOCK Sat Oct 17 21:04:11 2026`. Only two tokens matter here.

/// A status change that requires a keymap switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    /// The screen was locked; apply the lock map.
    Lock,
    /// The screen was unblanked; restore the origin map.
    Unblank,
}

impl LockEvent {
    /// Classify a raw status line. Returns `None` for lines to ignore.
    pub fn classify(line: &[u8]) -> Option<LockEvent> {
        if line.starts_with(b"LOCK") {
            Some(LockEvent::Lock)
        } else if line.starts_with(b"UNBLANK") {
            Some(LockEvent::Unblank)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"LOCK Sat Oct 17 21:04:11 2026\n", Some(LockEvent::Lock))]
    #[case(b"LOCK\n", Some(LockEvent::Lock))]
    #[case(b"UNBLANK Sat Oct 17 21:09:02 2026\n", Some(LockEvent::Unblank))]
    #[case(b"BLANK Sat Oct 17 21:03:40 2026\n", None)]
    #[case(b"RUN 12\n", None)]
    #[case(b" LOCK\n", None)]
    #[case(b"lock\n", None)]
    #[case(b"\xff\xfeNOISE\n", None)]
    #[case(b"", None)]
    fn classifies_status_lines(#[case] line: &[u8], #[case] expected: Option<LockEvent>) {
        assert_eq!(LockEvent::classify(line), expected);
    }
}
