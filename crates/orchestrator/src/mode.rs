//! Operating modes (spec §4.10): process-global, settable at runtime,
//! gating which of {read index, write index, read storage, write storage}
//! a given operation may touch.

use serde::{Deserialize, Serialize};
use vg_core::{Error, Result};

/// The database's current operating mode. Held in an
/// [`std::sync::atomic::AtomicU8`]-backed cell by [`crate::database::Database`]
/// so it can be read and swapped without a lock on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Read and write both the index and storage (default).
    Normal,
    /// Index and storage are readable; no writes of any kind. The index
    /// may lazily hydrate missing nodes from storage (spec §4.10).
    ReadOnly,
    /// The index accepts writes; storage is only read for existence
    /// checks, never for full hydration. Every search-family operation
    /// fails fast (spec §4.10 "search ops fail fast").
    WriteOnly,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

impl Mode {
    /// Whether a read-path operation (`search`, `get*`) is permitted.
    pub fn allows_read(&self) -> bool {
        !matches!(self, Mode::WriteOnly)
    }

    /// Whether a write-path operation (`add`, `update`, `delete`, `addVerb`)
    /// is permitted.
    pub fn allows_write(&self) -> bool {
        !matches!(self, Mode::ReadOnly)
    }

    /// Fail fast with the mode-appropriate error if `operation` is not
    /// permitted as a read.
    pub fn require_read(&self, operation: &str) -> Result<()> {
        if self.allows_read() {
            Ok(())
        } else {
            Err(Error::WriteOnlyViolation { operation: operation.to_string() })
        }
    }

    /// Fail fast with the mode-appropriate error if `operation` is not
    /// permitted as a write.
    pub fn require_write(&self, operation: &str) -> Result<()> {
        if self.allows_write() {
            Ok(())
        } else {
            Err(Error::ReadOnlyViolation { operation: operation.to_string() })
        }
    }

    /// Encode for storage in an `AtomicU8` (spec §5 "process-global,
    /// settable at runtime" — a lock-free cell avoids a mutex on every
    /// operation's mode check).
    pub fn to_u8(self) -> u8 {
        match self {
            Mode::Normal => 0,
            Mode::ReadOnly => 1,
            Mode::WriteOnly => 2,
        }
    }

    /// Decode from [`Mode::to_u8`]; unrecognized values fall back to
    /// [`Mode::Normal`] (should not occur outside memory corruption).
    pub fn from_u8(n: u8) -> Self {
        match n {
            1 => Mode::ReadOnly,
            2 => Mode::WriteOnly,
            _ => Mode::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_allows_everything() {
        assert!(Mode::Normal.require_read("search").is_ok());
        assert!(Mode::Normal.require_write("add").is_ok());
    }

    #[test]
    fn read_only_rejects_writes() {
        assert!(Mode::ReadOnly.require_read("search").is_ok());
        assert!(matches!(Mode::ReadOnly.require_write("add"), Err(Error::ReadOnlyViolation { .. })));
    }

    #[test]
    fn write_only_rejects_reads() {
        assert!(Mode::WriteOnly.require_write("add").is_ok());
        assert!(matches!(Mode::WriteOnly.require_read("search"), Err(Error::WriteOnlyViolation { .. })));
    }
}
