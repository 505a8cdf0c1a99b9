//! Row and column index type.

use std::fmt;

/// Dense index assigned to a tag when it is registered as a row or column.
///
/// Row and column indices are independent numbering spaces. Within a session
/// they come from a running counter and are never reused; loading a table
/// renumbers them to `0..N-1` in stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagIndex(pub u32);

impl TagIndex {
    /// Invalid index, used as a "not found" sentinel
    pub const INVALID: TagIndex = TagIndex(u32::MAX);

    /// Create a new tag index
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index value
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Check if this is a valid index
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// Index as a position into page row/column vectors
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for TagIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "INVALID")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<u32> for TagIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl From<TagIndex> for u32 {
    fn from(index: TagIndex) -> Self {
        index.0
    }
}
