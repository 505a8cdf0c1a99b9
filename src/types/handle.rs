//! Composite datablock handles.

use std::fmt;

/// A 64-bit key into a page's record storage.
///
/// The high 32 bits select a datablock in the page's datablock list, the low
/// 32 bits select a slot inside that datablock. Handles stay put when rows or
/// columns are inserted elsewhere in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataHandle(u64);

impl DataHandle {
    /// "No data here". Fills deleted columns.
    pub const INVALID: DataHandle = DataHandle(u64::MAX);

    /// Pack a datablock index and a slot
    pub const fn pack(block: u32, slot: u32) -> Self {
        Self(((block as u64) << 32) | slot as u64)
    }

    /// Datablock index (high half)
    pub const fn block(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Slot inside the datablock (low half)
    pub const fn slot(self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }

    /// Raw packed value
    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }
}

impl fmt::Display for DataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}:{}", self.block(), self.slot())
        } else {
            write!(f, "INVALID")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_packing() {
        let handle = DataHandle::pack(3, 511);
        assert_eq!(handle.block(), 3);
        assert_eq!(handle.slot(), 511);
        assert_eq!(handle.raw(), (3u64 << 32) | 511);
        assert!(handle.is_valid());
        assert!(!DataHandle::INVALID.is_valid());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(format!("{}", DataHandle::pack(1, 2)), "1:2");
        assert_eq!(format!("{}", DataHandle::INVALID), "INVALID");
    }
}
