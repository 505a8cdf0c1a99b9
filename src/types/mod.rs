//! Common types used throughout the table store.

mod color;
mod handle;
mod tag;
mod tag_index;

pub use color::{LinearColor, PaletteCursor};
pub use handle::DataHandle;
pub use tag::{Ancestors, Tag, TAG_SEPARATOR};
pub use tag_index::TagIndex;

use serde::{Deserialize, Serialize};

/// Maximum number of records held by a single datablock.
/// Pages needing more records span several datablocks.
pub const MAX_DATABLOCK_CAPACITY: u32 = 512;

/// Current table stream format version
///
/// 1: Initial version
/// 2: Record types are persisted with the table
/// 3: Per-record-type inheritance maps
/// 4: Per-page record byte size, for drift detection
pub const FORMAT_VERSION: u32 = 4;

/// Oldest stream version that can still be migrated
pub const MIN_SUPPORTED_FORMAT_VERSION: u32 = 3;

/// Separator between the row and column tag in a cell key
pub const CELL_KEY_SEPARATOR: char = '|';

/// Memory strategy for pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AllocationMode {
    /// Allocate exactly rows x columns up front and never grow
    Fixed,
    /// Grow by whole datablocks as rows and columns are added
    #[default]
    Dynamic,
}

impl AllocationMode {
    pub fn is_fixed(self) -> bool {
        matches!(self, Self::Fixed)
    }
}

/// Selects the row or the column side of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    Row,
    Column,
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Row => write!(f, "row"),
            Self::Column => write!(f, "column"),
        }
    }
}

/// A resolved cell address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub row: TagIndex,
    pub column: TagIndex,
}

impl Cell {
    pub const fn new(row: TagIndex, column: TagIndex) -> Self {
        Self { row, column }
    }

    pub const fn is_valid(&self) -> bool {
        self.row.is_valid() && self.column.is_valid()
    }
}

/// A cell addressed by its tags; stays meaningful across save and reload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CellTags {
    pub row: Tag,
    pub column: Tag,
}

impl CellTags {
    pub fn new(row: Tag, column: Tag) -> Self {
        Self { row, column }
    }

    /// Parse both tags
    pub fn parse(row: &str, column: &str) -> crate::Result<Self> {
        Ok(Self::new(Tag::new(row)?, Tag::new(column)?))
    }

    /// The explicit "not linked" target
    pub fn unlinked() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.row.is_valid() && self.column.is_valid()
    }

    /// Composite key used by inheritance maps
    pub fn cell_key(&self) -> String {
        format!("{}{}{}", self.row, CELL_KEY_SEPARATOR, self.column)
    }
}

impl std::fmt::Display for CellTags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_key() -> crate::Result<()> {
        let cell = CellTags::parse("combat.melee", "terrain")?;
        assert_eq!(cell.cell_key(), "combat.melee|terrain");
        assert_eq!(CellTags::unlinked().cell_key(), "None|None");
        assert!(!CellTags::unlinked().is_valid());
        Ok(())
    }

    #[test]
    fn test_cell_validity() {
        assert!(Cell::new(TagIndex::new(0), TagIndex::new(1)).is_valid());
        assert!(!Cell::new(TagIndex::INVALID, TagIndex::new(1)).is_valid());
    }

    #[test]
    fn test_default_mode_is_dynamic() {
        assert_eq!(AllocationMode::default(), AllocationMode::Dynamic);
        assert!(AllocationMode::Fixed.is_fixed());
    }
}
