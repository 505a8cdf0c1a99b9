//! # Affinity Table
//!
//! A sparse two-dimensional data store indexed by hierarchical tags.
//!
//! Rows and columns are dotted tags such as `combat.melee` and
//! `terrain.grass`. Every registered record type gets its own page of cell
//! records, and queries can fall back to the closest registered ancestor of a
//! tag.
//!
//! ## Architecture
//!
//! - **Types** (`types`): tags, indices, handles, colors
//! - **Records** (`record`): the capability a host implements for its record types
//! - **Index** (`index`): tag to index resolution
//! - **Storage** (`storage`): datablock slabs and the table file container
//! - **Page** (`page`): the handle grid for one record type
//! - **Table** (`table`): structural edits, queries, links and persistence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use affinity_table::{PlainRecord, TableConfig, TableStore, Tag, CellTags};
//! use std::sync::Arc;
//!
//! let store = TableStore::open(
//!     "units.aft",
//!     TableConfig::new(),
//!     vec![Arc::new(PlainRecord::zeroed("Damage", 4)?)],
//! )?;
//!
//! {
//!     let mut table = store.write();
//!     table.add_row(&Tag::new("combat.melee")?)?;
//!     table.add_column(&Tag::new("terrain.grass")?)?;
//!     let cell = CellTags::parse("combat.melee", "terrain.grass")?;
//!     table.query_mut(&cell, "Damage")?.copy_from_slice(&12u32.to_be_bytes());
//! }
//!
//! let table = store.read();
//! let cell = CellTags::parse("combat.melee.sword", "terrain.grass.tall")?;
//! let records = table.query(&cell, false, &["Damage"])?;
//!
//! store.flush()?;
//! ```

pub mod error;
pub mod index;
pub mod page;
pub mod record;
pub mod storage;
pub mod table;
pub mod types;

pub use error::{Result, TableError};
pub use types::{
    AllocationMode, Axis, Cell, CellTags, DataHandle, LinearColor, PaletteCursor, Tag, TagIndex,
    FORMAT_VERSION, MAX_DATABLOCK_CAPACITY,
};

// Re-export main public API
pub use index::TagIndexMap;
pub use page::Page;
pub use record::{PlainRecord, RecordType, RecordTypeRef};
pub use storage::{Datablock, TableFile};
pub use table::{LinkState, Table, TableLayout, TableState, TableStats};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableConfig {
    /// Growth policy for every page (default: dynamic)
    pub mode: AllocationMode,
    /// Description stored with the table
    pub description: String,
}

impl TableConfig {
    /// Create a configuration for an editable table
    pub fn new() -> Self {
        Self {
            mode: AllocationMode::Dynamic,
            description: String::new(),
        }
    }

    /// Create a configuration for a runtime table: pages are sized exactly
    /// once at load time and never grow
    pub fn runtime() -> Self {
        Self::new().mode(AllocationMode::Fixed)
    }

    /// Set the allocation mode
    pub fn mode(mut self, mode: AllocationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// File-backed table handle
///
/// This is the primary public interface for hosts. The table sits behind a
/// read-write lock, so any number of readers or a single writer can use it at
/// a time.
pub struct TableStore {
    table: Arc<RwLock<Table>>,
    path: PathBuf,
    config: TableConfig,
}

impl TableStore {
    /// Open the table at `path`, or start an empty one if the file does not
    /// exist yet
    pub fn open<P: Into<PathBuf>>(
        path: P,
        config: TableConfig,
        record_types: Vec<RecordTypeRef>,
    ) -> Result<Self> {
        let path = path.into();
        let mut table = Table::new(&config);
        table.set_record_types(record_types)?;

        if path.exists() {
            TableFile::open(&mut table, &path)?;
        } else {
            info!(path = %path.display(), "starting a new table");
        }

        Ok(Self {
            table: Arc::new(RwLock::new(table)),
            path,
            config,
        })
    }

    /// Shared access to the table
    pub fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read()
    }

    /// Exclusive access to the table
    pub fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write()
    }

    /// Save the table to its file
    pub fn flush(&self) -> Result<()> {
        let mut table = self.table.write();
        TableFile::save(&mut table, &self.path)
    }

    /// Get statistics about the table
    pub fn stats(&self) -> TableStats {
        self.table.read().stats()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record_types() -> Vec<RecordTypeRef> {
        vec![Arc::new(PlainRecord::new("Damage", vec![0, 0, 0, 1]).unwrap())]
    }

    #[test]
    fn test_store_roundtrip() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("units.aft");

        let store = TableStore::open(&path, TableConfig::new().description("units"), record_types())?;
        {
            let mut table = store.write();
            table.add_row(&Tag::new("combat.melee")?)?;
            table.add_column(&Tag::new("terrain.grass")?)?;
            let cell = CellTags::parse("combat.melee", "terrain.grass")?;
            table
                .query_mut(&cell, "Damage")?
                .copy_from_slice(&12u32.to_be_bytes());
        }
        store.flush()?;
        assert!(path.exists());

        let reopened = TableStore::open(&path, TableConfig::runtime(), record_types())?;
        let table = reopened.read();
        assert_eq!(table.description, "units");
        assert_eq!(table.mode(), AllocationMode::Fixed);

        let cell = CellTags::parse("combat.melee.sword", "terrain.grass.tall")?;
        let records = table.query(&cell, false, &["Damage"])?;
        assert_eq!(records, vec![&12u32.to_be_bytes()[..]]);

        let parent = CellTags::parse("combat", "terrain")?;
        assert_eq!(table.query(&parent, true, &["Damage"])?, vec![&[0u8, 0, 0, 1][..]]);
        Ok(())
    }

    #[test]
    fn test_store_stats() -> Result<()> {
        let dir = tempdir().unwrap();
        let store = TableStore::open(dir.path().join("new.aft"), TableConfig::new(), record_types())?;
        assert_eq!(store.stats().rows, 0);
        assert_eq!(store.stats().pages, 1);

        store.write().add_row(&Tag::new("a.b")?)?;
        store.write().add_column(&Tag::new("x")?)?;
        let stats = store.stats();
        assert_eq!(stats.rows, 2);
        assert_eq!(stats.live_records, 2);
        assert_eq!(store.config().mode, AllocationMode::Dynamic);
        Ok(())
    }

    #[test]
    fn test_config_serde() {
        let config = TableConfig::runtime().description("runtime");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"mode":"fixed","description":"runtime"}"#);

        let parsed: TableConfig = serde_json::from_str(r#"{"description":"x"}"#).unwrap();
        assert_eq!(parsed.mode, AllocationMode::Dynamic);
    }
}
