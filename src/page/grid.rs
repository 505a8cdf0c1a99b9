//! Handle grid for one record type.

use crate::error::{Result, TableError};
use crate::record::RecordTypeRef;
use crate::storage::Datablock;
use crate::types::{AllocationMode, DataHandle, MAX_DATABLOCK_CAPACITY};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// A row is an ordered list of handles, one per column position
pub type Row = Vec<DataHandle>;

/// All cell records of one record type, laid out as a grid of handles.
///
/// Row and column positions are the table's tag indices. Deleted rows are
/// left in place as `None` so later indices keep their position. Deleted
/// columns stay as [`DataHandle::INVALID`] in every row and are never given a
/// live handle again.
pub struct Page {
    /// Record type stored in this page
    record: RecordTypeRef,
    /// Rows in index order; `None` marks a deleted row
    rows: Vec<Option<Row>>,
    /// Record storage
    datablocks: Vec<Datablock>,
    /// Column positions that are no longer usable
    dead_columns: BTreeSet<u32>,
    /// Column positions per row, dead ones included
    columns: u32,
    /// Growth policy
    mode: AllocationMode,
    /// Datablock tried first when issuing handles
    current: usize,
}

impl Page {
    /// Create a page of `rows` x `columns` records.
    ///
    /// A non-empty page commits exactly enough datablock capacity for every
    /// cell. In fixed mode that is the only allocation the page ever makes.
    pub fn new(
        record: RecordTypeRef,
        rows: u32,
        columns: u32,
        mode: AllocationMode,
    ) -> Result<Self> {
        let mut page = Self {
            record,
            rows: Vec::with_capacity(rows as usize),
            datablocks: Vec::new(),
            dead_columns: BTreeSet::new(),
            columns,
            mode,
            current: 0,
        };

        let cells = rows.checked_mul(columns).ok_or_else(|| {
            TableError::invalid_operation(format!(
                "page of {} x {} cells is too large",
                rows, columns
            ))
        })?;

        if cells > 0 {
            page.allocate_blocks(cells)?;
        } else if mode.is_fixed() {
            warn!(
                record_type = page.record.name(),
                "fixed-mode page created with no allocations"
            );
        }

        for _ in 0..rows {
            page.add_row()?;
        }

        Ok(page)
    }

    /// Append a row with one handle per live column
    pub fn add_row(&mut self) -> Result<()> {
        let needed = self.columns as usize - self.dead_columns.len();
        self.ensure_capacity(needed)?;

        let mut row = Row::with_capacity(self.columns as usize);
        for column in 0..self.columns {
            if self.dead_columns.contains(&column) {
                row.push(DataHandle::INVALID);
            } else {
                row.push(self.new_handle()?);
            }
        }
        self.rows.push(Some(row));
        Ok(())
    }

    /// Append a column to every live row
    pub fn add_column(&mut self) -> Result<()> {
        let needed = self.live_row_count();
        self.ensure_capacity(needed)?;

        for index in 0..self.rows.len() {
            if self.rows[index].is_none() {
                continue;
            }
            let handle = self.new_handle()?;
            if let Some(row) = self.rows[index].as_mut() {
                row.push(handle);
            }
        }
        self.columns += 1;
        Ok(())
    }

    /// Delete a row, recycling all of its handles. The position stays reserved.
    pub fn delete_row(&mut self, index: u32) -> Result<()> {
        let row = self
            .rows
            .get_mut(index as usize)
            .and_then(Option::take)
            .ok_or_else(|| {
                TableError::invalid_operation(format!("row {} is not a live row", index))
            })?;

        for handle in row {
            self.release(handle)?;
        }
        Ok(())
    }

    /// Delete a column, recycling its handle in every live row
    pub fn delete_column(&mut self, index: u32) -> Result<()> {
        if index >= self.columns || self.dead_columns.contains(&index) {
            return Err(TableError::invalid_operation(format!(
                "column {} is not a live column",
                index
            )));
        }

        for position in 0..self.rows.len() {
            let handle = match self.rows[position].as_mut() {
                Some(row) => std::mem::replace(&mut row[index as usize], DataHandle::INVALID),
                None => continue,
            };
            self.release(handle)?;
        }
        self.dead_columns.insert(index);
        Ok(())
    }

    /// Record at a grid position, if the position holds data
    pub fn get(&self, row: u32, column: u32) -> Option<&[u8]> {
        self.handle_at(row, column)
            .and_then(|handle| self.get_by_handle(handle))
    }

    /// Mutable record at a grid position
    pub fn get_mut(&mut self, row: u32, column: u32) -> Option<&mut [u8]> {
        let handle = self.handle_at(row, column)?;
        self.get_by_handle_mut(handle)
    }

    /// Record for a handle
    pub fn get_by_handle(&self, handle: DataHandle) -> Option<&[u8]> {
        if !handle.is_valid() {
            return None;
        }
        self.datablocks
            .get(handle.block() as usize)
            .and_then(|block| block.record(handle.slot()))
    }

    /// Mutable record for a handle
    pub fn get_by_handle_mut(&mut self, handle: DataHandle) -> Option<&mut [u8]> {
        if !handle.is_valid() {
            return None;
        }
        self.datablocks
            .get_mut(handle.block() as usize)
            .and_then(|block| block.record_mut(handle.slot()))
    }

    /// Handle stored at a grid position. `None` for deleted rows and out of
    /// range positions; dead columns yield [`DataHandle::INVALID`].
    pub fn handle_at(&self, row: u32, column: u32) -> Option<DataHandle> {
        self.rows
            .get(row as usize)?
            .as_ref()?
            .get(column as usize)
            .copied()
    }

    /// Every record in a row, skipping dead columns
    pub fn row_data(&self, row: u32) -> Vec<&[u8]> {
        match self.rows.get(row as usize).and_then(Option::as_ref) {
            Some(handles) => handles
                .iter()
                .filter_map(|&handle| self.get_by_handle(handle))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Copy one cell's record over another's
    pub fn copy_record(&mut self, from: (u32, u32), to: (u32, u32)) -> Result<()> {
        let source = self
            .get(from.0, from.1)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                TableError::invalid_operation(format!("no record at {:?}", from))
            })?;
        let record = self.record.clone();
        let target = self.get_mut(to.0, to.1).ok_or_else(|| {
            TableError::invalid_operation(format!("no record at {:?}", to))
        })?;
        record.copy_one(target, &source);
        Ok(())
    }

    /// Compare two cells with the record type's equality
    pub fn records_equal(&self, a: (u32, u32), b: (u32, u32)) -> Option<bool> {
        let left = self.get(a.0, a.1)?;
        let right = self.get(b.0, b.1)?;
        Some(self.record.deep_equals(left, right))
    }

    /// Release datablocks that hold no live records.
    ///
    /// Returns the number of datablocks released.
    pub fn garbage_collect(&mut self) -> usize {
        let released = self
            .datablocks
            .iter_mut()
            .map(Datablock::garbage_collect)
            .filter(|&released| released)
            .count();
        if released > 0 {
            debug!(record_type = self.record.name(), released, "page garbage collected");
        }
        released
    }

    /// Rows (deleted included) and columns (dead included)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.rows.len() as u32, self.columns)
    }

    pub fn record_type(&self) -> &RecordTypeRef {
        &self.record
    }

    pub fn record_name(&self) -> &str {
        self.record.name()
    }

    pub fn record_size(&self) -> usize {
        self.record.size()
    }

    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    pub fn is_row_live(&self, row: u32) -> bool {
        matches!(self.rows.get(row as usize), Some(Some(_)))
    }

    pub fn is_column_dead(&self, column: u32) -> bool {
        self.dead_columns.contains(&column)
    }

    /// Dead column positions in ascending order
    pub fn dead_columns(&self) -> impl Iterator<Item = u32> + '_ {
        self.dead_columns.iter().copied()
    }

    pub fn live_row_count(&self) -> usize {
        self.rows.iter().filter(|row| row.is_some()).count()
    }

    pub fn datablock_count(&self) -> usize {
        self.datablocks.len()
    }

    /// Total slots across all datablocks
    pub fn capacity(&self) -> usize {
        self.datablocks
            .iter()
            .map(|block| block.capacity() as usize)
            .sum()
    }

    /// Records currently referenced by the grid
    pub fn live_records(&self) -> usize {
        self.datablocks
            .iter()
            .map(|block| block.live_count() as usize)
            .sum()
    }

    /// Commit enough datablocks for `capacity` more records, full blocks first.
    /// The first new block becomes the allocation fast path.
    fn allocate_blocks(&mut self, capacity: u32) -> Result<()> {
        let full_blocks = capacity / MAX_DATABLOCK_CAPACITY;
        let remainder = capacity % MAX_DATABLOCK_CAPACITY;

        self.current = self.datablocks.len();

        for _ in 0..full_blocks {
            self.datablocks
                .push(Datablock::new(self.record.clone(), MAX_DATABLOCK_CAPACITY, true)?);
        }
        if remainder > 0 {
            self.datablocks
                .push(Datablock::new(self.record.clone(), remainder, true)?);
        }

        debug!(
            record_type = self.record.name(),
            capacity,
            datablocks = self.datablocks.len(),
            "page datablocks allocated"
        );
        Ok(())
    }

    /// Fail up front when a fixed page cannot supply `needed` handles, so a
    /// structural edit never stops half-way.
    fn ensure_capacity(&self, needed: usize) -> Result<()> {
        if !self.mode.is_fixed() {
            return Ok(());
        }
        let available: usize = self
            .datablocks
            .iter()
            .map(|block| block.available_slots() as usize)
            .sum();
        if needed > available {
            return Err(TableError::CapacityExhausted {
                record_type: self.record.name().to_string(),
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    fn find_available_handle(&mut self) -> Option<DataHandle> {
        if let Some(slot) = self
            .datablocks
            .get_mut(self.current)
            .and_then(Datablock::new_slot)
        {
            return Some(DataHandle::pack(self.current as u32, slot));
        }

        for (index, block) in self.datablocks.iter_mut().enumerate() {
            if let Some(slot) = block.new_slot() {
                self.current = index;
                return Some(DataHandle::pack(index as u32, slot));
            }
        }
        None
    }

    fn new_handle(&mut self) -> Result<DataHandle> {
        if let Some(handle) = self.find_available_handle() {
            return Ok(handle);
        }

        if self.mode.is_fixed() {
            return Err(TableError::CapacityExhausted {
                record_type: self.record.name().to_string(),
                capacity: self.capacity(),
            });
        }

        self.allocate_blocks(MAX_DATABLOCK_CAPACITY)?;
        self.find_available_handle().ok_or_else(|| {
            TableError::corruption(format!(
                "no handle available for '{}' after growing the page",
                self.record.name()
            ))
        })
    }

    fn release(&mut self, handle: DataHandle) -> Result<()> {
        if !handle.is_valid() {
            return Ok(());
        }
        let block = self
            .datablocks
            .get_mut(handle.block() as usize)
            .ok_or_else(|| {
                TableError::corruption(format!("handle {} points past the last datablock", handle))
            })?;
        block.recycle(handle.slot())
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("record_type", &self.record.name())
            .field("rows", &self.rows.len())
            .field("columns", &self.columns)
            .field("dead_columns", &self.dead_columns)
            .field("mode", &self.mode)
            .field("datablocks", &self.datablocks.len())
            .finish()
    }
}
