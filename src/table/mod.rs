//! Tables: taxonomy-indexed grids of record pages.
//!
//! A [`Table`] resolves row and column tags to indices, keeps one [`Page`] per
//! registered record type, and fans structural edits out to every page.
//! Queries are taxonomic: with `exact == false` a tag that is not registered
//! falls back to its closest registered ancestor, so `combat.melee.sword`
//! reads the `combat.melee` row when no more specific row exists.
//!
//! Index values are only stable within a session. Deleting a tag leaves a
//! hole in every page (a deleted row or a dead column) and the index is never
//! handed out again; saving and loading renumbers everything to `0..N-1`.

mod format;
mod layout;

pub use layout::{AxisEntry, PageLayout, TableLayout, TableStats};

use crate::error::{Result, TableError};
use crate::index::TagIndexMap;
use crate::page::Page;
use crate::record::RecordTypeRef;
use crate::types::{
    AllocationMode, Axis, Cell, CellTags, LinearColor, PaletteCursor, Tag, TagIndex,
};
use crate::TableConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, error, info, warn};

/// Lifecycle of a table instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableState {
    /// Freshly created or cleared
    Empty,
    /// A stream is being read
    Loading,
    /// Usable; check [`Table::has_loading_errors`] after a load
    Ready,
}

/// What a table knows about a cell's inheritance link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing recorded for the cell
    Unknown,
    /// The cell was explicitly unlinked
    Unlinked,
    /// The cell inherits from this parent cell
    Linked(CellTags),
}

/// Cell key to parent cell, for one record type
type InheritanceMap = BTreeMap<String, CellTags>;

/// A sparse, taxonomy-indexed table of records
pub struct Table {
    /// Free-form notes about the table's contents
    pub description: String,
    /// Row tags in index order, refreshed on save and consumed on load
    pub row_tags: Vec<Tag>,
    /// Column tags in index order, refreshed on save and consumed on load
    pub column_tags: Vec<Tag>,
    record_types: Vec<RecordTypeRef>,
    rows: TagIndexMap,
    columns: TagIndexMap,
    row_colors: BTreeMap<Tag, LinearColor>,
    column_colors: BTreeMap<Tag, LinearColor>,
    /// One page per registered record type
    pages: Vec<Page>,
    /// Inheritance maps keyed by record type name
    inheritance: BTreeMap<String, InheritanceMap>,
    mode: AllocationMode,
    state: TableState,
    loading_errors: bool,
}

impl Table {
    /// Create an empty table
    pub fn new(config: &TableConfig) -> Self {
        Self {
            description: config.description.clone(),
            row_tags: Vec::new(),
            column_tags: Vec::new(),
            record_types: Vec::new(),
            rows: TagIndexMap::new(),
            columns: TagIndexMap::new(),
            row_colors: BTreeMap::new(),
            column_colors: BTreeMap::new(),
            pages: Vec::new(),
            inheritance: BTreeMap::new(),
            mode: config.mode,
            state: TableState::Empty,
            loading_errors: false,
        }
    }

    pub fn mode(&self) -> AllocationMode {
        self.mode
    }

    /// Change the allocation mode. Only allowed before any page exists.
    pub fn set_mode(&mut self, mode: AllocationMode) -> Result<()> {
        if mode != self.mode && !self.pages.is_empty() {
            return Err(TableError::invalid_operation(
                "allocation mode cannot change once pages are allocated",
            ));
        }
        self.mode = mode;
        Ok(())
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    /// True if the last load hit problems. The table is usable, but its
    /// contents may not match what was saved.
    pub fn has_loading_errors(&self) -> bool {
        self.loading_errors
    }

    /// Drop every row, column, page, color and link and reset index counters.
    /// Registered record types and the ordered tag arrays are kept.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.rows.clear();
        self.columns.clear();
        self.row_colors.clear();
        self.column_colors.clear();
        self.inheritance.clear();
        self.state = TableState::Empty;
        self.loading_errors = false;
    }

    // Record types
    //////////////////////////////////////////////////////////////////////////

    /// Registered record types, in registration order
    pub fn record_types(&self) -> &[RecordTypeRef] {
        &self.record_types
    }

    pub fn record_type(&self, name: &str) -> Option<&RecordTypeRef> {
        self.record_types.iter().find(|record| record.name() == name)
    }

    /// Replace the registered record types and reconcile pages with them
    pub fn set_record_types(&mut self, record_types: Vec<RecordTypeRef>) -> Result<()> {
        let mut unique: Vec<RecordTypeRef> = Vec::with_capacity(record_types.len());
        for record in record_types {
            if unique.iter().any(|known| known.name() == record.name()) {
                warn!(record_type = record.name(), "duplicate record type ignored");
                continue;
            }
            unique.push(record);
        }
        self.record_types = unique;
        self.reconcile_pages()
    }

    /// Register one more record type. Returns false if the name is taken.
    pub fn add_record_type(&mut self, record: RecordTypeRef) -> Result<bool> {
        if self.record_type(record.name()).is_some() {
            return Ok(false);
        }
        self.record_types.push(record);
        self.reconcile_pages()?;
        Ok(true)
    }

    /// Deregister a record type and drop its page
    pub fn remove_record_type(&mut self, name: &str) -> Result<bool> {
        let Some(position) = self.record_types.iter().position(|r| r.name() == name) else {
            return Ok(false);
        };
        self.record_types.remove(position);
        self.reconcile_pages()?;
        Ok(true)
    }

    /// Bring the page set in line with the registered record types, keeping the
    /// extents of existing pages (deleted rows and dead columns included).
    fn reconcile_pages(&mut self) -> Result<()> {
        let (rows, columns) = match self.pages.first() {
            Some(page) => page.dimensions(),
            None => (self.rows.next_index(), self.columns.next_index()),
        };
        self.allocate_page_memory(rows, columns)
    }

    /// Add a `rows` x `columns` page for every registered record type without
    /// one, and drop pages whose record type is no longer registered.
    ///
    /// Positions that are not live in the row or column index are deleted from
    /// new pages straight away, so every page shares the same holes.
    pub fn allocate_page_memory(&mut self, rows: u32, columns: u32) -> Result<()> {
        let missing: Vec<RecordTypeRef> = self
            .record_types
            .iter()
            .filter(|record| self.page(record.name()).is_none())
            .cloned()
            .collect();

        for record in missing {
            let mut page = Page::new(record, rows, columns, self.mode)?;
            self.mirror_deletions(&mut page)?;
            info!(
                record_type = page.record_name(),
                rows, columns, "page allocated"
            );
            self.pages.push(page);
        }

        let record_types = &self.record_types;
        self.pages.retain(|page| {
            let keep = record_types
                .iter()
                .any(|record| record.name() == page.record_name());
            if !keep {
                info!(record_type = page.record_name(), "page dropped");
            }
            keep
        });

        if !self.pages.is_empty() && self.state == TableState::Empty {
            self.state = TableState::Ready;
        }
        Ok(())
    }

    fn mirror_deletions(&self, page: &mut Page) -> Result<()> {
        let (rows, columns) = page.dimensions();

        let live_rows: HashSet<u32> = self
            .rows
            .entries_by_index()
            .into_iter()
            .map(|(_, index)| index.value())
            .collect();
        for row in 0..rows {
            if !live_rows.contains(&row) && page.is_row_live(row) {
                page.delete_row(row)?;
            }
        }

        let live_columns: HashSet<u32> = self
            .columns
            .entries_by_index()
            .into_iter()
            .map(|(_, index)| index.value())
            .collect();
        for column in 0..columns {
            if !live_columns.contains(&column) && !page.is_column_dead(column) {
                page.delete_column(column)?;
            }
        }
        Ok(())
    }

    // Pages
    //////////////////////////////////////////////////////////////////////////

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, record_type: &str) -> Option<&Page> {
        self.pages
            .iter()
            .find(|page| page.record_name() == record_type)
    }

    pub fn page_mut(&mut self, record_type: &str) -> Option<&mut Page> {
        self.pages
            .iter_mut()
            .find(|page| page.record_name() == record_type)
    }

    /// Release datablocks that no longer hold live records, across all pages
    pub fn garbage_collect(&mut self) -> usize {
        self.pages.iter_mut().map(Page::garbage_collect).sum()
    }

    // Indexing
    //////////////////////////////////////////////////////////////////////////

    pub fn rows(&self) -> &TagIndexMap {
        &self.rows
    }

    pub fn columns(&self) -> &TagIndexMap {
        &self.columns
    }

    /// Live row count
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Live column count
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Index of a row, or its closest registered ancestor if `exact` is false
    pub fn row_index(&self, tag: &Tag, exact: bool) -> TagIndex {
        self.rows.resolve(tag, exact)
    }

    /// Index of a column, or its closest registered ancestor if `exact` is false
    pub fn column_index(&self, tag: &Tag, exact: bool) -> TagIndex {
        self.columns.resolve(tag, exact)
    }

    fn resolver(&self, axis: Axis) -> &TagIndexMap {
        match axis {
            Axis::Row => &self.rows,
            Axis::Column => &self.columns,
        }
    }

    fn resolver_mut(&mut self, axis: Axis) -> &mut TagIndexMap {
        match axis {
            Axis::Row => &mut self.rows,
            Axis::Column => &mut self.columns,
        }
    }

    /// Resolve both tags of a cell, logging whichever side misses
    pub fn resolve_cell(&self, cell: &CellTags, exact: bool) -> Result<Cell> {
        let row = self.rows.resolve(&cell.row, exact);
        if !row.is_valid() {
            error!(tag = %cell.row, exact, "row tag did not resolve");
            return Err(TableError::TagNotFound(cell.row.to_string()));
        }
        let column = self.columns.resolve(&cell.column, exact);
        if !column.is_valid() {
            error!(tag = %cell.column, exact, "column tag did not resolve");
            return Err(TableError::TagNotFound(cell.column.to_string()));
        }
        Ok(Cell::new(row, column))
    }

    // Cell access
    //////////////////////////////////////////////////////////////////////////

    /// Record of one type at a resolved cell
    pub fn cell_data(&self, cell: Cell, record_type: &str) -> Option<&[u8]> {
        if !cell.is_valid() {
            return None;
        }
        self.page(record_type)?
            .get(cell.row.value(), cell.column.value())
    }

    /// Mutable record of one type at a resolved cell
    pub fn cell_data_mut(&mut self, cell: Cell, record_type: &str) -> Option<&mut [u8]> {
        if !cell.is_valid() {
            return None;
        }
        self.page_mut(record_type)?
            .get_mut(cell.row.value(), cell.column.value())
    }

    /// Records of one type across a row's live columns
    pub fn row_data(&self, row: TagIndex, record_type: &str) -> Vec<&[u8]> {
        if !row.is_valid() {
            return Vec::new();
        }
        self.page(record_type)
            .map(|page| page.row_data(row.value()))
            .unwrap_or_default()
    }

    /// Fetch the records of every requested type at a cell.
    ///
    /// All or nothing: if any requested type has no page or no data at the
    /// resolved cell, the whole query fails. Records come back in the order of
    /// `record_types`.
    pub fn query(
        &self,
        cell: &CellTags,
        exact: bool,
        record_types: &[&str],
    ) -> Result<Vec<&[u8]>> {
        let resolved = self.resolve_cell(cell, exact)?;

        let mut records = Vec::with_capacity(record_types.len());
        let mut first_miss = None;
        for &record_type in record_types {
            match self.cell_data(resolved, record_type) {
                Some(record) => records.push(record),
                None => {
                    error!(
                        record_type,
                        cell = %cell,
                        "query requested a record type with no data at this cell"
                    );
                    first_miss.get_or_insert(record_type);
                }
            }
        }

        if let Some(record_type) = first_miss {
            return Err(TableError::RecordMiss {
                record_type: record_type.to_string(),
                location: cell.to_string(),
            });
        }
        Ok(records)
    }

    /// Fetch, for every requested type, the records across a whole row
    pub fn query_for_row(
        &self,
        row: &Tag,
        exact: bool,
        record_types: &[&str],
    ) -> Result<Vec<Vec<&[u8]>>> {
        let index = self.rows.resolve(row, exact);
        if !index.is_valid() {
            error!(tag = %row, exact, "row tag did not resolve");
            return Err(TableError::TagNotFound(row.to_string()));
        }

        let mut results = Vec::with_capacity(record_types.len());
        let mut first_miss = None;
        for &record_type in record_types {
            let records = self.row_data(index, record_type);
            if records.is_empty() {
                error!(
                    record_type,
                    row = %row,
                    "row query requested a record type with no data in this row"
                );
                first_miss.get_or_insert(record_type);
            } else {
                results.push(records);
            }
        }

        if let Some(record_type) = first_miss {
            return Err(TableError::RecordMiss {
                record_type: record_type.to_string(),
                location: format!("row {}", row),
            });
        }
        Ok(results)
    }

    /// Mutable record of one type at an exactly matched cell
    pub fn query_mut(&mut self, cell: &CellTags, record_type: &str) -> Result<&mut [u8]> {
        let resolved = self.resolve_cell(cell, true)?;
        self.cell_data_mut(resolved, record_type)
            .ok_or_else(|| TableError::RecordMiss {
                record_type: record_type.to_string(),
                location: cell.to_string(),
            })
    }

    /// Copy one cell's record over another's (both matched exactly)
    pub fn copy_cell(&mut self, record_type: &str, from: &CellTags, to: &CellTags) -> Result<()> {
        let source = self.resolve_cell(from, true)?;
        let target = self.resolve_cell(to, true)?;
        let page = self
            .page_mut(record_type)
            .ok_or_else(|| TableError::UnknownRecordType(record_type.to_string()))?;
        page.copy_record(
            (source.row.value(), source.column.value()),
            (target.row.value(), target.column.value()),
        )
    }

    // Structural edits
    //////////////////////////////////////////////////////////////////////////

    /// Add a row and any missing ancestor rows. Returns false if the tag is
    /// already a row or is invalid.
    pub fn add_row(&mut self, tag: &Tag) -> Result<bool> {
        self.add_entry(Axis::Row, tag)
    }

    /// Add a column and any missing ancestor columns. Returns false if the tag
    /// is already a column or is invalid.
    pub fn add_column(&mut self, tag: &Tag) -> Result<bool> {
        self.add_entry(Axis::Column, tag)
    }

    /// Delete a single row. Returns false if the tag is not a row.
    pub fn delete_row(&mut self, tag: &Tag) -> Result<bool> {
        self.delete_entry(Axis::Row, tag)
    }

    /// Delete a single column. Returns false if the tag is not a column.
    pub fn delete_column(&mut self, tag: &Tag) -> Result<bool> {
        self.delete_entry(Axis::Column, tag)
    }

    /// Delete a tag together with all of its descendants, deepest first.
    /// Returns how many rows or columns were deleted.
    pub fn delete_subtree(&mut self, axis: Axis, tag: &Tag) -> Result<usize> {
        let mut doomed: Vec<Tag> = self
            .resolver(axis)
            .tags_by_index()
            .into_iter()
            .filter(|candidate| tag.is_ancestor_or_self_of(candidate))
            .collect();
        doomed.sort_by_key(|candidate| std::cmp::Reverse(candidate.depth()));

        let mut deleted = 0;
        for candidate in &doomed {
            if self.delete_entry(axis, candidate)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn add_entry(&mut self, axis: Axis, tag: &Tag) -> Result<bool> {
        if !tag.is_valid() || self.resolver(axis).contains(tag) {
            return Ok(false);
        }
        if self.mode.is_fixed() {
            return Err(TableError::invalid_operation(format!(
                "cannot add {} '{}' to a fixed-mode table",
                axis, tag
            )));
        }

        let added = self.resolver_mut(axis).register(tag);
        for (new_tag, index) in &added {
            for page in &mut self.pages {
                match axis {
                    Axis::Row => page.add_row()?,
                    Axis::Column => page.add_column()?,
                }
            }
            debug!(axis = %axis, tag = %new_tag, index = index.value(), "tag registered");
        }

        self.state = TableState::Ready;
        Ok(true)
    }

    fn delete_entry(&mut self, axis: Axis, tag: &Tag) -> Result<bool> {
        let Some(index) = self.resolver_mut(axis).remove(tag) else {
            return Ok(false);
        };

        for page in &mut self.pages {
            match axis {
                Axis::Row => page.delete_row(index.value())?,
                Axis::Column => page.delete_column(index.value())?,
            }
        }
        self.colors_mut(axis).remove(tag);

        debug!(axis = %axis, tag = %tag, index = index.value(), "tag deleted");
        Ok(true)
    }

    // Colors
    //////////////////////////////////////////////////////////////////////////

    fn colors(&self, axis: Axis) -> &BTreeMap<Tag, LinearColor> {
        match axis {
            Axis::Row => &self.row_colors,
            Axis::Column => &self.column_colors,
        }
    }

    fn colors_mut(&mut self, axis: Axis) -> &mut BTreeMap<Tag, LinearColor> {
        match axis {
            Axis::Row => &mut self.row_colors,
            Axis::Column => &mut self.column_colors,
        }
    }

    pub fn set_tag_color(&mut self, tag: &Tag, color: LinearColor, axis: Axis) {
        self.colors_mut(axis).insert(tag.clone(), color);
    }

    pub fn tag_color(&self, tag: &Tag, axis: Axis) -> Option<LinearColor> {
        self.colors(axis).get(tag).copied()
    }

    /// Keep a tag's existing color, or give it the next palette color
    pub fn assign_tag_color(
        &mut self,
        tag: &Tag,
        axis: Axis,
        cursor: &mut PaletteCursor,
    ) -> LinearColor {
        if let Some(color) = self.tag_color(tag, axis) {
            return color;
        }
        let color = cursor.next_color();
        self.set_tag_color(tag, color, axis);
        color
    }

    // Inheritance links
    //////////////////////////////////////////////////////////////////////////

    /// Record that `child` inherits `record_type` data from `parent`
    pub fn set_inheritance_link(&mut self, record_type: &str, child: &CellTags, parent: CellTags) {
        self.inheritance
            .entry(record_type.to_string())
            .or_default()
            .insert(child.cell_key(), parent);
    }

    /// Raw link target for a cell. Unlinked cells yield [`CellTags::unlinked`].
    pub fn inheritance_link(&self, record_type: &str, child: &CellTags) -> Option<&CellTags> {
        self.inheritance
            .get(record_type)
            .and_then(|links| links.get(&child.cell_key()))
    }

    pub fn link_state(&self, record_type: &str, child: &CellTags) -> LinkState {
        match self.inheritance_link(record_type, child) {
            None => LinkState::Unknown,
            Some(parent) if !parent.is_valid() => LinkState::Unlinked,
            Some(parent) => LinkState::Linked(parent.clone()),
        }
    }

    /// Mark a cell as explicitly not linked
    pub fn remove_inheritance_link(&mut self, record_type: &str, child: &CellTags) {
        self.set_inheritance_link(record_type, child, CellTags::unlinked());
    }

    /// Every recorded link for a record type, by cell key
    pub fn inheritance_links(&self, record_type: &str) -> impl Iterator<Item = (&str, &CellTags)> {
        self.inheritance
            .get(record_type)
            .into_iter()
            .flat_map(|links| links.iter().map(|(key, parent)| (key.as_str(), parent)))
    }

    // Comparison
    //////////////////////////////////////////////////////////////////////////

    /// Same tags in the same order and equal records in every page
    pub fn content_equals(&self, other: &Table) -> bool {
        let rows = self.rows.entries_by_index();
        let other_rows = other.rows.entries_by_index();
        let columns = self.columns.entries_by_index();
        let other_columns = other.columns.entries_by_index();

        let same_tags = |a: &[(Tag, TagIndex)], b: &[(Tag, TagIndex)]| {
            a.len() == b.len() && a.iter().zip(b).all(|((x, _), (y, _))| x == y)
        };
        if !same_tags(&rows, &other_rows) || !same_tags(&columns, &other_columns) {
            return false;
        }
        if self.pages.len() != other.pages.len() {
            return false;
        }

        self.pages.iter().all(|page| {
            let Some(other_page) = other.page(page.record_name()) else {
                return false;
            };
            let record = page.record_type();
            rows.iter().zip(&other_rows).all(|((_, r), (_, other_r))| {
                columns.iter().zip(&other_columns).all(|((_, c), (_, other_c))| {
                    match (
                        page.get(r.value(), c.value()),
                        other_page.get(other_r.value(), other_c.value()),
                    ) {
                        (Some(a), Some(b)) => record.deep_equals(a, b),
                        (None, None) => true,
                        _ => false,
                    }
                })
            })
        })
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("rows", &self.rows.len())
            .field("columns", &self.columns.len())
            .field("pages", &self.pages)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("loading_errors", &self.loading_errors)
            .finish()
    }
}
