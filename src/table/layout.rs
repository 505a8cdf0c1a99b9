//! Structure summaries for tooling.

use super::{Table, TableState};
use crate::error::Result;
use crate::types::{AllocationMode, Axis, LinearColor, Tag, TagIndex};
use serde::{Deserialize, Serialize};

/// One row or column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisEntry {
    pub tag: Tag,
    pub index: u32,
    /// Nesting depth, 1 for top-level tags
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<LinearColor>,
}

/// Memory use of one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLayout {
    pub record_type: String,
    pub record_size: usize,
    /// Grid extents, deleted rows and dead columns included
    pub rows: u32,
    pub columns: u32,
    pub dead_columns: Vec<u32>,
    pub datablocks: usize,
    pub capacity: usize,
    pub live_records: usize,
    pub links: usize,
}

/// Export of a table's structure, without record contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableLayout {
    pub description: String,
    pub mode: AllocationMode,
    pub state: TableState,
    pub has_loading_errors: bool,
    pub rows: Vec<AxisEntry>,
    pub columns: Vec<AxisEntry>,
    pub pages: Vec<PageLayout>,
}

/// Table statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    /// Live rows
    pub rows: usize,
    /// Live columns
    pub columns: usize,
    pub pages: usize,
    pub datablocks: usize,
    /// Records referenced by live cells across all pages
    pub live_records: usize,
    pub has_loading_errors: bool,
}

impl Table {
    pub fn stats(&self) -> TableStats {
        TableStats {
            rows: self.row_count(),
            columns: self.column_count(),
            pages: self.pages.len(),
            datablocks: self.pages.iter().map(|page| page.datablock_count()).sum(),
            live_records: self.pages.iter().map(|page| page.live_records()).sum(),
            has_loading_errors: self.loading_errors,
        }
    }

    /// Export the table structure
    pub fn layout(&self) -> TableLayout {
        TableLayout {
            description: self.description.clone(),
            mode: self.mode,
            state: self.state,
            has_loading_errors: self.loading_errors,
            rows: self.axis_entries(Axis::Row),
            columns: self.axis_entries(Axis::Column),
            pages: self
                .pages
                .iter()
                .map(|page| {
                    let (rows, columns) = page.dimensions();
                    PageLayout {
                        record_type: page.record_name().to_string(),
                        record_size: page.record_size(),
                        rows,
                        columns,
                        dead_columns: page.dead_columns().collect(),
                        datablocks: page.datablock_count(),
                        capacity: page.capacity(),
                        live_records: page.live_records(),
                        links: self.inheritance_links(page.record_name()).count(),
                    }
                })
                .collect(),
        }
    }

    /// Export the table structure as pretty-printed JSON
    pub fn layout_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.layout())?)
    }

    fn axis_entries(&self, axis: Axis) -> Vec<AxisEntry> {
        self.resolver(axis)
            .entries_by_index()
            .into_iter()
            .map(|(tag, index): (Tag, TagIndex)| AxisEntry {
                depth: tag.depth(),
                color: self.tag_color(&tag, axis),
                index: index.value(),
                tag,
            })
            .collect()
    }
}
