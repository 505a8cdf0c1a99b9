//! Versioned table stream.
//!
//! ```text
//! u32  format version
//! i32  page count
//!      per page: type name, i32 record size (v4+), then one record per
//!      live row x live column, both in index order
//! i32  row color count, then (tag, f32 r, g, b, a) per color
//! i32  column color count, same layout
//! i32  page count
//!      per page: type name, i32 link count, then (cell key, parent row tag,
//!      parent column tag) per link
//! ```
//!
//! Row and column tags are not part of the stream. They travel separately in
//! [`Table::row_tags`] and [`Table::column_tags`], which [`Table::save`]
//! refreshes and [`Table::load`] consumes.

use super::{Table, TableState};
use crate::error::{Result, TableError};
use crate::page::Page;
use crate::record::RecordTypeRef;
use crate::storage::codec::{
    read_count, read_f32, read_string, read_u32, write_count, write_f32, write_string, write_u32,
};
use crate::types::{
    Axis, CellTags, LinearColor, Tag, FORMAT_VERSION, MIN_SUPPORTED_FORMAT_VERSION,
};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use tracing::{error, info, warn};

impl Table {
    /// Refresh the ordered tag arrays from the resolvers
    pub fn pre_save(&mut self) {
        self.row_tags = self.rows.tags_by_index();
        self.column_tags = self.columns.tags_by_index();
    }

    /// Write the table stream. Only registered record types with a page are
    /// written.
    pub fn save(&mut self, w: &mut dyn Write) -> Result<()> {
        self.pre_save();

        write_u32(w, FORMAT_VERSION)?;

        let pages: Vec<&Page> = self
            .record_types
            .iter()
            .filter_map(|record| self.page(record.name()))
            .collect();

        write_count(w, pages.len(), "page")?;
        for page in &pages {
            write_string(w, page.record_name())?;
            write_count(w, page.record_size(), "record byte")?;
            self.save_page(w, page)?;
        }

        write_colors(w, &self.row_colors)?;
        write_colors(w, &self.column_colors)?;

        write_count(w, pages.len(), "page")?;
        for page in &pages {
            write_string(w, page.record_name())?;
            let links = self.inheritance.get(page.record_name());
            write_count(w, links.map_or(0, BTreeMap::len), "link")?;
            for (key, parent) in links.into_iter().flatten() {
                write_string(w, key)?;
                write_string(w, parent.row.as_str())?;
                write_string(w, parent.column.as_str())?;
            }
        }
        Ok(())
    }

    fn save_page(&self, w: &mut dyn Write, page: &Page) -> Result<()> {
        let record = page.record_type();
        let columns = self.columns.entries_by_index();
        for (row_tag, row) in self.rows.entries_by_index() {
            for (column_tag, column) in &columns {
                let data = page.get(row.value(), column.value()).ok_or_else(|| {
                    error!(
                        record_type = record.name(),
                        row = %row_tag,
                        column = %column_tag,
                        "missing memory location for a live cell"
                    );
                    TableError::corruption(format!(
                        "no {} record at {}|{}",
                        record.name(),
                        row_tag,
                        column_tag
                    ))
                })?;
                record.serialize_one(w, data)?;
            }
        }
        Ok(())
    }

    /// Replace the table's contents with a stream.
    ///
    /// Recoverable problems (duplicate tags, orphaned tags, bad colors) are
    /// logged and flag [`Table::has_loading_errors`]; the rest of the stream
    /// still loads. Schema mismatches and malformed streams abort with an
    /// error, also flagged. Either way the table ends up `Ready`.
    pub fn load(&mut self, r: &mut dyn Read) -> Result<()> {
        self.clear();
        self.state = TableState::Loading;

        let result = self.load_stream(r);
        if let Err(err) = &result {
            error!(error = %err, "table load aborted");
            self.loading_errors = true;

            // Whatever was read stays, but every registered type keeps a page
            if let Err(err) = self.reconcile_pages() {
                error!(error = %err, "could not allocate pages after an aborted load");
            }
        }

        self.state = TableState::Ready;
        result
    }

    fn load_stream(&mut self, r: &mut dyn Read) -> Result<()> {
        let version = read_u32(r)?;
        if !(MIN_SUPPORTED_FORMAT_VERSION..=FORMAT_VERSION).contains(&version) {
            error!(
                found = version,
                current = FORMAT_VERSION,
                "unsupported table format version"
            );
            return Err(TableError::UnsupportedVersion {
                found: version,
                current: FORMAT_VERSION,
            });
        }
        if version < FORMAT_VERSION {
            info!(
                from = version,
                to = FORMAT_VERSION,
                "upgrading table stream to the current format"
            );
        }

        self.register_stored_tags(Axis::Row);
        self.register_stored_tags(Axis::Column);

        let rows = self.rows.next_index();
        let columns = self.columns.next_index();

        let page_count = read_count(r, "page")?;
        for _ in 0..page_count {
            let name = read_string(r)?;
            let record = self.record_type(&name).cloned().ok_or_else(|| {
                error!(record_type = %name, "stream contains an unregistered record type");
                TableError::UnknownRecordType(name.clone())
            })?;

            let stored_size = if version >= 4 {
                read_count(r, "record byte")?
            } else {
                record.size()
            };
            if stored_size != record.size() {
                warn!(
                    record_type = %name,
                    stored = stored_size,
                    current = record.size(),
                    "record size changed since the table was saved"
                );
            }

            let mut page = Page::new(record.clone(), rows, columns, self.mode)?;
            load_page(r, &mut page, &record, stored_size, (rows, columns))?;
            self.pages.push(page);
        }

        self.row_colors = self.read_colors(r, Axis::Row)?;
        self.column_colors = self.read_colors(r, Axis::Column)?;

        let page_count = read_count(r, "page")?;
        for _ in 0..page_count {
            let name = read_string(r)?;
            let link_count = read_count(r, "link")?;
            for _ in 0..link_count {
                let key = read_string(r)?;
                let row = read_string(r)?;
                let column = read_string(r)?;
                match parse_link_target(&row, &column) {
                    Some(parent) => {
                        self.inheritance
                            .entry(name.clone())
                            .or_default()
                            .insert(key, parent);
                    }
                    None => {
                        warn!(
                            record_type = %name,
                            cell = %key,
                            "skipping inheritance link with a malformed parent"
                        );
                        self.loading_errors = true;
                    }
                }
            }
        }

        self.validate_taxonomy()?;

        // Types registered after the table was saved start from defaults
        let (rows, columns) = match self.pages.first() {
            Some(page) => page.dimensions(),
            None => (rows, columns),
        };
        self.allocate_page_memory(rows, columns)
    }

    /// Register the stored tags for one axis with indices `0..N-1`
    fn register_stored_tags(&mut self, axis: Axis) {
        let tags = match axis {
            Axis::Row => std::mem::take(&mut self.row_tags),
            Axis::Column => std::mem::take(&mut self.column_tags),
        };

        for tag in &tags {
            if self.resolver_mut(axis).insert(tag.clone()).is_none() {
                error!(axis = %axis, tag = %tag, "duplicate or invalid stored tag skipped");
                self.loading_errors = true;
            }
        }

        match axis {
            Axis::Row => self.row_tags = tags,
            Axis::Column => self.column_tags = tags,
        }
    }

    fn read_colors(&mut self, r: &mut dyn Read, axis: Axis) -> Result<BTreeMap<Tag, LinearColor>> {
        let count = read_count(r, "color")?;
        let mut colors = BTreeMap::new();
        for _ in 0..count {
            let name = read_string(r)?;
            let color = LinearColor::new(read_f32(r)?, read_f32(r)?, read_f32(r)?, read_f32(r)?);
            match Tag::new(&name) {
                Ok(tag) => {
                    colors.insert(tag, color);
                }
                Err(_) => {
                    warn!(axis = %axis, tag = %name, "skipping color for a malformed tag");
                    self.loading_errors = true;
                }
            }
        }
        Ok(colors)
    }

    /// Drop every tag whose direct parent is not registered, repeating until
    /// the hierarchy is closed
    fn validate_taxonomy(&mut self) -> Result<()> {
        for axis in [Axis::Row, Axis::Column] {
            loop {
                let orphans = self.resolver(axis).orphans();
                if orphans.is_empty() {
                    break;
                }
                for tag in orphans {
                    error!(axis = %axis, tag = %tag, "tag has no parent, removing it");
                    self.delete_entry(axis, &tag)?;
                    self.loading_errors = true;
                }
            }
        }
        Ok(())
    }
}

/// Read every record of a page. Each record is confined to its stored size:
/// bytes the record type does not consume are skipped, and a record type
/// that grew keeps its defaults for the missing tail.
fn load_page(
    r: &mut dyn Read,
    page: &mut Page,
    record: &RecordTypeRef,
    stored_size: usize,
    (rows, columns): (u32, u32),
) -> Result<()> {
    for row in 0..rows {
        for column in 0..columns {
            let data = page.get_mut(row, column).ok_or_else(|| {
                TableError::corruption(format!(
                    "no {} record at {}x{} while loading",
                    record.name(),
                    row,
                    column
                ))
            })?;
            let mut stored = Read::take(&mut *r, stored_size as u64);
            record.deserialize_one(&mut stored, data)?;
            io::copy(&mut stored, &mut io::sink())?;
            if stored.limit() != 0 {
                return Err(TableError::corruption(format!(
                    "{} record at {}x{} is truncated",
                    record.name(),
                    row,
                    column
                )));
            }
        }
    }
    Ok(())
}

fn write_colors(w: &mut dyn Write, colors: &BTreeMap<Tag, LinearColor>) -> Result<()> {
    write_count(w, colors.len(), "color")?;
    for (tag, color) in colors {
        write_string(w, tag.as_str())?;
        write_f32(w, color.r)?;
        write_f32(w, color.g)?;
        write_f32(w, color.b)?;
        write_f32(w, color.a)?;
    }
    Ok(())
}

/// Parent cells may be unlinked, which is stored as two empty tags
fn parse_link_target(row: &str, column: &str) -> Option<CellTags> {
    let parse = |name: &str| {
        if name.is_empty() {
            Some(Tag::none())
        } else {
            Tag::new(name).ok()
        }
    };
    Some(CellTags::new(parse(row)?, parse(column)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PlainRecord;
    use crate::storage::codec::write_i32;
    use crate::table::LinkState;
    use crate::TableConfig;
    use std::sync::Arc;

    fn tag(name: &str) -> Tag {
        Tag::new(name).unwrap()
    }

    fn cell(row: &str, column: &str) -> CellTags {
        CellTags::parse(row, column).unwrap()
    }

    /// Writes the v3 layout, which predates the per-page record size
    fn save_v3(table: &mut Table, w: &mut dyn Write) -> Result<()> {
        let mut current = Vec::new();
        table.save(&mut current)?;

        let mut r = current.as_slice();
        read_u32(&mut r)?;
        write_u32(w, 3)?;

        let page_count = read_count(&mut r, "page")?;
        write_i32(w, page_count as i32)?;
        for _ in 0..page_count {
            let name = read_string(&mut r)?;
            let size = read_count(&mut r, "record byte")?;
            write_string(w, &name)?;
            let cells = table.row_count() * table.column_count();
            let mut records = vec![0u8; cells * size];
            r.read_exact(&mut records)?;
            w.write_all(&records)?;
        }
        w.write_all(r)?;
        Ok(())
    }

    fn record_types() -> Vec<RecordTypeRef> {
        vec![
            Arc::new(PlainRecord::new("Damage", vec![0, 1]).unwrap()),
            Arc::new(PlainRecord::zeroed("Cost", 4).unwrap()),
        ]
    }

    fn empty_table() -> Table {
        let mut table = Table::new(&TableConfig::new());
        table.set_record_types(record_types()).unwrap();
        table
    }

    fn sample_table() -> Result<Table> {
        let mut table = empty_table();
        table.add_row(&tag("combat.melee"))?;
        table.add_row(&tag("combat.ranged"))?;
        table.add_column(&tag("terrain.grass"))?;
        table.add_column(&tag("terrain.sand"))?;
        table.delete_column(&tag("terrain.sand"))?;

        table
            .query_mut(&cell("combat.ranged", "terrain.grass"), "Damage")?
            .copy_from_slice(&[7, 7]);
        table
            .query_mut(&cell("combat", "terrain"), "Cost")?
            .copy_from_slice(&[1, 2, 3, 4]);
        table.set_tag_color(&tag("combat"), LinearColor::from_rgb8(255, 0, 0), Axis::Row);
        table.set_tag_color(&tag("terrain"), LinearColor::WHITE, Axis::Column);
        table.set_inheritance_link(
            "Damage",
            &cell("combat.ranged", "terrain.grass"),
            cell("combat", "terrain"),
        );
        table.remove_inheritance_link("Cost", &cell("combat.melee", "terrain"));
        Ok(table)
    }

    fn reload(table: &mut Table) -> Result<Table> {
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        let mut restored = empty_table();
        restored.row_tags = table.row_tags.clone();
        restored.column_tags = table.column_tags.clone();
        restored.load(&mut stream.as_slice())?;
        Ok(restored)
    }

    #[test]
    fn test_save_load_roundtrip() -> Result<()> {
        let mut table = sample_table()?;
        let mut restored = reload(&mut table)?;

        // Saving the reloaded table reproduces the stream byte for byte
        let mut original = Vec::new();
        table.save(&mut original)?;
        let mut resaved = Vec::new();
        restored.save(&mut resaved)?;
        assert_eq!(resaved, original);

        assert_eq!(restored.state(), TableState::Ready);
        assert!(!restored.has_loading_errors());
        assert!(restored.content_equals(&table));
        assert_eq!(restored.row_count(), 3);
        assert_eq!(restored.column_count(), 2);

        // Indices are renumbered densely
        assert_eq!(restored.page("Damage").unwrap().dimensions(), (3, 2));
        assert_eq!(
            restored.query(&cell("combat.ranged", "terrain.grass"), true, &["Damage"])?,
            vec![&[7u8, 7][..]]
        );
        assert_eq!(
            restored.tag_color(&tag("combat"), Axis::Row),
            Some(LinearColor::from_rgb8(255, 0, 0))
        );
        assert_eq!(
            restored.link_state("Damage", &cell("combat.ranged", "terrain.grass")),
            LinkState::Linked(cell("combat", "terrain"))
        );
        assert_eq!(
            restored.link_state("Cost", &cell("combat.melee", "terrain")),
            LinkState::Unlinked
        );
        Ok(())
    }

    #[test]
    fn test_save_refreshes_tag_order() -> Result<()> {
        let mut table = sample_table()?;
        table.save(&mut Vec::new())?;
        assert_eq!(
            table.row_tags,
            vec![tag("combat.melee"), tag("combat"), tag("combat.ranged")]
        );
        assert_eq!(table.column_tags, vec![tag("terrain.grass"), tag("terrain")]);
        Ok(())
    }

    #[test]
    fn test_v3_stream_migrates() -> Result<()> {
        let mut table = sample_table()?;
        let mut stream = Vec::new();
        save_v3(&mut table, &mut stream)?;

        let mut restored = empty_table();
        restored.row_tags = table.row_tags.clone();
        restored.column_tags = table.column_tags.clone();
        restored.load(&mut stream.as_slice())?;

        assert!(!restored.has_loading_errors());
        assert!(restored.content_equals(&table));
        Ok(())
    }

    #[test]
    fn test_unsupported_version() -> Result<()> {
        let mut stream = Vec::new();
        write_u32(&mut stream, FORMAT_VERSION + 1)?;

        let mut table = empty_table();
        let err = table.load(&mut stream.as_slice()).unwrap_err();
        assert!(matches!(err, TableError::UnsupportedVersion { found: 5, current: 4 }));
        assert!(table.has_loading_errors());
        assert_eq!(table.state(), TableState::Ready);
        Ok(())
    }

    #[test]
    fn test_unknown_record_type_aborts() -> Result<()> {
        let mut table = sample_table()?;
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        let mut restored = Table::new(&TableConfig::new());
        restored.set_record_types(vec![Arc::new(PlainRecord::zeroed("Cost", 4)?)])?;
        restored.row_tags = table.row_tags.clone();
        restored.column_tags = table.column_tags.clone();

        assert!(matches!(
            restored.load(&mut stream.as_slice()),
            Err(TableError::UnknownRecordType(name)) if name == "Damage"
        ));
        assert!(restored.has_loading_errors());
        Ok(())
    }

    #[test]
    fn test_aborted_load_keeps_a_page_per_record_type() -> Result<()> {
        let mut table = sample_table()?;
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        let mut restored = Table::new(&TableConfig::new());
        restored.set_record_types(vec![Arc::new(PlainRecord::zeroed("Cost", 4)?)])?;
        restored.row_tags = table.row_tags.clone();
        restored.column_tags = table.column_tags.clone();
        assert!(restored.load(&mut stream.as_slice()).is_err());

        assert_eq!(restored.pages().len(), 1);
        assert_eq!(restored.page("Cost").unwrap().dimensions(), (3, 2));
        assert!(restored
            .query(&cell("combat.melee", "terrain.grass"), true, &["Cost"])
            .is_ok());

        // Later edits and saves still carry the page
        restored.add_row(&tag("combat.magic"))?;
        assert!(restored
            .query(&cell("combat.magic", "terrain"), true, &["Cost"])
            .is_ok());
        let mut resaved = Vec::new();
        restored.save(&mut resaved)?;
        assert_eq!(&resaved[4..8], &1i32.to_be_bytes());
        Ok(())
    }

    #[test]
    fn test_record_size_drift_still_loads() -> Result<()> {
        let mut table = Table::new(&TableConfig::new());
        table.set_record_types(vec![Arc::new(PlainRecord::new("Damage", vec![1, 2])?)])?;
        table.add_row(&tag("combat"))?;
        table.add_column(&tag("grass"))?;
        table.add_column(&tag("sand"))?;
        table
            .query_mut(&cell("combat", "sand"), "Damage")?
            .copy_from_slice(&[5, 6]);
        table.set_tag_color(&tag("combat"), LinearColor::WHITE, Axis::Row);
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        // The type grew by two bytes since the save
        let mut restored = Table::new(&TableConfig::new());
        restored.set_record_types(vec![Arc::new(PlainRecord::new("Damage", vec![0, 0, 8, 8])?)])?;
        restored.row_tags = table.row_tags.clone();
        restored.column_tags = table.column_tags.clone();
        restored.load(&mut stream.as_slice())?;

        assert!(!restored.has_loading_errors());
        assert_eq!(
            restored.query(&cell("combat", "sand"), true, &["Damage"])?,
            vec![&[5u8, 6, 8, 8][..]]
        );
        assert_eq!(
            restored.query(&cell("combat", "grass"), true, &["Damage"])?,
            vec![&[1u8, 2, 8, 8][..]]
        );
        assert_eq!(
            restored.tag_color(&tag("combat"), Axis::Row),
            Some(LinearColor::WHITE)
        );

        // And shrank back: the extra stored bytes are skipped
        let mut grown = Vec::new();
        restored.save(&mut grown)?;
        let mut shrunk = Table::new(&TableConfig::new());
        shrunk.set_record_types(vec![Arc::new(PlainRecord::new("Damage", vec![1, 2])?)])?;
        shrunk.row_tags = restored.row_tags.clone();
        shrunk.column_tags = restored.column_tags.clone();
        shrunk.load(&mut grown.as_slice())?;
        assert!(shrunk.content_equals(&table));
        assert_eq!(
            shrunk.tag_color(&tag("combat"), Axis::Row),
            Some(LinearColor::WHITE)
        );
        Ok(())
    }

    #[test]
    fn test_orphans_are_dropped() -> Result<()> {
        let mut table = empty_table();
        table.add_row(&tag("a.b.c"))?;
        table.add_column(&tag("x"))?;
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        // Lose "a.b" from the stored rows; the stream only depends on the count
        let mut restored = empty_table();
        restored.row_tags = vec![tag("a.b.c"), tag("a"), tag("a.q.r")];
        restored.column_tags = table.column_tags.clone();
        restored.load(&mut stream.as_slice())?;

        assert!(restored.has_loading_errors());
        assert_eq!(restored.rows().tags_by_index(), vec![tag("a")]);
        assert!(restored.query(&cell("a", "x"), true, &["Damage"]).is_ok());
        Ok(())
    }

    #[test]
    fn test_duplicate_stored_tags_are_skipped() -> Result<()> {
        let mut table = empty_table();
        table.add_row(&tag("a"))?;
        table.add_column(&tag("x"))?;
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        let mut restored = empty_table();
        restored.row_tags = vec![tag("a"), tag("a")];
        restored.column_tags = vec![tag("x")];
        restored.load(&mut stream.as_slice())?;

        assert!(restored.has_loading_errors());
        assert_eq!(restored.row_count(), 1);
        Ok(())
    }

    #[test]
    fn test_new_record_type_gets_fresh_page() -> Result<()> {
        let mut table = sample_table()?;
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        let mut restored = empty_table();
        restored.add_record_type(Arc::new(PlainRecord::new("Range", vec![9])?))?;
        restored.row_tags = table.row_tags.clone();
        restored.column_tags = table.column_tags.clone();
        restored.load(&mut stream.as_slice())?;

        assert!(!restored.has_loading_errors());
        assert_eq!(
            restored.query(&cell("combat.melee", "terrain.grass"), true, &["Range"])?,
            vec![&[9u8][..]]
        );
        Ok(())
    }

    #[test]
    fn test_truncated_stream_is_flagged() -> Result<()> {
        let mut table = sample_table()?;
        let mut stream = Vec::new();
        table.save(&mut stream)?;
        stream.truncate(stream.len() / 2);

        let mut restored = empty_table();
        restored.row_tags = table.row_tags.clone();
        restored.column_tags = table.column_tags.clone();
        assert!(restored.load(&mut stream.as_slice()).is_err());
        assert!(restored.has_loading_errors());
        Ok(())
    }

    #[test]
    fn test_fixed_mode_loads() -> Result<()> {
        let mut table = sample_table()?;
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        let mut restored = Table::new(&TableConfig::runtime());
        restored.set_record_types(record_types())?;
        restored.row_tags = table.row_tags.clone();
        restored.column_tags = table.column_tags.clone();
        restored.load(&mut stream.as_slice())?;

        assert!(restored.content_equals(&table));
        let page = restored.page("Cost").unwrap();
        assert_eq!(page.capacity(), 6);
        Ok(())
    }
}
