//! Table files.
//!
//! A table file is a [`FileHeader`] followed by a checksummed payload:
//!
//! ```text
//! description  string
//! row tags     u32 count, then tag strings in index order
//! column tags  u32 count, then tag strings in index order
//! table stream (see `table::format`)
//! ```
//!
//! The ordered tag arrays are the canonical row and column order; the table
//! stream only carries cell records, colors and inheritance links.

use crate::error::{Result, TableError};
use crate::storage::codec::{read_string, read_u32, write_string, write_u32};
use crate::storage::file_header::{FileHeader, FILE_HEADER_SIZE};
use crate::table::Table;
use crate::types::Tag;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

/// Reads and writes whole tables
pub struct TableFile;

impl TableFile {
    /// Serialize a table, header included
    pub fn write(table: &mut Table, w: &mut dyn Write) -> Result<()> {
        // Saving refreshes the ordered tag arrays, so it has to run first
        let mut stream = Vec::new();
        table.save(&mut stream)?;

        let mut payload = Vec::with_capacity(stream.len() + 64);
        write_string(&mut payload, &table.description)?;
        write_tags(&mut payload, &table.row_tags)?;
        write_tags(&mut payload, &table.column_tags)?;
        payload.extend_from_slice(&stream);

        let header = FileHeader::for_payload(&payload)?;
        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        header.write(&mut header_bytes);

        w.write_all(&header_bytes)?;
        w.write_all(&payload)?;
        Ok(())
    }

    /// Replace the contents of `table` with a serialized table
    pub fn read(table: &mut Table, r: &mut dyn Read) -> Result<()> {
        let mut header_bytes = [0u8; FILE_HEADER_SIZE];
        r.read_exact(&mut header_bytes)
            .map_err(|_| TableError::invalid_file("header too short"))?;
        let header = FileHeader::read(&header_bytes)?;

        // Grow with the bytes actually present, never with the declared length
        let mut payload = Vec::new();
        Read::take(&mut *r, u64::from(header.payload_len)).read_to_end(&mut payload)?;
        if payload.len() != header.payload_len as usize {
            return Err(TableError::corruption(format!(
                "payload is truncated: {} of {} bytes",
                payload.len(),
                header.payload_len
            )));
        }
        header.verify(&payload)?;

        let mut reader = payload.as_slice();
        table.description = read_string(&mut reader)?;
        table.row_tags = read_tags(&mut reader)?;
        table.column_tags = read_tags(&mut reader)?;
        table.load(&mut reader)
    }

    /// Save a table to a file, replacing it atomically
    pub fn save(table: &mut Table, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            Self::write(table, &mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        info!(path = %path.display(), "table saved");
        Ok(())
    }

    /// Load a table from a file
    pub fn open(table: &mut Table, path: &Path) -> Result<()> {
        let bytes = fs::read(path)?;
        Self::read(table, &mut bytes.as_slice())?;
        info!(
            path = %path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "table loaded"
        );
        Ok(())
    }
}

fn write_tags(w: &mut dyn Write, tags: &[Tag]) -> Result<()> {
    let count = u32::try_from(tags.len())
        .map_err(|_| TableError::invalid_operation("too many tags"))?;
    write_u32(w, count)?;
    for tag in tags {
        write_string(w, tag.as_str())?;
    }
    Ok(())
}

fn read_tags(r: &mut dyn Read) -> Result<Vec<Tag>> {
    let count = read_u32(r)? as usize;
    let mut tags = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let name = read_string(r)?;
        let tag = Tag::new(&name)
            .map_err(|_| TableError::corruption(format!("malformed tag '{}'", name)))?;
        tags.push(tag);
    }
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PlainRecord, RecordTypeRef};
    use crate::types::{Axis, CellTags, LinearColor};
    use crate::TableConfig;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn record_types() -> Vec<RecordTypeRef> {
        vec![Arc::new(PlainRecord::zeroed("Weight", 4).unwrap())]
    }

    fn sample_table() -> Result<Table> {
        let mut table = Table::new(&TableConfig::new().description("sample"));
        table.set_record_types(record_types())?;
        table.add_row(&Tag::new("combat.melee")?)?;
        table.add_column(&Tag::new("terrain.grass")?)?;
        table.set_tag_color(&Tag::new("combat")?, LinearColor::WHITE, Axis::Row);

        let cell = CellTags::parse("combat.melee", "terrain.grass")?;
        table
            .query_mut(&cell, "Weight")?
            .copy_from_slice(&9u32.to_be_bytes());
        Ok(table)
    }

    #[test]
    fn test_file_roundtrip() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.aft");

        let mut table = sample_table()?;
        TableFile::save(&mut table, &path)?;

        let mut restored = Table::new(&TableConfig::new());
        restored.set_record_types(record_types())?;
        TableFile::open(&mut restored, &path)?;

        assert_eq!(restored.description, "sample");
        assert!(!restored.has_loading_errors());
        assert!(restored.content_equals(&table));
        assert_eq!(
            restored.tag_color(&Tag::new("combat")?, Axis::Row),
            Some(LinearColor::WHITE)
        );
        Ok(())
    }

    #[test]
    fn test_corrupted_payload_is_detected() -> Result<()> {
        let mut table = sample_table()?;
        let mut bytes = Vec::new();
        TableFile::write(&mut table, &mut bytes)?;

        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut restored = Table::new(&TableConfig::new());
        restored.set_record_types(record_types())?;
        assert!(matches!(
            TableFile::read(&mut restored, &mut bytes.as_slice()),
            Err(TableError::Corruption(_))
        ));
        Ok(())
    }

    #[test]
    fn test_oversized_payload_length_is_truncation() -> Result<()> {
        let header = FileHeader {
            container_version: crate::storage::CONTAINER_VERSION,
            payload_len: u32::MAX,
            checksum: 0,
        };
        let mut bytes = vec![0u8; FILE_HEADER_SIZE];
        header.write(&mut bytes);
        bytes.extend_from_slice(b"short");

        let mut table = Table::new(&TableConfig::new());
        assert!(matches!(
            TableFile::read(&mut table, &mut bytes.as_slice()),
            Err(TableError::Corruption(_))
        ));
        Ok(())
    }

    #[test]
    fn test_not_a_table_file() {
        let mut table = Table::new(&TableConfig::new());
        let bytes = vec![0u8; 64];
        assert!(matches!(
            TableFile::read(&mut table, &mut bytes.as_slice()),
            Err(TableError::InvalidFile(_))
        ));
    }
}
