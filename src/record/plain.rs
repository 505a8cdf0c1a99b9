//! Fixed-layout byte records.

use crate::error::{Result, TableError};
use crate::record::RecordType;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

/// A record type made of a fixed number of plain bytes with a default image.
///
/// Records own no resources, so destroying them only scrubs their memory.
/// Serialization writes the raw bytes.
#[derive(Debug)]
pub struct PlainRecord {
    name: String,
    defaults: Vec<u8>,
    valid: AtomicBool,
}

impl PlainRecord {
    /// Create a record type whose default value is `defaults`
    pub fn new(name: impl Into<String>, defaults: Vec<u8>) -> Result<Self> {
        let name = name.into();
        if defaults.is_empty() {
            return Err(TableError::invalid_operation(format!(
                "record type '{}' must have a non-zero size",
                name
            )));
        }
        if name.is_empty() {
            return Err(TableError::invalid_operation("record type name is empty"));
        }
        Ok(Self {
            name,
            defaults,
            valid: AtomicBool::new(true),
        })
    }

    /// Create a record type of `size` zeroed bytes
    pub fn zeroed(name: impl Into<String>, size: usize) -> Result<Self> {
        Self::new(name, vec![0u8; size])
    }

    /// Default record image
    pub fn defaults(&self) -> &[u8] {
        &self.defaults
    }

    /// Mark the definition as gone (e.g. unloaded by the host)
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl RecordType for PlainRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.defaults.len()
    }

    fn construct_in_place(&self, buf: &mut [u8], count: usize) {
        for record in buf.chunks_exact_mut(self.size()).take(count) {
            record.copy_from_slice(&self.defaults);
        }
    }

    fn destroy_in_place(&self, buf: &mut [u8], count: usize) {
        let len = (count * self.size()).min(buf.len());
        buf[..len].fill(0);
    }

    fn clear_one(&self, record: &mut [u8]) {
        record.copy_from_slice(&self.defaults);
    }

    fn copy_one(&self, dst: &mut [u8], src: &[u8]) {
        dst.copy_from_slice(src);
    }

    fn serialize_one(&self, w: &mut dyn Write, record: &[u8]) -> std::io::Result<()> {
        w.write_all(record)
    }

    /// Reads up to `size()` bytes. A shorter stream, such as a record saved
    /// before the type grew, leaves the default bytes in the tail.
    fn deserialize_one(&self, r: &mut dyn Read, record: &mut [u8]) -> std::io::Result<()> {
        let mut filled = 0;
        while filled < record.len() {
            match r.read(&mut record[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        record[filled..].copy_from_slice(&self.defaults[filled..]);
        Ok(())
    }

    fn deep_equals(&self, a: &[u8], b: &[u8]) -> bool {
        a == b
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}
