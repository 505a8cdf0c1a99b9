//! Record type capability.
//!
//! The store never looks inside a record. Everything it needs to build,
//! reset, copy, compare and persist record memory comes from a [`RecordType`]
//! implementation handed to the table by the host.

mod plain;

pub use plain::PlainRecord;

use std::io::{Read, Write};
use std::sync::Arc;

/// Shared reference to a record type
pub type RecordTypeRef = Arc<dyn RecordType>;

/// Operations the store needs from a record type.
///
/// Buffers passed to the `*_in_place` methods hold `count` consecutive records
/// of [`RecordType::size`] bytes each. Single-record methods receive exactly
/// one record's bytes.
pub trait RecordType: Send + Sync {
    /// Stable name used to match persisted pages with registered types
    fn name(&self) -> &str;

    /// Size of one record in bytes. Must be non-zero and constant.
    fn size(&self) -> usize;

    /// Initialize `count` default records in fresh memory
    fn construct_in_place(&self, buf: &mut [u8], count: usize);

    /// Release whatever `count` records own before their memory goes away
    fn destroy_in_place(&self, buf: &mut [u8], count: usize);

    /// Reset one record to its default value
    fn clear_one(&self, record: &mut [u8]);

    /// Copy `src` over `dst`
    fn copy_one(&self, dst: &mut [u8], src: &[u8]);

    /// Write one record to a stream
    fn serialize_one(&self, w: &mut dyn Write, record: &[u8]) -> std::io::Result<()>;

    /// Read one record from a stream into existing memory
    fn deserialize_one(&self, r: &mut dyn Read, record: &mut [u8]) -> std::io::Result<()>;

    /// Field-by-field equality
    fn deep_equals(&self, a: &[u8], b: &[u8]) -> bool;

    /// Whether the type definition is still usable. A type that went stale
    /// between allocation and teardown must not be asked to destroy records.
    fn is_valid(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for dyn RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordType")
            .field("name", &self.name())
            .field("size", &self.size())
            .finish()
    }
}
