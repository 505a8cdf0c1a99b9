//! Table file header.
//!
//! Every table file starts with a fixed header that identifies the file and
//! guards the payload with a checksum.

use crate::error::{Result, TableError};

/// Magic bytes to identify a valid table file
pub const MAGIC: &[u8; 16] = b"AffinityTable01\0";

/// Version of the file container (independent of the table stream version)
pub const CONTAINER_VERSION: u32 = 1;

/// Header size in bytes
pub const FILE_HEADER_SIZE: usize = 28;

/// Table file header
///
/// Layout:
/// ```text
/// Offset  Size  Description
/// 0       16    Magic string "AffinityTable01\0"
/// 16      4     Container version
/// 20      4     Payload length in bytes
/// 24      4     Checksum of payload (CRC32)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Container version
    pub container_version: u32,
    /// Number of payload bytes following the header
    pub payload_len: u32,
    /// CRC32 of the payload
    pub checksum: u32,
}

impl FileHeader {
    /// Create a header describing `payload`
    pub fn for_payload(payload: &[u8]) -> Result<Self> {
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            TableError::invalid_operation(format!("payload of {} bytes is too large", payload.len()))
        })?;
        Ok(Self {
            container_version: CONTAINER_VERSION,
            payload_len,
            checksum: crc32fast::hash(payload),
        })
    }

    /// Read a file header from bytes
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(TableError::invalid_file("header too short"));
        }

        // Check magic
        if &bytes[0..16] != MAGIC {
            return Err(TableError::invalid_file("invalid magic bytes"));
        }

        let container_version = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let payload_len = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        let checksum = u32::from_be_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);

        if container_version != CONTAINER_VERSION {
            return Err(TableError::invalid_file(format!(
                "unsupported container version: {} (expected {})",
                container_version, CONTAINER_VERSION
            )));
        }

        Ok(Self {
            container_version,
            payload_len,
            checksum,
        })
    }

    /// Write this header to bytes
    pub fn write(&self, bytes: &mut [u8]) {
        bytes[0..16].copy_from_slice(MAGIC);
        bytes[16..20].copy_from_slice(&self.container_version.to_be_bytes());
        bytes[20..24].copy_from_slice(&self.payload_len.to_be_bytes());
        bytes[24..28].copy_from_slice(&self.checksum.to_be_bytes());
    }

    /// Verify a payload against this header
    pub fn verify(&self, payload: &[u8]) -> Result<()> {
        if payload.len() != self.payload_len as usize {
            return Err(TableError::corruption(format!(
                "payload length mismatch: {} (expected {})",
                payload.len(),
                self.payload_len
            )));
        }
        if crc32fast::hash(payload) != self.checksum {
            return Err(TableError::corruption("payload checksum mismatch"));
        }
        Ok(())
    }
}
