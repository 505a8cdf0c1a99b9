//! Error types for the table store.

use thiserror::Error;

/// Result type alias for table operations
pub type Result<T> = std::result::Result<T, TableError>;

/// Errors that can occur in the table store
#[derive(Error, Debug)]
pub enum TableError {
    /// I/O error from the underlying reader, writer or file system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tag text is not a well-formed dotted identifier
    #[error("Invalid tag '{0}'")]
    InvalidTag(String),

    /// Neither the tag nor (for nearest lookups) any of its ancestors is registered
    #[error("Tag '{0}' not found")]
    TagNotFound(String),

    /// A query asked for a record type that has no page or no data at the cell
    #[error("No '{record_type}' data at {location}")]
    RecordMiss {
        record_type: String,
        location: String,
    },

    /// A persisted page refers to a record type that is not registered
    #[error("Unknown record type '{0}'")]
    UnknownRecordType(String),

    /// A fixed-mode page ran out of pre-allocated slots
    #[error("Page for '{record_type}' is out of capacity ({capacity} slots)")]
    CapacityExhausted { record_type: String, capacity: usize },

    /// Data corruption detected (e.g., checksum mismatch, malformed stream)
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Invalid operation for the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The stream was written with a format version we cannot read
    #[error("Unsupported format version {found} (current: {current})")]
    UnsupportedVersion { found: u32, current: u32 },

    /// Table file is not recognisable
    #[error("Invalid table file: {0}")]
    InvalidFile(String),

    /// Layout export failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TableError {
    /// Create a corruption error with a message
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create an invalid table file error
    pub fn invalid_file(msg: impl Into<String>) -> Self {
        Self::InvalidFile(msg.into())
    }

    /// True for errors produced by a query that simply found nothing
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::TagNotFound(_) | Self::RecordMiss { .. })
    }
}
