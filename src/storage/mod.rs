//! Storage layer: record memory and table files.
//!
//! This module provides the datablock slab that backs every page, the free
//! slot list it recycles through, and the checksummed file container tables
//! are saved into.

pub mod codec;
mod datablock;
mod file_header;
mod free_list;
mod table_file;

pub use datablock::Datablock;
pub use file_header::{FileHeader, CONTAINER_VERSION, FILE_HEADER_SIZE, MAGIC};
pub use free_list::FreeList;
pub use table_file::TableFile;
