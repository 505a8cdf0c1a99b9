//! Page layer: per-record-type handle grids.
//!
//! A page owns every record of one record type in the table. Cells are
//! addressed by (row index, column index) and resolve through a composite
//! [`DataHandle`](crate::types::DataHandle) to a slot in one of the page's
//! datablocks:
//!
//! ```text
//!            col 0      col 1      col 2 (dead)
//! row 0   [ 0:0    ]  [ 0:1    ]  [ INVALID ]
//! row 1   (deleted)
//! row 2   [ 0:4    ]  [ 1:0    ]  [ INVALID ]
//!              │           │
//!              ▼           ▼
//!        datablock 0   datablock 1
//! ```
//!
//! Pages can be sized once (fixed mode, for runtime use) or grow one
//! datablock at a time (dynamic mode, for editing).

mod grid;

pub use grid::{Page, Row};
