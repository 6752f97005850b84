//! # formsheet-core
//!
//! Spreadsheet document model used by the formsheet template engine.
//!
//! This crate provides the document types the engine renders into:
//! - [`CellValue`] - Typed cell contents (blank, string, number, boolean, formula, error)
//! - [`CellAddress`] and [`CellRange`] - A1-style addressing
//! - [`Worksheet`] - Sparse cell grid with comments, merged regions and row-band copies
//! - [`Workbook`] - An ordered set of worksheets
//!
//! ## Example
//!
//! ```rust
//! use formsheet_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::with_sheet("Orders").unwrap();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//!
//! sheet.set_cell_value("A1", "Item").unwrap();
//! sheet.set_cell_value_at(1, 1, CellValue::Number(3.0)).unwrap();
//! sheet.set_cell_formula("C2", "=B2*2").unwrap();
//!
//! assert_eq!(sheet.formula_cells().count(), 1);
//! ```

pub mod cell;
pub mod comment;
pub mod error;
pub mod workbook;
pub mod worksheet;

// Re-exports for convenience
pub use cell::{CellAddress, CellData, CellError, CellRange, CellValue};
pub use comment::CellComment;
pub use error::{Error, Result};
pub use workbook::Workbook;
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
