//! # formsheet
//!
//! Data-bound spreadsheet forms. A template sheet is expanded against a
//! JSON document into a rendered sheet; the rendered sheet is then edited
//! cell by cell with incremental recalculation and validation.
//!
//! ## Features
//!
//! - Repeat, conditional and plain commands over template row ranges,
//!   configured in JSON or in cell comments (`fs:each(...)`)
//! - Formula rewriting so references follow repeated rows
//! - Dependency-ordered recalculation, full or from an edited cell
//! - Per-cell validation rules with same-row column references
//! - Paged views with one cache generation per page
//!
//! ## Example
//!
//! ```rust
//! use formsheet::prelude::*;
//! use serde_json::json;
//!
//! let mut templates = Workbook::with_sheet("Orders").unwrap();
//! let sheet = templates.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", "${o.item}").unwrap();
//! sheet.set_cell_value("B1", "${o.qty}").unwrap();
//! sheet.set_cell_formula("A2", "=SUM(B1)").unwrap();
//!
//! let config = SheetConfiguration::from_json(
//!     r#"{
//!         "tabName": "Orders",
//!         "sheetName": "Orders",
//!         "bodyRange": "A1:B2",
//!         "commands": [{"type": "each", "range": "A1:B1", "var": "o", "items": "orders"}],
//!         "validations": [{"cell": "B1", "rule": "$value > 0"}]
//!     }"#,
//! )
//! .unwrap();
//!
//! let data = json!({"orders": [{"item": "bolt", "qty": 2}, {"item": "nut", "qty": 5}]});
//! let mut session =
//!     FormSession::open(templates, vec![config], data, SessionSettings::default(), NoopNotifier).unwrap();
//!
//! assert_eq!(session.active_sheet().unwrap().get_formula_at(2, 0), Some("=SUM(B1:B2)"));
//! assert_eq!(session.cached_display_value(2, 0), "7");
//!
//! assert!(!session.on_value_change(1, 1, "-1").unwrap());
//! assert_eq!(session.cached_display_value(2, 0), "1");
//! ```

pub mod annotation;
pub mod cache;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod expand;
pub mod expression;
pub mod mapping;
pub mod notify;
pub mod prelude;
pub mod recalc;
pub mod rewrite;
pub mod session;
pub mod validation;

pub use annotation::{configurations_from_annotations, Annotation};
pub use cache::{CachedCell, CellCache, ValidationStatus};
pub use command::{Command, CommandKind, CommandTree, LengthSpec};
pub use config::{CommandConfig, ConfigRange, SessionSettings, SheetConfiguration, ValidationRule};
pub use context::{Binding, DataContext};
pub use error::{ConfigurationError, Diagnostic, Error, ExpressionError, Result};
pub use expand::{expand, RenderedSheet, SheetLayout};
pub use mapping::{RowRemapper, RowsMapping};
pub use notify::{NoopNotifier, RecordingNotifier, RenderNotifier, RenderTarget};
pub use recalc::{CalculationOptions, CalculationStats, Recalculator, WorkbookCalculationExt};
pub use session::FormSession;
pub use validation::{RuleIndex, Validator, Verdict};

// Re-export the document model
pub use formsheet_core::{CellAddress, CellComment, CellError, CellRange, CellValue, Workbook, Worksheet};
pub use formsheet_formula::{FormulaValue, NameResolver};
