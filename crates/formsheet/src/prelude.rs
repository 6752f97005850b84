//! Common imports for formsheet users
//!
//! ```rust
//! use formsheet::prelude::*;
//! ```

pub use crate::{
    // Document model
    CellAddress,
    CellValue,
    Workbook,
    Worksheet,

    // Configuration
    CommandConfig,
    ConfigRange,
    SessionSettings,
    SheetConfiguration,
    ValidationRule,

    // Rendering
    expand,
    DataContext,
    RenderedSheet,
    RowRemapper,

    // Sessions
    FormSession,
    NoopNotifier,
    RenderNotifier,
    RenderTarget,
    ValidationStatus,

    // Recalculation
    CalculationStats,
    WorkbookCalculationExt,

    // Errors
    Error,
    Result,
};
