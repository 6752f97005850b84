//! Formula error types

use thiserror::Error;

pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Failures while parsing or evaluating. Spreadsheet-level errors such
/// as `#DIV/0!` are values, not `FormulaError`s.
#[derive(Debug, Error)]
pub enum FormulaError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// A bare name that neither the name resolver nor the workbook knows
    #[error("Unknown name: {0}")]
    UnknownName(String),

    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("Circular reference detected")]
    CircularReference,

    #[error("Invalid reference: {0}")]
    InvalidReference(String),
}
