//! Error types
//!
//! [`Error`] is returned from fallible session and configuration calls.
//! [`ConfigurationError`] and [`ExpressionError`] never escape a render or
//! a validation pass: they are logged and kept as [`Diagnostic`]s.

use thiserror::Error;

use crate::config::ConfigRange;
use formsheet_formula::FormulaError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] formsheet_core::Error),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("Unknown tab: {0}")]
    UnknownTab(String),

    #[error("Page {page} out of range ({pages} pages)")]
    PageOutOfRange { page: usize, pages: usize },

    #[error("Cell {0} holds a formula and cannot be edited")]
    ReadOnlyCell(String),

    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// A command that cannot take part in expansion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("{kind} command at {range} has no enclosing command")]
    MissingParent { kind: &'static str, range: ConfigRange },

    #[error("{kind} command at {range} overlaps {sibling}")]
    Overlap {
        kind: &'static str,
        range: ConfigRange,
        sibling: ConfigRange,
    },

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Malformed annotation at {cell}: {text}")]
    MalformedAnnotation { cell: String, text: String },
}

/// An expression that could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("Cannot parse `{expr}`: {message}")]
    Parse { expr: String, message: String },

    #[error("Cannot evaluate `{expr}`: {message}")]
    Evaluation { expr: String, message: String },

    #[error("Unbound name: {0}")]
    UnboundName(String),

    #[error("`{0}` is not a collection")]
    NotACollection(String),
}

/// Non-fatal problem recorded while rendering
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}
