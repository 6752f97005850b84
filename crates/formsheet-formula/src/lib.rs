//! # formsheet-formula
//!
//! Formula parser, printer and evaluator for formsheet.
//!
//! - Formula parsing (text to AST) and printing (AST back to text)
//! - Evaluation against a workbook, with bare names supplied by a
//!   [`NameResolver`]
//! - Built-in functions for math, logic, text, type tests and dates
//! - Dependency tracking for recalculation order
//!
//! ## Example
//!
//! ```rust
//! use formsheet_formula::{evaluate, parse_formula, EvaluationContext, FormulaValue};
//!
//! let ast = parse_formula("=ROUND(10/4, 1)").unwrap();
//! let result = evaluate(&ast, &EvaluationContext::simple()).unwrap();
//! assert_eq!(result, FormulaValue::Number(2.5));
//! ```

pub mod ast;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod printer;

pub use ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
pub use dependency::{CellKey, DependencyGraph, RecalcOrder};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{compare_values, evaluate, EvaluationContext, FormulaValue, NameResolver};
pub use parser::{parse_expression, parse_formula};
