//! Built-in spreadsheet functions
//!
//! Each submodule exposes a `FUNCTIONS` table; the registry indexes all of
//! them by upper-case name. Implementations receive already-evaluated
//! arguments.

pub mod date;
pub mod info;
pub mod logical;
pub mod math;
pub mod text;

use ahash::AHashMap;

use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use formsheet_core::CellError;

/// Function implementation signature
pub type FunctionImpl = fn(&[FormulaValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Function definition
pub struct FunctionDef {
    /// Upper-case name
    pub name: &'static str,
    pub min_args: usize,
    /// `None` means unlimited
    pub max_args: Option<usize>,
    pub implementation: FunctionImpl,
    /// Result can change without any input changing (`TODAY`, `NOW`)
    pub volatile: bool,
}

impl FunctionDef {
    pub(crate) const fn fixed(name: &'static str, args: usize, implementation: FunctionImpl) -> Self {
        Self::range(name, args, args, implementation)
    }

    pub(crate) const fn range(
        name: &'static str,
        min_args: usize,
        max_args: usize,
        implementation: FunctionImpl,
    ) -> Self {
        Self {
            name,
            min_args,
            max_args: Some(max_args),
            implementation,
            volatile: false,
        }
    }

    pub(crate) const fn variadic(name: &'static str, min_args: usize, implementation: FunctionImpl) -> Self {
        Self {
            name,
            min_args,
            max_args: None,
            implementation,
            volatile: false,
        }
    }

    pub(crate) const fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<&'static str, &'static FunctionDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let tables: [&'static [FunctionDef]; 5] = [
            math::FUNCTIONS,
            logical::FUNCTIONS,
            text::FUNCTIONS,
            info::FUNCTIONS,
            date::FUNCTIONS,
        ];
        let functions = tables
            .into_iter()
            .flatten()
            .map(|def| (def.name, def))
            .collect();
        Self { functions }
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<&'static FunctionDef> {
        self.functions.get(name.to_ascii_uppercase().as_str()).copied()
    }

    pub fn is_volatile(&self, name: &str) -> bool {
        self.get(name).map_or(false, |def| def.volatile)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `name` is a built-in whose result changes on every recalculation
pub fn is_volatile(name: &str) -> bool {
    crate::evaluator::function_registry().is_volatile(name)
}

/// Spreadsheet error short-circuit inside function bodies
pub(crate) type CellResult<T> = Result<T, CellError>;

/// Turn an in-cell error into an error value
pub(crate) fn lift(result: CellResult<FormulaValue>) -> FormulaResult<FormulaValue> {
    Ok(result.unwrap_or_else(FormulaValue::Error))
}

/// Coerce one argument to a number; missing arguments use `default`
pub(crate) fn number_arg(args: &[FormulaValue], index: usize, default: Option<f64>) -> CellResult<f64> {
    let Some(value) = args.get(index) else {
        return default.ok_or(CellError::Value);
    };
    match value {
        FormulaValue::Error(e) => Err(*e),
        FormulaValue::Array(_) => Err(CellError::Value),
        other => other.as_number().ok_or(CellError::Value),
    }
}

/// Coerce one argument to text
pub(crate) fn text_arg(args: &[FormulaValue], index: usize) -> CellResult<String> {
    match args.get(index) {
        Some(FormulaValue::Error(e)) => Err(*e),
        Some(FormulaValue::Array(_)) | None => Err(CellError::Value),
        Some(other) => Ok(other.as_string()),
    }
}

/// Numbers for aggregate functions. Direct arguments are coerced; inside
/// ranges only real numbers count and text, booleans and blanks are skipped.
pub(crate) fn collect_numbers(args: &[FormulaValue]) -> CellResult<Vec<f64>> {
    let mut numbers = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Array(_) => {
                for value in arg.flatten() {
                    match value {
                        FormulaValue::Number(n) => numbers.push(*n),
                        FormulaValue::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            FormulaValue::Empty => {}
            FormulaValue::Error(e) => return Err(*e),
            other => numbers.push(other.as_number().ok_or(CellError::Value)?),
        }
    }
    Ok(numbers)
}
