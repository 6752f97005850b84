//! Formula evaluator
//!
//! Walks an AST against an [`EvaluationContext`]. Cell references read
//! the workbook; bare names go to an optional [`NameResolver`], which is
//! how template expressions see the data they are rendered from.

use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::FunctionRegistry;
use formsheet_core::{CellError, CellValue, Workbook};

static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

pub(crate) fn function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Intermediate value during evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    /// Rows of columns, produced by ranges and array constants
    Array(Vec<Vec<FormulaValue>>),
    Empty,
}

impl FormulaValue {
    /// Numeric view; numeric text parses, blank is zero
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            FormulaValue::String(s) => s.trim().parse().ok(),
            FormulaValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Truthiness for conditions; text must spell TRUE or FALSE
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::Empty => Some(false),
            FormulaValue::String(s) if s.eq_ignore_ascii_case("TRUE") => Some(true),
            FormulaValue::String(s) if s.eq_ignore_ascii_case("FALSE") => Some(false),
            _ => None,
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            FormulaValue::Number(n) => n.to_string(),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(_) => CellError::Value.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Scalars in row-major order; arrays are flattened
    pub fn flatten(&self) -> Box<dyn Iterator<Item = &FormulaValue> + '_> {
        match self {
            FormulaValue::Array(rows) => Box::new(rows.iter().flatten().flat_map(|v| v.flatten())),
            scalar => Box::new(std::iter::once(scalar)),
        }
    }
}

impl From<&CellValue> for FormulaValue {
    fn from(value: &CellValue) -> Self {
        match value.effective_value() {
            CellValue::Empty | CellValue::Formula { .. } => FormulaValue::Empty,
            CellValue::Number(n) => FormulaValue::Number(*n),
            CellValue::String(s) => FormulaValue::String(s.to_string()),
            CellValue::Boolean(b) => FormulaValue::Boolean(*b),
            CellValue::Error(e) => FormulaValue::Error(*e),
        }
    }
}

impl From<CellValue> for FormulaValue {
    fn from(value: CellValue) -> Self {
        FormulaValue::from(&value)
    }
}

impl From<FormulaValue> for CellValue {
    fn from(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Empty => CellValue::Empty,
            FormulaValue::Number(n) => CellValue::Number(n),
            FormulaValue::String(s) => CellValue::string(s),
            FormulaValue::Boolean(b) => CellValue::Boolean(b),
            FormulaValue::Error(e) => CellValue::Error(e),
            // a single-cell array collapses to its value
            FormulaValue::Array(rows) => match rows.as_slice() {
                [row] if row.len() == 1 => CellValue::from(row[0].clone()),
                _ => CellValue::Error(CellError::Value),
            },
        }
    }
}

/// Supplies values for bare names such as `order.total`
pub trait NameResolver {
    /// `None` when the name is unbound
    fn resolve_name(&self, name: &str) -> Option<FormulaValue>;
}

/// Where an expression is being evaluated
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub workbook: Option<&'a Workbook>,
    pub names: Option<&'a dyn NameResolver>,
    pub current_sheet: usize,
    pub current_row: u32,
    pub current_col: u16,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(workbook: Option<&'a Workbook>, sheet: usize, row: u32, col: u16) -> Self {
        Self {
            workbook,
            names: None,
            current_sheet: sheet,
            current_row: row,
            current_col: col,
        }
    }

    /// No workbook and no names; only literals and functions work
    pub fn simple() -> Self {
        Self::new(None, 0, 0, 0)
    }

    pub fn with_names(mut self, names: &'a dyn NameResolver) -> Self {
        self.names = Some(names);
        self
    }

    fn sheet(&self, sheet: Option<&str>) -> Result<Option<&'a formsheet_core::Worksheet>, CellError> {
        let Some(workbook) = self.workbook else {
            return Ok(None);
        };
        let index = match sheet {
            Some(name) => workbook.sheet_index(name).ok_or(CellError::Ref)?,
            None => self.current_sheet,
        };
        workbook.worksheet(index).map(Some).ok_or(CellError::Ref)
    }

    pub fn get_cell_value(&self, sheet: Option<&str>, row: u32, col: u16) -> FormulaValue {
        match self.sheet(sheet) {
            Ok(Some(ws)) => ws.cell_at(row, col).map_or(FormulaValue::Empty, |c| (&c.value).into()),
            Ok(None) => FormulaValue::Empty,
            Err(e) => FormulaValue::Error(e),
        }
    }

    pub fn get_range_values(
        &self,
        sheet: Option<&str>,
        start_row: u32,
        start_col: u16,
        end_row: u32,
        end_col: u16,
    ) -> FormulaValue {
        let ws = match self.sheet(sheet) {
            Ok(Some(ws)) => ws,
            Ok(None) => return FormulaValue::Array(Vec::new()),
            Err(e) => return FormulaValue::Error(e),
        };
        FormulaValue::Array(
            (start_row..=end_row)
                .map(|row| {
                    (start_col..=end_col)
                        .map(|col| {
                            ws.cell_at(row, col)
                                .map_or(FormulaValue::Empty, |c| (&c.value).into())
                        })
                        .collect()
                })
                .collect(),
        )
    }

    fn resolve_name(&self, name: &str) -> FormulaResult<FormulaValue> {
        self.names
            .and_then(|names| names.resolve_name(name))
            .ok_or_else(|| FormulaError::UnknownName(name.to_string()))
    }
}

/// Evaluate an expression
pub fn evaluate(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match expr {
        FormulaExpr::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaExpr::String(s) => Ok(FormulaValue::String(s.clone())),
        FormulaExpr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),
        FormulaExpr::Error(e) => Ok(FormulaValue::Error(*e)),

        FormulaExpr::CellRef(r) => Ok(ctx.get_cell_value(
            r.sheet.as_deref(),
            r.address.row,
            r.address.col,
        )),
        FormulaExpr::RangeRef(r) => Ok(ctx.get_range_values(
            r.sheet.as_deref(),
            r.range.start.row,
            r.range.start.col,
            r.range.end.row,
            r.range.end.col,
        )),
        FormulaExpr::NameRef(name) => ctx.resolve_name(name),

        FormulaExpr::BinaryOp { op, left, right } => {
            let left = evaluate(left, ctx)?;
            let right = evaluate(right, ctx)?;
            Ok(apply_binary(*op, &left, &right))
        }
        FormulaExpr::UnaryOp { op, operand } => {
            let value = evaluate(operand, ctx)?;
            if let Some(e) = value.get_error() {
                return Ok(FormulaValue::Error(e));
            }
            Ok(match (op, value.as_number()) {
                (_, None) => FormulaValue::Error(CellError::Value),
                (UnaryOperator::Negate, Some(n)) => FormulaValue::Number(-n),
                (UnaryOperator::Percent, Some(n)) => FormulaValue::Number(n / 100.0),
            })
        }
        FormulaExpr::Function { name, args } => call_function(name, args, ctx),
        FormulaExpr::Array(rows) => rows
            .iter()
            .map(|row| row.iter().map(|e| evaluate(e, ctx)).collect())
            .collect::<FormulaResult<_>>()
            .map(FormulaValue::Array),
    }
}

/// Single value out of a one-cell array, used where an operator needs a scalar
fn scalar(value: &FormulaValue) -> &FormulaValue {
    match value {
        FormulaValue::Array(rows) => match rows.as_slice() {
            [row] if row.len() == 1 => &row[0],
            _ => value,
        },
        _ => value,
    }
}

fn apply_binary(op: BinaryOperator, left: &FormulaValue, right: &FormulaValue) -> FormulaValue {
    let (left, right) = (scalar(left), scalar(right));
    if let Some(e) = left.get_error().or_else(|| right.get_error()) {
        return FormulaValue::Error(e);
    }
    use BinaryOperator::*;
    match op {
        Equal => FormulaValue::Boolean(compare_values(left, right) == Ordering::Equal),
        NotEqual => FormulaValue::Boolean(compare_values(left, right) != Ordering::Equal),
        LessThan => FormulaValue::Boolean(compare_values(left, right) == Ordering::Less),
        LessEqual => FormulaValue::Boolean(compare_values(left, right) != Ordering::Greater),
        GreaterThan => FormulaValue::Boolean(compare_values(left, right) == Ordering::Greater),
        GreaterEqual => FormulaValue::Boolean(compare_values(left, right) != Ordering::Less),
        Concat => FormulaValue::String(left.as_string() + &right.as_string()),
        Range => FormulaValue::Error(CellError::Ref),
        Add | Subtract | Multiply | Divide | Power => {
            let (Some(l), Some(r)) = (left.as_number(), right.as_number()) else {
                return FormulaValue::Error(CellError::Value);
            };
            let result = match op {
                Add => l + r,
                Subtract => l - r,
                Multiply => l * r,
                Divide if r == 0.0 => return FormulaValue::Error(CellError::Div0),
                Divide => l / r,
                _ => l.powf(r),
            };
            if result.is_finite() {
                FormulaValue::Number(result)
            } else {
                FormulaValue::Error(CellError::Num)
            }
        }
    }
}

/// Spreadsheet ordering: blanks act as zero or empty text, numbers sort
/// before text, text before booleans, text compares case-insensitively.
pub fn compare_values(left: &FormulaValue, right: &FormulaValue) -> Ordering {
    use FormulaValue::*;
    fn rank(v: &FormulaValue) -> u8 {
        match v {
            Number(_) => 0,
            String(_) => 1,
            Boolean(_) => 2,
            _ => 3,
        }
    }
    match (left, right) {
        (Empty, Empty) => Ordering::Equal,
        (Empty, String(s)) => "".cmp(s.to_lowercase().as_str()),
        (String(s), Empty) => s.to_lowercase().as_str().cmp(""),
        (Empty, other) => compare_values(&Number(0.0), other),
        (other, Empty) => compare_values(other, &Number(0.0)),
        (Number(l), Number(r)) => l.partial_cmp(r).unwrap_or(Ordering::Equal),
        (String(l), String(r)) => l.to_lowercase().cmp(&r.to_lowercase()),
        (Boolean(l), Boolean(r)) => l.cmp(r),
        (l, r) => rank(l).cmp(&rank(r)),
    }
}

fn call_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let def = function_registry()
        .get(name)
        .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;

    let expected = match def.max_args {
        Some(max) if max == def.min_args => format!("{max}"),
        Some(max) => format!("{} to {max}", def.min_args),
        None => format!("at least {}", def.min_args),
    };
    if args.len() < def.min_args || def.max_args.map_or(false, |max| args.len() > max) {
        return Err(FormulaError::ArgumentCount {
            function: name.to_string(),
            expected,
            actual: args.len(),
        });
    }

    let values = args
        .iter()
        .map(|arg| evaluate(arg, ctx))
        .collect::<FormulaResult<Vec<_>>>()?;
    (def.implementation)(&values, ctx)
}
