//! Information functions

use super::FunctionDef;
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use formsheet_core::CellError;

pub(crate) const FUNCTIONS: &[FunctionDef] = &[
    FunctionDef::fixed("ISBLANK", 1, fn_isblank),
    FunctionDef::fixed("ISNUMBER", 1, fn_isnumber),
    FunctionDef::fixed("ISTEXT", 1, fn_istext),
    FunctionDef::fixed("ISLOGICAL", 1, fn_islogical),
    FunctionDef::fixed("ISERROR", 1, fn_iserror),
    FunctionDef::fixed("ISERR", 1, fn_iserr),
    FunctionDef::fixed("ISNA", 1, fn_isna),
    FunctionDef::fixed("NA", 0, fn_na),
];

fn test(args: &[FormulaValue], pred: fn(&FormulaValue) -> bool) -> FormulaResult<FormulaValue> {
    Ok(match &args[0] {
        FormulaValue::Array(_) => FormulaValue::Error(CellError::Value),
        v => FormulaValue::Boolean(pred(v)),
    })
}

pub fn fn_isblank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test(args, |v| matches!(v, FormulaValue::Empty))
}

pub fn fn_isnumber(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test(args, |v| matches!(v, FormulaValue::Number(_)))
}

pub fn fn_istext(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test(args, |v| matches!(v, FormulaValue::String(_)))
}

pub fn fn_islogical(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test(args, |v| matches!(v, FormulaValue::Boolean(_)))
}

pub fn fn_iserror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test(args, FormulaValue::is_error)
}

/// Any error except `#N/A`
pub fn fn_iserr(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test(args, |v| v.is_error() && !matches!(v, FormulaValue::Error(CellError::Na)))
}

pub fn fn_isna(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    test(args, |v| matches!(v, FormulaValue::Error(CellError::Na)))
}

pub fn fn_na(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Error(CellError::Na))
}

#[cfg(test)]
mod tests {
    use crate::evaluator::{evaluate, EvaluationContext, FormulaValue};
    use crate::parser::parse_formula;

    fn eval(formula: &str) -> FormulaValue {
        evaluate(&parse_formula(formula).unwrap(), &EvaluationContext::simple()).unwrap()
    }

    #[test]
    fn test_type_predicates() {
        assert_eq!(eval("=ISNUMBER(1.5)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISTEXT(\"1.5\")"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISLOGICAL(1)"), FormulaValue::Boolean(false));
        assert_eq!(eval("=ISBLANK(Z99)"), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_error_predicates() {
        assert_eq!(eval("=ISERROR(1/0)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=ISERR(NA())"), FormulaValue::Boolean(false));
        assert_eq!(eval("=ISNA(NA())"), FormulaValue::Boolean(true));
    }
}
