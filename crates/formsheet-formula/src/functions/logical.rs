//! Logical functions

use super::{lift, CellResult, FunctionDef};
use crate::error::FormulaResult;
use crate::evaluator::{compare_values, EvaluationContext, FormulaValue};
use formsheet_core::CellError;
use std::cmp::Ordering;

pub(crate) const FUNCTIONS: &[FunctionDef] = &[
    FunctionDef::range("IF", 1, 3, fn_if),
    FunctionDef::variadic("AND", 1, fn_and),
    FunctionDef::variadic("OR", 1, fn_or),
    FunctionDef::variadic("XOR", 1, fn_xor),
    FunctionDef::fixed("NOT", 1, fn_not),
    FunctionDef::fixed("IFERROR", 2, fn_iferror),
    FunctionDef::fixed("IFNA", 2, fn_ifna),
    FunctionDef::variadic("IFS", 2, fn_ifs),
    FunctionDef::variadic("SWITCH", 3, fn_switch),
    FunctionDef::fixed("TRUE", 0, fn_true),
    FunctionDef::fixed("FALSE", 0, fn_false),
];

fn condition(value: &FormulaValue) -> CellResult<bool> {
    match value {
        FormulaValue::Error(e) => Err(*e),
        other => other.as_bool().ok_or(CellError::Value),
    }
}

/// Booleans found in the arguments; text inside ranges is ignored
fn booleans(args: &[FormulaValue]) -> CellResult<Vec<bool>> {
    let mut out = Vec::new();
    for arg in args {
        if let FormulaValue::Array(_) = arg {
            for v in arg.flatten() {
                match v {
                    FormulaValue::Error(e) => return Err(*e),
                    FormulaValue::Boolean(b) => out.push(*b),
                    FormulaValue::Number(n) => out.push(*n != 0.0),
                    _ => {}
                }
            }
        } else {
            out.push(condition(arg)?);
        }
    }
    if out.is_empty() {
        return Err(CellError::Value);
    }
    Ok(out)
}

pub fn fn_if(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(condition(&args[0]).map(|cond| {
        let branch = if cond { args.get(1) } else { args.get(2) };
        match branch {
            Some(v) => v.clone(),
            None => FormulaValue::Boolean(cond),
        }
    }))
}

pub fn fn_and(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(booleans(args).map(|b| FormulaValue::Boolean(b.iter().all(|x| *x))))
}

pub fn fn_or(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(booleans(args).map(|b| FormulaValue::Boolean(b.iter().any(|x| *x))))
}

pub fn fn_xor(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(booleans(args).map(|b| FormulaValue::Boolean(b.iter().filter(|x| **x).count() % 2 == 1)))
}

pub fn fn_not(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(condition(&args[0]).map(|b| FormulaValue::Boolean(!b)))
}

pub fn fn_iferror(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(if args[0].is_error() { args[1].clone() } else { args[0].clone() })
}

pub fn fn_ifna(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match args[0] {
        FormulaValue::Error(CellError::Na) => args[1].clone(),
        ref other => other.clone(),
    })
}

/// IFS(cond1, value1, cond2, value2, ...)
pub fn fn_ifs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    if args.len() % 2 != 0 {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    for pair in args.chunks(2) {
        match condition(&pair[0]) {
            Err(e) => return Ok(FormulaValue::Error(e)),
            Ok(true) => return Ok(pair[1].clone()),
            Ok(false) => {}
        }
    }
    Ok(FormulaValue::Error(CellError::Na))
}

/// SWITCH(expr, match1, value1, ..., [default])
pub fn fn_switch(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let target = &args[0];
    if let FormulaValue::Error(e) = target {
        return Ok(FormulaValue::Error(*e));
    }
    let rest = &args[1..];
    for pair in rest.chunks_exact(2) {
        if compare_values(target, &pair[0]) == Ordering::Equal {
            return Ok(pair[1].clone());
        }
    }
    Ok(match rest.len() % 2 {
        1 => rest[rest.len() - 1].clone(),
        _ => FormulaValue::Error(CellError::Na),
    })
}

pub fn fn_true(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(true))
}

pub fn fn_false(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Boolean(false))
}

#[cfg(test)]
mod tests {
    use crate::evaluator::{evaluate, EvaluationContext, FormulaValue};
    use crate::parser::parse_formula;
    use formsheet_core::CellError;

    fn eval(formula: &str) -> FormulaValue {
        evaluate(&parse_formula(formula).unwrap(), &EvaluationContext::simple()).unwrap()
    }

    #[test]
    fn test_if() {
        assert_eq!(eval("=IF(1>0,\"yes\",\"no\")"), FormulaValue::String("yes".into()));
        assert_eq!(eval("=IF(0,\"yes\")"), FormulaValue::Boolean(false));
        assert_eq!(eval("=IF(\"maybe\",1,2)"), FormulaValue::Error(CellError::Value));
    }

    #[test]
    fn test_boolean_combinators() {
        assert_eq!(eval("=AND(TRUE,1,{TRUE,\"x\"})"), FormulaValue::Boolean(true));
        assert_eq!(eval("=OR(FALSE,0)"), FormulaValue::Boolean(false));
        assert_eq!(eval("=XOR(TRUE,TRUE,TRUE)"), FormulaValue::Boolean(true));
        assert_eq!(eval("=NOT(TRUE())"), FormulaValue::Boolean(false));
    }

    #[test]
    fn test_error_handling_functions() {
        assert_eq!(eval("=IFERROR(1/0,-1)"), FormulaValue::Number(-1.0));
        assert_eq!(eval("=IFNA(#N/A,\"none\")"), FormulaValue::String("none".into()));
        assert_eq!(eval("=IFNA(#REF!,1)"), FormulaValue::Error(CellError::Ref));
    }

    #[test]
    fn test_ifs_and_switch() {
        assert_eq!(eval("=IFS(1>2,\"a\",2>1,\"b\")"), FormulaValue::String("b".into()));
        assert_eq!(eval("=IFS(FALSE,1)"), FormulaValue::Error(CellError::Na));
        assert_eq!(eval("=SWITCH(\"B\",\"a\",1,\"b\",2)"), FormulaValue::Number(2.0));
        assert_eq!(eval("=SWITCH(9,1,\"one\",\"other\")"), FormulaValue::String("other".into()));
    }
}
