//! Math and aggregate functions

use super::{collect_numbers, lift, number_arg, CellResult, FunctionDef};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use formsheet_core::CellError;

pub(crate) const FUNCTIONS: &[FunctionDef] = &[
    FunctionDef::variadic("SUM", 1, fn_sum),
    FunctionDef::variadic("PRODUCT", 1, fn_product),
    FunctionDef::variadic("AVERAGE", 1, fn_average),
    FunctionDef::variadic("MIN", 1, fn_min),
    FunctionDef::variadic("MAX", 1, fn_max),
    FunctionDef::variadic("COUNT", 1, fn_count),
    FunctionDef::variadic("COUNTA", 1, fn_counta),
    FunctionDef::fixed("COUNTBLANK", 1, fn_countblank),
    FunctionDef::fixed("ABS", 1, fn_abs),
    FunctionDef::fixed("INT", 1, fn_int),
    FunctionDef::fixed("SIGN", 1, fn_sign),
    FunctionDef::fixed("SQRT", 1, fn_sqrt),
    FunctionDef::fixed("POWER", 2, fn_power),
    FunctionDef::fixed("MOD", 2, fn_mod),
    FunctionDef::range("ROUND", 1, 2, fn_round),
    FunctionDef::range("ROUNDUP", 1, 2, fn_roundup),
    FunctionDef::range("ROUNDDOWN", 1, 2, fn_rounddown),
    FunctionDef::range("TRUNC", 1, 2, fn_rounddown),
];

fn number(n: f64) -> CellResult<FormulaValue> {
    if n.is_finite() {
        Ok(FormulaValue::Number(n))
    } else {
        Err(CellError::Num)
    }
}

fn unary(args: &[FormulaValue], f: impl FnOnce(f64) -> CellResult<f64>) -> FormulaResult<FormulaValue> {
    lift(number_arg(args, 0, None).and_then(f).and_then(number))
}

pub fn fn_sum(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(collect_numbers(args).and_then(|n| number(n.iter().sum())))
}

pub fn fn_product(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(collect_numbers(args).and_then(|n| number(n.iter().product())))
}

pub fn fn_average(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(collect_numbers(args).and_then(|n| {
        if n.is_empty() {
            Err(CellError::Div0)
        } else {
            number(n.iter().sum::<f64>() / n.len() as f64)
        }
    }))
}

pub fn fn_min(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(collect_numbers(args).and_then(|n| number(n.into_iter().reduce(f64::min).unwrap_or(0.0))))
}

pub fn fn_max(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(collect_numbers(args).and_then(|n| number(n.into_iter().reduce(f64::max).unwrap_or(0.0))))
}

/// COUNT never fails; it counts numeric values and skips everything else
pub fn fn_count(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = args
        .iter()
        .flat_map(|a| a.flatten())
        .filter(|v| matches!(v, FormulaValue::Number(_)))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

pub fn fn_counta(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = args
        .iter()
        .flat_map(|a| a.flatten())
        .filter(|v| !matches!(v, FormulaValue::Empty))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

pub fn fn_countblank(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let count = args[0]
        .flatten()
        .filter(|v| matches!(v, FormulaValue::Empty) || matches!(v, FormulaValue::String(s) if s.is_empty()))
        .count();
    Ok(FormulaValue::Number(count as f64))
}

pub fn fn_abs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, |n| Ok(n.abs()))
}

pub fn fn_int(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, |n| Ok(n.floor()))
}

pub fn fn_sign(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, |n| Ok(if n == 0.0 { 0.0 } else { n.signum() }))
}

pub fn fn_sqrt(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    unary(args, |n| if n < 0.0 { Err(CellError::Num) } else { Ok(n.sqrt()) })
}

pub fn fn_power(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let base = number_arg(args, 0, None)?;
        let exp = number_arg(args, 1, None)?;
        if base == 0.0 && exp < 0.0 {
            return Err(CellError::Div0);
        }
        number(base.powf(exp))
    })())
}

/// Result takes the sign of the divisor
pub fn fn_mod(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let n = number_arg(args, 0, None)?;
        let d = number_arg(args, 1, None)?;
        if d == 0.0 {
            return Err(CellError::Div0);
        }
        number(n - d * (n / d).floor())
    })())
}

fn round_with(args: &[FormulaValue], f: fn(f64) -> f64) -> FormulaResult<FormulaValue> {
    lift((|| {
        let n = number_arg(args, 0, None)?;
        let digits = number_arg(args, 1, Some(0.0))?.trunc() as i32;
        if digits >= 0 {
            let factor = 10f64.powi(digits);
            number(f(n * factor) / factor)
        } else {
            let factor = 10f64.powi(-digits);
            number(f(n / factor) * factor)
        }
    })())
}

/// Halves round away from zero
pub fn fn_round(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    round_with(args, f64::round)
}

pub fn fn_roundup(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    round_with(args, |x| if x < 0.0 { x.floor() } else { x.ceil() })
}

pub fn fn_rounddown(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    round_with(args, f64::trunc)
}
