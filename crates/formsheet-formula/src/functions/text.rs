//! Text functions
//!
//! Positions are 1-based and count characters, not bytes.

use super::{lift, number_arg, text_arg, CellResult, FunctionDef};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use formsheet_core::CellError;

pub(crate) const FUNCTIONS: &[FunctionDef] = &[
    FunctionDef::fixed("LEN", 1, fn_len),
    FunctionDef::range("LEFT", 1, 2, fn_left),
    FunctionDef::range("RIGHT", 1, 2, fn_right),
    FunctionDef::fixed("MID", 3, fn_mid),
    FunctionDef::fixed("LOWER", 1, fn_lower),
    FunctionDef::fixed("UPPER", 1, fn_upper),
    FunctionDef::fixed("PROPER", 1, fn_proper),
    FunctionDef::fixed("TRIM", 1, fn_trim),
    FunctionDef::variadic("CONCAT", 1, fn_concat),
    FunctionDef::variadic("CONCATENATE", 1, fn_concat),
    FunctionDef::range("FIND", 2, 3, fn_find),
    FunctionDef::range("SEARCH", 2, 3, fn_search),
    FunctionDef::fixed("EXACT", 2, fn_exact),
    FunctionDef::fixed("REPT", 2, fn_rept),
    FunctionDef::range("SUBSTITUTE", 3, 4, fn_substitute),
    FunctionDef::fixed("VALUE", 1, fn_value),
    FunctionDef::fixed("T", 1, fn_t),
];

fn text(s: String) -> CellResult<FormulaValue> {
    Ok(FormulaValue::String(s))
}

fn count_arg(args: &[FormulaValue], index: usize, default: f64) -> CellResult<usize> {
    let n = number_arg(args, index, Some(default))?;
    if n < 0.0 {
        return Err(CellError::Value);
    }
    Ok(n.trunc() as usize)
}

pub fn fn_len(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(text_arg(args, 0).map(|s| FormulaValue::Number(s.chars().count() as f64)))
}

pub fn fn_left(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let s = text_arg(args, 0)?;
        let n = count_arg(args, 1, 1.0)?;
        text(s.chars().take(n).collect())
    })())
}

pub fn fn_right(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let s = text_arg(args, 0)?;
        let n = count_arg(args, 1, 1.0)?;
        let len = s.chars().count();
        text(s.chars().skip(len.saturating_sub(n)).collect())
    })())
}

pub fn fn_mid(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let s = text_arg(args, 0)?;
        let start = number_arg(args, 1, None)?;
        if start < 1.0 {
            return Err(CellError::Value);
        }
        let n = count_arg(args, 2, 0.0)?;
        text(s.chars().skip(start as usize - 1).take(n).collect())
    })())
}

pub fn fn_lower(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(text_arg(args, 0).and_then(|s| text(s.to_lowercase())))
}

pub fn fn_upper(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(text_arg(args, 0).and_then(|s| text(s.to_uppercase())))
}

/// Capitalize the first letter of each run of letters
pub fn fn_proper(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(text_arg(args, 0).and_then(|s| {
        let mut out = String::with_capacity(s.len());
        let mut prev_alpha = false;
        for c in s.chars() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = c.is_alphabetic();
        }
        text(out)
    }))
}

/// Strip outer spaces and collapse inner runs to one space
pub fn fn_trim(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(text_arg(args, 0).and_then(|s| text(s.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" "))))
}

pub fn fn_concat(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut out = String::new();
    for value in args.iter().flat_map(|a| a.flatten()) {
        if let FormulaValue::Error(e) = value {
            return Ok(FormulaValue::Error(*e));
        }
        out.push_str(&value.as_string());
    }
    Ok(FormulaValue::String(out))
}

fn find_impl(args: &[FormulaValue], case_sensitive: bool) -> CellResult<FormulaValue> {
    let mut needle = text_arg(args, 0)?;
    let mut haystack = text_arg(args, 1)?;
    let start = number_arg(args, 2, Some(1.0))?;
    if start < 1.0 {
        return Err(CellError::Value);
    }
    if !case_sensitive {
        needle = needle.to_lowercase();
        haystack = haystack.to_lowercase();
    }
    let chars: Vec<char> = haystack.chars().collect();
    let needle: Vec<char> = needle.chars().collect();
    let from = start as usize - 1;
    if from > chars.len() {
        return Err(CellError::Value);
    }
    (from..=chars.len().saturating_sub(needle.len()))
        .find(|&i| chars[i..].starts_with(&needle))
        .map(|i| FormulaValue::Number((i + 1) as f64))
        .ok_or(CellError::Value)
}

pub fn fn_find(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(find_impl(args, true))
}

pub fn fn_search(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(find_impl(args, false))
}

pub fn fn_exact(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| Ok(FormulaValue::Boolean(text_arg(args, 0)? == text_arg(args, 1)?)))())
}

pub fn fn_rept(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let s = text_arg(args, 0)?;
        let n = count_arg(args, 1, 0.0)?;
        text(s.repeat(n))
    })())
}

/// SUBSTITUTE(text, old, new, [instance])
pub fn fn_substitute(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let s = text_arg(args, 0)?;
        let old = text_arg(args, 1)?;
        let new = text_arg(args, 2)?;
        if old.is_empty() {
            return text(s);
        }
        if args.len() < 4 {
            return text(s.replace(&old, &new));
        }
        let instance = number_arg(args, 3, None)?;
        if instance < 1.0 {
            return Err(CellError::Value);
        }
        match s.match_indices(&old).nth(instance as usize - 1) {
            Some((at, _)) => text(format!("{}{}{}", &s[..at], new, &s[at + old.len()..])),
            None => text(s),
        }
    })())
}

pub fn fn_value(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(match &args[0] {
        FormulaValue::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaValue::Empty => Ok(FormulaValue::Number(0.0)),
        FormulaValue::Error(e) => Err(*e),
        FormulaValue::String(s) => s
            .trim()
            .replace(',', "")
            .parse()
            .map(FormulaValue::Number)
            .map_err(|_| CellError::Value),
        _ => Err(CellError::Value),
    })
}

pub fn fn_t(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match &args[0] {
        FormulaValue::String(s) => FormulaValue::String(s.clone()),
        FormulaValue::Error(e) => FormulaValue::Error(*e),
        _ => FormulaValue::String(String::new()),
    })
}
