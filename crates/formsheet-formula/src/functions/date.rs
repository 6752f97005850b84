//! Date functions
//!
//! Dates are serial day numbers in the 1900 system, where serial 1 is
//! 1900-01-01 and serial 60 is the phantom 1900-02-29 that spreadsheets
//! have always carried. Times are the fractional part of the serial.

use chrono::{Datelike, Local, NaiveDate, Timelike};

use super::{lift, number_arg, CellResult, FunctionDef};
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use formsheet_core::CellError;

pub(crate) const FUNCTIONS: &[FunctionDef] = &[
    FunctionDef::fixed("DATE", 3, fn_date),
    FunctionDef::fixed("YEAR", 1, fn_year),
    FunctionDef::fixed("MONTH", 1, fn_month),
    FunctionDef::fixed("DAY", 1, fn_day),
    FunctionDef::range("WEEKDAY", 1, 2, fn_weekday),
    FunctionDef::fixed("DAYS", 2, fn_days),
    FunctionDef::fixed("TODAY", 0, fn_today).volatile(),
    FunctionDef::fixed("NOW", 0, fn_now).volatile(),
];

/// Serial 60, which has no real calendar date
const PHANTOM_LEAP_DAY: i64 = 60;
const MAX_SERIAL: i64 = 2_958_465; // 9999-12-31

fn epoch_before_leap() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 31)
}

fn epoch_after_leap() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Serial number for a calendar date
pub fn date_to_serial(date: NaiveDate) -> Option<i64> {
    let march_first = NaiveDate::from_ymd_opt(1900, 3, 1)?;
    let epoch = if date < march_first {
        epoch_before_leap()?
    } else {
        epoch_after_leap()?
    };
    let serial = (date - epoch).num_days();
    (serial >= 1).then_some(serial)
}

/// `(year, month, day)` for a serial; the phantom leap day maps to 1900-02-29
pub fn serial_to_ymd(serial: f64) -> Option<(i32, u32, u32)> {
    let serial = serial.trunc() as i64;
    if !(0..=MAX_SERIAL).contains(&serial) {
        return None;
    }
    match serial {
        0 => Some((1900, 1, 0)),
        PHANTOM_LEAP_DAY => Some((1900, 2, 29)),
        s => {
            let epoch = if s < PHANTOM_LEAP_DAY {
                epoch_before_leap()?
            } else {
                epoch_after_leap()?
            };
            let date = epoch + chrono::Duration::days(s);
            Some((date.year(), date.month(), date.day()))
        }
    }
}

/// DATE(year, month, day); months and days overflow into the next unit
pub fn fn_date(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let mut year = number_arg(args, 0, None)?.trunc() as i64;
        let month = number_arg(args, 1, None)?.trunc() as i64;
        let day = number_arg(args, 2, None)?.trunc() as i64;
        if (0..1900).contains(&year) {
            year += 1900;
        }
        let year = year + (month - 1).div_euclid(12);
        let month = (month - 1).rem_euclid(12) + 1;
        let first = i32::try_from(year)
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, month as u32, 1))
            .ok_or(CellError::Num)?;
        let first_serial = date_to_serial(first).ok_or(CellError::Num)?;
        // the phantom day sits between Feb 28 and Mar 1 of 1900
        let mut serial = first_serial + day - 1;
        if first_serial <= PHANTOM_LEAP_DAY - 29 && serial >= PHANTOM_LEAP_DAY {
            serial += 1;
        }
        if !(0..=MAX_SERIAL).contains(&serial) {
            return Err(CellError::Num);
        }
        Ok(FormulaValue::Number(serial as f64))
    })())
}

fn date_part(args: &[FormulaValue], pick: fn((i32, u32, u32)) -> f64) -> FormulaResult<FormulaValue> {
    lift((|| {
        let serial = number_arg(args, 0, None)?;
        let ymd = serial_to_ymd(serial).ok_or(CellError::Num)?;
        Ok(FormulaValue::Number(pick(ymd)))
    })())
}

pub fn fn_year(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    date_part(args, |(y, _, _)| y as f64)
}

pub fn fn_month(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    date_part(args, |(_, m, _)| m as f64)
}

pub fn fn_day(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    date_part(args, |(_, _, d)| d as f64)
}

/// WEEKDAY(serial, [type]); type 1 is Sunday=1, 2 is Monday=1, 3 is Monday=0
pub fn fn_weekday(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let serial = number_arg(args, 0, None)?.trunc() as i64;
        if !(0..=MAX_SERIAL).contains(&serial) {
            return Err(CellError::Num);
        }
        let kind = number_arg(args, 1, Some(1.0))?.trunc() as i64;
        let day = match kind {
            1 => (serial - 1).rem_euclid(7) + 1,
            2 => (serial + 5).rem_euclid(7) + 1,
            3 => (serial + 5).rem_euclid(7),
            _ => return Err(CellError::Num),
        };
        Ok(FormulaValue::Number(day as f64))
    })())
}

pub fn fn_days(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift((|| {
        let end = number_arg(args, 0, None)?.trunc();
        let start = number_arg(args, 1, None)?.trunc();
        Ok(FormulaValue::Number(end - start))
    })())
}

fn today_serial() -> CellResult<i64> {
    date_to_serial(Local::now().date_naive()).ok_or(CellError::Num)
}

pub fn fn_today(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(today_serial().map(|s| FormulaValue::Number(s as f64)))
}

pub fn fn_now(_args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    lift(today_serial().map(|s| {
        let now = Local::now();
        let seconds = now.num_seconds_from_midnight() as f64;
        FormulaValue::Number(s as f64 + seconds / 86_400.0)
    }))
}
