//! Expression engine
//!
//! Template expressions use the formula grammar, with bare dotted names
//! (`e.salary * 12`) resolved by a [`NameResolver`], normally the
//! [`DataContext`](crate::context::DataContext). Three shapes are
//! evaluated:
//!
//! - predicates, for conditionals and validation rules
//! - `${...}` interpolation inside template cell text
//! - validation rules, where `$value` and same-row `$C` tokens are
//!   replaced by literals before parsing
//!
//! The `try_*` functions report an [`ExpressionError`]; the others log it
//! and degrade to `false` or empty.

use lazy_regex::{regex, regex_captures};

use crate::error::ExpressionError;
use formsheet_core::{CellAddress, CellValue};
use formsheet_formula::{
    evaluate, parse_expression, EvaluationContext, FormulaError, FormulaExpr, FormulaValue,
    NameResolver,
};

pub fn parse(expr: &str) -> Result<FormulaExpr, ExpressionError> {
    parse_expression(expr).map_err(|e| ExpressionError::Parse {
        expr: expr.to_string(),
        message: e.to_string(),
    })
}

pub fn try_evaluate(expr: &str, names: &dyn NameResolver) -> Result<FormulaValue, ExpressionError> {
    let ast = parse(expr)?;
    let ctx = EvaluationContext::simple().with_names(names);
    evaluate(&ast, &ctx).map_err(|e| match e {
        FormulaError::UnknownName(name) => ExpressionError::UnboundName(name),
        other => ExpressionError::Evaluation {
            expr: expr.to_string(),
            message: other.to_string(),
        },
    })
}

pub fn try_predicate(expr: &str, names: &dyn NameResolver) -> Result<bool, ExpressionError> {
    let value = try_evaluate(expr, names)?;
    let message = match &value {
        FormulaValue::Error(e) => format!("evaluates to {e}"),
        other => match other.as_bool() {
            Some(b) => return Ok(b),
            None => format!("`{}` is not a boolean", other.as_string()),
        },
    };
    Err(ExpressionError::Evaluation {
        expr: expr.to_string(),
        message,
    })
}

/// Predicate that treats any failure as false
pub fn predicate(expr: &str, names: &dyn NameResolver) -> bool {
    try_predicate(expr, names).unwrap_or_else(|e| {
        log::warn!("Expression failed, treating as false: {e}");
        false
    })
}

/// Fill `${...}` placeholders in `text`
///
/// Text that is exactly one placeholder keeps the type of its value, so
/// `${order.qty}` renders as a number. Failed placeholders render empty
/// and their errors are appended to `errors`.
pub fn interpolate(text: &str, names: &dyn NameResolver, errors: &mut Vec<ExpressionError>) -> CellValue {
    if let Some((_, inner)) = regex_captures!(r"^\s*\$\{([^}]*)\}\s*$", text) {
        return match try_evaluate(inner, names) {
            Ok(value) => CellValue::from(value),
            Err(e) => {
                log::warn!("Cannot fill placeholder in `{text}`: {e}");
                errors.push(e);
                CellValue::Empty
            }
        };
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in regex!(r"\$\{([^}]*)\}").find_iter(text) {
        out.push_str(&text[last..m.start()]);
        let inner = &text[m.start() + 2..m.end() - 1];
        match try_evaluate(inner, names) {
            Ok(value) => out.push_str(&value.as_string()),
            Err(e) => {
                log::warn!("Cannot fill placeholder in `{text}`: {e}");
                errors.push(e);
            }
        }
        last = m.end();
    }
    out.push_str(&text[last..]);
    CellValue::string(out)
}

/// The data path of a cell that is a single plain `${path}` placeholder
pub fn placeholder_path(text: &str) -> Option<&str> {
    regex_captures!(r"^\s*\$\{\s*([A-Za-z_]\w*(?:\.\w+)*)\s*\}\s*$", text).map(|(_, path)| path)
}

/// Replace `$value` with the edited value and `$C` with the value in
/// column C of the same row. Absolute references such as `$C$5` or `$C5`
/// are left alone.
pub fn substitute_rule(rule: &str, value: &CellValue, row_value: impl Fn(u16) -> Option<CellValue>) -> String {
    let mut out = String::with_capacity(rule.len());
    let mut last = 0;
    for (whole, name, trailing, start) in tokens(rule) {
        out.push_str(&rule[last..start]);
        let replacement = if !trailing.is_empty() {
            None
        } else if name.eq_ignore_ascii_case("value") {
            Some(rule_literal(value))
        } else if name.len() <= 3 && name.chars().all(|c| c.is_ascii_uppercase()) {
            CellAddress::letters_to_column(name)
                .ok()
                .map(|col| rule_literal(&row_value(col).unwrap_or_default()))
        } else {
            None
        };
        out.push_str(replacement.as_deref().unwrap_or(whole));
        last = start + whole.len();
    }
    out.push_str(&rule[last..]);
    out
}

/// `(whole, name, trailing, start)` for every `$name` token
fn tokens(rule: &str) -> impl Iterator<Item = (&str, &str, &str, usize)> {
    regex!(r"\$([A-Za-z]+)([\w$]?)")
        .captures_iter(rule)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            let trailing = caps.get(2).map_or("", |m| m.as_str());
            Some((whole.as_str(), name, trailing, whole.start()))
        })
}

/// Formula literal for a cell value
fn rule_literal(value: &CellValue) -> String {
    match value.effective_value() {
        CellValue::Empty | CellValue::Formula { .. } => "\"\"".to_string(),
        CellValue::Number(n) => number_literal(*n),
        CellValue::Boolean(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        CellValue::Error(e) => e.as_str().to_string(),
        CellValue::String(s) => {
            let trimmed = s.as_str().trim();
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_finite() => number_literal(n),
                _ => format!("\"{}\"", trimmed.replace('"', "\"\"")),
            }
        }
    }
}

fn number_literal(n: f64) -> String {
    let text = FormulaValue::Number(n).as_string();
    if n < 0.0 {
        format!("({text})")
    } else {
        text
    }
}

/// Substitute and evaluate a validation rule
pub fn evaluate_rule(
    rule: &str,
    value: &CellValue,
    row_value: impl Fn(u16) -> Option<CellValue>,
    names: &dyn NameResolver,
) -> Result<bool, ExpressionError> {
    try_predicate(&substitute_rule(rule, value, row_value), names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DataContext;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn order() -> DataContext {
        DataContext::new(json!({
            "order": {"id": "A-7", "qty": 3, "price": 2.5, "rush": true, "note": null},
            "limit": 10
        }))
    }

    #[test]
    fn test_predicate() {
        let ctx = order();
        assert!(predicate("order.qty > 2", &ctx));
        assert!(predicate("AND(order.rush, order.qty * order.price < limit)", &ctx));
        assert!(!predicate("order.note", &ctx));
        // failures degrade to false
        assert!(!predicate("missing.flag", &ctx));
        assert!(!predicate("order.id", &ctx));
        assert!(!predicate("1/0", &ctx));
        assert!(!predicate("order.qty >", &ctx));
    }

    #[test]
    fn test_try_predicate_errors() {
        let ctx = order();
        assert_eq!(
            try_predicate("missing.flag", &ctx),
            Err(ExpressionError::UnboundName("missing.flag".into()))
        );
        assert!(matches!(try_predicate("(", &ctx), Err(ExpressionError::Parse { .. })));
        assert!(matches!(try_predicate("1/0", &ctx), Err(ExpressionError::Evaluation { .. })));
    }

    #[test]
    fn test_interpolate() {
        let ctx = order();
        let mut errors = Vec::new();
        assert_eq!(interpolate("${order.qty}", &ctx, &mut errors), CellValue::Number(3.0));
        assert_eq!(
            interpolate("Order ${order.id} x${order.qty}", &ctx, &mut errors),
            CellValue::string("Order A-7 x3")
        );
        assert_eq!(interpolate("${order.qty * order.price}", &ctx, &mut errors), CellValue::Number(7.5));
        assert!(errors.is_empty());

        assert_eq!(interpolate("Hi ${who}!", &ctx, &mut errors), CellValue::string("Hi !"));
        assert_eq!(interpolate("${who}", &ctx, &mut errors), CellValue::Empty);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_placeholder_path() {
        assert_eq!(placeholder_path("${order.qty}"), Some("order.qty"));
        assert_eq!(placeholder_path(" ${ e.name } "), Some("e.name"));
        assert_eq!(placeholder_path("${order.qty * 2}"), None);
        assert_eq!(placeholder_path("x ${order.qty}"), None);
    }

    #[test]
    fn test_substitute_rule() {
        let row = |col: u16| match col {
            1 => Some(CellValue::Number(4.0)),
            2 => Some(CellValue::string("O\"Neil")),
            _ => None,
        };
        assert_eq!(substitute_rule("$value > 0", &CellValue::Number(-1.0), row), "(-1) > 0");
        assert_eq!(substitute_rule("$value <= $B", &CellValue::string(" 12 "), row), "12 <= 4");
        assert_eq!(substitute_rule("LEN($C) > 0", &CellValue::Empty, row), "LEN(\"O\"\"Neil\") > 0");
        assert_eq!(substitute_rule("$D = \"\"", &CellValue::Empty, row), "\"\" = \"\"");
        assert_eq!(substitute_rule("$value < $B$1 + $B2", &CellValue::Boolean(true), row), "TRUE < $B$1 + $B2");
    }

    #[test]
    fn test_evaluate_rule() {
        let ctx = order();
        let row = |_| None;
        assert_eq!(evaluate_rule("$value > 0", &CellValue::string("-1"), row, &ctx), Ok(false));
        assert_eq!(evaluate_rule("$value <= limit", &CellValue::Number(10.0), row, &ctx), Ok(true));
        assert_eq!(evaluate_rule("LEN($value) = 3", &CellValue::string("abc"), row, &ctx), Ok(true));
    }

    #[test]
    fn test_padded_text_is_trimmed() {
        let ctx = order();
        let row = |_| None;
        assert_eq!(substitute_rule("$value = \"ok\"", &CellValue::string("  ok "), row), "\"ok\" = \"ok\"");
        assert_eq!(evaluate_rule("$value = 7", &CellValue::string(" 7 "), row, &ctx), Ok(true));
        assert_eq!(evaluate_rule("LEN($value) = 2", &CellValue::string(" ok\t"), row, &ctx), Ok(true));
    }
}
