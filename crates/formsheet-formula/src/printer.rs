//! Formula printing
//!
//! Turns an AST back into formula text. Parentheses are emitted only
//! where precedence requires them, so `parse -> print` may normalize
//! redundant parentheses and spacing but never changes meaning.

use std::fmt::{self, Write as _};

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator};

const UNARY_PRECEDENCE: u8 = 6;
const ATOM_PRECEDENCE: u8 = 8;

impl FormulaExpr {
    /// Formula text with the leading `=`
    ///
    /// ```rust
    /// use formsheet_formula::parse_formula;
    ///
    /// let ast = parse_formula("=SUM( $A$1 : A4 ) * (2 + 3)").unwrap();
    /// assert_eq!(ast.to_formula_text(), "=SUM($A$1:A4)*(2+3)");
    /// ```
    pub fn to_formula_text(&self) -> String {
        format!("={self}")
    }

    fn precedence(&self) -> u8 {
        match self {
            FormulaExpr::BinaryOp { op, .. } => op.precedence(),
            FormulaExpr::UnaryOp {
                op: UnaryOperator::Negate,
                ..
            } => UNARY_PRECEDENCE,
            // postfix % sits just above prefix minus
            FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                ..
            } => UNARY_PRECEDENCE,
            FormulaExpr::Number(n) if *n < 0.0 => UNARY_PRECEDENCE,
            _ => ATOM_PRECEDENCE,
        }
    }
}

impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaExpr::Number(n) => f.write_str(&format_number(*n)),
            FormulaExpr::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            FormulaExpr::Boolean(b) => f.write_str(if *b { "TRUE" } else { "FALSE" }),
            FormulaExpr::Error(e) => f.write_str(e.as_str()),
            FormulaExpr::CellRef(r) => {
                write_sheet(f, r.sheet.as_deref())?;
                write!(f, "{}", r.address)
            }
            FormulaExpr::RangeRef(r) => {
                write_sheet(f, r.sheet.as_deref())?;
                write!(f, "{}:{}", r.range.start, r.range.end)
            }
            FormulaExpr::NameRef(name) => f.write_str(name),
            FormulaExpr::BinaryOp { op, left, right } => {
                let prec = op.precedence();
                // ^ groups to the right, everything else to the left
                let (left_min, right_min) = if *op == BinaryOperator::Power {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                write_operand(f, left, left_min)?;
                f.write_str(op.symbol())?;
                write_operand(f, right, right_min)
            }
            FormulaExpr::UnaryOp {
                op: UnaryOperator::Negate,
                operand,
            } => {
                f.write_char('-')?;
                write_operand(f, operand, UNARY_PRECEDENCE)
            }
            FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                operand,
            } => {
                write_operand(f, operand, UNARY_PRECEDENCE + 1)?;
                f.write_char('%')
            }
            FormulaExpr::Function { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_char(')')
            }
            FormulaExpr::Array(rows) => {
                f.write_char('{')?;
                for (r, row) in rows.iter().enumerate() {
                    if r > 0 {
                        f.write_char(';')?;
                    }
                    for (c, item) in row.iter().enumerate() {
                        if c > 0 {
                            f.write_char(',')?;
                        }
                        write!(f, "{item}")?;
                    }
                }
                f.write_char('}')
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &FormulaExpr, min: u8) -> fmt::Result {
    if expr.precedence() < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

fn write_sheet(f: &mut fmt::Formatter<'_>, sheet: Option<&str>) -> fmt::Result {
    match sheet {
        None => Ok(()),
        Some(name) if name.chars().all(|c| c.is_alphanumeric() || c == '_') => {
            write!(f, "{name}!")
        }
        Some(name) => write!(f, "'{}'!", name.replace('\'', "''")),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::parse_formula;
    use pretty_assertions::assert_eq;

    fn reprint(text: &str) -> String {
        parse_formula(text).unwrap().to_formula_text()
    }

    #[test]
    fn test_minimal_parentheses() {
        assert_eq!(reprint("=(1+2)*3"), "=(1+2)*3");
        assert_eq!(reprint("=1+(2*3)"), "=1+2*3");
        assert_eq!(reprint("=1-(2-3)"), "=1-(2-3)");
        assert_eq!(reprint("=(1-2)-3"), "=1-2-3");
        assert_eq!(reprint("=(2^3)^2"), "=(2^3)^2");
        assert_eq!(reprint("=2^(3^2)"), "=2^3^2");
        assert_eq!(reprint("=-(A1+1)"), "=-(A1+1)");
    }

    #[test]
    fn test_references_and_literals() {
        assert_eq!(reprint("='My Sheet'!$A1"), "='My Sheet'!$A1");
        assert_eq!(reprint("=Data!A1:B2"), "=Data!A1:B2");
        assert_eq!(reprint("=\"a\"\"b\"&TRUE"), "=\"a\"\"b\"&TRUE");
        assert_eq!(reprint("=2.50+10%"), "=2.5+10%");
        assert_eq!(reprint("={1,2;3,4}"), "={1,2;3,4}");
        assert_eq!(reprint("=if(a.b>=0, #N/A, 1)"), "=IF(a.b>=0,#N/A,1)");
    }
}
