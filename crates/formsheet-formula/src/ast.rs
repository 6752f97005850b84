//! Formula abstract syntax tree

use formsheet_core::{CellAddress, CellError, CellRange};

/// Parsed formula or expression
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),

    CellRef(CellReference),
    RangeRef(RangeReference),
    /// Bare identifier, possibly dotted (`order.total`)
    NameRef(String),

    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<FormulaExpr>,
    },

    /// Function call; the name is stored upper-cased
    Function {
        name: String,
        args: Vec<FormulaExpr>,
    },

    /// Array constant, rows of columns
    Array(Vec<Vec<FormulaExpr>>),
}

impl FormulaExpr {
    /// Call `f` on every node, parents before children
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a FormulaExpr)) {
        f(self);
        match self {
            FormulaExpr::BinaryOp { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            FormulaExpr::UnaryOp { operand, .. } => operand.walk(f),
            FormulaExpr::Function { args, .. } => args.iter().for_each(|a| a.walk(f)),
            FormulaExpr::Array(rows) => rows.iter().flatten().for_each(|a| a.walk(f)),
            _ => {}
        }
    }

    /// True if any node satisfies `pred`
    pub fn any(&self, pred: &mut dyn FnMut(&FormulaExpr) -> bool) -> bool {
        let mut found = false;
        self.walk(&mut |node| found = found || pred(node));
        found
    }
}

/// `[Sheet!]A1`
#[derive(Debug, Clone, PartialEq)]
pub struct CellReference {
    pub sheet: Option<String>,
    pub address: CellAddress,
}

/// `[Sheet!]A1:B2`
#[derive(Debug, Clone, PartialEq)]
pub struct RangeReference {
    pub sheet: Option<String>,
    pub range: CellRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    Concat,

    /// `:` between two non-reference operands
    Range,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        use BinaryOperator::*;
        match self {
            Equal | NotEqual | LessThan | LessEqual | GreaterThan | GreaterEqual => 1,
            Concat => 2,
            Add | Subtract => 3,
            Multiply | Divide => 4,
            Power => 5,
            Range => 7,
        }
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Power => "^",
            Equal => "=",
            NotEqual => "<>",
            LessThan => "<",
            LessEqual => "<=",
            GreaterThan => ">",
            GreaterEqual => ">=",
            Concat => "&",
            Range => ":",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Percent,
}
