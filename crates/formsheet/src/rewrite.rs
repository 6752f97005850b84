//! Formula rewriting
//!
//! Template formulas refer to template rows. After expansion each watched
//! formula is translated to rendered rows:
//!
//! - a reference to a row rendered once becomes that row
//! - a reference to a repeated row resolves in the innermost repeat
//!   element the formula was rendered in, then in enclosing elements,
//!   then across the whole sheet
//! - several instances used directly as a function argument become a
//!   range when contiguous and an argument list otherwise
//! - references to other sheets and to rows past the template pass through
//!
//! If any reference cannot be placed the formula keeps its template text
//! and the cell is reported as unresolved. A formula whose translation
//! changes nothing keeps its original text byte for byte.

use std::ops::RangeInclusive;

use crate::expand::RowInfo;
use crate::mapping::{RowRemapper, RowsMapping};
use formsheet_core::{CellAddress, CellRange, Worksheet};
use formsheet_formula::{parse_formula, CellReference, FormulaExpr, RangeReference};

/// Mapping entries collected per repeat element while rendering
///
/// Scope 0 is the whole sheet. An entry recorded in a scope is also
/// recorded in all of its ancestors.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    parents: Vec<Option<usize>>,
    entries: Vec<Vec<RowsMapping>>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            parents: vec![None],
            entries: vec![Vec::new()],
        }
    }

    /// New child scope of `parent`
    pub fn open(&mut self, parent: usize) -> usize {
        self.parents.push(Some(parent));
        self.entries.push(Vec::new());
        self.parents.len() - 1
    }

    pub fn record(&mut self, scope: usize, entry: RowsMapping) {
        let mut next = Some(scope);
        while let Some(id) = next {
            if let Some(entries) = self.entries.get_mut(id) {
                entries.push(entry);
            }
            next = self.parents.get(id).copied().flatten();
        }
    }

    pub fn finish(self) -> ScopedRemapper {
        ScopedRemapper {
            parents: self.parents,
            remappers: self.entries.into_iter().map(RowRemapper::new).collect(),
        }
    }
}

/// One [`RowRemapper`] per scope
#[derive(Debug, Clone)]
pub struct ScopedRemapper {
    parents: Vec<Option<usize>>,
    remappers: Vec<RowRemapper>,
}

impl ScopedRemapper {
    pub fn global(&self) -> &RowRemapper {
        &self.remappers[0]
    }

    /// Instances of `template_row` seen from `scope`: the innermost scope
    /// that rendered it wins
    pub fn instances(&self, scope: usize, template_row: u32) -> Vec<u32> {
        let mut next = Some(scope);
        while let Some(id) = next {
            let Some(remapper) = self.remappers.get(id) else {
                break;
            };
            let rows = remapper.rendered_rows(template_row);
            if !rows.is_empty() {
                return rows;
            }
            next = self.parents.get(id).copied().flatten();
        }
        Vec::new()
    }
}

/// Translate every watched formula in place; returns the cells left
/// untranslated
pub fn rewrite_formulas(
    sheet: &mut Worksheet,
    watch: &[(u32, u16)],
    rows: &[RowInfo],
    scopes: &ScopedRemapper,
    template_rows: RangeInclusive<u32>,
) -> Vec<(u32, u16)> {
    let translator = Translator {
        scopes,
        template_rows,
        sheet_name: sheet.name().to_string(),
    };
    let mut unresolved = Vec::new();
    for &(row, col) in watch {
        let Some(text) = sheet.get_formula_at(row, col) else {
            continue;
        };
        let scope = rows.get(row as usize).map_or(0, |info| info.scope);
        match translator.translate(text, scope) {
            Ok(None) => {}
            Ok(Some(translated)) => {
                if let Err(e) = sheet.set_cell_formula_at(row, col, &translated) {
                    log::warn!("Cannot store rewritten formula at {}: {e}", CellAddress::new(row, col));
                    unresolved.push((row, col));
                }
            }
            Err(miss) => {
                log::debug!("Rewrite miss at {}: {miss}", CellAddress::new(row, col));
                unresolved.push((row, col));
            }
        }
    }
    unresolved
}

/// Why a formula could not be translated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteMiss {
    Parse(String),
    /// The template row rendered nowhere
    NoInstance(u32),
    /// A repeated row used where only one cell fits
    Ambiguous(u32),
}

impl std::fmt::Display for RewriteMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RewriteMiss::Parse(message) => write!(f, "cannot parse: {message}"),
            RewriteMiss::NoInstance(row) => write!(f, "template row {} was not rendered", row + 1),
            RewriteMiss::Ambiguous(row) => {
                write!(f, "template row {} is repeated outside a function argument", row + 1)
            }
        }
    }
}

struct Translator<'a> {
    scopes: &'a ScopedRemapper,
    template_rows: RangeInclusive<u32>,
    sheet_name: String,
}

impl Translator<'_> {
    /// `Ok(None)` when nothing changes
    fn translate(&self, text: &str, scope: usize) -> Result<Option<String>, RewriteMiss> {
        let expr = parse_formula(text).map_err(|e| RewriteMiss::Parse(e.to_string()))?;
        let translated = self.single(&expr, scope)?;
        Ok((translated != expr).then(|| translated.to_formula_text()))
    }

    fn single(&self, expr: &FormulaExpr, scope: usize) -> Result<FormulaExpr, RewriteMiss> {
        // outside argument lists expand yields exactly one expression
        let mut out = self.expand(expr, scope, false)?;
        Ok(out.pop().unwrap_or_else(|| expr.clone()))
    }

    /// `expr` translated; more than one result only when `as_argument`
    fn expand(&self, expr: &FormulaExpr, scope: usize, as_argument: bool) -> Result<Vec<FormulaExpr>, RewriteMiss> {
        let one = |e: FormulaExpr| -> Result<Vec<FormulaExpr>, RewriteMiss> { Ok(vec![e]) };
        match expr {
            FormulaExpr::CellRef(r) if self.is_local(r.sheet.as_deref(), r.address.row) => {
                let rows = self.scopes.instances(scope, r.address.row);
                match rows.as_slice() {
                    [] => Err(RewriteMiss::NoInstance(r.address.row)),
                    [row] => one(cell_ref(r, *row)),
                    _ if !as_argument => Err(RewriteMiss::Ambiguous(r.address.row)),
                    [first, .., last] if contiguous(&rows) => one(FormulaExpr::RangeRef(RangeReference {
                        sheet: r.sheet.clone(),
                        range: CellRange::new(r.address.with_row(*first), r.address.with_row(*last)),
                    })),
                    _ => Ok(rows.iter().map(|row| cell_ref(r, *row)).collect()),
                }
            }
            FormulaExpr::RangeRef(r) => one(self.range(r, scope)?),
            FormulaExpr::Function { name, args } => {
                let mut translated = Vec::with_capacity(args.len());
                for arg in args {
                    translated.extend(self.expand(arg, scope, true)?);
                }
                one(FormulaExpr::Function {
                    name: name.clone(),
                    args: translated,
                })
            }
            FormulaExpr::BinaryOp { op, left, right } => one(FormulaExpr::BinaryOp {
                op: *op,
                left: Box::new(self.single(left, scope)?),
                right: Box::new(self.single(right, scope)?),
            }),
            FormulaExpr::UnaryOp { op, operand } => one(FormulaExpr::UnaryOp {
                op: *op,
                operand: Box::new(self.single(operand, scope)?),
            }),
            FormulaExpr::Array(rows) => {
                let rows = rows
                    .iter()
                    .map(|row| row.iter().map(|e| self.single(e, scope)).collect::<Result<Vec<_>, _>>())
                    .collect::<Result<Vec<_>, _>>()?;
                one(FormulaExpr::Array(rows))
            }
            other => one(other.clone()),
        }
    }

    /// First instance of the first rendered row to last instance of the
    /// last one; rows skipped at either end shrink the range
    fn range(&self, r: &RangeReference, scope: usize) -> Result<FormulaExpr, RewriteMiss> {
        let (top, bottom) = (r.range.start.row, r.range.end.row);
        let start_local = self.is_local(r.sheet.as_deref(), top);
        let end_local = self.is_local(r.sheet.as_deref(), bottom);
        if !start_local && !end_local {
            return Ok(FormulaExpr::RangeRef(r.clone()));
        }

        let last_template = bottom.min(*self.template_rows.end());
        let start = if start_local {
            (top..=last_template)
                .find_map(|row| self.scopes.instances(scope, row).first().copied())
                .ok_or(RewriteMiss::NoInstance(top))?
        } else {
            top
        };
        let end = if end_local {
            (top..=bottom)
                .rev()
                .find_map(|row| self.scopes.instances(scope, row).last().copied())
                .ok_or(RewriteMiss::NoInstance(bottom))?
        } else {
            bottom
        };
        if end < start {
            return Err(RewriteMiss::NoInstance(top));
        }
        Ok(FormulaExpr::RangeRef(RangeReference {
            sheet: r.sheet.clone(),
            range: CellRange {
                start: r.range.start.with_row(start),
                end: r.range.end.with_row(end),
            },
        }))
    }

    fn is_local(&self, sheet: Option<&str>, row: u32) -> bool {
        let same_sheet = sheet.map_or(true, |name| name.eq_ignore_ascii_case(&self.sheet_name));
        same_sheet && self.template_rows.contains(&row)
    }
}

fn cell_ref(r: &CellReference, row: u32) -> FormulaExpr {
    FormulaExpr::CellRef(CellReference {
        sheet: r.sheet.clone(),
        address: r.address.with_row(row),
    })
}

fn contiguous(rows: &[u32]) -> bool {
    rows.windows(2).all(|pair| pair[1] == pair[0] + 1)
}
