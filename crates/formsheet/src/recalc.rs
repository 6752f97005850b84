//! Workbook recalculation
//!
//! [`Recalculator`] parses every formula of a rendered workbook once and
//! keeps the dependency graph. A full pass forgets all cached results and
//! evaluates every formula in dependency order. The incremental pass
//! after an edit evaluates only what lies downstream of the changed cells,
//! plus volatile formulas.
//!
//! Cells on a circular chain get `#REF!`. An evaluation failure is logged
//! and stored as `#VALUE!`; neither stops the pass.
//!
//! # Example
//!
//! ```rust
//! use formsheet::recalc::WorkbookCalculationExt;
//! use formsheet_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::with_sheet("Form").unwrap();
//! let sheet = workbook.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", 10.0).unwrap();
//! sheet.set_cell_formula("A2", "=A1*2").unwrap();
//!
//! let stats = workbook.recalc_all();
//! assert_eq!(stats.cells_calculated, 1);
//! assert_eq!(
//!     workbook.worksheet(0).unwrap().get_calculated_value_at(1, 0),
//!     Some(&CellValue::Number(20.0))
//! );
//! ```

use ahash::AHashMap;

use formsheet_core::{CellAddress, CellError, CellValue, Workbook};
use formsheet_formula::{
    evaluate, parse_formula, CellKey, DependencyGraph, EvaluationContext, FormulaExpr, FormulaValue,
    NameResolver,
};

#[derive(Debug, Clone)]
pub struct CalculationOptions {
    /// Re-evaluate volatile formulas (TODAY, NOW) on every incremental pass
    pub calculate_volatile: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            calculate_volatile: true,
        }
    }
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalculationStats {
    /// Formula cells known to the recalculator
    pub formula_count: usize,
    pub cells_calculated: usize,
    /// Cells on or downstream of a cycle
    pub circular_references: usize,
    pub volatile_cells: usize,
    /// Parse and evaluation failures
    pub errors: usize,
    /// Formula cells that received a new result, in evaluation order
    pub recalculated: Vec<CellKey>,
}

pub trait WorkbookCalculationExt {
    /// Clear and re-evaluate every formula
    fn recalc_all(&mut self) -> CalculationStats;

    /// As [`recalc_all`](Self::recalc_all), resolving bare names through
    /// `names`
    fn recalc_all_with(&mut self, names: &dyn NameResolver) -> CalculationStats;
}

impl WorkbookCalculationExt for Workbook {
    fn recalc_all(&mut self) -> CalculationStats {
        Recalculator::new(self).recalc_all(self, None)
    }

    fn recalc_all_with(&mut self, names: &dyn NameResolver) -> CalculationStats {
        Recalculator::new(self).recalc_all(self, Some(names))
    }
}

/// Parsed formulas and their dependency graph
#[derive(Debug, Default)]
pub struct Recalculator {
    options: CalculationOptions,
    graph: DependencyGraph,
    parsed: AHashMap<CellKey, FormulaExpr>,
    parse_errors: usize,
}

impl Recalculator {
    pub fn new(workbook: &Workbook) -> Self {
        Self::with_options(workbook, CalculationOptions::default())
    }

    pub fn with_options(workbook: &Workbook, options: CalculationOptions) -> Self {
        let mut calc = Self {
            options,
            ..Self::default()
        };
        calc.collect_formulas(workbook);
        calc
    }

    fn collect_formulas(&mut self, workbook: &Workbook) {
        for (sheet, ws) in workbook.worksheets().enumerate() {
            for (row, col, text) in ws.formula_cells() {
                let key = CellKey::new(sheet, row, col);
                match parse_formula(text) {
                    Ok(expr) => {
                        self.graph.register_formula(workbook, key, &expr);
                        self.parsed.insert(key, expr);
                    }
                    Err(e) => {
                        log::warn!("Cannot parse formula at {}!{}: {e}", ws.name(), CellAddress::new(row, col));
                        self.parse_errors += 1;
                    }
                }
            }
        }
    }

    pub fn formula_count(&self) -> usize {
        self.parsed.len()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn is_formula(&self, key: CellKey) -> bool {
        self.parsed.contains_key(&key)
    }

    /// Clear every cached result and evaluate all formulas
    pub fn recalc_all(&self, workbook: &mut Workbook, names: Option<&dyn NameResolver>) -> CalculationStats {
        let sheet_count = workbook.worksheets().count();
        for sheet in 0..sheet_count {
            if let Some(ws) = workbook.worksheet_mut(sheet) {
                ws.clear_formula_results();
            }
        }
        let all: Vec<CellKey> = self.parsed.keys().copied().collect();
        let mut stats = self.stats();
        stats.errors += self.parse_errors;
        self.run(workbook, &all, names, &mut stats);
        stats
    }

    /// Evaluate the formulas downstream of `changed`
    pub fn recalc_from(
        &self,
        workbook: &mut Workbook,
        changed: &[CellKey],
        names: Option<&dyn NameResolver>,
    ) -> CalculationStats {
        let mut seeds = changed.to_vec();
        if self.options.calculate_volatile {
            seeds.extend(self.graph.volatile_cells());
        }
        let mut stats = self.stats();
        self.run(workbook, &seeds, names, &mut stats);
        stats
    }

    /// Evaluate one formula cell without storing the result
    pub fn evaluate_cell(&self, workbook: &Workbook, key: CellKey, names: Option<&dyn NameResolver>) -> Option<FormulaValue> {
        let expr = self.parsed.get(&key)?;
        let mut ctx = EvaluationContext::new(Some(workbook), key.sheet, key.row, key.col);
        if let Some(names) = names {
            ctx = ctx.with_names(names);
        }
        Some(evaluate(expr, &ctx).unwrap_or_else(|e| {
            log::warn!("Evaluation error at {}: {e}", describe(workbook, key));
            FormulaValue::Error(CellError::Value)
        }))
    }

    fn stats(&self) -> CalculationStats {
        CalculationStats {
            formula_count: self.parsed.len(),
            volatile_cells: self.graph.volatile_cells().count(),
            ..CalculationStats::default()
        }
    }

    fn run(&self, workbook: &mut Workbook, seeds: &[CellKey], names: Option<&dyn NameResolver>, stats: &mut CalculationStats) {
        let order = self.graph.get_recalc_order(seeds);

        for &key in &order.cyclic {
            if !self.parsed.contains_key(&key) {
                continue;
            }
            log::warn!("Circular reference at {}", describe(workbook, key));
            store(workbook, key, CellValue::Error(CellError::Ref));
            stats.circular_references += 1;
            stats.errors += 1;
            stats.recalculated.push(key);
        }

        for key in order.order {
            let Some(expr) = self.parsed.get(&key) else {
                continue;
            };
            let mut ctx = EvaluationContext::new(Some(&*workbook), key.sheet, key.row, key.col);
            if let Some(names) = names {
                ctx = ctx.with_names(names);
            }
            let value = match evaluate(expr, &ctx) {
                Ok(value) => CellValue::from(value),
                Err(e) => {
                    log::warn!("Evaluation error at {}: {e}", describe(workbook, key));
                    stats.errors += 1;
                    CellValue::Error(CellError::Value)
                }
            };
            store(workbook, key, value);
            stats.cells_calculated += 1;
            stats.recalculated.push(key);
        }
    }
}

fn store(workbook: &mut Workbook, key: CellKey, value: CellValue) {
    if let Some(ws) = workbook.worksheet_mut(key.sheet) {
        if let Err(e) = ws.set_formula_result(key.row, key.col, value) {
            log::warn!("Cannot store result: {e}");
        }
    }
}

fn describe(workbook: &Workbook, key: CellKey) -> String {
    let sheet = workbook.worksheet(key.sheet).map_or("?", |ws| ws.name());
    format!("{sheet}!{}", CellAddress::new(key.row, key.col))
}
