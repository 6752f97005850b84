//! Dependency tracking for formula calculation

use std::collections::BTreeSet;

use ahash::{AHashMap, AHashSet};

use crate::ast::FormulaExpr;
use crate::functions::is_volatile;
use crate::parser::parse_formula;
use formsheet_core::{CellAddress, Workbook};

/// Unique key for a cell (sheet index + address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }

    pub fn from_address(sheet: usize, addr: &CellAddress) -> Self {
        Self::new(sheet, addr.row, addr.col)
    }
}

/// Evaluation order for a set of cells
#[derive(Debug, Default, PartialEq)]
pub struct RecalcOrder {
    /// Every precedent comes before its dependents
    pub order: Vec<CellKey>,
    /// Cells on a cycle or downstream of one
    pub cyclic: Vec<CellKey>,
}

/// Which cells read which
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// cell -> cells that read it
    dependents: AHashMap<CellKey, AHashSet<CellKey>>,
    /// cell -> cells it reads
    precedents: AHashMap<CellKey, AHashSet<CellKey>>,
    volatile: AHashSet<CellKey>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph over every formula cell of the workbook. Formulas that do not
    /// parse contribute no edges.
    pub fn from_workbook(workbook: &Workbook) -> Self {
        let mut graph = Self::new();
        for (sheet, ws) in workbook.worksheets().enumerate() {
            for (row, col, text) in ws.formula_cells() {
                if let Ok(expr) = parse_formula(text) {
                    graph.register_formula(workbook, CellKey::new(sheet, row, col), &expr);
                }
            }
        }
        graph
    }

    /// Replace the edges of `cell` with the references found in `expr`
    pub fn register_formula(&mut self, workbook: &Workbook, cell: CellKey, expr: &FormulaExpr) {
        self.clear_dependencies(cell);
        let mut refs = Vec::new();
        let mut volatile = false;
        expr.walk(&mut |node| match node {
            FormulaExpr::CellRef(r) => {
                if let Some(sheet) = resolve_sheet(workbook, cell.sheet, r.sheet.as_deref()) {
                    refs.push(CellKey::from_address(sheet, &r.address));
                }
            }
            FormulaExpr::RangeRef(r) => {
                if let Some(sheet) = resolve_sheet(workbook, cell.sheet, r.sheet.as_deref()) {
                    refs.extend(r.range.cells().map(|a| CellKey::from_address(sheet, &a)));
                }
            }
            FormulaExpr::Function { name, .. } if is_volatile(name) => volatile = true,
            _ => {}
        });
        for precedent in refs {
            self.add_dependency(precedent, cell);
        }
        if volatile {
            self.volatile.insert(cell);
        }
    }

    /// `dependent` reads `precedent`
    pub fn add_dependency(&mut self, precedent: CellKey, dependent: CellKey) {
        self.dependents.entry(precedent).or_default().insert(dependent);
        self.precedents.entry(dependent).or_default().insert(precedent);
    }

    /// Drop every edge into `cell`; edges out of it stay
    pub fn clear_dependencies(&mut self, cell: CellKey) {
        if let Some(precedents) = self.precedents.remove(&cell) {
            for precedent in precedents {
                if let Some(deps) = self.dependents.get_mut(&precedent) {
                    deps.remove(&cell);
                }
            }
        }
        self.volatile.remove(&cell);
    }

    pub fn get_dependents(&self, cell: CellKey) -> impl Iterator<Item = CellKey> + '_ {
        self.dependents.get(&cell).into_iter().flat_map(|set| set.iter().copied())
    }

    pub fn get_precedents(&self, cell: CellKey) -> impl Iterator<Item = CellKey> + '_ {
        self.precedents.get(&cell).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Cells whose formulas call a volatile function
    pub fn volatile_cells(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.volatile.iter().copied()
    }

    /// Everything reachable from `changed` through dependents, `changed`
    /// included, in evaluation order
    pub fn get_recalc_order(&self, changed: &[CellKey]) -> RecalcOrder {
        let mut affected: AHashSet<CellKey> = AHashSet::new();
        let mut stack: Vec<CellKey> = changed.to_vec();
        while let Some(cell) = stack.pop() {
            if affected.insert(cell) {
                stack.extend(self.get_dependents(cell));
            }
        }

        // Kahn's algorithm; the BTreeSet keeps ties in sheet/row/col order
        let mut in_degree: AHashMap<CellKey, usize> = affected
            .iter()
            .map(|&cell| {
                let n = self.get_precedents(cell).filter(|p| affected.contains(p)).count();
                (cell, n)
            })
            .collect();
        let mut ready: BTreeSet<CellKey> = in_degree
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(cell, _)| *cell)
            .collect();

        let mut order = Vec::with_capacity(affected.len());
        while let Some(cell) = ready.pop_first() {
            order.push(cell);
            for dependent in self.get_dependents(cell) {
                if let Some(n) = in_degree.get_mut(&dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(dependent);
                    }
                }
            }
            in_degree.remove(&cell);
        }

        let mut cyclic: Vec<CellKey> = in_degree.into_keys().collect();
        cyclic.sort();
        RecalcOrder { order, cyclic }
    }

    /// Whether `cell` can reach itself through its precedents
    pub fn has_circular_reference(&self, cell: CellKey) -> bool {
        let mut visited = AHashSet::new();
        let mut stack: Vec<CellKey> = self.get_precedents(cell).collect();
        while let Some(next) = stack.pop() {
            if next == cell {
                return true;
            }
            if visited.insert(next) {
                stack.extend(self.get_precedents(next));
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.dependents.clear();
        self.precedents.clear();
        self.volatile.clear();
    }
}

fn resolve_sheet(workbook: &Workbook, current: usize, name: Option<&str>) -> Option<usize> {
    match name {
        Some(name) => workbook.sheet_index(name),
        None => Some(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn key(row: u32, col: u16) -> CellKey {
        CellKey::new(0, row, col)
    }

    #[test]
    fn test_add_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(key(0, 0), key(0, 1));

        assert!(graph.get_dependents(key(0, 0)).any(|c| c == key(0, 1)));
        assert!(graph.get_precedents(key(0, 1)).any(|c| c == key(0, 0)));
    }

    #[test]
    fn test_recalc_order_respects_chains() {
        // A1 -> B1 -> C1, and A1 -> C1 directly
        let mut graph = DependencyGraph::new();
        graph.add_dependency(key(0, 0), key(0, 1));
        graph.add_dependency(key(0, 1), key(0, 2));
        graph.add_dependency(key(0, 0), key(0, 2));

        let order = graph.get_recalc_order(&[key(0, 0)]);
        assert_eq!(order.order, vec![key(0, 0), key(0, 1), key(0, 2)]);
        assert!(order.cyclic.is_empty());

        let partial = graph.get_recalc_order(&[key(0, 1)]);
        assert_eq!(partial.order, vec![key(0, 1), key(0, 2)]);
    }

    #[test]
    fn test_circular_reference() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(key(0, 0), key(1, 0));
        graph.add_dependency(key(1, 0), key(0, 0));
        graph.add_dependency(key(1, 0), key(2, 0));

        assert!(graph.has_circular_reference(key(0, 0)));
        assert!(!graph.has_circular_reference(key(2, 0)));

        let order = graph.get_recalc_order(&[key(0, 0)]);
        assert!(order.order.is_empty());
        assert_eq!(order.cyclic, vec![key(0, 0), key(1, 0), key(2, 0)]);
    }

    #[test]
    fn test_from_workbook() {
        let mut wb = Workbook::with_sheet("Form").unwrap();
        wb.add_worksheet_with_name("Rates").unwrap();
        let ws = wb.worksheet_mut(0).unwrap();
        ws.set_cell_formula("C1", "SUM(A1:B1)*Rates!A1").unwrap();
        ws.set_cell_formula("D1", "C1+TODAY()").unwrap();

        let graph = DependencyGraph::from_workbook(&wb);
        let mut precedents: Vec<_> = graph.get_precedents(key(0, 2)).collect();
        precedents.sort();
        assert_eq!(precedents, vec![key(0, 0), key(0, 1), CellKey::new(1, 0, 0)]);
        assert_eq!(graph.volatile_cells().collect::<Vec<_>>(), vec![key(0, 3)]);

        let order = graph.get_recalc_order(&[key(0, 1)]);
        assert_eq!(order.order, vec![key(0, 1), key(0, 2), key(0, 3)]);
    }

    #[test]
    fn test_register_formula_replaces_edges() {
        let wb = Workbook::with_sheet("Form").unwrap();
        let mut graph = DependencyGraph::new();
        let cell = key(5, 5);
        graph.register_formula(&wb, cell, &parse_formula("=A1").unwrap());
        graph.register_formula(&wb, cell, &parse_formula("=B2").unwrap());

        assert_eq!(graph.get_precedents(cell).collect::<Vec<_>>(), vec![key(1, 1)]);
        assert_eq!(graph.get_dependents(key(0, 0)).count(), 0);
    }
}
