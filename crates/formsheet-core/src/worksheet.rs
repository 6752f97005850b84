//! Worksheet type

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::cell::{CellAddress, CellData, CellRange, CellStorage, CellValue};
use crate::comment::CellComment;
use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};

/// One sheet of a workbook: cells, comments and merged regions
#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    cells: CellStorage,
    comments: BTreeMap<(u32, u16), CellComment>,
}

impl Worksheet {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: CellStorage::new(),
            comments: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    // === Cell Access ===

    /// Cell by A1 address
    pub fn cell(&self, address: &str) -> Result<Option<&CellData>> {
        let addr = CellAddress::parse(address)?;
        Ok(self.cells.get(addr.row, addr.col))
    }

    pub fn cell_at(&self, row: u32, col: u16) -> Option<&CellData> {
        self.cells.get(row, col)
    }

    pub fn get_value(&self, address: &str) -> Result<CellValue> {
        let addr = CellAddress::parse(address)?;
        Ok(self.get_value_at(addr.row, addr.col))
    }

    /// Stored value, `Empty` for missing cells
    pub fn get_value_at(&self, row: u32, col: u16) -> CellValue {
        self.cells
            .get(row, col)
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }

    pub fn cell_style_index_at(&self, row: u32, col: u16) -> u32 {
        self.cells.get(row, col).map_or(0, |c| c.style_index)
    }

    // === Cell Modification ===

    pub fn set_cell_value<V: Into<CellValue>>(&mut self, address: &str, value: V) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_cell_value_at(addr.row, addr.col, value)
    }

    /// Replace the value at `(row, col)`, keeping its style
    pub fn set_cell_value_at<V: Into<CellValue>>(
        &mut self,
        row: u32,
        col: u16,
        value: V,
    ) -> Result<()> {
        check_position(row, col)?;
        self.cells.set_value(row, col, value.into());
        Ok(())
    }

    pub fn set_cell_style_index_at(&mut self, row: u32, col: u16, style_index: u32) -> Result<()> {
        check_position(row, col)?;
        self.cells.set_style(row, col, style_index);
        Ok(())
    }

    pub fn set_cell_formula(&mut self, address: &str, formula: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_cell_formula_at(addr.row, addr.col, formula)
    }

    /// Store a formula; a missing leading `=` is added
    pub fn set_cell_formula_at(&mut self, row: u32, col: u16, formula: &str) -> Result<()> {
        check_position(row, col)?;
        let text = match formula.strip_prefix('=') {
            Some(_) => formula.to_string(),
            None => format!("={formula}"),
        };
        self.cells.set_value(row, col, CellValue::formula(text));
        Ok(())
    }

    /// Bounds of all stored cells
    pub fn used_range(&self) -> Option<CellRange> {
        self.cells
            .used_bounds()
            .map(|(r0, c0, r1, c1)| CellRange::from_indices(r0, c0, r1, c1))
    }

    // === Rows ===

    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.cells.row_height(row)
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.cells.set_row_height(row, Some(height));
    }

    /// Copy the rows `src` of `template` so that `src.start()` lands on
    /// `dest_top`. Values, styles, heights and merged regions lying
    /// wholly inside the band are copied. Comments are not: in a
    /// template they hold configuration, not content.
    pub fn copy_rows_from(
        &mut self,
        template: &Worksheet,
        src: RangeInclusive<u32>,
        dest_top: u32,
    ) -> Result<()> {
        let (first, last) = (*src.start(), *src.end());
        if last < first {
            return Ok(());
        }
        let dest_last = u64::from(dest_top) + u64::from(last - first);
        if dest_last >= u64::from(MAX_ROWS) {
            return Err(Error::RowOutOfBounds(dest_last as u32, MAX_ROWS - 1));
        }
        for offset in 0..=(last - first) {
            self.cells
                .copy_row_from(&template.cells, first + offset, dest_top + offset);
        }

        let delta = i64::from(dest_top) - i64::from(first);
        let band = CellRange::from_indices(first, 0, last, MAX_COLS - 1);
        let copied: Vec<CellRange> = template
            .merged_regions()
            .iter()
            .filter(|region| band.contains_range(region))
            .filter_map(|region| region.offset_rows(delta))
            .collect();
        for region in copied {
            self.cells.add_merged_region(region);
        }
        Ok(())
    }

    /// Push every row at or below `from` down by `by` rows, comments included
    pub fn shift_rows(&mut self, from: u32, by: u32) {
        if by == 0 {
            return;
        }
        self.cells.shift_rows_down(from, by);
        let moved = self.comments.split_off(&(from, 0));
        self.comments.extend(
            moved
                .into_iter()
                .map(|((row, col), comment)| ((row + by, col), comment)),
        );
    }

    // === Merged Cells ===

    pub fn merged_regions(&self) -> &[CellRange] {
        self.cells.merged_regions()
    }

    /// Merge a range; fails if it overlaps an existing region
    pub fn merge_cells(&mut self, range: &CellRange) -> Result<()> {
        if self.merged_regions().iter().any(|m| m.overlaps(range)) {
            return Err(Error::MergedCellConflict(range.to_string()));
        }
        self.cells.add_merged_region(*range);
        Ok(())
    }

    pub fn unmerge_cells(&mut self, range: &CellRange) -> bool {
        match self.merged_regions().iter().position(|m| m == range) {
            Some(i) => self.cells.remove_merged_region(i).is_some(),
            None => false,
        }
    }

    // === Comments ===

    pub fn set_comment(&mut self, address: &str, comment: CellComment) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_comment_at(addr.row, addr.col, comment);
        Ok(())
    }

    pub fn set_comment_at(&mut self, row: u32, col: u16, comment: CellComment) {
        self.comments.insert((row, col), comment);
    }

    pub fn comment(&self, address: &str) -> Result<Option<&CellComment>> {
        let addr = CellAddress::parse(address)?;
        Ok(self.comment_at(addr.row, addr.col))
    }

    pub fn comment_at(&self, row: u32, col: u16) -> Option<&CellComment> {
        self.comments.get(&(row, col))
    }

    /// All comments in row-major order
    pub fn comments(&self) -> impl Iterator<Item = ((u32, u16), &CellComment)> {
        self.comments.iter().map(|(&k, v)| (k, v))
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    // === Iteration ===

    pub fn cell_count(&self) -> usize {
        self.cells.cell_count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter_row(&self, row: u32) -> impl Iterator<Item = (u16, &CellData)> {
        self.cells.iter_row(row)
    }

    pub fn iter_rows(&self, rows: RangeInclusive<u32>) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.cells.iter_rows(rows)
    }

    // === Formula calculation support ===

    /// `(row, col, text)` of every formula cell
    pub fn formula_cells(&self) -> impl Iterator<Item = (u32, u16, &str)> {
        self.cells
            .iter()
            .filter_map(|(row, col, cell)| Some((row, col, cell.value.formula_text()?)))
    }

    pub fn get_formula_at(&self, row: u32, col: u16) -> Option<&str> {
        self.cells.get(row, col)?.value.formula_text()
    }

    /// Store the computed result of a formula cell
    pub fn set_formula_result(&mut self, row: u32, col: u16, value: CellValue) -> Result<()> {
        let not_formula = || Error::NotAFormula(CellAddress::new(row, col).to_string());
        match self.cells.get_mut(row, col).map(|c| &mut c.value) {
            Some(CellValue::Formula { cached_value, .. }) => {
                *cached_value = Some(Box::new(value));
                Ok(())
            }
            _ => Err(not_formula()),
        }
    }

    /// Forget every computed formula result
    pub fn clear_formula_results(&mut self) {
        let formula_positions: Vec<(u32, u16)> =
            self.formula_cells().map(|(r, c, _)| (r, c)).collect();
        for (row, col) in formula_positions {
            if let Some(CellValue::Formula { cached_value, .. }) =
                self.cells.get_mut(row, col).map(|c| &mut c.value)
            {
                *cached_value = None;
            }
        }
    }

    /// Computed value for formulas, stored value otherwise
    pub fn get_calculated_value_at(&self, row: u32, col: u16) -> Option<&CellValue> {
        self.cells.get(row, col).map(|cell| cell.value.effective_value())
    }
}

fn check_position(row: u32, col: u16) -> Result<()> {
    if row >= MAX_ROWS {
        return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
    }
    if col >= MAX_COLS {
        return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Worksheet {
        let mut ws = Worksheet::new("Template");
        ws.set_cell_value("A3", "Name").unwrap();
        ws.set_cell_value("B3", 1.0).unwrap();
        ws.set_cell_style_index_at(2, 1, 4).unwrap();
        ws.set_cell_formula("C4", "B3*2").unwrap();
        ws.set_row_height(3, 30.0);
        ws.merge_cells(&CellRange::parse("A4:B4").unwrap()).unwrap();
        ws.merge_cells(&CellRange::parse("D3:D6").unwrap()).unwrap();
        ws.set_comment("A3", CellComment::text_only("fs:each(items=\"rows\")"))
            .unwrap();
        ws
    }

    #[test]
    fn test_set_cell_values() {
        let mut ws = Worksheet::new("Test");
        ws.set_cell_value("A1", "Hello").unwrap();
        ws.set_cell_value("B1", 42.0).unwrap();
        ws.set_cell_value("C1", true).unwrap();

        assert_eq!(ws.get_value("A1").unwrap().as_string(), Some("Hello"));
        assert_eq!(ws.get_value("B1").unwrap().as_number(), Some(42.0));
        assert_eq!(ws.get_value("C1").unwrap().as_bool(), Some(true));
        assert!(ws.set_cell_value_at(MAX_ROWS, 0, 1.0).is_err());
    }

    #[test]
    fn test_formula_prefix_added() {
        let mut ws = Worksheet::new("Test");
        ws.set_cell_formula("A1", "SUM(B1:B10)").unwrap();
        assert_eq!(ws.get_formula_at(0, 0), Some("=SUM(B1:B10)"));
    }

    #[test]
    fn test_formula_results() {
        let mut ws = Worksheet::new("Test");
        ws.set_cell_formula("A1", "=1+1").unwrap();
        ws.set_cell_value("A2", 5.0).unwrap();

        ws.set_formula_result(0, 0, CellValue::Number(2.0)).unwrap();
        assert_eq!(ws.get_calculated_value_at(0, 0), Some(&CellValue::Number(2.0)));
        assert!(matches!(
            ws.set_formula_result(1, 0, CellValue::Empty),
            Err(Error::NotAFormula(addr)) if addr == "A2"
        ));

        ws.clear_formula_results();
        assert!(ws.get_calculated_value_at(0, 0).unwrap().is_formula());
    }

    #[test]
    fn test_copy_rows_from_template() {
        let source = template();
        let mut out = Worksheet::new("Out");
        out.copy_rows_from(&source, 2..=3, 10).unwrap();

        assert_eq!(out.get_value("A11").unwrap().as_string(), Some("Name"));
        assert_eq!(out.cell_style_index_at(10, 1), 4);
        assert_eq!(out.get_formula_at(11, 2), Some("=B3*2"));
        assert_eq!(out.row_height(11), Some(30.0));
        // A4:B4 lies inside the band, D3:D6 does not
        assert_eq!(out.merged_regions(), &[CellRange::parse("A12:B12").unwrap()]);
        assert_eq!(out.comment_count(), 0);
    }

    #[test]
    fn test_copy_rows_twice_does_not_duplicate_merges() {
        let source = template();
        let mut out = Worksheet::new("Out");
        out.copy_rows_from(&source, 3..=3, 3).unwrap();
        out.copy_rows_from(&source, 3..=3, 3).unwrap();
        assert_eq!(out.merged_regions().len(), 1);
    }

    #[test]
    fn test_shift_rows_moves_comments() {
        let mut ws = template();
        ws.shift_rows(2, 2);
        assert!(ws.comment_at(2, 0).is_none());
        assert!(ws.comment_at(4, 0).is_some());
        assert_eq!(ws.get_value("A5").unwrap().as_string(), Some("Name"));
    }

    #[test]
    fn test_merge_conflicts() {
        let mut ws = Worksheet::new("Test");
        ws.merge_cells(&CellRange::parse("A1:C3").unwrap()).unwrap();
        assert!(ws.merge_cells(&CellRange::parse("B2:D4").unwrap()).is_err());
        assert!(ws.unmerge_cells(&CellRange::parse("A1:C3").unwrap()));
        assert!(!ws.unmerge_cells(&CellRange::parse("A1:C3").unwrap()));
    }

    #[test]
    fn test_used_range() {
        let mut ws = Worksheet::new("Test");
        assert!(ws.used_range().is_none());
        ws.set_cell_value_at(5, 3, "A").unwrap();
        ws.set_cell_value_at(10, 7, "B").unwrap();
        assert_eq!(ws.used_range().unwrap().to_string(), "D6:H11");
    }
}
