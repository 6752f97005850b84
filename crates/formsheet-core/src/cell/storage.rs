//! Sparse cell storage
//!
//! Only non-empty cells are kept, in a row-major
//! `BTreeMap<row, BTreeMap<col, CellData>>` so row bands can be copied
//! and iterated in order.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use super::{CellAddress, CellRange, CellValue};

/// Value plus style reference of one cell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellData {
    pub value: CellValue,
    /// Opaque style id carried along when rows are copied (0 = default)
    pub style_index: u32,
}

impl CellData {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            style_index: 0,
        }
    }

    pub fn with_style(value: CellValue, style_index: u32) -> Self {
        Self { value, style_index }
    }

    /// No value and default style
    pub fn is_empty(&self) -> bool {
        self.value.is_empty() && self.style_index == 0
    }
}

/// Row-major sparse grid with per-row heights and merged regions
#[derive(Debug, Clone, Default)]
pub struct CellStorage {
    rows: BTreeMap<u32, BTreeMap<u16, CellData>>,
    row_heights: BTreeMap<u32, f64>,
    merged_regions: Vec<CellRange>,
}

impl CellStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, row: u32, col: u16) -> Option<&CellData> {
        self.rows.get(&row)?.get(&col)
    }

    pub fn get_mut(&mut self, row: u32, col: u16) -> Option<&mut CellData> {
        self.rows.get_mut(&row)?.get_mut(&col)
    }

    /// Store `data`; an empty cell is removed instead
    pub fn set(&mut self, row: u32, col: u16, data: CellData) {
        if data.is_empty() {
            self.remove(row, col);
        } else {
            self.rows.entry(row).or_default().insert(col, data);
        }
    }

    /// Replace the value, keeping the style
    pub fn set_value(&mut self, row: u32, col: u16, value: CellValue) {
        let style_index = self.get(row, col).map_or(0, |c| c.style_index);
        self.set(row, col, CellData::with_style(value, style_index));
    }

    pub fn set_style(&mut self, row: u32, col: u16, style_index: u32) {
        let value = self.get(row, col).map(|c| c.value.clone()).unwrap_or_default();
        self.set(row, col, CellData::with_style(value, style_index));
    }

    pub fn remove(&mut self, row: u32, col: u16) -> Option<CellData> {
        let cols = self.rows.get_mut(&row)?;
        let removed = cols.remove(&col);
        if cols.is_empty() {
            self.rows.remove(&row);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.row_heights.clear();
        self.merged_regions.clear();
    }

    pub fn cell_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `(min_row, min_col, max_row, max_col)` of stored cells
    pub fn used_bounds(&self) -> Option<(u32, u16, u32, u16)> {
        let min_row = *self.rows.keys().next()?;
        let max_row = *self.rows.keys().next_back()?;
        let (min_col, max_col) = self
            .rows
            .values()
            .filter_map(|cols| Some((*cols.keys().next()?, *cols.keys().next_back()?)))
            .fold((u16::MAX, 0), |(lo, hi), (a, b)| (lo.min(a), hi.max(b)));
        Some((min_row, min_col, max_row, max_col))
    }

    /// All cells in row order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.rows
            .iter()
            .flat_map(|(&row, cols)| cols.iter().map(move |(&col, data)| (row, col, data)))
    }

    /// Cells of one row in column order
    pub fn iter_row(&self, row: u32) -> impl Iterator<Item = (u16, &CellData)> {
        self.rows
            .get(&row)
            .into_iter()
            .flat_map(|cols| cols.iter().map(|(&col, data)| (col, data)))
    }

    /// Cells of a band of rows
    pub fn iter_rows(
        &self,
        rows: RangeInclusive<u32>,
    ) -> impl Iterator<Item = (u32, u16, &CellData)> {
        self.rows
            .range(rows)
            .flat_map(|(&row, cols)| cols.iter().map(move |(&col, data)| (row, col, data)))
    }

    /// Custom height, if one was set
    pub fn row_height(&self, row: u32) -> Option<f64> {
        self.row_heights.get(&row).copied()
    }

    pub fn set_row_height(&mut self, row: u32, height: Option<f64>) {
        match height {
            Some(h) => self.row_heights.insert(row, h),
            None => self.row_heights.remove(&row),
        };
    }

    /// Copy every cell and the height of `src_row` in `source` onto
    /// `dst_row` here, replacing whatever `dst_row` held.
    pub fn copy_row_from(&mut self, source: &CellStorage, src_row: u32, dst_row: u32) {
        match source.rows.get(&src_row) {
            Some(cols) => {
                self.rows.insert(dst_row, cols.clone());
            }
            None => {
                self.rows.remove(&dst_row);
            }
        }
        self.set_row_height(dst_row, source.row_height(src_row));
    }

    /// Move every row at or below `from` down by `by` rows.
    /// Merged regions starting at or below `from` move with them.
    pub fn shift_rows_down(&mut self, from: u32, by: u32) {
        if by == 0 {
            return;
        }
        let moved = self.rows.split_off(&from);
        self.rows
            .extend(moved.into_iter().map(|(row, cols)| (row + by, cols)));
        let moved = self.row_heights.split_off(&from);
        self.row_heights
            .extend(moved.into_iter().map(|(row, h)| (row + by, h)));
        for region in &mut self.merged_regions {
            if region.start.row >= from {
                region.start.row += by;
                region.end.row += by;
            }
        }
    }

    pub fn merged_regions(&self) -> &[CellRange] {
        &self.merged_regions
    }

    /// Add a merged region unless an identical one already exists
    pub fn add_merged_region(&mut self, range: CellRange) {
        if !self.merged_regions.contains(&range) {
            self.merged_regions.push(range);
        }
    }

    pub fn remove_merged_region(&mut self, index: usize) -> Option<CellRange> {
        (index < self.merged_regions.len()).then(|| self.merged_regions.remove(index))
    }

    pub fn merged_region_at(&self, row: u32, col: u16) -> Option<&CellRange> {
        let addr = CellAddress::new(row, col);
        self.merged_regions.iter().find(|r| r.contains(&addr))
    }

    pub fn is_merged(&self, row: u32, col: u16) -> bool {
        self.merged_region_at(row, col).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> CellData {
        CellData::new(CellValue::Number(n))
    }

    #[test]
    fn test_empty_cells_are_dropped() {
        let mut storage = CellStorage::new();
        storage.set(0, 0, num(1.0));
        assert_eq!(storage.cell_count(), 1);
        storage.set_value(0, 0, CellValue::Empty);
        assert_eq!(storage.cell_count(), 0);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_styled_blank_is_kept() {
        let mut storage = CellStorage::new();
        storage.set_style(3, 2, 7);
        assert_eq!(storage.get(3, 2).unwrap().style_index, 7);
        storage.set_value(3, 2, CellValue::Number(5.0));
        assert_eq!(storage.get(3, 2).unwrap().style_index, 7);
    }

    #[test]
    fn test_used_bounds() {
        let mut storage = CellStorage::new();
        assert!(storage.used_bounds().is_none());
        storage.set(5, 3, num(1.0));
        storage.set(10, 7, num(2.0));
        storage.set(2, 1, num(3.0));
        assert_eq!(storage.used_bounds(), Some((2, 1, 10, 7)));
    }

    #[test]
    fn test_iter_rows_band() {
        let mut storage = CellStorage::new();
        for row in 0..6 {
            storage.set(row, 0, num(f64::from(row)));
        }
        let rows: Vec<u32> = storage.iter_rows(2..=4).map(|(r, _, _)| r).collect();
        assert_eq!(rows, vec![2, 3, 4]);
    }

    #[test]
    fn test_copy_row_from_replaces_destination() {
        let mut template = CellStorage::new();
        template.set(4, 0, num(1.0));
        template.set(4, 2, num(2.0));
        template.set_row_height(4, Some(22.5));

        let mut target = CellStorage::new();
        target.set(9, 5, num(99.0));
        target.copy_row_from(&template, 4, 9);

        assert!(target.get(9, 5).is_none());
        assert_eq!(target.get(9, 2).unwrap().value.as_number(), Some(2.0));
        assert_eq!(target.row_height(9), Some(22.5));

        target.copy_row_from(&template, 0, 9);
        assert!(target.iter_row(9).next().is_none());
    }

    #[test]
    fn test_shift_rows_down() {
        let mut storage = CellStorage::new();
        storage.set(1, 0, num(1.0));
        storage.set(3, 0, num(3.0));
        storage.add_merged_region(CellRange::from_indices(3, 0, 3, 2));
        storage.shift_rows_down(2, 4);

        assert_eq!(storage.get(1, 0).unwrap().value.as_number(), Some(1.0));
        assert!(storage.get(3, 0).is_none());
        assert_eq!(storage.get(7, 0).unwrap().value.as_number(), Some(3.0));
        assert!(storage.is_merged(7, 1));
        assert!(!storage.is_merged(3, 1));
    }

    #[test]
    fn test_merged_regions_dedup() {
        let mut storage = CellStorage::new();
        let range = CellRange::from_indices(0, 0, 1, 1);
        storage.add_merged_region(range);
        storage.add_merged_region(range);
        assert_eq!(storage.merged_regions().len(), 1);
        assert_eq!(storage.remove_merged_region(0), Some(range));
        assert_eq!(storage.remove_merged_region(0), None);
    }
}
