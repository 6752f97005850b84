//! A1-style cell addresses and rectangular ranges

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// A single cell position, 0-based, with the `$` anchoring flags kept
/// so a reference can be printed back the way it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    /// Row index (0-based)
    pub row: u32,
    /// Column index (0-based, A = 0)
    pub col: u16,
    /// `$` before the row number
    pub row_absolute: bool,
    /// `$` before the column letters
    pub col_absolute: bool,
}

impl CellAddress {
    /// Relative address at `(row, col)`
    pub fn new(row: u32, col: u16) -> Self {
        Self::with_absolute(row, col, false, false)
    }

    /// Address with explicit anchoring flags
    pub fn with_absolute(row: u32, col: u16, row_absolute: bool, col_absolute: bool) -> Self {
        Self {
            row,
            col,
            row_absolute,
            col_absolute,
        }
    }

    /// Same column and anchoring, different row
    pub fn with_row(self, row: u32) -> Self {
        Self { row, ..self }
    }

    /// Parse `A1`, `$A1`, `A$1` or `$A$1`
    ///
    /// ```
    /// use formsheet_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("$C7").unwrap();
    /// assert_eq!((addr.row, addr.col), (6, 2));
    /// assert!(addr.col_absolute && !addr.row_absolute);
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let invalid = |why: &str| Error::InvalidAddress(format!("{why} in '{text}'"));

        let (col_absolute, rest) = match text.strip_prefix('$') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let letters_end = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        if letters_end == 0 {
            return Err(invalid("no column letters"));
        }
        let col = Self::letters_to_column(&rest[..letters_end])?;

        let rest = &rest[letters_end..];
        let (row_absolute, digits) = match rest.strip_prefix('$') {
            Some(digits) => (true, digits),
            None => (false, rest),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("no row number"));
        }
        let row: u32 = digits.parse().map_err(|_| invalid("row number too large"))?;
        if row == 0 {
            return Err(invalid("row numbers start at 1"));
        }
        if row > MAX_ROWS {
            return Err(Error::RowOutOfBounds(row - 1, MAX_ROWS - 1));
        }

        Ok(Self::with_absolute(row - 1, col, row_absolute, col_absolute))
    }

    /// Column index to letters (0 = A, 26 = AA)
    pub fn column_to_letters(col: u16) -> String {
        let mut letters = Vec::with_capacity(3);
        let mut n = u32::from(col) + 1;
        while n > 0 {
            n -= 1;
            letters.push(b'A' + (n % 26) as u8);
            n /= 26;
        }
        letters.iter().rev().map(|&b| b as char).collect()
    }

    /// Letters to column index, case-insensitive
    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() {
            return Err(Error::InvalidAddress("empty column letters".into()));
        }
        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!("invalid column letter '{c}'")));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            if col > u32::from(MAX_COLS) {
                return Err(Error::ColumnOutOfBounds(u16::MAX, MAX_COLS - 1));
            }
        }
        Ok((col - 1) as u16)
    }

    /// Format with anchoring flags, e.g. `$B3`
    pub fn to_a1_string(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.col_absolute { "$" } else { "" },
            Self::column_to_letters(self.col),
            if self.row_absolute { "$" } else { "" },
            self.row + 1
        )
    }

    /// Range spanning from this address to `other`
    pub fn to(&self, other: CellAddress) -> CellRange {
        CellRange::new(*self, other)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Rectangular block of cells, normalized so `start` is top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Range between two corners in any order
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        let (top, bottom) = if a.row <= b.row { (a, b) } else { (b, a) };
        let (left_col, right_col) = (a.col.min(b.col), a.col.max(b.col));
        let (left_abs, right_abs) = if a.col <= b.col {
            (a.col_absolute, b.col_absolute)
        } else {
            (b.col_absolute, a.col_absolute)
        };
        Self {
            start: CellAddress::with_absolute(top.row, left_col, top.row_absolute, left_abs),
            end: CellAddress::with_absolute(bottom.row, right_col, bottom.row_absolute, right_abs),
        }
    }

    /// Range from 0-based bounds
    pub fn from_indices(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        Self::new(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        )
    }

    /// One-cell range
    pub fn single(addr: CellAddress) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    /// Parse `A1:B10` or a bare `C3`
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        match text.split_once(':') {
            Some((a, b)) => Ok(Self::new(CellAddress::parse(a)?, CellAddress::parse(b)?)),
            None => CellAddress::parse(text)
                .map(Self::single)
                .map_err(|_| Error::InvalidRange(text.to_string())),
        }
    }

    pub fn top(&self) -> u32 {
        self.start.row
    }

    pub fn bottom(&self) -> u32 {
        self.end.row
    }

    pub fn left(&self) -> u16 {
        self.start.col
    }

    pub fn right(&self) -> u16 {
        self.end.col
    }

    /// Row indices covered, top to bottom
    pub fn rows(&self) -> RangeInclusive<u32> {
        self.start.row..=self.end.row
    }

    pub fn contains(&self, addr: &CellAddress) -> bool {
        self.rows().contains(&addr.row) && (self.start.col..=self.end.col).contains(&addr.col)
    }

    /// `other` lies entirely inside this range
    pub fn contains_range(&self, other: &CellRange) -> bool {
        self.contains(&other.start) && self.contains(&other.end)
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.row_count()) * u64::from(self.col_count())
    }

    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    /// Same columns, rows moved by `delta`. `None` if that leaves the sheet.
    pub fn offset_rows(&self, delta: i64) -> Option<CellRange> {
        let shift = |row: u32| {
            let moved = i64::from(row) + delta;
            (0..i64::from(MAX_ROWS)).contains(&moved).then_some(moved as u32)
        };
        Some(Self {
            start: self.start.with_row(shift(self.start.row)?),
            end: self.end.with_row(shift(self.end.row)?),
        })
    }

    /// Addresses in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellAddress> + '_ {
        let cols = self.start.col..=self.end.col;
        self.rows()
            .flat_map(move |row| cols.clone().map(move |col| CellAddress::new(row, col)))
    }

    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start, self.end)
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
