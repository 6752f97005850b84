//! Cached cells
//!
//! One [`CellCache`] generation covers the visible page of the active
//! tab. Entries are keyed by rendered coordinates and hold what the UI
//! last rendered: the display string and the validation state. A page or
//! tab switch starts a new generation; entries are never carried over.

use ahash::AHashMap;

use formsheet_core::Worksheet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationStatus {
    #[default]
    Unvalidated,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachedCell {
    pub display: String,
    pub status: ValidationStatus,
    pub message: Option<String>,
    /// Bumped on every write; unique within a generation
    pub revision: u64,
}

impl CachedCell {
    pub fn is_invalid(&self) -> bool {
        self.status == ValidationStatus::Invalid
    }
}

#[derive(Debug, Clone, Default)]
pub struct CellCache {
    generation: u64,
    entries: AHashMap<(u32, u16), CachedCell>,
    next_revision: u64,
}

impl CellCache {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            entries: AHashMap::new(),
            next_revision: 1,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, row: u32, col: u16) -> Option<&CachedCell> {
        self.entries.get(&(row, col))
    }

    /// Overwrite the display value, keeping validation state
    pub fn put(&mut self, row: u32, col: u16, display: impl Into<String>) {
        let revision = self.bump();
        let entry = self.entries.entry((row, col)).or_default();
        entry.display = display.into();
        entry.revision = revision;
    }

    /// Recompute the display value of one cell from `sheet`
    pub fn refresh(&mut self, row: u32, col: u16, sheet: &Worksheet) {
        let display = sheet
            .cell_at(row, col)
            .map(|cell| cell.value.to_display_string())
            .unwrap_or_default();
        self.put(row, col, display);
    }

    pub fn status(&self, row: u32, col: u16) -> ValidationStatus {
        self.get(row, col).map_or(ValidationStatus::Unvalidated, |c| c.status)
    }

    /// Record a validation outcome; returns whether the cell went from
    /// invalid to not invalid or back
    pub fn set_status(&mut self, row: u32, col: u16, status: ValidationStatus, message: Option<String>) -> bool {
        let revision = self.bump();
        let entry = self.entries.entry((row, col)).or_default();
        let was_invalid = entry.is_invalid();
        entry.status = status;
        entry.message = message;
        entry.revision = revision;
        was_invalid != entry.is_invalid()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ((u32, u16), &CachedCell)> {
        self.entries.iter().map(|(&k, v)| (k, v))
    }

    /// Cells currently marked invalid
    pub fn invalid_cells(&self) -> impl Iterator<Item = ((u32, u16), &CachedCell)> {
        self.iter().filter(|(_, c)| c.is_invalid())
    }

    fn bump(&mut self) -> u64 {
        let revision = self.next_revision;
        self.next_revision += 1;
        revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsheet_core::CellValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_refresh_touches_one_entry() {
        let mut sheet = Worksheet::new("Form");
        sheet.set_cell_value("A1", 1.5).unwrap();
        sheet.set_cell_value("B1", "x").unwrap();

        let mut cache = CellCache::new(7);
        cache.refresh(0, 0, &sheet);
        cache.refresh(0, 1, &sheet);
        let before = cache.get(0, 1).cloned();

        sheet.set_cell_value_at(0, 0, CellValue::Number(2.0)).unwrap();
        cache.refresh(0, 0, &sheet);

        assert_eq!(cache.get(0, 0).map(|c| c.display.as_str()), Some("2"));
        assert_eq!(cache.get(0, 1).cloned(), before);
        assert_eq!(cache.generation(), 7);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_set_status_reports_invalid_flips() {
        let mut cache = CellCache::new(0);
        assert_eq!(cache.status(3, 3), ValidationStatus::Unvalidated);
        assert!(!cache.set_status(3, 3, ValidationStatus::Valid, None));
        assert!(cache.set_status(3, 3, ValidationStatus::Invalid, Some("bad".into())));
        assert!(!cache.set_status(3, 3, ValidationStatus::Invalid, Some("worse".into())));
        assert_eq!(cache.invalid_cells().count(), 1);
        assert!(cache.set_status(3, 3, ValidationStatus::Valid, None));
        assert_eq!(cache.get(3, 3).and_then(|c| c.message.clone()), None);
    }

    #[test]
    fn test_refresh_missing_cell_is_blank() {
        let mut cache = CellCache::new(0);
        cache.refresh(9, 9, &Worksheet::new("Form"));
        assert_eq!(cache.get(9, 9).map(|c| c.display.clone()), Some(String::new()));
    }
}
