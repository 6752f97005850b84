//! Template row to rendered row mapping
//!
//! Expansion emits one [`RowsMapping`] per run of template rows it copies
//! (and a zero-count entry for every block it skips). Entries arrive in
//! rendered order and never overlap, so both directions of lookup are
//! binary searches over a sorted index.

use std::collections::BTreeMap;
use std::ops::Range;

/// `template_count` template rows starting at `template_row` rendered as
/// `rendered_count` rows starting at `rendered_start`
///
/// Copied runs have equal counts. A skipped block (false conditional,
/// empty repeat) has `rendered_count == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowsMapping {
    pub template_row: u32,
    pub template_count: u32,
    pub rendered_start: u32,
    pub rendered_count: u32,
}

impl RowsMapping {
    pub fn copied(template_row: u32, rendered_start: u32, count: u32) -> Self {
        Self {
            template_row,
            template_count: count,
            rendered_start,
            rendered_count: count,
        }
    }

    pub fn skipped(template_row: u32, template_count: u32, at: u32) -> Self {
        Self {
            template_row,
            template_count,
            rendered_start: at,
            rendered_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rendered_count == 0
    }

    pub fn rendered_end(&self) -> u32 {
        self.rendered_start + self.rendered_count
    }

    pub fn template_end(&self) -> u32 {
        self.template_row + self.template_count
    }

    pub fn covers_template(&self, row: u32) -> bool {
        (self.template_row..self.template_end()).contains(&row)
    }
}

/// Lookup structure over a completed list of entries
#[derive(Debug, Clone, Default)]
pub struct RowRemapper {
    entries: Vec<RowsMapping>,
    /// non-empty entries by rendered start
    by_rendered: Vec<usize>,
    /// non-empty entries by (template row, rendered start)
    by_template: Vec<usize>,
    /// template rows covered only by skips, disjoint and ascending
    skips: Vec<SkipSpan>,
}

/// Template rows `start..end` whose earliest skip point is `at`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SkipSpan {
    start: u32,
    end: u32,
    at: u32,
}

impl RowRemapper {
    pub fn new(mut entries: Vec<RowsMapping>) -> Self {
        // stable, so zero-count entries keep their place among equals
        entries.sort_by_key(|e| e.rendered_start);

        let (mut filled, skipped): (Vec<usize>, Vec<usize>) =
            (0..entries.len()).partition(|&i| !entries[i].is_empty());
        let by_rendered = filled.clone();
        filled.sort_by_key(|&i| (entries[i].template_row, entries[i].rendered_start));
        let skips = skip_spans(skipped.iter().map(|&i| entries[i]));

        Self {
            entries,
            by_rendered,
            by_template: filled,
            skips,
        }
    }

    pub fn entries(&self) -> &[RowsMapping] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One past the last rendered row
    pub fn rendered_end(&self) -> u32 {
        self.by_rendered
            .last()
            .map_or(0, |&i| self.entries[i].rendered_end())
    }

    pub fn rendered_row_to_template(&self, row: u32) -> Option<u32> {
        let idx = self
            .by_rendered
            .partition_point(|&i| self.entries[i].rendered_start <= row);
        let entry = &self.entries[*self.by_rendered.get(idx.checked_sub(1)?)?];
        (row < entry.rendered_end()).then(|| entry.template_row + (row - entry.rendered_start))
    }

    /// Every rendered instance of `template_row`, ascending
    pub fn rendered_rows(&self, template_row: u32) -> Vec<u32> {
        let end = self
            .by_template
            .partition_point(|&i| self.entries[i].template_row <= template_row);
        let Some(&last) = end.checked_sub(1).and_then(|i| self.by_template.get(i)) else {
            return Vec::new();
        };
        let head = self.entries[last];
        if !head.covers_template(template_row) {
            return Vec::new();
        }
        let start = self
            .by_template
            .partition_point(|&i| self.entries[i].template_row < head.template_row);
        let offset = template_row - head.template_row;
        self.by_template[start..end]
            .iter()
            .map(|&i| self.entries[i].rendered_start + offset)
            .collect()
    }

    /// Hull of all instances. A row that rendered nowhere but was skipped
    /// maps to the empty range at the skip point; a row no entry covers
    /// maps to `None`.
    pub fn template_row_to_rendered(&self, template_row: u32) -> Option<Range<u32>> {
        let rows = self.rendered_rows(template_row);
        if let (Some(first), Some(last)) = (rows.first(), rows.last()) {
            return Some(*first..*last + 1);
        }
        let idx = self.skips.partition_point(|s| s.start <= template_row);
        let span = self.skips.get(idx.checked_sub(1)?)?;
        (template_row < span.end).then_some(span.at..span.at)
    }

    /// Whether any entry, copied or skipped, covers `template_row`
    pub fn covers_template_row(&self, template_row: u32) -> bool {
        self.template_row_to_rendered(template_row).is_some()
    }
}

/// Sweep skipped blocks into disjoint spans, each carrying the lowest
/// skip point of the blocks over it
fn skip_spans(skipped: impl Iterator<Item = RowsMapping>) -> Vec<SkipSpan> {
    let mut starts: Vec<RowsMapping> = skipped.filter(|e| e.template_count > 0).collect();
    let mut ends = starts.clone();
    starts.sort_by_key(|e| e.template_row);
    ends.sort_by_key(|e| e.template_end());

    let mut bounds: Vec<u32> = starts.iter().flat_map(|e| [e.template_row, e.template_end()]).collect();
    bounds.sort_unstable();
    bounds.dedup();

    // skip point -> how many open blocks share it
    let mut open: BTreeMap<u32, usize> = BTreeMap::new();
    let (mut next_start, mut next_end) = (0, 0);
    let mut spans: Vec<SkipSpan> = Vec::new();
    for window in bounds.windows(2) {
        let (lo, hi) = (window[0], window[1]);
        while let Some(e) = ends.get(next_end).filter(|e| e.template_end() <= lo) {
            if let Some(count) = open.get_mut(&e.rendered_start) {
                *count -= 1;
                if *count == 0 {
                    open.remove(&e.rendered_start);
                }
            }
            next_end += 1;
        }
        while let Some(e) = starts.get(next_start).filter(|e| e.template_row <= lo) {
            *open.entry(e.rendered_start).or_default() += 1;
            next_start += 1;
        }
        let Some((&at, _)) = open.first_key_value() else {
            continue;
        };
        match spans.last_mut() {
            Some(last) if last.end == lo && last.at == at => last.end = hi,
            _ => spans.push(SkipSpan { start: lo, end: hi, at }),
        }
    }
    spans
}
