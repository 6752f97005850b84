//! Form sessions
//!
//! A [`FormSession`] owns everything one open form needs: the template
//! workbook, the rendered workbook, the data context, and for the active
//! tab the visible page and its cell cache. Every configured tab is
//! rendered once when the session opens. Each rendered sheet takes its
//! template's slot, so formulas that point at other sheets keep working.
//!
//! Switching tab or page builds a new cache generation; the old one is
//! dropped whole. All calls run synchronously on the caller's thread.
//!
//! # Example
//!
//! ```rust
//! use formsheet::config::{ConfigRange, SessionSettings, SheetConfiguration};
//! use formsheet::session::FormSession;
//! use formsheet::notify::NoopNotifier;
//! use formsheet_core::Workbook;
//! use serde_json::json;
//!
//! let mut templates = Workbook::with_sheet("Form").unwrap();
//! let sheet = templates.worksheet_mut(0).unwrap();
//! sheet.set_cell_value("A1", "${customer}").unwrap();
//!
//! let config = SheetConfiguration::new("Customer", "Form", ConfigRange::parse("A1").unwrap());
//! let mut session = FormSession::open(
//!     templates,
//!     vec![config],
//!     json!({"customer": "Acme"}),
//!     SessionSettings::default(),
//!     NoopNotifier,
//! )
//! .unwrap();
//!
//! assert_eq!(session.cached_display_value(0, 0), "Acme");
//! session.on_value_change(0, 0, "Globex").unwrap();
//! assert_eq!(session.context().root()["customer"], json!("Globex"));
//! ```

use std::ops::Range;

use serde_json::Value;

use crate::annotation::configurations_from_annotations;
use crate::cache::{CachedCell, CellCache, ValidationStatus};
use crate::config::{SessionSettings, SheetConfiguration};
use crate::context::{cell_to_json, DataContext};
use crate::error::{Error, Result};
use crate::expand::{expand, SheetLayout};
use crate::notify::{NoopNotifier, RenderNotifier, RenderTarget};
use crate::recalc::{CalculationStats, Recalculator};
use crate::validation::{RuleIndex, Validator, Verdict};
use formsheet_core::{CellAddress, CellValue, Workbook, Worksheet};
use formsheet_formula::CellKey;

/// One configured tab and its current rendering
#[derive(Debug, Clone)]
struct Tab {
    config: SheetConfiguration,
    /// Index of the template sheet, and of its rendering
    sheet: usize,
    rules: RuleIndex,
    layout: SheetLayout,
}

pub struct FormSession<N: RenderNotifier = NoopNotifier> {
    templates: Workbook,
    workbook: Workbook,
    tabs: Vec<Tab>,
    context: DataContext,
    settings: SessionSettings,
    notifier: N,
    active: usize,
    page: usize,
    cache: CellCache,
    next_generation: u64,
    recalc: Recalculator,
}

impl<N: RenderNotifier> FormSession<N> {
    /// Render every tab of `configs` against `data` and show the first
    /// page of the first tab
    pub fn open(
        templates: Workbook,
        configs: Vec<SheetConfiguration>,
        data: Value,
        settings: SessionSettings,
        notifier: N,
    ) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::InvalidConfiguration("no tabs configured".into()));
        }

        let mut context = DataContext::new(data);
        let mut workbook = templates.clone();
        let mut tabs: Vec<Tab> = Vec::with_capacity(configs.len());
        for config in configs {
            config.check()?;
            let sheet = templates.sheet_index(&config.sheet_name).ok_or_else(|| {
                Error::InvalidConfiguration(format!("tab {}: no sheet named {}", config.tab_name, config.sheet_name))
            })?;
            if let Some(other) = tabs.iter().find(|t| t.sheet == sheet) {
                return Err(Error::InvalidConfiguration(format!(
                    "tabs {} and {} both render sheet {}",
                    other.config.tab_name, config.tab_name, config.sheet_name
                )));
            }
            let template = templates
                .worksheet(sheet)
                .ok_or_else(|| Error::UnknownTab(config.tab_name.clone()))?;

            let rendered = expand(template, &config, &mut context)?;
            log_diagnostics(&config, &rendered.layout);
            workbook.replace_worksheet(sheet, rendered.sheet)?;
            tabs.push(Tab {
                rules: RuleIndex::from_config(&config),
                config,
                sheet,
                layout: rendered.layout,
            });
        }

        let recalc = Recalculator::new(&workbook);
        let stats = recalc.recalc_all(&mut workbook, Some(&context));
        log::debug!(
            "Opened {} tabs, {} formulas calculated",
            tabs.len(),
            stats.cells_calculated
        );

        let mut session = Self {
            templates,
            workbook,
            tabs,
            context,
            settings,
            notifier,
            active: 0,
            page: 0,
            cache: CellCache::new(0),
            next_generation: 0,
            recalc,
        };
        session.rebuild_cache();
        Ok(session)
    }

    /// [`open`](Self::open) with the configuration read from template
    /// annotations
    pub fn open_with_annotations(
        templates: Workbook,
        data: Value,
        settings: SessionSettings,
        notifier: N,
    ) -> Result<Self> {
        let (configs, _) = configurations_from_annotations(&templates);
        Self::open(templates, configs, data, settings, notifier)
    }

    // ===== Tabs and pages =====

    pub fn tab_names(&self) -> impl Iterator<Item = &str> {
        self.tabs.iter().map(|t| t.config.tab_name.as_str())
    }

    pub fn active_tab(&self) -> &str {
        &self.tab().config.tab_name
    }

    /// Show the first page of `tab_name`
    pub fn activate_tab(&mut self, tab_name: &str) -> Result<()> {
        let index = self.tab_index(tab_name)?;
        self.show(index, 0);
        Ok(())
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        let tab = self.tab();
        let rows = tab.layout.body.len();
        let per_page = tab.config.max_rows_per_page.max(1) as usize;
        ((rows + per_page - 1) / per_page).max(1)
    }

    pub fn set_page(&mut self, page: usize) -> Result<()> {
        let pages = self.page_count();
        if page >= pages {
            return Err(Error::PageOutOfRange { page, pages });
        }
        self.show(self.active, page);
        Ok(())
    }

    /// Rendered body rows of the visible page
    pub fn visible_rows(&self) -> Range<u32> {
        let tab = self.tab();
        let body = &tab.layout.body;
        let start = body.start + self.page as u32 * tab.config.max_rows_per_page;
        start.min(body.end)..start.saturating_add(tab.config.max_rows_per_page).min(body.end)
    }

    fn show(&mut self, tab: usize, page: usize) {
        self.active = tab;
        self.page = page;
        self.rebuild_cache();
    }

    /// Start a new cache generation holding the header and the visible
    /// page
    fn rebuild_cache(&mut self) {
        self.cache = CellCache::new(self.next_generation);
        self.next_generation += 1;

        let tab = &self.tabs[self.active];
        let Some(sheet) = self.workbook.worksheet(tab.sheet) else {
            return;
        };
        let header = tab.layout.header.clone().unwrap_or(0..0);
        let cols = tab.config.form_range().cols();
        for row in header.chain(self.visible_rows()) {
            for col in cols.clone() {
                self.cache.refresh(row, col, sheet);
            }
        }
    }

    /// Render `tab_name` again from its template and the current data
    ///
    /// The previous rendering stays in place when expansion fails.
    pub fn rerender(&mut self, tab_name: &str) -> Result<()> {
        let index = self.tab_index(tab_name)?;
        let tab = &self.tabs[index];
        let template = self
            .templates
            .worksheet(tab.sheet)
            .ok_or_else(|| Error::UnknownTab(tab_name.to_string()))?;

        let rendered = expand(template, &tab.config, &mut self.context)?;
        log_diagnostics(&tab.config, &rendered.layout);
        let sheet = tab.sheet;
        self.workbook.replace_worksheet(sheet, rendered.sheet)?;
        self.tabs[index].layout = rendered.layout;

        self.recalc = Recalculator::new(&self.workbook);
        self.recalc_all();
        if index == self.active {
            let page = self.page.min(self.page_count() - 1);
            self.show(index, page);
        }
        Ok(())
    }

    // ===== Cached cells =====

    /// Recompute the cached display value of one visible cell
    pub fn refresh_cached_cell(&mut self, row: u32, col: u16) {
        if !self.is_on_page(row) {
            log::debug!("Not refreshing {}: off page", CellAddress::new(row, col));
            return;
        }
        if let Some(sheet) = self.workbook.worksheet(self.tabs[self.active].sheet) {
            self.cache.refresh(row, col, sheet);
        }
    }

    /// Display value of a visible cell; empty for anything off the page
    pub fn cached_display_value(&self, row: u32, col: u16) -> String {
        if !self.is_on_page(row) {
            return String::new();
        }
        self.cache
            .get(row, col)
            .map(|c| c.display.clone())
            .unwrap_or_default()
    }

    /// Cached cell by page-relative `row:col` key
    pub fn get_by_key(&self, key: &str) -> Option<&CachedCell> {
        let (row, col) = self.key_to_cell(key)?;
        self.cache.get(row, col)
    }

    /// Overwrite a cached display value by page-relative `row:col` key
    pub fn put_by_key(&mut self, key: &str, display: impl Into<String>) -> bool {
        match self.key_to_cell(key) {
            Some((row, col)) => {
                self.cache.put(row, col, display);
                true
            }
            None => false,
        }
    }

    fn key_to_cell(&self, key: &str) -> Option<(u32, u16)> {
        let (row, col) = key.split_once(':')?;
        let row = self.visible_rows().start + row.trim().parse::<u32>().ok()?;
        let col = self.left_col() + col.trim().parse::<u16>().ok()?;
        self.is_on_page(row).then_some((row, col))
    }

    fn is_on_page(&self, row: u32) -> bool {
        self.visible_rows().contains(&row) || self.tab().layout.header.as_ref().is_some_and(|h| h.contains(&row))
    }

    fn left_col(&self) -> u16 {
        self.tab().config.form_range().first_col()
    }

    // ===== Edits and recalculation =====

    /// Clear every formula result and evaluate the whole workbook again,
    /// then refresh the visible cells
    pub fn recalc_all(&mut self) -> CalculationStats {
        self.context.reset();
        let stats = self.recalc.recalc_all(&mut self.workbook, Some(&self.context));
        let keys: Vec<(u32, u16)> = self.cache.iter().map(|(key, _)| key).collect();
        if let Some(sheet) = self.workbook.worksheet(self.tabs[self.active].sheet) {
            for (row, col) in keys {
                self.cache.refresh(row, col, sheet);
            }
        }
        stats
    }

    /// Apply text typed into a visible cell
    ///
    /// The value is written to the rendered sheet and, for a cell bound to
    /// a data path, back into the data context. Dependent formulas are
    /// recalculated. The cell is validated, then its row if the cell
    /// passed. Returns whether everything validated.
    pub fn on_value_change(&mut self, row: u32, col: u16, input: &str) -> Result<bool> {
        let tab = &self.tabs[self.active];
        let sheet_index = tab.sheet;
        let sheet = self
            .workbook
            .worksheet_mut(sheet_index)
            .ok_or_else(|| Error::UnknownTab(tab.config.tab_name.clone()))?;

        let previous = sheet.get_value_at(row, col);
        if previous.is_formula() {
            return Err(Error::ReadOnlyCell(CellAddress::new(row, col).to_string()));
        }
        let value = CellValue::from_input(input, &previous);
        sheet.set_cell_value_at(row, col, value.clone())?;

        if let (Some(path), Some(info)) = (tab.layout.binding(row, col), tab.layout.row(row)) {
            self.context.restore(&info.bindings);
            if !self.context.assign(path, cell_to_json(&value)) {
                log::debug!("Cannot save {} to {path}", CellAddress::new(row, col));
            }
        }

        self.context.reset();
        let stats = self.recalc.recalc_from(
            &mut self.workbook,
            &[CellKey::new(sheet_index, row, col)],
            Some(&self.context),
        );
        self.refresh_cached_cell(row, col);

        let mut valid = self.validate_cell(row, col, true);
        if valid {
            valid = self.validate_row(row, true);
        }

        for key in stats.recalculated.iter().filter(|k| k.sheet == sheet_index) {
            self.refresh_cached_cell(key.row, key.col);
        }
        Ok(valid)
    }

    // ===== Validation =====

    /// Validate one visible cell and record the outcome
    ///
    /// Cells off the visible page pass. A change in invalid status asks
    /// the notifier to re-render that cell's group.
    pub fn validate_cell(&mut self, row: u32, col: u16, pass_empty: bool) -> bool {
        if !self.visible_rows().contains(&row) {
            return true;
        }
        let tab = &self.tabs[self.active];
        let Some(sheet) = self.workbook.worksheet(tab.sheet) else {
            return true;
        };
        let validator = Validator {
            sheet,
            layout: &tab.layout,
            rules: &tab.rules,
            error_suffix: tab.config.error_suffix.as_deref(),
            default_message: &self.settings.default_message,
        };
        let verdict = validator.check(&mut self.context, row, col, pass_empty);

        let valid = verdict.is_valid();
        let (status, message) = match verdict {
            Verdict::Valid => (ValidationStatus::Valid, None),
            Verdict::Invalid(message) => (ValidationStatus::Invalid, Some(message)),
        };
        if self.cache.set_status(row, col, status, message) {
            self.request_render(row, col);
        }
        valid
    }

    /// Validate every cell of a visible row, then refresh that row's
    /// cached cells and no others
    pub fn validate_row(&mut self, row: u32, pass_empty: bool) -> bool {
        let mut valid = true;
        for col in self.tab().config.form_range().cols() {
            valid = self.validate_cell(row, col, pass_empty) && valid;
        }
        for col in self.tab().config.form_range().cols() {
            self.refresh_cached_cell(row, col);
        }
        valid
    }

    /// Validate the whole visible page
    pub fn validate_all_visible(&mut self, pass_empty: bool) -> bool {
        let mut valid = true;
        for row in self.visible_rows() {
            valid = self.validate_row(row, pass_empty) && valid;
        }
        valid
    }

    /// Validate every page of every tab; the first tab with an invalid
    /// cell is left showing on its first invalid page. When everything
    /// passes the original tab and page are shown again.
    pub fn find_first_invalid_tab(&mut self, pass_empty: bool) -> Option<String> {
        let (active, page) = (self.active, self.page);
        for tab in 0..self.tabs.len() {
            self.show(tab, 0);
            for page in 0..self.page_count() {
                if page > 0 {
                    self.show(tab, page);
                }
                if !self.validate_all_visible(pass_empty) {
                    log::info!("Tab {} has invalid cells on page {}", self.active_tab(), page + 1);
                    return Some(self.active_tab().to_string());
                }
            }
        }
        self.show(active, page);
        None
    }

    /// Recalculate and validate everything before a save
    pub fn pre_validation(&mut self, pass_empty: bool) -> bool {
        self.recalc_all();
        self.find_first_invalid_tab(pass_empty).is_none()
    }

    fn request_render(&mut self, row: u32, col: u16) {
        let Some(client_id) = self.settings.client_id.clone() else {
            return;
        };
        let target = RenderTarget {
            client_id,
            row: row - self.visible_rows().start,
            col: col.saturating_sub(self.left_col()),
        };
        log::trace!("Re-render {target}");
        self.notifier.request_render(target);
    }

    // ===== Accessors =====

    fn tab(&self) -> &Tab {
        &self.tabs[self.active]
    }

    fn tab_index(&self, tab_name: &str) -> Result<usize> {
        self.tabs
            .iter()
            .position(|t| t.config.tab_name.eq_ignore_ascii_case(tab_name))
            .ok_or_else(|| Error::UnknownTab(tab_name.to_string()))
    }

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    pub fn templates(&self) -> &Workbook {
        &self.templates
    }

    /// Rendered sheet of the active tab
    pub fn active_sheet(&self) -> Option<&Worksheet> {
        self.workbook.worksheet(self.tab().sheet)
    }

    pub fn config(&self) -> &SheetConfiguration {
        &self.tab().config
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.tab().layout
    }

    pub fn cache(&self) -> &CellCache {
        &self.cache
    }

    pub fn context(&self) -> &DataContext {
        &self.context
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    /// The data document with every saved edit
    pub fn into_data(self) -> Value {
        self.context.into_root()
    }
}

fn log_diagnostics(config: &SheetConfiguration, layout: &SheetLayout) {
    for diagnostic in &layout.diagnostics {
        log::warn!("Tab {}: {diagnostic}", config.tab_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandConfig, ConfigRange, ValidationRule};
    use crate::notify::RecordingNotifier;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn range(text: &str) -> ConfigRange {
        ConfigRange::parse(text).unwrap()
    }

    /// Header row, then one row per item: A = name, B = qty
    fn items_session(count: usize, per_page: u32) -> FormSession<RecordingNotifier> {
        let mut templates = Workbook::with_sheet("Items").unwrap();
        let sheet = templates.worksheet_mut(0).unwrap();
        sheet.set_cell_value("A1", "Name").unwrap();
        sheet.set_cell_value("B1", "Qty").unwrap();
        sheet.set_cell_value("A2", "${i.name}").unwrap();
        sheet.set_cell_value("B2", "${i.qty}").unwrap();

        let mut config = SheetConfiguration::new("Items", "Items", range("A2:B2"));
        config.header_range = Some(range("A1:B1"));
        config.max_rows_per_page = per_page;
        config.commands.push(CommandConfig::Each {
            range: range("A2:B2"),
            var: "i".into(),
            items: "items".into(),
        });
        config
            .validations
            .push(ValidationRule::new("B2", "$value > 0", Some("Quantity must be positive")));

        let items: Vec<Value> = (0..count).map(|n| json!({"name": format!("item{n}"), "qty": n + 1})).collect();
        FormSession::open(
            templates,
            vec![config],
            json!({ "items": items }),
            SessionSettings::with_client_id("form"),
            RecordingNotifier::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_paging() {
        let mut session = items_session(5, 2);
        assert_eq!(session.page_count(), 3);
        assert_eq!(session.visible_rows(), 1..3);
        assert_eq!(session.cached_display_value(0, 0), "Name");
        assert_eq!(session.cached_display_value(1, 0), "item0");
        assert_eq!(session.cached_display_value(3, 0), "");

        let generation = session.cache().generation();
        session.set_page(2).unwrap();
        assert_eq!(session.visible_rows(), 5..6);
        assert_eq!(session.cached_display_value(5, 0), "item4");
        assert!(session.cache().generation() > generation);
        assert!(session.cache().get(1, 0).is_none());
        assert!(matches!(session.set_page(3), Err(Error::PageOutOfRange { page: 3, pages: 3 })));
    }

    #[test]
    fn test_invalid_flip_requests_one_render() {
        let mut session = items_session(2, 10);
        assert!(!session.on_value_change(2, 1, "-4").unwrap());
        assert_eq!(
            session.cache().get(2, 1).and_then(|c| c.message.clone()).as_deref(),
            Some("Quantity must be positive")
        );
        assert_eq!(session.notifier().targets.len(), 1);
        assert_eq!(session.notifier().targets[0].component_id(), "form:1:group1");

        // still invalid: no new request
        assert!(!session.validate_cell(2, 1, false));
        assert_eq!(session.notifier().targets.len(), 1);

        assert!(session.on_value_change(2, 1, "4").unwrap());
        assert_eq!(session.notifier_mut().drain().len(), 2);
    }

    #[test]
    fn test_edit_is_saved_to_context() {
        let mut session = items_session(2, 10);
        session.on_value_change(2, 0, "widget").unwrap();
        session.on_value_change(2, 1, "1,500").unwrap();
        assert_eq!(session.cached_display_value(2, 1), "1500");
        let data = session.into_data();
        assert_eq!(data["items"][1], json!({"name": "widget", "qty": 1500.0}));
    }

    #[test]
    fn test_off_page_cells_pass() {
        let mut session = items_session(5, 2);
        session.workbook.worksheet_mut(0).unwrap().set_cell_value_at(4, 1, -1.0).unwrap();
        assert!(session.validate_cell(4, 1, false));
        assert!(session.validate_all_visible(false));
        assert_eq!(session.find_first_invalid_tab(false).as_deref(), Some("Items"));
        assert_eq!(session.page(), 1);
    }

    #[test]
    fn test_formula_cells_are_read_only() {
        let mut session = items_session(1, 10);
        session.workbook.worksheet_mut(0).unwrap().set_cell_formula_at(1, 1, "=2").unwrap();
        assert!(matches!(session.on_value_change(1, 1, "3"), Err(Error::ReadOnlyCell(_))));
    }

    #[test]
    fn test_unknown_tab() {
        let mut session = items_session(1, 10);
        assert!(matches!(session.activate_tab("Nope"), Err(Error::UnknownTab(_))));
        assert_eq!(session.active_tab(), "Items");
    }

    #[test]
    fn test_keyed_cache_access() {
        let mut session = items_session(4, 2);
        session.set_page(1).unwrap();
        assert_eq!(session.get_by_key("0:0").map(|c| c.display.as_str()), Some("item2"));
        assert!(session.put_by_key("1:1", "x"));
        assert_eq!(session.cached_display_value(4, 1), "x");
        assert!(!session.put_by_key("5:0", "x"));
        assert!(session.get_by_key("bad").is_none());
    }
}
