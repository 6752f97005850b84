//! Template expansion
//!
//! Expansion runs in two phases. The first materializes the command tree
//! against the data context: template rows are copied to the rendered
//! sheet, `${...}` placeholders are filled in, and every formula cell is
//! put on a watch list untouched. The second rewrites the watched
//! formulas once the row mapping is complete, since a formula may point
//! at rows that had not been rendered yet when it was copied.

use std::ops::Range;

use ahash::AHashMap;

use crate::command::{Command, CommandTree};
use crate::config::{ConfigRange, SheetConfiguration};
use crate::context::{Binding, DataContext};
use crate::error::{Diagnostic, Result};
use crate::expression;
use crate::mapping::{RowRemapper, RowsMapping};
use crate::rewrite::{self, ScopeTree};
use formsheet_core::{CellValue, Worksheet};

/// Where a rendered row came from
#[derive(Debug, Clone, PartialEq)]
pub struct RowInfo {
    pub template_row: u32,
    /// Full name of the data context the row was rendered under
    pub data_path: String,
    /// The bindings behind `data_path`, for restoring the context
    pub bindings: Vec<Binding>,
    /// Repeat scope the row was rendered in; 0 outside any repeat
    pub scope: usize,
}

/// A command as it was rendered
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedCommand {
    pub type_name: &'static str,
    pub template_range: ConfigRange,
    pub rendered_start: u32,
    pub final_length: u32,
    /// 0 for the root
    pub depth: usize,
}

impl RenderedCommand {
    pub fn rendered_rows(&self) -> Range<u32> {
        self.rendered_start..self.rendered_start + self.final_length
    }
}

/// Everything a session needs to know about a rendered sheet besides the
/// cells themselves
#[derive(Debug, Clone, Default)]
pub struct SheetLayout {
    pub remapper: RowRemapper,
    /// Indexed by rendered row
    pub rows: Vec<RowInfo>,
    /// Cells rendered from a single `${path}` placeholder
    pub bindings: AHashMap<(u32, u16), String>,
    /// Formula cells left untranslated by the rewrite
    pub unresolved: Vec<(u32, u16)>,
    /// In render order, parents before children
    pub commands: Vec<RenderedCommand>,
    pub header: Option<Range<u32>>,
    pub body: Range<u32>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SheetLayout {
    pub fn row(&self, rendered_row: u32) -> Option<&RowInfo> {
        self.rows.get(rendered_row as usize)
    }

    pub fn binding(&self, row: u32, col: u16) -> Option<&str> {
        self.bindings.get(&(row, col)).map(String::as_str)
    }

    pub fn is_unresolved(&self, row: u32, col: u16) -> bool {
        self.unresolved.contains(&(row, col))
    }
}

#[derive(Debug, Clone)]
pub struct RenderedSheet {
    pub sheet: Worksheet,
    pub layout: SheetLayout,
}

/// Render `template` for `config` against `ctx`
///
/// The context's bindings are cleared before and after. Configuration and
/// expression problems end up in [`SheetLayout::diagnostics`]; an `Err`
/// means the document itself could not take the rendered rows.
pub fn expand(template: &Worksheet, config: &SheetConfiguration, ctx: &mut DataContext) -> Result<RenderedSheet> {
    let (root, errors) = CommandTree::for_sheet(template, config);
    let mut env = BuildEnv::new(template);
    env.diagnostics.extend(errors.into_iter().map(Diagnostic::from));

    ctx.reset();
    let built = root.build_at(0, ctx, &mut env);
    ctx.reset();
    built?;

    let BuildEnv {
        mut sheet,
        watch,
        rows,
        bindings,
        commands,
        scopes,
        diagnostics,
        ..
    } = env;

    // phase two
    let scoped = scopes.finish();
    let unresolved = rewrite::rewrite_formulas(&mut sheet, &watch, &rows, &scoped, root.range.rows());
    for &(row, col) in &unresolved {
        log::warn!(
            "Formula at {} kept untranslated",
            formsheet_core::CellAddress::new(row, col)
        );
    }

    let span = |range: ConfigRange| {
        commands
            .iter()
            .find(|c| c.depth == 1 && c.template_range == range)
            .map(RenderedCommand::rendered_rows)
    };
    let header = config.header_range.and_then(span);
    let body = span(config.body_range).unwrap_or(0..0);

    log::debug!(
        "Rendered {} rows for tab {} ({} formulas, {} unresolved)",
        rows.len(),
        config.tab_name,
        watch.len(),
        unresolved.len()
    );

    Ok(RenderedSheet {
        sheet,
        layout: SheetLayout {
            remapper: scoped.global().clone(),
            rows,
            bindings,
            unresolved,
            commands,
            header,
            body,
            diagnostics,
        },
    })
}

/// Accumulators threaded through [`Command::build_at`]
pub struct BuildEnv<'a> {
    template: &'a Worksheet,
    sheet: Worksheet,
    /// Rendered formula cells awaiting the rewrite
    watch: Vec<(u32, u16)>,
    rows: Vec<RowInfo>,
    bindings: AHashMap<(u32, u16), String>,
    commands: Vec<RenderedCommand>,
    scopes: ScopeTree,
    scope: usize,
    pub(crate) depth: usize,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> BuildEnv<'a> {
    pub fn new(template: &'a Worksheet) -> Self {
        Self {
            template,
            sheet: Worksheet::new(template.name()),
            watch: Vec::new(),
            rows: Vec::new(),
            bindings: AHashMap::new(),
            commands: Vec::new(),
            scopes: ScopeTree::new(),
            scope: 0,
            depth: 0,
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn begin_command(&mut self, command: &Command, target_row: u32) -> usize {
        self.commands.push(RenderedCommand {
            type_name: command.type_name(),
            template_range: command.range,
            rendered_start: target_row,
            final_length: 0,
            depth: self.depth,
        });
        self.commands.len() - 1
    }

    pub(crate) fn finish_command(&mut self, record: usize, length: u32) {
        if let Some(rendered) = self.commands.get_mut(record) {
            rendered.final_length = length;
        }
    }

    pub(crate) fn diagnose(&mut self, diagnostic: impl Into<Diagnostic>) {
        self.diagnostics.push(diagnostic.into());
    }

    /// Open a scope for one repeat element; returns the scope to restore
    pub(crate) fn enter_scope(&mut self) -> usize {
        let outer = self.scope;
        self.scope = self.scopes.open(outer);
        outer
    }

    pub(crate) fn leave_scope(&mut self, outer: usize) {
        self.scope = outer;
    }

    /// Record that `command` rendered nothing at `at`
    pub(crate) fn skip(&mut self, command: &Command, at: u32) {
        self.scopes.record(
            self.scope,
            RowsMapping::skipped(command.top_row(), command.range.height(), at),
        );
    }

    /// Copy `count` template rows from `first` to `dest` and fill their
    /// placeholders
    pub(crate) fn copy_rows(&mut self, first: u32, count: u32, dest: u32, ctx: &DataContext) -> Result<()> {
        let last = first + count - 1;
        self.sheet.copy_rows_from(self.template, first..=last, dest)?;
        self.scopes.record(self.scope, RowsMapping::copied(first, dest, count));

        let template = self.template;
        let data_path = ctx.full_name();
        let row_bindings = ctx.bindings().to_vec();
        for offset in 0..count {
            let (template_row, rendered) = (first + offset, dest + offset);
            debug_assert_eq!(self.rows.len(), rendered as usize);
            self.rows.push(RowInfo {
                template_row,
                data_path: data_path.clone(),
                bindings: row_bindings.clone(),
                scope: self.scope,
            });

            for (col, cell) in template.iter_row(template_row) {
                match &cell.value {
                    CellValue::Formula { .. } => self.watch.push((rendered, col)),
                    CellValue::String(text) if text.as_str().contains("${") => {
                        let mut errors = Vec::new();
                        let value = expression::interpolate(text.as_str(), ctx, &mut errors);
                        self.diagnostics.extend(errors.into_iter().map(Diagnostic::from));
                        if let Some(path) = expression::placeholder_path(text.as_str()) {
                            self.bindings.insert((rendered, col), path.to_string());
                        }
                        self.sheet.set_cell_value_at(rendered, col, value)?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
