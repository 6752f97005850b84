//! Command model
//!
//! A [`Command`] is a template range plus what to do with it: copy it
//! ([`CommandKind::Plain`]), copy it once per element of a collection
//! ([`CommandKind::Repeat`]) or copy it only when a predicate holds
//! ([`CommandKind::Conditional`]). Commands nest; the tree for one sheet
//! is built by [`CommandTree`] and rendered by calling
//! [`Command::build_at`] on its root.
//!
//! Children always render at their parent's write cursor, so rendered
//! rows never overlap however much data-driven commands grow.

use std::mem;

use crate::config::{CommandConfig, ConfigRange, SheetConfiguration};
use crate::context::DataContext;
use crate::error::{ConfigurationError, Result};
use crate::expand::BuildEnv;
use crate::expression;
use formsheet_core::Worksheet;

/// Variable bound by the body repeat of a sheet with `initial_rows`
pub const INITIAL_ROWS_VAR: &str = "row";

#[derive(Debug, Clone, PartialEq)]
pub enum CommandKind {
    Plain,
    /// One copy per element of `items`, each with `var` bound to it
    Repeat { var: String, items: String },
    Conditional { condition: String },
}

/// How many rows a command will render, as far as the template knows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthSpec {
    Fixed(u32),
    DataDriven,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub range: ConfigRange,
    /// Sorted by first row, never overlapping in rows
    pub children: Vec<Command>,
    /// Set when the command was placed under an enclosing command; the
    /// root has none
    pub parent_found: bool,
}

impl Command {
    pub fn new(kind: CommandKind, range: ConfigRange) -> Self {
        Self {
            kind,
            range,
            children: Vec::new(),
            parent_found: false,
        }
    }

    pub fn plain(range: ConfigRange) -> Self {
        Self::new(CommandKind::Plain, range)
    }

    pub fn repeat(range: ConfigRange, var: impl Into<String>, items: impl Into<String>) -> Self {
        Self::new(
            CommandKind::Repeat {
                var: var.into(),
                items: items.into(),
            },
            range,
        )
    }

    pub fn conditional(range: ConfigRange, condition: impl Into<String>) -> Self {
        Self::new(
            CommandKind::Conditional {
                condition: condition.into(),
            },
            range,
        )
    }

    pub fn from_config(config: &CommandConfig) -> Self {
        match config {
            CommandConfig::Area { range } => Self::plain(*range),
            CommandConfig::Each { range, var, items } => Self::repeat(*range, var, items),
            CommandConfig::If { range, condition } => Self::conditional(*range, condition),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            CommandKind::Plain => "area",
            CommandKind::Repeat { .. } => "each",
            CommandKind::Conditional { .. } => "if",
        }
    }

    pub fn top_row(&self) -> u32 {
        self.range.first_row()
    }

    pub fn last_row(&self) -> u32 {
        self.range.last_row()
    }

    pub fn left_col(&self) -> u16 {
        self.range.first_col()
    }

    pub fn right_col(&self) -> u16 {
        self.range.last_col()
    }

    pub fn declared_length(&self) -> LengthSpec {
        let body = self.children.iter().try_fold(self.range.height(), |height, child| {
            match child.declared_length() {
                LengthSpec::Fixed(n) => (height - child.range.height()).checked_add(n),
                LengthSpec::DataDriven => None,
            }
        });
        match (&self.kind, body) {
            (_, None) | (CommandKind::Conditional { .. }, _) => LengthSpec::DataDriven,
            (CommandKind::Plain, Some(height)) => LengthSpec::Fixed(height),
            (CommandKind::Repeat { items, .. }, Some(height)) => items
                .trim()
                .parse::<u32>()
                .ok()
                .and_then(|n| n.checked_mul(height))
                .map_or(LengthSpec::DataDriven, LengthSpec::Fixed),
        }
    }

    /// Render this command starting at `target_row` and return the
    /// number of rows it occupies
    ///
    /// Expression failures render the command as empty and are recorded
    /// as diagnostics. Only document errors, such as running past the
    /// last sheet row, are returned.
    pub fn build_at(&self, target_row: u32, ctx: &mut DataContext, env: &mut BuildEnv<'_>) -> Result<u32> {
        let record = env.begin_command(self, target_row);
        let length = match &self.kind {
            CommandKind::Plain => self.render_body(target_row, ctx, env)?,
            CommandKind::Conditional { condition } => match expression::try_predicate(condition, ctx) {
                Ok(true) => self.render_body(target_row, ctx, env)?,
                Ok(false) => {
                    env.skip(self, target_row);
                    0
                }
                Err(e) => {
                    log::warn!("Condition of if command at {} failed: {e}", self.range);
                    env.diagnose(e);
                    env.skip(self, target_row);
                    0
                }
            },
            CommandKind::Repeat { var, items } => self.render_repeat(var, items, target_row, ctx, env)?,
        };
        env.finish_command(record, length);
        Ok(length)
    }

    fn render_repeat(
        &self,
        var: &str,
        items: &str,
        target_row: u32,
        ctx: &mut DataContext,
        env: &mut BuildEnv<'_>,
    ) -> Result<u32> {
        let count = ctx.collection_len(items).unwrap_or_else(|e| {
            log::warn!("Items of each command at {} unavailable: {e}", self.range);
            env.diagnose(e);
            0
        });
        if count == 0 {
            env.skip(self, target_row);
            return Ok(0);
        }

        let mut cursor = target_row;
        for index in 0..count {
            if let Err(e) = ctx.push(var, index, items) {
                log::warn!("Cannot bind {var} at {} element {index}: {e}", self.range);
                env.diagnose(e);
                break;
            }
            let outer = env.enter_scope();
            let rendered = self.render_body(cursor, ctx, env);
            env.leave_scope(outer);
            ctx.pop();
            cursor += rendered?;
        }
        Ok(cursor - target_row)
    }

    /// Own rows copied verbatim, children rendered in between
    fn render_body(&self, target_row: u32, ctx: &mut DataContext, env: &mut BuildEnv<'_>) -> Result<u32> {
        let mut cursor = target_row;
        let mut row = self.top_row();
        for child in &self.children {
            if child.top_row() > row {
                let count = child.top_row() - row;
                env.copy_rows(row, count, cursor, ctx)?;
                cursor += count;
            }
            env.depth += 1;
            let rendered = child.build_at(cursor, ctx, env);
            env.depth -= 1;
            cursor += rendered?;
            row = child.last_row() + 1;
        }
        if row <= self.last_row() {
            let count = self.last_row() - row + 1;
            env.copy_rows(row, count, cursor, ctx)?;
            cursor += count;
        }
        Ok(cursor - target_row)
    }
}

/// Builds the command tree of a sheet
pub struct CommandTree;

impl CommandTree {
    /// Place `commands` under a plain root covering `root`, each under
    /// the smallest command containing it
    ///
    /// Commands outside the root or overlapping a sibling are reported and
    /// dropped. Of two equal ranges the later one nests inside the
    /// earlier.
    pub fn build(root: ConfigRange, commands: Vec<Command>) -> (Command, Vec<ConfigurationError>) {
        let mut tree = Command::plain(root);
        let mut errors = Vec::new();
        for command in commands {
            if !root.contains(&command.range) {
                errors.push(ConfigurationError::MissingParent {
                    kind: command.type_name(),
                    range: command.range,
                });
                continue;
            }
            if let Err(e) = insert(&mut tree, command) {
                errors.push(e);
            }
        }
        for e in &errors {
            log::warn!("Skipping command: {e}");
        }
        (tree, errors)
    }

    /// Tree for a configured sheet: header and body first, then the
    /// configured commands. The root spans everything the template uses.
    pub fn for_sheet(template: &Worksheet, config: &SheetConfiguration) -> (Command, Vec<ConfigurationError>) {
        let form = config.form_range();
        let (last_row, last_col) = match template.used_range() {
            Some(used) => (used.bottom().max(form.last_row()), used.right().max(form.last_col())),
            None => (form.last_row(), form.last_col()),
        };
        let root = ConfigRange::new(0, last_row, 0, last_col).unwrap_or(form);

        let mut commands = Vec::with_capacity(config.commands.len() + 2);
        if let Some(header) = config.header_range {
            commands.push(Command::plain(header));
        }
        commands.push(match config.initial_rows {
            Some(n) => Command::repeat(config.body_range, INITIAL_ROWS_VAR, n.max(1).to_string()),
            None => Command::plain(config.body_range),
        });
        commands.extend(config.commands.iter().map(Command::from_config));
        Self::build(root, commands)
    }
}

fn insert(parent: &mut Command, mut command: Command) -> std::result::Result<(), ConfigurationError> {
    if let Some(child) = parent
        .children
        .iter_mut()
        .find(|c| c.range.contains(&command.range))
    {
        return insert(child, command);
    }

    let (inside, outside): (Vec<_>, Vec<_>) = mem::take(&mut parent.children)
        .into_iter()
        .partition(|c| command.range.contains(&c.range));
    parent.children = outside;
    if let Some(sibling) = parent
        .children
        .iter()
        .find(|c| c.range.overlaps_rows(&command.range))
    {
        let error = ConfigurationError::Overlap {
            kind: command.type_name(),
            range: command.range,
            sibling: sibling.range,
        };
        parent.children.extend(inside);
        parent.children.sort_by_key(Command::top_row);
        return Err(error);
    }

    command.children.extend(inside);
    command.children.sort_by_key(Command::top_row);
    command.parent_found = true;
    parent.children.push(command);
    parent.children.sort_by_key(Command::top_row);
    Ok(())
}
