//! Sheet configuration
//!
//! A [`SheetConfiguration`] describes one form tab: where its header and
//! body live on the template sheet, how the body pages, which commands
//! expand it and which cells carry validation rules. It is read from JSON
//! or derived from template annotations (see [`crate::annotation`]).

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Error, Result};
use formsheet_core::{CellAddress, CellRange};

/// Message used when a failing rule carries none
pub const DEFAULT_INVALID_MESSAGE: &str = "Invalid input";

pub const DEFAULT_MAX_ROWS_PER_PAGE: u32 = 20;

/// Rectangular template region, immutable once built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfigRange {
    first_row: u32,
    last_row: u32,
    first_col: u16,
    last_col: u16,
}

impl ConfigRange {
    pub fn new(
        first_row: u32,
        last_row: u32,
        first_col: u16,
        last_col: u16,
    ) -> std::result::Result<Self, ConfigurationError> {
        if first_row > last_row || first_col > last_col {
            return Err(ConfigurationError::InvalidRange(format!(
                "rows {first_row}..={last_row}, columns {first_col}..={last_col}"
            )));
        }
        Ok(Self {
            first_row,
            last_row,
            first_col,
            last_col,
        })
    }

    pub fn from_cell_range(range: &CellRange) -> Self {
        Self {
            first_row: range.top(),
            last_row: range.bottom(),
            first_col: range.left(),
            last_col: range.right(),
        }
    }

    /// Parse `A1:D5` or a single cell
    pub fn parse(text: &str) -> std::result::Result<Self, ConfigurationError> {
        CellRange::parse(text)
            .map(|r| Self::from_cell_range(&r))
            .map_err(|_| ConfigurationError::InvalidRange(text.to_string()))
    }

    pub fn first_row(&self) -> u32 {
        self.first_row
    }

    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    pub fn first_col(&self) -> u16 {
        self.first_col
    }

    pub fn last_col(&self) -> u16 {
        self.last_col
    }

    pub fn height(&self) -> u32 {
        self.last_row - self.first_row + 1
    }

    pub fn rows(&self) -> RangeInclusive<u32> {
        self.first_row..=self.last_row
    }

    pub fn cols(&self) -> RangeInclusive<u16> {
        self.first_col..=self.last_col
    }

    /// `other` lies wholly inside `self`; equal ranges contain each other
    pub fn contains(&self, other: &ConfigRange) -> bool {
        self.first_row <= other.first_row
            && other.last_row <= self.last_row
            && self.first_col <= other.first_col
            && other.last_col <= self.last_col
    }

    pub fn contains_cell(&self, row: u32, col: u16) -> bool {
        self.rows().contains(&row) && self.cols().contains(&col)
    }

    pub fn overlaps_rows(&self, other: &ConfigRange) -> bool {
        self.first_row <= other.last_row && other.first_row <= self.last_row
    }

    /// Smallest range covering both
    pub fn union(&self, other: &ConfigRange) -> ConfigRange {
        Self {
            first_row: self.first_row.min(other.first_row),
            last_row: self.last_row.max(other.last_row),
            first_col: self.first_col.min(other.first_col),
            last_col: self.last_col.max(other.last_col),
        }
    }

    pub fn to_cell_range(&self) -> CellRange {
        CellRange::from_indices(self.first_row, self.first_col, self.last_row, self.last_col)
    }
}

impl fmt::Display for ConfigRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell_range().to_a1_string())
    }
}

impl TryFrom<String> for ConfigRange {
    type Error = ConfigurationError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ConfigRange> for String {
    fn from(range: ConfigRange) -> Self {
        range.to_string()
    }
}

/// A command as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandConfig {
    /// Repeat `range` once per element of `items`, binding it to `var`.
    /// `items` is a data path, or a number for that many blank elements.
    Each {
        range: ConfigRange,
        var: String,
        items: String,
    },
    /// Render `range` only when `condition` holds
    If { range: ConfigRange, condition: String },
    /// Copy `range` as is
    Area { range: ConfigRange },
}

impl CommandConfig {
    pub fn range(&self) -> ConfigRange {
        match self {
            CommandConfig::Each { range, .. }
            | CommandConfig::If { range, .. }
            | CommandConfig::Area { range } => *range,
        }
    }
}

/// A boolean rule attached to one template cell
///
/// `$value` stands for the edited value and `$C` for the value in column
/// C of the same row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    /// Template cell in A1 notation
    pub cell: String,
    pub rule: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ValidationRule {
    pub fn new(cell: impl Into<String>, rule: impl Into<String>, message: Option<&str>) -> Self {
        Self {
            cell: cell.into(),
            rule: rule.into(),
            message: message.map(str::to_string),
        }
    }

    pub fn address(&self) -> std::result::Result<CellAddress, ConfigurationError> {
        CellAddress::parse(&self.cell).map_err(|_| ConfigurationError::InvalidRange(self.cell.clone()))
    }
}

/// One form tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetConfiguration {
    pub tab_name: String,
    pub sheet_name: String,
    #[serde(default)]
    pub header_range: Option<ConfigRange>,
    pub body_range: ConfigRange,
    /// Render the body as this many blank rows
    #[serde(default)]
    pub initial_rows: Option<u32>,
    #[serde(default = "default_max_rows_per_page")]
    pub max_rows_per_page: u32,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
    #[serde(default)]
    pub validations: Vec<ValidationRule>,
    /// A bound cell at path `p` is invalid when `p` + suffix resolves to
    /// a non-empty message
    #[serde(default)]
    pub error_suffix: Option<String>,
}

fn default_max_rows_per_page() -> u32 {
    DEFAULT_MAX_ROWS_PER_PAGE
}

impl SheetConfiguration {
    pub fn new(tab_name: impl Into<String>, sheet_name: impl Into<String>, body_range: ConfigRange) -> Self {
        Self {
            tab_name: tab_name.into(),
            sheet_name: sheet_name.into(),
            header_range: None,
            body_range,
            initial_rows: None,
            max_rows_per_page: DEFAULT_MAX_ROWS_PER_PAGE,
            commands: Vec::new(),
            validations: Vec::new(),
            error_suffix: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check()?;
        Ok(config)
    }

    /// A JSON array of configurations
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        let configs: Vec<Self> = serde_json::from_str(json)?;
        for config in &configs {
            config.check()?;
        }
        Ok(configs)
    }

    /// Header and body together
    pub fn form_range(&self) -> ConfigRange {
        match self.header_range {
            Some(header) => header.union(&self.body_range),
            None => self.body_range,
        }
    }

    /// Structural checks that serde cannot express
    pub fn check(&self) -> Result<()> {
        if self.tab_name.trim().is_empty() {
            return Err(Error::InvalidConfiguration("tab name is empty".into()));
        }
        if self.max_rows_per_page == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "tab {}: maxRowsPerPage must be positive",
                self.tab_name
            )));
        }
        if let Some(header) = self.header_range {
            if header.last_row() >= self.body_range.first_row() {
                return Err(Error::InvalidConfiguration(format!(
                    "tab {}: header {header} must end above body {}",
                    self.tab_name, self.body_range
                )));
            }
        }
        for rule in &self.validations {
            rule.address()
                .map_err(|e| Error::InvalidConfiguration(format!("tab {}: {e}", self.tab_name)))?;
        }
        Ok(())
    }
}

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Prefix of render-target ids; no re-render requests are sent without it
    pub client_id: Option<String>,
    pub default_message: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            default_message: DEFAULT_INVALID_MESSAGE.to_string(),
        }
    }
}

impl SessionSettings {
    pub fn with_client_id(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }
}
