//! Template annotations
//!
//! Instead of a JSON configuration, a template can carry its
//! configuration in cell comments, one directive per line:
//!
//! ```text
//! fs:form(name="Orders", headerLastCell="C1", lastCell="C3", maxRowsPerPage="10")
//! fs:each(var="o", items="orders", lastCell="C2")
//! fs:if(condition="showTotal", lastCell="C3")
//! fs:area(lastCell="C4")
//! fs:validate(rule="$value > 0", message="Quantity must be positive")
//! ```
//!
//! Ranges start at the annotated cell and end at `lastCell`. `fs:form`
//! goes on the top-left cell of the form; its body starts on the row
//! after the header. `fs:validate` applies to the annotated cell.

use ahash::AHashMap;
use lazy_regex::{regex, regex_captures};

use crate::config::{CommandConfig, ConfigRange, SheetConfiguration, ValidationRule, DEFAULT_MAX_ROWS_PER_PAGE};
use crate::error::ConfigurationError;
use formsheet_core::{CellAddress, Workbook, Worksheet};

pub const DIRECTIVE_PREFIX: &str = "fs:";

/// One parsed directive
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: String,
    pub args: AHashMap<String, String>,
}

impl Annotation {
    /// Parse `fs:name(key="value", ...)`; `""` inside a value is a quote
    pub fn parse(text: &str) -> Option<Self> {
        let (_, name, body) = regex_captures!(r#"^fs:(\w+)\s*\((.*)\)\s*$"#, text.trim())?;
        let args = regex!(r#"(\w+)\s*=\s*"((?:[^"]|"")*)""#)
            .captures_iter(body)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str().to_string();
                let value = caps.get(2)?.as_str().replace("\"\"", "\"");
                Some((key, value))
            })
            .collect();
        Some(Self {
            name: name.to_ascii_lowercase(),
            args,
        })
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }
}

/// Configurations of every sheet that has an `fs:form`, in sheet order
pub fn configurations_from_annotations(workbook: &Workbook) -> (Vec<SheetConfiguration>, Vec<ConfigurationError>) {
    let mut configs = Vec::new();
    let mut errors = Vec::new();
    for sheet in workbook.worksheets() {
        if let Some(config) = sheet_configuration(sheet, &mut errors) {
            configs.push(config);
        }
    }
    for e in &errors {
        log::warn!("Ignoring annotation: {e}");
    }
    (configs, errors)
}

fn sheet_configuration(sheet: &Worksheet, errors: &mut Vec<ConfigurationError>) -> Option<SheetConfiguration> {
    let mut config: Option<SheetConfiguration> = None;
    let mut commands = Vec::new();
    let mut validations = Vec::new();

    for ((row, col), comment) in sheet.comments() {
        let cell = CellAddress::new(row, col);
        for line in comment.directives(DIRECTIVE_PREFIX) {
            let malformed = |why: &str| ConfigurationError::MalformedAnnotation {
                cell: format!("{}!{cell}", sheet.name()),
                text: format!("{line} ({why})"),
            };
            let Some(annotation) = Annotation::parse(line) else {
                errors.push(malformed("not a directive"));
                continue;
            };
            let result = match annotation.name.as_str() {
                "form" if config.is_some() => Err(malformed("second form on sheet")),
                "form" => form(sheet, cell, &annotation).map(|c| config = Some(c)),
                "each" => match (annotation.arg("var"), annotation.arg("items")) {
                    (Some(var), Some(items)) => command_range(cell, &annotation).map(|range| {
                        commands.push(CommandConfig::Each {
                            range,
                            var: var.to_string(),
                            items: items.to_string(),
                        })
                    }),
                    _ => Err(malformed("each needs var and items")),
                },
                "if" => match annotation.arg("condition") {
                    Some(condition) => command_range(cell, &annotation).map(|range| {
                        commands.push(CommandConfig::If {
                            range,
                            condition: condition.to_string(),
                        })
                    }),
                    None => Err(malformed("if needs a condition")),
                },
                "area" => command_range(cell, &annotation).map(|range| commands.push(CommandConfig::Area { range })),
                "validate" => match annotation.arg("rule") {
                    Some(rule) => {
                        validations.push(ValidationRule::new(cell.to_a1_string(), rule, annotation.arg("message")));
                        Ok(())
                    }
                    None => Err(malformed("validate needs a rule")),
                },
                _ => Err(malformed("unknown directive")),
            };
            if let Err(e) = result {
                errors.push(e);
            }
        }
    }

    let Some(mut config) = config else {
        if !commands.is_empty() || !validations.is_empty() {
            errors.push(ConfigurationError::MalformedAnnotation {
                cell: sheet.name().to_string(),
                text: "commands without an fs:form".into(),
            });
        }
        return None;
    };
    config.commands = commands;
    config.validations = validations;
    Some(config)
}

fn form(sheet: &Worksheet, cell: CellAddress, annotation: &Annotation) -> Result<SheetConfiguration, ConfigurationError> {
    let last = required_cell(annotation, "lastCell")?;
    let header_range = match annotation.arg("headerLastCell") {
        Some(text) => Some(corner_range(cell, parse_cell(text)?)?),
        None => None,
    };
    let body_top = header_range.map_or(cell.row, |h| h.last_row() + 1);
    let body_range = ConfigRange::new(body_top, last.row, cell.col, last.col)?;

    let mut config = SheetConfiguration::new(
        annotation.arg("name").unwrap_or(sheet.name()),
        sheet.name(),
        body_range,
    );
    config.header_range = header_range;
    config.initial_rows = number_arg(annotation, "initialRows")?;
    config.max_rows_per_page = number_arg(annotation, "maxRowsPerPage")?.unwrap_or(DEFAULT_MAX_ROWS_PER_PAGE);
    config.error_suffix = annotation.arg("errorSuffix").map(str::to_string);
    Ok(config)
}

fn command_range(cell: CellAddress, annotation: &Annotation) -> Result<ConfigRange, ConfigurationError> {
    match annotation.arg("lastCell") {
        Some(text) => corner_range(cell, parse_cell(text)?),
        None => corner_range(cell, cell),
    }
}

fn corner_range(top_left: CellAddress, bottom_right: CellAddress) -> Result<ConfigRange, ConfigurationError> {
    ConfigRange::new(top_left.row, bottom_right.row, top_left.col, bottom_right.col)
}

fn required_cell(annotation: &Annotation, key: &str) -> Result<CellAddress, ConfigurationError> {
    let text = annotation
        .arg(key)
        .ok_or_else(|| ConfigurationError::InvalidRange(format!("fs:{} without {key}", annotation.name)))?;
    parse_cell(text)
}

fn parse_cell(text: &str) -> Result<CellAddress, ConfigurationError> {
    CellAddress::parse(text).map_err(|_| ConfigurationError::InvalidRange(text.to_string()))
}

fn number_arg(annotation: &Annotation, key: &str) -> Result<Option<u32>, ConfigurationError> {
    annotation
        .arg(key)
        .map(|text| {
            text.trim()
                .parse()
                .map_err(|_| ConfigurationError::InvalidRange(format!("{key}=\"{text}\"")))
        })
        .transpose()
}
