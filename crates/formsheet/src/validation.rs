//! Cell validation
//!
//! A rendered cell is checked in a fixed order:
//!
//! 1. an empty value passes outright when the caller asks for it
//! 2. with an error suffix configured, a bound cell at path `p` fails
//!    when `p` + suffix resolves to a non-empty string in the data
//!    context; that string is the message
//! 3. the rules declared on the cell's template origin, in declaration
//!    order; the first failing rule decides the message
//!
//! [`Validator`] only computes the [`Verdict`]. Recording it and asking
//! for a re-render is up to [`FormSession`](crate::session::FormSession).

use ahash::AHashMap;
use serde_json::Value;

use crate::config::{SheetConfiguration, ValidationRule};
use crate::context::DataContext;
use crate::expand::SheetLayout;
use crate::expression;
use formsheet_core::{CellAddress, CellValue, Worksheet};

/// Validation rules by template cell
#[derive(Debug, Clone, Default)]
pub struct RuleIndex {
    rules: AHashMap<(u32, u16), Vec<ValidationRule>>,
}

impl RuleIndex {
    pub fn from_config(config: &SheetConfiguration) -> Self {
        let mut rules: AHashMap<(u32, u16), Vec<ValidationRule>> = AHashMap::new();
        for rule in &config.validations {
            match rule.address() {
                Ok(addr) => rules.entry((addr.row, addr.col)).or_default().push(rule.clone()),
                Err(e) => log::warn!("Tab {}: skipping rule `{}`: {e}", config.tab_name, rule.rule),
            }
        }
        Self { rules }
    }

    pub fn rules_for(&self, template_row: u32, col: u16) -> &[ValidationRule] {
        self.rules
            .get(&(template_row, col))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(String),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Verdict::Valid => None,
            Verdict::Invalid(message) => Some(message),
        }
    }
}

/// Checks cells of one rendered sheet
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    pub sheet: &'a Worksheet,
    pub layout: &'a SheetLayout,
    pub rules: &'a RuleIndex,
    pub error_suffix: Option<&'a str>,
    pub default_message: &'a str,
}

impl<'a> Validator<'a> {
    /// Check the cell at rendered `(row, col)`
    ///
    /// `ctx` is restored to the row's data path first. Rules that cannot be
    /// evaluated count as failed.
    pub fn check(&self, ctx: &mut DataContext, row: u32, col: u16, pass_empty: bool) -> Verdict {
        let value = self.sheet.get_value_at(row, col);
        if pass_empty && is_blank(&value) {
            return Verdict::Valid;
        }
        let Some(info) = self.layout.row(row) else {
            return Verdict::Valid;
        };
        ctx.restore(&info.bindings);

        if let Some(message) = self.context_error(ctx, row, col) {
            self.log_failure(row, col, &message);
            return Verdict::Invalid(message);
        }

        for rule in self.rules.rules_for(info.template_row, col) {
            let row_value = |c: u16| Some(self.sheet.get_value_at(row, c));
            let passed = match expression::evaluate_rule(&rule.rule, &value, row_value, &*ctx) {
                Ok(passed) => passed,
                Err(e) => {
                    log::warn!("Rule `{}` on {}: {e}", rule.rule, CellAddress::new(row, col));
                    false
                }
            };
            if !passed {
                let message = rule.message.clone().unwrap_or_else(|| self.default_message.to_string());
                self.log_failure(row, col, &message);
                return Verdict::Invalid(message);
            }
        }
        Verdict::Valid
    }

    /// Message stored next to the cell's bound path, if any
    fn context_error(&self, ctx: &DataContext, row: u32, col: u16) -> Option<String> {
        let suffix = self.error_suffix?;
        let path = self.layout.binding(row, col)?;
        match ctx.resolve(&format!("{path}{suffix}"))? {
            Value::String(message) if !message.trim().is_empty() => Some(message.clone()),
            _ => None,
        }
    }

    fn log_failure(&self, row: u32, col: u16, message: &str) {
        log::info!(
            "Validation failed for sheet {} row {} column {} : {message}",
            self.sheet.name(),
            row + 1,
            CellAddress::column_to_letters(col)
        );
    }
}

fn is_blank(value: &CellValue) -> bool {
    match value.effective_value() {
        CellValue::Empty => true,
        CellValue::String(s) => s.as_str().trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandConfig, ConfigRange, DEFAULT_INVALID_MESSAGE};
    use crate::expand::{expand, RenderedSheet};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn range(text: &str) -> ConfigRange {
        ConfigRange::parse(text).unwrap()
    }

    /// One repeated row per line item: A = name, B = qty, C = max
    fn line_items(ctx: &mut DataContext, validations: Vec<ValidationRule>) -> (SheetConfiguration, RenderedSheet) {
        let mut template = Worksheet::new("T");
        template.set_cell_value("A1", "${i.name}").unwrap();
        template.set_cell_value("B1", "${i.qty}").unwrap();
        template.set_cell_value("C1", "${i.max}").unwrap();
        let mut config = SheetConfiguration::new("Items", "T", range("A1:C1"));
        config.commands.push(CommandConfig::Each {
            range: range("A1:C1"),
            var: "i".into(),
            items: "items".into(),
        });
        config.validations = validations;
        config.error_suffix = Some("Error".into());
        let rendered = expand(&template, &config, ctx).unwrap();
        (config, rendered)
    }

    fn validator<'a>(rendered: &'a RenderedSheet, rules: &'a RuleIndex) -> Validator<'a> {
        Validator {
            sheet: &rendered.sheet,
            layout: &rendered.layout,
            rules,
            error_suffix: Some("Error"),
            default_message: DEFAULT_INVALID_MESSAGE,
        }
    }

    #[test]
    fn test_first_failing_rule_wins() {
        let mut ctx = DataContext::new(json!({"items": [{"name": "bolt", "qty": -1, "max": 5}]}));
        let (config, rendered) = line_items(
            &mut ctx,
            vec![
                ValidationRule::new("B1", "$value > 0", Some("Quantity must be positive")),
                ValidationRule::new("B1", "$value <= $C", None),
            ],
        );
        let rules = RuleIndex::from_config(&config);
        assert_eq!(rules.len(), 2);

        let v = validator(&rendered, &rules);
        assert_eq!(
            v.check(&mut ctx, 0, 1, false),
            Verdict::Invalid("Quantity must be positive".into())
        );
    }

    #[test]
    fn test_same_row_column_and_default_message() {
        let mut ctx = DataContext::new(json!({"items": [
            {"name": "bolt", "qty": 3, "max": 5},
            {"name": "nut", "qty": 9, "max": 5}
        ]}));
        let (config, rendered) = line_items(&mut ctx, vec![ValidationRule::new("B1", "$value <= $C", None)]);
        let rules = RuleIndex::from_config(&config);
        let v = validator(&rendered, &rules);

        assert_eq!(v.check(&mut ctx, 0, 1, false), Verdict::Valid);
        assert_eq!(v.check(&mut ctx, 1, 1, false), Verdict::Invalid(DEFAULT_INVALID_MESSAGE.into()));
    }

    #[test]
    fn test_pass_empty_skips_rules() {
        let mut ctx = DataContext::new(json!({"items": [{"name": "bolt", "qty": null, "max": 5}]}));
        let (config, rendered) = line_items(&mut ctx, vec![ValidationRule::new("B1", r#"$value <> """#, None)]);
        let rules = RuleIndex::from_config(&config);
        let v = validator(&rendered, &rules);

        assert_eq!(rendered.sheet.get_value_at(0, 1), CellValue::Empty);
        assert_eq!(v.check(&mut ctx, 0, 1, true), Verdict::Valid);
        assert!(!v.check(&mut ctx, 0, 1, false).is_valid());
    }

    #[test]
    fn test_error_message_from_context() {
        let mut ctx = DataContext::new(json!({"items": [
            {"name": "bolt", "qty": 1, "max": 5},
            {"name": "", "nameError": "Name is required", "qty": 1, "max": 5}
        ]}));
        let (config, rendered) = line_items(&mut ctx, Vec::new());
        let rules = RuleIndex::from_config(&config);
        let v = validator(&rendered, &rules);

        assert_eq!(v.check(&mut ctx, 0, 0, false), Verdict::Valid);
        let verdict = v.check(&mut ctx, 1, 0, false);
        assert_eq!(verdict.message(), Some("Name is required"));
        assert_eq!(ctx.full_name(), "each.i.1");
    }

    #[test]
    fn test_broken_rule_fails_the_cell() {
        let mut ctx = DataContext::new(json!({"items": [{"name": "bolt", "qty": 1, "max": 5}]}));
        let (config, rendered) = line_items(&mut ctx, vec![ValidationRule::new("B1", "$value >", Some("bad"))]);
        let rules = RuleIndex::from_config(&config);
        assert_eq!(validator(&rendered, &rules).check(&mut ctx, 0, 1, false), Verdict::Invalid("bad".into()));
    }
}
