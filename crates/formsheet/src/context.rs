//! Data context
//!
//! The JSON document a form renders from, plus a cursor of repeat
//! bindings. Each binding is written `each.<var>.<index>`; the cursor's
//! full name joins them with `:` (`each.dept.1:each.e.0`). A rendered
//! row remembers the bindings it was produced under so the context can
//! be restored before validating or saving that row. Two repeats may
//! reuse a variable name, so a row's bindings carry their pointers and
//! are never rebuilt from the name alone.
//!
//! Bindings point into the document by JSON pointer, so writes made
//! through a bound name land in the document itself.

use serde_json::Value;

use crate::error::ExpressionError;
use formsheet_formula::{FormulaValue, NameResolver};

const SEGMENT_PREFIX: &str = "each.";

/// One bound repeat element
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub var: String,
    pub index: usize,
    /// `None` for blank elements of a counted repeat
    pointer: Option<String>,
}

impl Binding {
    /// `each.<var>.<index>`
    pub fn segment(&self) -> String {
        format!("{SEGMENT_PREFIX}{}.{}", self.var, self.index)
    }

    pub fn pointer(&self) -> Option<&str> {
        self.pointer.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataContext {
    root: Value,
    cursor: Vec<Binding>,
}

impl DataContext {
    pub fn new(root: Value) -> Self {
        Self {
            root,
            cursor: Vec::new(),
        }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_root(self) -> Value {
        self.root
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.cursor
    }

    pub fn depth(&self) -> usize {
        self.cursor.len()
    }

    /// Bound segments joined by `:`; empty at the top level
    pub fn full_name(&self) -> String {
        self.cursor
            .iter()
            .map(Binding::segment)
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Number of elements `items` yields: a count literal, or the length
    /// of the array at that path
    pub fn collection_len(&self, items: &str) -> Result<usize, ExpressionError> {
        if let Some(count) = blank_count(items) {
            return Ok(count);
        }
        match self.resolve(items) {
            Some(Value::Array(elements)) => Ok(elements.len()),
            Some(Value::Null) | None => Err(ExpressionError::UnboundName(items.trim().to_string())),
            Some(_) => Err(ExpressionError::NotACollection(items.trim().to_string())),
        }
    }

    /// Bind `var` to element `index` of `items`
    pub fn push(&mut self, var: &str, index: usize, items: &str) -> Result<(), ExpressionError> {
        let pointer = if blank_count(items).is_some() {
            None
        } else {
            let len = self.collection_len(items)?;
            if index >= len {
                return Err(ExpressionError::Evaluation {
                    expr: items.to_string(),
                    message: format!("index {index} out of range ({len} elements)"),
                });
            }
            let base = self
                .pointer_of(items)
                .ok_or_else(|| ExpressionError::UnboundName(items.to_string()))?;
            Some(format!("{base}/{index}"))
        };
        self.cursor.push(Binding {
            var: var.to_string(),
            index,
            pointer,
        });
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Binding> {
        self.cursor.pop()
    }

    /// Drop every binding
    pub fn reset(&mut self) {
        self.cursor.clear();
    }

    /// JSON pointer for a dotted path. The first segment is a bound
    /// variable (innermost first) or a top-level key. `None` when the
    /// path runs through a blank element.
    pub fn pointer_of(&self, path: &str) -> Option<String> {
        let mut segments = path.trim().split('.');
        let head = segments.next().filter(|s| !s.is_empty())?;
        let mut pointer = match self.cursor.iter().rev().find(|b| b.var == head) {
            Some(binding) => binding.pointer.clone()?,
            None => format!("/{}", escape(head)),
        };
        for segment in segments {
            pointer.push('/');
            pointer.push_str(&escape(segment));
        }
        Some(pointer)
    }

    /// Value at a dotted path
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        self.root.pointer(&self.pointer_of(path)?)
    }

    /// Write `value` at a dotted path, creating the last object key if
    /// needed. Returns false when the parent does not exist.
    pub fn assign(&mut self, path: &str, value: Value) -> bool {
        let Some(pointer) = self.pointer_of(path) else {
            return false;
        };
        let Some((parent, key)) = pointer.rsplit_once('/') else {
            return false;
        };
        let key = unescape(key);
        let parent = if parent.is_empty() {
            Some(&mut self.root)
        } else {
            self.root.pointer_mut(parent)
        };
        match parent {
            Some(Value::Object(map)) => {
                map.insert(key, value);
                true
            }
            Some(Value::Array(items)) => match key.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Bind exactly `path`, keeping the longest prefix already bound.
    /// Returns how many bindings were rebound.
    pub fn restore(&mut self, path: &[Binding]) -> usize {
        let kept = self
            .cursor
            .iter()
            .zip(path)
            .take_while(|(bound, wanted)| bound == wanted)
            .count();
        self.cursor.truncate(kept);
        self.cursor.extend_from_slice(&path[kept..]);
        path.len() - kept
    }
}

impl NameResolver for DataContext {
    fn resolve_name(&self, name: &str) -> Option<FormulaValue> {
        self.resolve(name).map(json_to_formula)
    }
}

/// `items` written as a plain count
fn blank_count(items: &str) -> Option<usize> {
    items.trim().parse().ok()
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

pub fn json_to_formula(value: &Value) -> FormulaValue {
    match value {
        Value::Null => FormulaValue::Empty,
        Value::Bool(b) => FormulaValue::Boolean(*b),
        Value::Number(n) => n.as_f64().map_or(FormulaValue::Empty, FormulaValue::Number),
        Value::String(s) => FormulaValue::String(s.clone()),
        // arrays read as a column, for SUM(order.amounts) and friends
        Value::Array(items) => FormulaValue::Array(items.iter().map(|v| vec![json_to_formula(v)]).collect()),
        Value::Object(_) => FormulaValue::Error(formsheet_core::CellError::Value),
    }
}

/// JSON for an edited cell value
pub fn cell_to_json(value: &formsheet_core::CellValue) -> Value {
    use formsheet_core::CellValue;
    match value.effective_value() {
        CellValue::Empty | CellValue::Formula { .. } => Value::Null,
        CellValue::Boolean(b) => Value::Bool(*b),
        CellValue::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
        CellValue::String(s) => Value::String(s.to_string()),
        CellValue::Error(e) => Value::String(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn company() -> DataContext {
        DataContext::new(json!({
            "title": "Payroll",
            "departments": [
                {"name": "Ops", "employees": [{"name": "Ann", "salary": 10}]},
                {"name": "Dev", "employees": [{"name": "Bo", "salary": 20}, {"name": "Cy", "salary": 30}]}
            ]
        }))
    }

    /// Bindings of department `d`, employee `e`
    fn path(d: usize, e: usize) -> Vec<Binding> {
        let mut ctx = company();
        ctx.push("d", d, "departments").unwrap();
        ctx.push("e", e, "d.employees").unwrap();
        ctx.bindings().to_vec()
    }

    #[test]
    fn test_push_and_resolve() {
        let mut ctx = company();
        ctx.push("d", 1, "departments").unwrap();
        ctx.push("e", 0, "d.employees").unwrap();

        assert_eq!(ctx.full_name(), "each.d.1:each.e.0");
        assert_eq!(ctx.resolve("e.name"), Some(&json!("Bo")));
        assert_eq!(ctx.resolve("d.name"), Some(&json!("Dev")));
        assert_eq!(ctx.resolve("title"), Some(&json!("Payroll")));
        assert_eq!(ctx.resolve("e.missing"), None);
        assert_eq!(ctx.resolve_name("e.salary"), Some(FormulaValue::Number(20.0)));

        ctx.pop();
        assert_eq!(ctx.full_name(), "each.d.1");
    }

    #[test]
    fn test_push_errors() {
        let mut ctx = company();
        assert_eq!(ctx.push("x", 0, "nothing"), Err(ExpressionError::UnboundName("nothing".into())));
        assert_eq!(ctx.push("x", 0, "title"), Err(ExpressionError::NotACollection("title".into())));
        assert!(ctx.push("d", 5, "departments").is_err());
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_blank_elements() {
        let mut ctx = company();
        assert_eq!(ctx.collection_len("3"), Ok(3));
        ctx.push("row", 2, "3").unwrap();
        assert_eq!(ctx.full_name(), "each.row.2");
        assert_eq!(ctx.resolve("row.anything"), None);
        assert!(!ctx.assign("row.anything", json!(1)));
    }

    #[test]
    fn test_restore_rebinds_only_changed_suffix() {
        let mut ctx = company();
        assert_eq!(ctx.restore(&path(1, 1)), 2);
        assert_eq!(ctx.full_name(), "each.d.1:each.e.1");
        assert_eq!(ctx.resolve("e.name"), Some(&json!("Cy")));

        // sibling row of the same department: only the employee moves
        assert_eq!(ctx.restore(&path(1, 0)), 1);
        assert_eq!(ctx.resolve("e.name"), Some(&json!("Bo")));

        // already bound
        assert_eq!(ctx.restore(&path(1, 0)), 0);

        // back to the top level
        assert_eq!(ctx.restore(&[]), 0);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_restore_tells_apart_repeats_sharing_a_variable() {
        let mut ctx = DataContext::new(json!({"a": [{"name": "a0"}], "b": [{"name": "b0"}]}));
        ctx.push("i", 0, "a").unwrap();
        let over_a = ctx.bindings().to_vec();
        ctx.reset();
        ctx.push("i", 0, "b").unwrap();
        let over_b = ctx.bindings().to_vec();
        ctx.reset();

        ctx.restore(&over_a);
        assert_eq!(ctx.resolve("i.name"), Some(&json!("a0")));
        assert_eq!(ctx.restore(&over_b), 1);
        assert_eq!(ctx.full_name(), "each.i.0");
        assert_eq!(ctx.resolve("i.name"), Some(&json!("b0")));
    }

    #[test]
    fn test_assign_writes_into_document() {
        let mut ctx = company();
        ctx.restore(&path(0, 0));
        assert!(ctx.assign("e.salary", json!(15)));
        assert!(ctx.assign("e.note", json!("new field")));
        ctx.reset();
        assert_eq!(ctx.resolve("departments.0.employees.0.salary"), Some(&json!(15)));
        assert_eq!(ctx.resolve("departments.0.employees.0.note"), Some(&json!("new field")));
        assert!(ctx.assign("total", json!(99)));
        assert_eq!(ctx.root()["total"], json!(99));
        assert!(!ctx.assign("departments.9.name", json!("x")));
    }

    #[test]
    fn test_json_conversions() {
        assert_eq!(json_to_formula(&json!([1, 2])), FormulaValue::Array(vec![
            vec![FormulaValue::Number(1.0)],
            vec![FormulaValue::Number(2.0)],
        ]));
        assert_eq!(cell_to_json(&formsheet_core::CellValue::Number(2.5)), json!(2.5));
        assert_eq!(cell_to_json(&formsheet_core::CellValue::Empty), Value::Null);
    }
}
