//! Cell value types

use std::fmt;
use std::sync::Arc;

/// Contents of one cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    /// Blank cell
    #[default]
    Empty,

    Boolean(bool),

    /// All numbers are f64, dates included
    Number(f64),

    String(SharedString),

    /// Error literal such as `#REF!`
    Error(CellError),

    /// Formula text (always starting with `=`) and its last computed result
    Formula {
        text: String,
        cached_value: Option<Box<CellValue>>,
    },
}

impl CellValue {
    pub fn string<S: Into<String>>(s: S) -> Self {
        CellValue::String(SharedString::new(s.into()))
    }

    /// Formula without a computed result
    pub fn formula<S: Into<String>>(text: S) -> Self {
        CellValue::Formula {
            text: text.into(),
            cached_value: None,
        }
    }

    /// Interpret user-typed text the way a form cell would.
    ///
    /// Blank text clears the cell. Text that parses as a number once
    /// thousands separators are dropped becomes a number. When the cell
    /// previously held a boolean, `Y`/`Yes`/`True` (any case) map to
    /// `true` and anything else to `false`. Everything else stays text.
    ///
    /// ```
    /// use formsheet_core::CellValue;
    ///
    /// assert_eq!(CellValue::from_input("1,250", &CellValue::Empty), CellValue::Number(1250.0));
    /// assert_eq!(
    ///     CellValue::from_input("yes", &CellValue::Boolean(false)),
    ///     CellValue::Boolean(true)
    /// );
    /// ```
    pub fn from_input(text: &str, previous: &CellValue) -> CellValue {
        let text = text.trim();
        if text.is_empty() {
            return CellValue::Empty;
        }
        if let Ok(n) = text.replace(',', "").parse::<f64>() {
            if n.is_finite() {
                return CellValue::Number(n);
            }
        }
        if matches!(previous.effective_value(), CellValue::Boolean(_)) {
            let truthy = ["y", "yes", "true"]
                .iter()
                .any(|t| text.eq_ignore_ascii_case(t));
            return CellValue::Boolean(truthy);
        }
        CellValue::string(text)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Formula { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.effective_value(), CellValue::Error(_))
    }

    /// Numeric view; booleans count as 0/1
    pub fn as_number(&self) -> Option<f64> {
        match self.effective_value() {
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.effective_value() {
            CellValue::Boolean(b) => Some(*b),
            CellValue::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self.effective_value() {
            CellValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellValue::Formula { text, .. } => Some(text),
            _ => None,
        }
    }

    /// The computed result for formulas, the value itself otherwise
    pub fn effective_value(&self) -> &CellValue {
        match self {
            CellValue::Formula {
                cached_value: Some(v),
                ..
            } => v.effective_value(),
            _ => self,
        }
    }

    /// Text as a form field shows it: `TRUE`/`FALSE` for booleans,
    /// integral numbers without a fractional part.
    pub fn to_display_string(&self) -> String {
        match self.effective_value() {
            CellValue::Empty => String::new(),
            CellValue::Boolean(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::String(s) => s.to_string(),
            CellValue::Error(e) => e.as_str().to_string(),
            // formula never evaluated
            CellValue::Formula { .. } => String::new(),
        }
    }

    /// Unformatted text used when a value is saved back or substituted
    /// into a rule: booleans become `Y`/`N`.
    pub fn to_plain_string(&self) -> String {
        match self.effective_value() {
            CellValue::Boolean(b) => (if *b { "Y" } else { "N" }).to_string(),
            other => other.to_display_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Boolean(_) => "boolean",
            CellValue::Number(_) => "number",
            CellValue::String(_) => "string",
            CellValue::Error(_) => "error",
            CellValue::Formula { .. } => "formula",
        }
    }
}

/// `12.0` prints as `12`; everything else uses the shortest round-trip form.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Formula {
                text,
                cached_value: None,
            } => f.write_str(text),
            other => f.write_str(&other.to_display_string()),
        }
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Number(f64::from(n))
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::string(s)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::string(s)
    }
}

impl From<CellError> for CellValue {
    fn from(e: CellError) -> Self {
        CellValue::Error(e)
    }
}

/// Spreadsheet error literals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellError {
    /// `#NULL!`
    Null,
    /// `#DIV/0!`
    Div0,
    /// `#VALUE!`
    Value,
    /// `#REF!`, also used for circular references
    Ref,
    /// `#NAME?`, unknown function or unbound name
    Name,
    /// `#NUM!`
    Num,
    /// `#N/A`
    Na,
}

impl CellError {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellError::Null => "#NULL!",
            CellError::Div0 => "#DIV/0!",
            CellError::Value => "#VALUE!",
            CellError::Ref => "#REF!",
            CellError::Name => "#NAME?",
            CellError::Num => "#NUM!",
            CellError::Na => "#N/A",
        }
    }

    /// Case-insensitive lookup of an error literal
    pub fn parse(s: &str) -> Option<Self> {
        const ALL: [CellError; 7] = [
            CellError::Null,
            CellError::Div0,
            CellError::Value,
            CellError::Ref,
            CellError::Name,
            CellError::Num,
            CellError::Na,
        ];
        ALL.into_iter().find(|e| e.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference-counted string; template copies share the same allocation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SharedString(Arc<str>);

impl SharedString {
    pub fn new<S: AsRef<str>>(s: S) -> Self {
        SharedString(Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for SharedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SharedString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SharedString {
    fn from(s: &str) -> Self {
        SharedString::new(s)
    }
}

impl From<String> for SharedString {
    fn from(s: String) -> Self {
        SharedString::new(s)
    }
}
