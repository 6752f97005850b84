//! Cell comments
//!
//! Template authors put configuration into comments, one directive per
//! line. [`CellComment::directives`] picks those lines out by prefix and
//! leaves ordinary note text alone.
//!
//! ```rust
//! use formsheet_core::CellComment;
//!
//! let note = CellComment::new("designer", "Totals row\nfs:if(condition=\"show\")");
//! let directives: Vec<_> = note.directives("fs:").collect();
//! assert_eq!(directives, vec!["fs:if(condition=\"show\")"]);
//! ```

use std::fmt;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellComment {
    pub author: String,
    pub text: String,
}

impl CellComment {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }

    /// Comment without an author
    pub fn text_only(text: impl Into<String>) -> Self {
        Self::new(String::new(), text)
    }

    pub fn has_author(&self) -> bool {
        !self.author.is_empty()
    }

    /// Trimmed lines starting with `prefix`
    pub fn directives<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.text
            .lines()
            .map(str::trim)
            .filter(move |line| line.starts_with(prefix))
    }

    /// True when every non-blank line is a directive, i.e. the comment
    /// exists only to configure the template.
    pub fn is_directive_only(&self, prefix: &str) -> bool {
        self.text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .all(|line| line.starts_with(prefix))
    }
}

impl fmt::Display for CellComment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_author() {
            write!(f, "[{}]: {}", self.author, self.text)
        } else {
            f.write_str(&self.text)
        }
    }
}
