//! Re-render requests
//!
//! The UI that shows a form is outside this crate. When a cell's
//! validity flips, the session asks it to re-render that cell's group
//! through a [`RenderNotifier`]. Nothing comes back.

use std::fmt;

/// One cell group of the visible page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderTarget {
    pub client_id: String,
    /// Row within the page
    pub row: u32,
    /// Column relative to the body's first column
    pub col: u16,
}

impl RenderTarget {
    /// `clientId:row:group{col}`
    pub fn component_id(&self) -> String {
        format!("{}:{}:group{}", self.client_id, self.row, self.col)
    }
}

impl fmt::Display for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.component_id())
    }
}

pub trait RenderNotifier {
    fn request_render(&mut self, target: RenderTarget);
}

/// Drops every request
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl RenderNotifier for NoopNotifier {
    fn request_render(&mut self, _target: RenderTarget) {}
}

/// Keeps every request, in order
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub targets: Vec<RenderTarget>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the requests made so far
    pub fn drain(&mut self) -> Vec<RenderTarget> {
        std::mem::take(&mut self.targets)
    }
}

impl RenderNotifier for RecordingNotifier {
    fn request_render(&mut self, target: RenderTarget) {
        self.targets.push(target);
    }
}

impl<F: FnMut(RenderTarget)> RenderNotifier for F {
    fn request_render(&mut self, target: RenderTarget) {
        self(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_component_id() {
        let target = RenderTarget {
            client_id: "orders".into(),
            row: 3,
            col: 2,
        };
        assert_eq!(target.to_string(), "orders:3:group2");
    }

    #[test]
    fn test_closure_notifier() {
        let mut seen = Vec::new();
        {
            let mut notifier = |t: RenderTarget| seen.push(t.row);
            notifier.request_render(RenderTarget {
                client_id: "c".into(),
                row: 1,
                col: 0,
            });
        }
        assert_eq!(seen, vec![1]);
    }
}
