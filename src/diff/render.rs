// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! String rendering for diffs.
//!
//! Pure projections over the diff primitives in the parent module; no
//! rendering mode performs any comparison of its own beyond calling
//! [`line_diff`]/[`word_diff`].

use super::{line_diff, word_diff};
use console::style;
use std::fmt::Write;

/// How two artifacts are projected into a single display string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RenderMode {
    /// Two raw panes next to each other, no diff computation.
    SideBySide,
    /// Word-level diff with inline added/removed spans.
    DiffHighlight,
    /// Line-level diff, single pane with a leading `+`/`-`/space marker.
    #[default]
    Unified,
}

/// Configuration for diff rendering.
#[derive(Debug, Clone)]
pub struct DiffRenderer {
    /// Rendering mode.
    pub mode: RenderMode,
    /// Emit ANSI colors. When off, inline spans use git word-diff
    /// style `{+added+}` / `[-removed-]` markers instead.
    pub use_color: bool,
}

impl Default for DiffRenderer {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            use_color: false,
        }
    }
}

impl DiffRenderer {
    /// Create a renderer for the given mode, without colors.
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            use_color: false,
        }
    }

    /// Enable ANSI colors.
    pub fn with_color(mut self) -> Self {
        self.use_color = true;
        self
    }

    /// Render the comparison of two artifacts.
    pub fn render(&self, old: &str, new: &str) -> String {
        match self.mode {
            RenderMode::SideBySide => self.render_side_by_side(old, new),
            RenderMode::DiffHighlight => self.render_inline(old, new),
            RenderMode::Unified => self.render_unified(old, new),
        }
    }

    fn render_unified(&self, old: &str, new: &str) -> String {
        let mut out = String::new();
        for part in line_diff(old, new) {
            let marker = if part.added {
                '+'
            } else if part.removed {
                '-'
            } else {
                ' '
            };
            let line = part.value.strip_suffix('\n').unwrap_or(part.value);
            if self.use_color && part.added {
                let _ = writeln!(out, "{}", style(format!("+{line}")).green().force_styling(true));
            } else if self.use_color && part.removed {
                let _ = writeln!(out, "{}", style(format!("-{line}")).red().force_styling(true));
            } else {
                let _ = writeln!(out, "{marker}{line}");
            }
        }
        out
    }

    fn render_inline(&self, old: &str, new: &str) -> String {
        let mut out = String::new();
        for part in word_diff(old, new) {
            if part.added {
                if self.use_color {
                    let _ = write!(out, "{}", style(part.value).green().force_styling(true));
                } else {
                    let _ = write!(out, "{{+{}+}}", part.value);
                }
            } else if part.removed {
                if self.use_color {
                    let _ = write!(out, "{}", style(part.value).red().force_styling(true));
                } else {
                    let _ = write!(out, "[-{}-]", part.value);
                }
            } else {
                out.push_str(part.value);
            }
        }
        out
    }

    fn render_side_by_side(&self, old: &str, new: &str) -> String {
        let left: Vec<&str> = old.lines().collect();
        let right: Vec<&str> = new.lines().collect();
        let width = left.iter().map(|l| l.chars().count()).max().unwrap_or(0);

        let mut out = String::new();
        for i in 0..left.len().max(right.len()) {
            let l = left.get(i).copied().unwrap_or("");
            let r = right.get(i).copied().unwrap_or("");
            let pad = width.saturating_sub(l.chars().count());
            let _ = writeln!(out, "{l}{} │ {r}", " ".repeat(pad));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unified_markers() {
        let out = DiffRenderer::new(RenderMode::Unified).render("a\nb\nc", "a\nx\nc");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines, vec![" a", "-b", "+x", " c"]);
    }

    #[test]
    fn test_inline_plain_markers() {
        let out = DiffRenderer::new(RenderMode::DiffHighlight).render("hello world", "hello earth");
        assert!(out.contains("[-world-]"));
        assert!(out.contains("{+earth+}"));
        assert!(out.starts_with("hello "));
    }

    #[test]
    fn test_side_by_side_is_raw() {
        let out = DiffRenderer::new(RenderMode::SideBySide).render("a\nb", "a\nx");
        assert!(out.contains('│'));
        assert!(out.contains('b'));
        assert!(out.contains('x'));
        // No diff markers in a raw two-pane view.
        assert!(!out.contains("+x"));
    }

    #[test]
    fn test_render_deterministic() {
        let renderer = DiffRenderer::new(RenderMode::Unified);
        assert_eq!(renderer.render("a\nb", "a\nc"), renderer.render("a\nb", "a\nc"));
    }

    #[test]
    fn test_unified_handles_missing_trailing_newline() {
        let out = DiffRenderer::new(RenderMode::Unified).render("a", "a");
        assert_eq!(out, " a\n");
    }
}
