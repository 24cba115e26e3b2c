// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Diff primitives for comparing prompt revisions.
//!
//! This module provides line- and word-granularity diffs between two
//! artifacts of a refinement session, plus the three render-mode
//! projections used by presentation layers:
//! - Line diffs over newline-split text
//! - Word diffs over whitespace/punctuation-aware tokens
//! - Unified / inline / side-by-side string rendering

mod render;

pub use render::{DiffRenderer, RenderMode};

use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, TextDiff};

/// A single span in a diff, covering one line (line diffs) or one
/// token (word diffs) of either input.
///
/// Filtering a diff keeps both inputs reconstructable:
/// - concatenating the values of non-`removed` parts yields the new text
/// - concatenating the values of non-`added` parts yields the old text
///
/// Values are zero-copy slices of the compared inputs and keep their
/// original trailing newlines, so the concatenations above are byte-exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiffPart<'a> {
    /// The text of this span, borrowed from one of the inputs.
    pub value: &'a str,
    /// The span exists only in the new text.
    pub added: bool,
    /// The span exists only in the old text.
    pub removed: bool,
}

impl<'a> DiffPart<'a> {
    /// Whether this span is common to both inputs.
    #[inline]
    pub fn is_unchanged(&self) -> bool {
        !self.added && !self.removed
    }
}

/// LCS diff over lines split on newline, one [`DiffPart`] per line.
///
/// Within a replaced run, removed lines precede added lines; input order
/// is otherwise preserved. The LCS algorithm is pinned so identical
/// inputs always produce byte-identical output.
pub fn line_diff<'a>(old: &'a str, new: &'a str) -> Vec<DiffPart<'a>> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_lines(old, new);
    collect_parts(&diff)
}

/// LCS diff over word tokens, one [`DiffPart`] per token.
///
/// Tokens are words and the whitespace/punctuation runs between them,
/// so concatenating the kept values reconstructs the inputs exactly.
pub fn word_diff<'a>(old: &'a str, new: &'a str) -> Vec<DiffPart<'a>> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_words(old, new);
    collect_parts(&diff)
}

fn collect_parts<'a>(diff: &TextDiff<'a, 'a, 'a, str>) -> Vec<DiffPart<'a>> {
    diff.iter_all_changes()
        .map(|change| DiffPart {
            value: change.value(),
            added: change.tag() == ChangeTag::Insert,
            removed: change.tag() == ChangeTag::Delete,
        })
        .collect()
}

/// Statistics about a diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Number of added spans.
    pub added: usize,
    /// Number of removed spans.
    pub removed: usize,
}

impl DiffStats {
    /// Count added/removed spans in a diff.
    pub fn from_parts(parts: &[DiffPart<'_>]) -> Self {
        let mut stats = Self::default();
        for part in parts {
            if part.added {
                stats.added += 1;
            } else if part.removed {
                stats.removed += 1;
            }
        }
        stats
    }

    /// Check if there are any changes.
    #[inline]
    pub fn has_changes(&self) -> bool {
        self.added + self.removed > 0
    }

    /// Format as a compact string like "+10 -5".
    pub fn compact(&self) -> String {
        format!("+{} -{}", self.added, self.removed)
    }
}
