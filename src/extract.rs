// Copyright © 2025 lituus-io <spicyzhug@gmail.com>
// All Rights Reserved.
// Licensed under PolyForm Noncommercial 1.0.0

//! Canonical payload extraction from noisy model output.
//!
//! Model responses wrap the user-facing prompt in varying amounts of
//! scaffolding: sentinel tags, legacy copy markers, fenced blocks, or
//! plain boilerplate around the payload. [`Extractor`] isolates the
//! payload by trying a fixed resolution order, first match wins:
//!
//! 1. `<prompt_to_copy>` … `</prompt_to_copy>` sentinel tags
//!    (case-insensitive, whitespace tolerated inside the brackets)
//! 2. legacy `<<USER_COPY_PROMPT_START>>` … `<<USER_COPY_PROMPT_END>>` markers
//! 3. a ``` fence carrying a language tag
//! 4. boilerplate lines stripped from the leading and trailing edges
//! 5. the trimmed input unchanged
//!
//! The resolution order runs repeatedly until the text stops shrinking,
//! so nested conventions (a fence inside sentinels, a label header
//! inside a fence) unwrap fully in one call. The output is always a
//! contiguous slice of the input — the return type enforces it — and
//! extraction is idempotent. Malformed delimiters (one token missing,
//! or the end before the start) fall through to the next rule instead
//! of erroring.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

/// Canonical opening sentinel tag.
pub const PRIMARY_OPEN: &str = "<prompt_to_copy>";
/// Canonical closing sentinel tag.
pub const PRIMARY_CLOSE: &str = "</prompt_to_copy>";
/// Legacy opening copy marker.
pub const LEGACY_OPEN: &str = "<<USER_COPY_PROMPT_START>>";
/// Legacy closing copy marker.
pub const LEGACY_CLOSE: &str = "<<USER_COPY_PROMPT_END>>";

const BOILERPLATE: &str = r"(?xi)
      ^\#+ \s* 优化后的目标提示词 .* $
    | ^\*{0,2} 目标提示词 [:：] \*{0,2} $
    | ^\*{0,2} (?:改进|优化)说明 [:：] .* $
    | ^以下是 .* [:：] $
    | ^here (?:'s|\ is) \b .* [:：] $
    | ^(?:现在)? 请 (?:你)? (?:按照|根据) (?:此|以上) .* $
    | ^please\ generate\ content .* $
    | ^✅ .* $
    | ^< \s* /? \s* prompt_to_copy \s* > $
    | ^<< \s* USER_COPY_PROMPT_(?:START|END) \s* >> $
";

static DEFAULT_EXTRACTOR: LazyLock<Extractor> = LazyLock::new(Extractor::default);

/// Extract the canonical payload with the default configuration.
///
/// See [`Extractor::extract`].
pub fn extract(raw: &str) -> &str {
    DEFAULT_EXTRACTOR.extract(raw)
}

/// Payload extractor with compiled delimiter patterns.
///
/// Pure and reentrant; safe to share across sessions.
#[derive(Debug)]
pub struct Extractor {
    fence_skip_lines: usize,
    open_tag: Regex,
    close_tag: Regex,
    fence_open: Regex,
    fence_close: Regex,
    boilerplate: Regex,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Extractor {
    /// Create an extractor that skips `fence_skip_lines` header lines
    /// after a fence opens (rule 3). The upstream generator emits one
    /// title line inside the fence, hence the default of 1.
    pub fn new(fence_skip_lines: usize) -> Self {
        Self {
            fence_skip_lines,
            open_tag: Regex::new(r"(?i)<\s*prompt_to_copy\s*>").expect("open tag pattern"),
            close_tag: Regex::new(r"(?i)<\s*/\s*prompt_to_copy\s*>").expect("close tag pattern"),
            fence_open: Regex::new(r"(?m)^\s*```[A-Za-z][A-Za-z0-9_+-]*[ \t]*$")
                .expect("fence pattern"),
            fence_close: Regex::new(r"(?m)^[ \t]*```").expect("fence close pattern"),
            boilerplate: Regex::new(BOILERPLATE).expect("boilerplate pattern"),
        }
    }

    /// Isolate the canonical payload of `raw`.
    ///
    /// Returns a trimmed contiguous slice of the input; never synthesizes
    /// new text. The rule chain is iterated to a fixed point, so a body
    /// nested inside several conventions unwraps completely. Each pass
    /// returns a substring of its input, so the loop terminates.
    pub fn extract<'a>(&self, raw: &'a str) -> &'a str {
        let mut current = raw;
        loop {
            let next = self.extract_once(current);
            if next == current {
                return next;
            }
            current = next;
        }
    }

    fn extract_once<'a>(&self, raw: &'a str) -> &'a str {
        if let Some((open, close)) = self.primary_spans(raw) {
            return raw[open.end..close.start].trim();
        }
        if let Some((open, close)) = self.legacy_spans(raw) {
            return raw[open.end..close.start].trim();
        }
        if let Some(body) = self.fenced_body(raw) {
            return body;
        }
        self.strip_boilerplate(raw)
    }

    /// Re-wrap an updated payload in the delimiter convention of the
    /// original artifact.
    ///
    /// Text outside the delimiters is preserved verbatim, so a later
    /// [`extract`](Self::extract) of the result returns `replacement`
    /// (trimmed) exactly as it would have for the original. Artifacts
    /// without a recognized delimiter pair are replaced wholesale.
    pub fn rewrap(&self, original: &str, replacement: &str) -> String {
        let spans = self
            .primary_spans(original)
            .or_else(|| self.legacy_spans(original));
        match spans {
            Some((open, close)) => {
                let prefix = &original[..open.end];
                let suffix = &original[close.start..];
                format!("{prefix}\n{replacement}\n{suffix}")
            }
            None => replacement.to_string(),
        }
    }

    /// Byte spans of the primary sentinel pair, if both are present and
    /// well ordered.
    fn primary_spans(&self, text: &str) -> Option<(Range<usize>, Range<usize>)> {
        let open = self.open_tag.find(text)?;
        let close = self.close_tag.find(&text[open.end()..])?;
        let close = open.end() + close.start()..open.end() + close.end();
        Some((open.range(), close))
    }

    /// Byte spans of the legacy marker pair, if both are present and
    /// well ordered.
    fn legacy_spans(&self, text: &str) -> Option<(Range<usize>, Range<usize>)> {
        let open_start = text.find(LEGACY_OPEN)?;
        let open = open_start..open_start + LEGACY_OPEN.len();
        let close_start = text[open.end..].find(LEGACY_CLOSE)? + open.end;
        Some((open, close_start..close_start + LEGACY_CLOSE.len()))
    }

    /// Body of the first language-tagged fenced block (rule 3).
    fn fenced_body<'a>(&self, text: &'a str) -> Option<&'a str> {
        let fence = self.fence_open.find(text)?;
        let mut start = fence.end() + text[fence.end()..].find('\n')? + 1;
        for _ in 0..self.fence_skip_lines {
            match text[start..].find('\n') {
                Some(i) => start += i + 1,
                None => return None,
            }
        }
        let body = &text[start..];
        // Only a fence at line start closes the block; inline backtick
        // runs belong to the body.
        let end = self
            .fence_close
            .find(body)
            .map(|m| m.start())
            .unwrap_or(body.len());
        let slice = body[..end].trim();
        (!slice.is_empty()).then_some(slice)
    }

    /// Strip boilerplate and blank lines from the leading and trailing
    /// edges (rule 4). Interior lines are never touched, which keeps the
    /// output a contiguous slice and makes the rule idempotent.
    fn strip_boilerplate<'a>(&self, raw: &'a str) -> &'a str {
        let mut s = raw.trim();
        loop {
            if s.is_empty() {
                break;
            }
            let line_end = s.find('\n').unwrap_or(s.len());
            let line = s[..line_end].trim();
            if line.is_empty() || self.boilerplate.is_match(line) {
                s = if line_end == s.len() {
                    ""
                } else {
                    &s[line_end + 1..]
                };
            } else {
                break;
            }
        }
        loop {
            if s.is_empty() {
                break;
            }
            let line_start = s.rfind('\n').map(|i| i + 1).unwrap_or(0);
            let line = s[line_start..].trim();
            if line.is_empty() || self.boilerplate.is_match(line) {
                s = s[..line_start].trim_end_matches('\n');
            } else {
                break;
            }
        }
        s.trim()
    }
}
