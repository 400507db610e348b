//! Tag scanning for embedded-code templates
//!
//! Splits template text into literal text and `<% %>`-family tags, applying
//! the configured [`TrimMode`] to the newlines and indentation around tags.

use crate::error::{RenderError, Result};
use serde::Serialize;
use std::str::FromStr;

/// Which newlines next to tags are dropped from the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimMode {
    /// Keep all text exactly as written
    None,
    /// `-%>` drops the following newline, `<%-` drops the indentation before the tag
    #[default]
    Dash,
    /// Drop the newline after every tag (`>`)
    Gt,
    /// Drop the newline after a tag when its line starts with `<%` (`<>`)
    LtGt,
}

impl FromStr for TrimMode {
    type Err = String;

    /// Accepts both the conventional mode strings (`-`, `>`, `<>`) and names.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "none" => Ok(Self::None),
            "-" | "dash" => Ok(Self::Dash),
            ">" | "gt" => Ok(Self::Gt),
            "<>" | "ltgt" => Ok(Self::LtGt),
            other => Err(format!("unknown trim mode: {other}")),
        }
    }
}

/// Classification of a scanned segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// Literal text, copied to the output
    Text,
    /// `<% code %>`
    Code,
    /// `<%= expr %>`
    Output,
    /// `<%# comment %>`
    Comment,
}

/// A contiguous piece of the template
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Literal text, or the code between the markers with escapes resolved
    pub content: String,
    /// Byte offset of the segment in the template
    pub start: usize,
    /// Byte offset one past the end of the segment
    pub end: usize,
    /// Line on which the segment starts (1-based)
    pub line: usize,
}

struct Scanner<'a> {
    template: &'a str,
    mode: TrimMode,
    segments: Vec<Segment>,
    text: String,
    text_start: usize,
    text_line: usize,
    pos: usize,
    line: usize,
    line_start: usize,
    line_begins_with_tag: bool,
}

/// Scans `template` into segments.
///
/// Adjacent literal text is merged into one [`SegmentKind::Text`] segment, so
/// text and tag segments alternate.
///
/// # Errors
///
/// Returns `RenderError::Syntax` when a tag is opened but never closed.
pub fn scan(template: &str, mode: TrimMode) -> Result<Vec<Segment>> {
    let mut scanner = Scanner {
        template,
        mode,
        segments: Vec::new(),
        text: String::new(),
        text_start: 0,
        text_line: 1,
        pos: 0,
        line: 1,
        line_start: 0,
        line_begins_with_tag: false,
    };
    scanner.run()?;
    Ok(scanner.segments)
}

impl Scanner<'_> {
    fn run(&mut self) -> Result<()> {
        while let Some(offset) = self.template[self.pos..].find("<%") {
            let open = self.pos + offset;
            let chunk = &self.template[self.pos..open];
            self.push_text(chunk);

            if self.template[open..].starts_with("<%%") {
                self.push_text_literal("<%", open);
                self.pos = open + 3;
                continue;
            }

            if open == self.line_start {
                self.line_begins_with_tag = true;
            }
            self.scan_tag(open)?;
        }

        let rest = &self.template[self.pos..];
        self.push_text(rest);
        self.pos = self.template.len();
        self.flush_text();
        Ok(())
    }

    fn push_text(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        self.push_text_literal(chunk, self.pos);
        self.advance_lines(self.pos, chunk);
    }

    fn push_text_literal(&mut self, literal: &str, at: usize) {
        if self.text.is_empty() {
            self.text_start = at;
            self.text_line = self.line;
        }
        self.text.push_str(literal);
    }

    /// Updates line bookkeeping for `chunk`, which starts at byte `at`.
    fn advance_lines(&mut self, at: usize, chunk: &str) {
        let newlines = chunk.matches('\n').count();
        if newlines > 0 {
            self.line += newlines;
            if let Some(last) = chunk.rfind('\n') {
                self.line_start = at + last + 1;
            }
            self.line_begins_with_tag = false;
        }
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let content = std::mem::take(&mut self.text);
        let end = self.text_start + content.len();
        self.segments.push(Segment {
            kind: SegmentKind::Text,
            content,
            start: self.text_start,
            end,
            line: self.text_line,
        });
    }

    fn scan_tag(&mut self, open: usize) -> Result<()> {
        let bytes = self.template.as_bytes();
        let mut cursor = open + 2;

        let dash_open = self.mode == TrimMode::Dash && bytes.get(cursor) == Some(&b'-');
        if dash_open {
            cursor += 1;
            self.strip_indentation(open);
        }

        let kind = match bytes.get(cursor) {
            Some(b'=') => {
                cursor += 1;
                SegmentKind::Output
            }
            Some(b'#') => {
                cursor += 1;
                SegmentKind::Comment
            }
            _ => SegmentKind::Code,
        };

        let (mut content, close) = self.find_close(cursor)?;

        let dash_close = self.mode == TrimMode::Dash && content.ends_with('-');
        if dash_close {
            content.pop();
        }

        let tag_line = self.line;
        let tag_end = close + 2;
        let tag_text = &self.template[open..tag_end];
        let begins_line = self.line_begins_with_tag;
        self.advance_lines(open, tag_text);

        self.flush_text();
        self.segments.push(Segment {
            kind,
            content,
            start: open,
            end: tag_end,
            line: tag_line,
        });
        self.pos = tag_end;

        let eat_newline = match self.mode {
            TrimMode::None => false,
            TrimMode::Dash => dash_close,
            TrimMode::Gt => true,
            TrimMode::LtGt => begins_line,
        };
        if eat_newline {
            self.skip_newline();
        }
        Ok(())
    }

    /// Finds the `%>` closing the tag whose content starts at `from`,
    /// resolving `%%>` to a literal `%>`.
    fn find_close(&self, from: usize) -> Result<(String, usize)> {
        let mut content = String::new();
        let mut search = from;
        loop {
            let Some(offset) = self.template[search..].find("%>") else {
                return Err(RenderError::syntax(self.line, "unclosed tag, expected `%>`"));
            };
            let close = search + offset;
            if close > search && self.template.as_bytes()[close - 1] == b'%' {
                content.push_str(&self.template[search..close - 1]);
                content.push_str("%>");
                search = close + 2;
                continue;
            }
            content.push_str(&self.template[search..close]);
            return Ok((content, close));
        }
    }

    /// Drops spaces and tabs between the start of the line and `<%-`.
    fn strip_indentation(&mut self, open: usize) {
        if self.line_start > open {
            return;
        }
        let indent = &self.template[self.line_start..open];
        if indent.is_empty() || !indent.bytes().all(|b| b == b' ' || b == b'\t') {
            return;
        }
        if self.text.ends_with(indent) {
            let keep = self.text.len() - indent.len();
            self.text.truncate(keep);
            self.line_begins_with_tag = true;
        }
    }

    fn skip_newline(&mut self) {
        let rest = &self.template[self.pos..];
        let width = if rest.starts_with("\r\n") {
            2
        } else if rest.starts_with('\n') {
            1
        } else {
            return;
        };
        self.pos += width;
        self.line += 1;
        self.line_start = self.pos;
        self.line_begins_with_tag = false;
    }
}
