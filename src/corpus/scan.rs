//! Tokenless structural scanning of corpus source text.
//!
//! [`CodeScanner`] walks text while tracking whether it is inside a string or
//! a comment, so callers can count `{[(` / `)]}` nesting without a grammar.
//! It is resumable: feeding a file line by line gives the same answers as
//! feeding it whole, which is what the line-based patcher relies on.

use std::sync::LazyLock;

use regex::Regex;

use super::literal::{LiteralParser, is_quote, parse_string_literal};

static RE_EXPORTED_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"export\s+(?:(?:const|let|var)\s+[A-Za-z_$][\w$]*\s*(?::[^=;]+)?=|default)\s*\[",
    )
    .unwrap()
});

static RE_PROPERTY_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[^\w$])(?:([A-Za-z_$][\w$]*)|"([A-Za-z_$][\w$]*)"|'([A-Za-z_$][\w$]*)')\s*:"#)
        .unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Resumable string/comment-aware scanner.
#[derive(Debug, Clone, Default)]
pub struct CodeScanner {
    mode: Mode,
    escaped: bool,
    pending_slash: bool,
    pending_star: bool,
}

impl CodeScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the scanner currently sits in plain code.
    pub fn in_code(&self) -> bool {
        self.mode == Mode::Code && !self.pending_slash
    }

    /// Whether a string literal is open (e.g. a template spanning lines).
    pub fn in_string(&self) -> bool {
        matches!(self.mode, Mode::Quoted(_))
    }

    /// Feed `chunk`, calling `on_code(offset, ch)` for every character that is
    /// code (outside strings and comments). Offsets are relative to `chunk`.
    pub fn feed(&mut self, chunk: &str, mut on_code: impl FnMut(usize, char)) {
        for (i, ch) in chunk.char_indices() {
            match self.mode {
                Mode::Code => {
                    if self.pending_slash {
                        self.pending_slash = false;
                        match ch {
                            '/' => {
                                self.mode = Mode::LineComment;
                                continue;
                            }
                            '*' => {
                                self.mode = Mode::BlockComment;
                                continue;
                            }
                            // The held-back slash was division.
                            _ => on_code(i.saturating_sub(1), '/'),
                        }
                    }
                    match ch {
                        c if is_quote(c) => self.mode = Mode::Quoted(c),
                        '/' => self.pending_slash = true,
                        c => on_code(i, c),
                    }
                }
                Mode::Quoted(quote) => {
                    if self.escaped {
                        self.escaped = false;
                    } else if ch == '\\' {
                        self.escaped = true;
                    } else if ch == quote {
                        self.mode = Mode::Code;
                    } else if ch == '\n' && quote != '`' {
                        // Unterminated single-line string: recover at end of line.
                        self.mode = Mode::Code;
                    }
                }
                Mode::LineComment => {
                    if ch == '\n' {
                        self.mode = Mode::Code;
                    }
                }
                Mode::BlockComment => {
                    if self.pending_star && ch == '/' {
                        self.mode = Mode::Code;
                        self.pending_star = false;
                    } else {
                        self.pending_star = ch == '*';
                    }
                }
            }
        }
    }
}

/// Nesting contribution of a code character.
pub fn depth_delta(ch: char) -> i32 {
    match ch {
        '{' | '[' | '(' => 1,
        '}' | ']' | ')' => -1,
        _ => 0,
    }
}

/// Offset of the delimiter closing the one opened at `open`, if any.
pub fn matching_close(text: &str, open: usize) -> Option<usize> {
    let rest = text.get(open..)?;
    let mut scanner = CodeScanner::new();
    let mut depth = 0i32;
    let mut close = None;
    scanner.feed(rest, |i, ch| {
        if close.is_some() {
            return;
        }
        depth += depth_delta(ch);
        if depth == 0 && depth_delta(ch) < 0 {
            close = Some(open + i);
        }
    });
    close
}

/// Nesting depth at byte `pos`, or `None` when `pos` lies inside a string or
/// comment.
pub fn depth_at(text: &str, pos: usize) -> Option<i32> {
    let prefix = text.get(..pos)?;
    let mut scanner = CodeScanner::new();
    let mut depth = 0i32;
    scanner.feed(prefix, |_, ch| depth += depth_delta(ch));
    scanner.in_code().then_some(depth)
}

/// Offsets of the `[` opening every exported array literal in `text`.
pub fn exported_array_starts(text: &str) -> Vec<usize> {
    RE_EXPORTED_ARRAY
        .find_iter(text)
        .filter(|m| depth_at(text, m.start()).is_some())
        .map(|m| m.end() - 1)
        .collect()
}

/// A `{ ... }` element directly inside an exported array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBlock {
    /// Offset of the opening `{`.
    pub start: usize,
    /// Offset just past the closing `}`.
    pub end: usize,
}

impl RecordBlock {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Split the array opened at `open` into its top-level object elements.
///
/// An unterminated array is scanned to the end of the text, so a truncated
/// file still yields its complete leading records.
pub fn record_blocks(text: &str, open: usize) -> Vec<RecordBlock> {
    let Some(rest) = text.get(open..) else {
        return Vec::new();
    };
    let mut scanner = CodeScanner::new();
    let mut depth = 0i32;
    let mut current: Option<usize> = None;
    let mut blocks = Vec::new();
    let mut done = false;
    scanner.feed(rest, |i, ch| {
        if done {
            return;
        }
        let at = open + i;
        match ch {
            '{' if depth == 1 => current = Some(at),
            '}' if depth == 2 => {
                if let Some(start) = current.take() {
                    blocks.push(RecordBlock { start, end: at + 1 });
                }
            }
            _ => {}
        }
        depth += depth_delta(ch);
        if depth == 0 {
            done = true;
        }
    });
    blocks
}

/// Offsets of the property keys sitting directly inside `block`
/// (nesting depth 1), keyed by property name, in source order.
///
/// Returned offsets point at the first character after the `:`.
pub fn top_level_properties(block: &str) -> Vec<(String, usize)> {
    RE_PROPERTY_KEY
        .captures_iter(block)
        .filter_map(|caps| {
            let key = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
            let key_start = if caps.get(1).is_some() {
                key.start()
            } else {
                key.start() - 1
            };
            (depth_at(block, key_start) == Some(1))
                .then(|| (key.as_str().to_string(), caps.get(0).map_or(key.end(), |m| m.end())))
        })
        .collect()
}

/// Decode the string-literal value of `field` directly inside `block`.
///
/// Returns `None` when the field is absent or its value is not a plain
/// string literal.
pub fn string_property(block: &str, field: &str) -> Option<String> {
    top_level_properties(block)
        .into_iter()
        .filter(|(key, _)| key == field)
        .find_map(|(_, value_at)| {
            let rest = &block[value_at..];
            let offset = value_at + (rest.len() - rest.trim_start().len());
            let (text, end) = parse_string_literal(block, offset).ok()?;
            value_ends_at(block, end).then_some(text)
        })
}

/// Whether a property value that stopped at `pos` is complete: only trivia
/// stands between it and the next `,`, `}` or the end of `src`.
///
/// `'a' + 'b'` stops after `'a'` and is not complete.
pub fn value_ends_at(src: &str, pos: usize) -> bool {
    let mut parser = LiteralParser::new(src, pos);
    if parser.skip_trivia().is_err() {
        return false;
    }
    matches!(
        src.get(parser.position()..).and_then(|rest| rest.chars().next()),
        None | Some(',' | '}')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braces_inside_strings_and_comments_are_ignored() {
        let text = "{ a: '}', b: \"{{\", /* } */ c: `]` // }\n }";
        assert_eq!(matching_close(text, 0), Some(text.len() - 1));
    }

    #[test]
    fn division_is_code() {
        let mut seen = String::new();
        CodeScanner::new().feed("a / b", |_, c| seen.push(c));
        assert_eq!(seen, "a / b");

        let mut seen = String::new();
        CodeScanner::new().feed("a // b", |_, c| seen.push(c));
        assert_eq!(seen, "a ");
    }

    #[test]
    fn feeding_by_line_matches_feeding_whole() {
        let text = "[\n  { a: `x\n}` },\n  { b: '{' }\n]\n";
        let mut whole = Vec::new();
        CodeScanner::new().feed(text, |i, c| whole.push((i, c)));

        let mut by_line = Vec::new();
        let mut scanner = CodeScanner::new();
        let mut base = 0;
        for line in text.split_inclusive('\n') {
            scanner.feed(line, |i, c| by_line.push((base + i, c)));
            base += line.len();
        }
        assert_eq!(whole, by_line);
    }

    #[test]
    fn depth_at_reports_none_inside_strings() {
        let text = "{ a: 'x{y' }";
        assert_eq!(depth_at(text, 2), Some(1));
        assert_eq!(depth_at(text, 7), None);
    }

    #[test]
    fn finds_exported_arrays_but_not_commented_ones() {
        let text = "// export const old = [\nexport const examples: Example[] = [\n];\nexport default [];";
        let starts = exported_array_starts(text);
        assert_eq!(starts.len(), 2);
        assert!(starts.iter().all(|&s| &text[s..s + 1] == "["));
    }

    #[test]
    fn splits_record_blocks() {
        let text = "export const x = [\n  { id: 'a', nested: { k: 1 } },\n  { id: 'b' },\n];";
        let open = exported_array_starts(text)[0];
        let blocks = record_blocks(text, open);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].text(text), "{ id: 'b' }");
    }

    #[test]
    fn reads_only_top_level_string_properties() {
        let block = "{ meta: { id: 'inner' }, 'id': 'outer', note: 'id: fake', expression: call() }";
        assert_eq!(string_property(block, "id").as_deref(), Some("outer"));
        assert_eq!(string_property(block, "expression"), None);
        assert_eq!(string_property(block, "missing"), None);
    }

    #[test]
    fn concatenated_values_are_not_string_properties() {
        let block = "{ id: 'a', expression: 'order' + '.total', title: 'T' /* note */ }";
        assert_eq!(string_property(block, "id").as_deref(), Some("a"));
        assert_eq!(string_property(block, "expression"), None);
        assert_eq!(string_property(block, "title").as_deref(), Some("T"));
    }

    #[test]
    fn value_end_allows_trivia_before_separator() {
        assert!(value_ends_at("'x', next", 3));
        assert!(value_ends_at("'x' // note\n}", 3));
        assert!(value_ends_at("'x'  \r\n", 3));
        assert!(!value_ends_at("'x' + y", 3));
        assert!(!value_ends_at("'x'.trim()", 3));
    }
}
