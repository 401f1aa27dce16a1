//! Single-field rewrites inside corpus source files.
//!
//! The file is never parsed as a whole. The patcher finds the one line that
//! carries the record's id marker, walks back to the `{` opening that record,
//! then scans forward line by line with a depth counter until it meets the
//! `expectedOutput` key at the record's top level. Only that key's string
//! literal is replaced; every other byte of the file is left as it was.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::corpus::literal::{encode_string_literal, is_quote, parse_string_literal};
use crate::corpus::scan::{CodeScanner, depth_delta, value_ends_at};
use crate::error::{PatchError, PatchResult};
use crate::model::RecordKey;

/// Property holding the record identifier.
pub const ID_FIELD: &str = "id";

/// Property rewritten by the patcher.
pub const EXPECTED_FIELD: &str = "expectedOutput";

static RE_ID_KEY: LazyLock<Regex> = LazyLock::new(|| property_key(ID_FIELD));

static RE_EXPECTED_KEY: LazyLock<Regex> = LazyLock::new(|| property_key(EXPECTED_FIELD));

/// Matches `field:` with the key bare or quoted; group 1 spans the key, the
/// colon and the whitespace after it.
fn property_key(field: &str) -> Regex {
    let name = regex::escape(field);
    Regex::new(&format!(
        r#"(?:^|[^\w$])((?:{name}|"{name}"|'{name}')\s*:\s*)"#
    ))
    .unwrap()
}

/// A successful single-field edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOperation {
    pub target: RecordKey,
    /// 1-based line number of the rewritten field.
    pub line: usize,
    /// Literal source text that was replaced, quotes included.
    pub old_literal: String,
    /// Literal source text written in its place.
    pub new_literal: String,
}

/// Why a patch could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotFoundReason {
    /// No id marker for the record in the file.
    RecordMissing,
    /// The id marker occurs more than once in the file.
    AmbiguousRecord,
    /// No top-level `expectedOutput` within the record span and window.
    FieldMissing,
    /// The field value is not a lone single-line string literal.
    UnsupportedValue,
}

impl NotFoundReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecordMissing => "record id not found in file",
            Self::AmbiguousRecord => "record id occurs more than once in file",
            Self::FieldMissing => "expectedOutput not found within the record",
            Self::UnsupportedValue => "expectedOutput is not a lone single-line string literal",
        }
    }
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one patch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied(PatchOperation),
    /// The stored literal already holds the new content.
    Unchanged,
    NotFound(NotFoundReason),
}

impl PatchOutcome {
    /// Whether the record now holds the requested content.
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

/// Line-scanning patcher with a bounded lookahead.
#[derive(Debug, Clone, Copy)]
pub struct RecordPatcher {
    window: usize,
}

impl RecordPatcher {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// Replace the `expectedOutput` content of `target` in `text`.
    ///
    /// Returns the rewritten text only for [`PatchOutcome::Applied`].
    pub fn patch_text(
        &self,
        text: &str,
        target: &RecordKey,
        content: &str,
    ) -> (PatchOutcome, Option<String>) {
        let markers = id_markers(text, &target.id);
        let marker = match markers.as_slice() {
            [] => return (PatchOutcome::NotFound(NotFoundReason::RecordMissing), None),
            [only] => *only,
            _ => return (PatchOutcome::NotFound(NotFoundReason::AmbiguousRecord), None),
        };
        let Some(open) = enclosing_object(text, marker) else {
            return (PatchOutcome::NotFound(NotFoundReason::RecordMissing), None);
        };

        let field = match self.locate_field(text, open) {
            Ok(field) => field,
            Err(reason) => return (PatchOutcome::NotFound(reason), None),
        };
        if field.content == content {
            return (PatchOutcome::Unchanged, None);
        }

        let new_literal = encode_string_literal(content, field.quote);
        let mut patched = String::with_capacity(text.len() + new_literal.len());
        patched.push_str(&text[..field.start]);
        patched.push_str(&new_literal);
        patched.push_str(&text[field.end..]);

        let operation = PatchOperation {
            target: target.clone(),
            line: text[..field.start].matches('\n').count() + 1,
            old_literal: text[field.start..field.end].to_string(),
            new_literal,
        };
        (PatchOutcome::Applied(operation), Some(patched))
    }

    /// Patch the file owning `target` under `root`, writing in place.
    pub fn patch_file(
        &self,
        root: &Path,
        target: &RecordKey,
        content: &str,
    ) -> PatchResult<PatchOutcome> {
        let path: PathBuf = root.join(&target.source_file);
        let text = std::fs::read_to_string(&path).map_err(|source| PatchError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let (outcome, patched) = self.patch_text(&text, target, content);
        if let Some(patched) = patched {
            std::fs::write(&path, patched).map_err(|source| PatchError::Write {
                path: path.display().to_string(),
                source,
            })?;
        }
        match &outcome {
            PatchOutcome::Applied(op) => {
                tracing::debug!(record = %target, line = op.line, "expectedOutput rewritten");
            }
            PatchOutcome::Unchanged => {
                tracing::debug!(record = %target, "expectedOutput already current");
            }
            PatchOutcome::NotFound(reason) => {
                tracing::warn!(record = %target, %reason, "patch target not found");
            }
        }
        Ok(outcome)
    }

    /// Scan forward from the record's `{` for its top-level expected-output
    /// literal, within the line window.
    fn locate_field(&self, text: &str, open: usize) -> Result<FieldSpan, NotFoundReason> {
        let mut scanner = CodeScanner::new();
        let mut depth = 0i32;
        let mut base = open;

        for line in text[open..].split_inclusive('\n').take(self.window) {
            for caps in RE_EXPECTED_KEY.captures_iter(line) {
                let Some(key) = caps.get(1) else { continue };
                let mut ahead = scanner.clone();
                let mut key_depth = depth;
                ahead.feed(&line[..key.start()], |_, ch| key_depth += depth_delta(ch));
                if !ahead.in_code() || key_depth != 1 {
                    continue;
                }
                // A literal that is only the first operand of a longer
                // expression is not rewritten.
                return literal_span(line, key.end())
                    .filter(|&(_, _, _, end)| value_ends_at(text, base + end))
                    .map(|(content, quote, start, end)| FieldSpan {
                        content,
                        quote,
                        start: base + start,
                        end: base + end,
                    })
                    .ok_or(NotFoundReason::UnsupportedValue);
            }

            let mut closed = false;
            scanner.feed(line, |_, ch| {
                if closed {
                    return;
                }
                depth += depth_delta(ch);
                if depth == 0 {
                    closed = true;
                }
            });
            if closed {
                break;
            }
            base += line.len();
        }
        Err(NotFoundReason::FieldMissing)
    }
}

impl Default for RecordPatcher {
    fn default() -> Self {
        Self::new(40)
    }
}

/// Location of the literal to replace, as absolute byte offsets.
struct FieldSpan {
    content: String,
    quote: char,
    start: usize,
    end: usize,
}

/// Decode the string literal at `at` in `line`, if it closes on this line.
fn literal_span(line: &str, at: usize) -> Option<(String, char, usize, usize)> {
    let quote = line[at..].chars().next().filter(|&c| is_quote(c))?;
    let (content, end) = parse_string_literal(line, at).ok()?;
    let literal = &line[at..end];
    (!literal.contains('\n')).then_some((content, quote, at, end))
}

/// Offsets of every code-level `id: '<id>'` key in `text`.
fn id_markers(text: &str, id: &str) -> Vec<usize> {
    let mut markers = Vec::new();
    let mut scanner = CodeScanner::new();
    let mut base = 0;

    for line in text.split_inclusive('\n') {
        for caps in RE_ID_KEY.captures_iter(line) {
            let Some(key) = caps.get(1) else { continue };
            let mut ahead = scanner.clone();
            ahead.feed(&line[..key.start()], |_, _| {});
            if !ahead.in_code() {
                continue;
            }
            let matches_id = line[key.end()..].starts_with(is_quote)
                && parse_string_literal(line, key.end()).is_ok_and(|(value, _)| value == id);
            if matches_id {
                markers.push(base + key.start());
            }
        }
        scanner.feed(line, |_, _| {});
        base += line.len();
    }
    markers
}

/// Offset of the innermost `{` still open at `pos`.
fn enclosing_object(text: &str, pos: usize) -> Option<usize> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    CodeScanner::new().feed(&text[..pos], |i, ch| match ch {
        '{' | '[' | '(' => stack.push((ch, i)),
        '}' | ']' | ')' => {
            stack.pop();
        }
        _ => {}
    });
    match stack.last() {
        Some(('{', at)) => Some(*at),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &str = "\
import { Example } from './types';

export const dateExamples: Example[] = [
  {
    id: 'now-utc',
    title: 'Current time',
    expression: '$now()',
    sampleInput: '{}',
    expectedOutput: '\"2023-10-15T00:00:00Z\"',
    category: 'dates',
  },
  {
    id: 'sum',
    title: 'Sum',
    expression: '$sum(values)',
    sampleInput: '{\"values\": [1, 2]}',
    expectedOutput: '3', // checked by hand
  },
];
";

    fn key(id: &str) -> RecordKey {
        RecordKey::new(Path::new("dates.ts"), id)
    }

    fn changed_lines(before: &str, after: &str) -> Vec<usize> {
        before
            .lines()
            .zip(after.lines())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i + 1)
            .collect()
    }

    #[test]
    fn rewrites_only_the_expected_output_line() {
        let patcher = RecordPatcher::default();
        let (outcome, text) =
            patcher.patch_text(CORPUS, &key("now-utc"), "\"2023-10-15T00:00:00+00:00\"");
        let text = text.unwrap();
        let PatchOutcome::Applied(op) = outcome else {
            panic!("expected an applied patch, got {outcome:?}");
        };
        assert_eq!(op.line, 9);
        assert_eq!(op.old_literal, "'\"2023-10-15T00:00:00Z\"'");
        assert_eq!(op.new_literal, "'\"2023-10-15T00:00:00+00:00\"'");
        assert_eq!(changed_lines(CORPUS, &text), vec![9]);
        assert_eq!(text.lines().count(), CORPUS.lines().count());
        assert!(text.contains("    expectedOutput: '\"2023-10-15T00:00:00+00:00\"',\n"));
    }

    #[test]
    fn trailing_comment_and_separator_survive() {
        let (_, text) = RecordPatcher::default().patch_text(CORPUS, &key("sum"), "4");
        let text = text.unwrap();
        assert!(text.contains("    expectedOutput: '4', // checked by hand\n"));
        assert_eq!(changed_lines(CORPUS, &text), vec![17]);
    }

    #[test]
    fn single_quotes_in_content_are_escaped() {
        let (_, text) = RecordPatcher::default().patch_text(CORPUS, &key("sum"), "\"it's\"");
        assert!(text.unwrap().contains(r#"expectedOutput: '"it\'s"',"#));
    }

    #[test]
    fn current_literal_is_unchanged() {
        let (outcome, text) = RecordPatcher::default().patch_text(CORPUS, &key("sum"), "3");
        assert_eq!(outcome, PatchOutcome::Unchanged);
        assert!(text.is_none());
        assert!(outcome.is_success());
    }

    #[test]
    fn unknown_id_is_record_missing() {
        let (outcome, text) = RecordPatcher::default().patch_text(CORPUS, &key("nope"), "1");
        assert_eq!(outcome, PatchOutcome::NotFound(NotFoundReason::RecordMissing));
        assert!(text.is_none());
    }

    #[test]
    fn id_mentioned_only_in_text_is_not_a_marker() {
        let text = "export const x = [\n  { id: 'a', note: \"id: 'b'\", expectedOutput: '1' },\n];\n";
        let (outcome, _) = RecordPatcher::default().patch_text(text, &key("b"), "2");
        assert_eq!(outcome, PatchOutcome::NotFound(NotFoundReason::RecordMissing));
    }

    #[test]
    fn duplicate_id_in_file_is_ambiguous() {
        let text = "export const x = [\n  { id: 'a', expectedOutput: '1' },\n  { id: 'a', expectedOutput: '2' },\n];\n";
        let (outcome, _) = RecordPatcher::default().patch_text(text, &key("a"), "3");
        assert_eq!(outcome, PatchOutcome::NotFound(NotFoundReason::AmbiguousRecord));
    }

    #[test]
    fn nested_expected_output_is_ignored() {
        let text = "export const x = [\n  {\n    id: 'a',\n    meta: { expectedOutput: 'old' },\n  },\n  {\n    id: 'b',\n    expectedOutput: '1',\n  },\n];\n";
        let (outcome, _) = RecordPatcher::default().patch_text(text, &key("a"), "2");
        assert_eq!(outcome, PatchOutcome::NotFound(NotFoundReason::FieldMissing));
    }

    #[test]
    fn field_beyond_window_is_missing() {
        let (outcome, _) = RecordPatcher::new(3).patch_text(CORPUS, &key("now-utc"), "null");
        assert_eq!(outcome, PatchOutcome::NotFound(NotFoundReason::FieldMissing));
    }

    #[test]
    fn fields_before_the_id_are_found() {
        let text = "export const x = [\n  {\n    expectedOutput: '1',\n    id: 'a',\n  },\n];\n";
        let (outcome, patched) = RecordPatcher::default().patch_text(text, &key("a"), "2");
        assert!(matches!(outcome, PatchOutcome::Applied(_)));
        assert!(patched.unwrap().contains("expectedOutput: '2',"));
    }

    #[test]
    fn multi_line_template_is_unsupported() {
        let text = "export const x = [\n  {\n    id: 'a',\n    expectedOutput: `[\n1]`,\n  },\n];\n";
        let (outcome, _) = RecordPatcher::default().patch_text(text, &key("a"), "2");
        assert_eq!(outcome, PatchOutcome::NotFound(NotFoundReason::UnsupportedValue));
    }

    #[test]
    fn concatenated_literal_is_unsupported() {
        let text = "export const x = [\n  {\n    id: 'a',\n    expectedOutput: '[1,' + '2]',\n  },\n];\n";
        let (outcome, patched) = RecordPatcher::default().patch_text(text, &key("a"), "[1,3]");
        assert_eq!(outcome, PatchOutcome::NotFound(NotFoundReason::UnsupportedValue));
        assert!(patched.is_none());

        let wrapped = "export const x = [\n  {\n    id: 'a',\n    expectedOutput: '[1,'\n      + '2]',\n  },\n];\n";
        let (outcome, _) = RecordPatcher::default().patch_text(wrapped, &key("a"), "[1,3]");
        assert_eq!(outcome, PatchOutcome::NotFound(NotFoundReason::UnsupportedValue));
    }

    #[test]
    fn crlf_line_endings_are_preserved() {
        let text = CORPUS.replace('\n', "\r\n");
        let (_, patched) = RecordPatcher::default().patch_text(&text, &key("sum"), "4");
        let patched = patched.unwrap();
        assert_eq!(patched.matches("\r\n").count(), text.matches("\r\n").count());
        assert!(patched.contains("expectedOutput: '4', // checked by hand\r\n"));
    }

    #[test]
    fn patch_file_writes_in_place() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("dates.ts"), CORPUS).unwrap();

        let patcher = RecordPatcher::default();
        let outcome = patcher.patch_file(dir.path(), &key("sum"), "[1,2]").unwrap();
        assert!(matches!(outcome, PatchOutcome::Applied(_)));

        let written = std::fs::read_to_string(dir.path().join("dates.ts")).unwrap();
        assert!(written.contains("expectedOutput: '[1,2]', // checked by hand"));

        // Second application is a no-op.
        let again = patcher.patch_file(dir.path(), &key("sum"), "[1,2]").unwrap();
        assert_eq!(again, PatchOutcome::Unchanged);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = RecordPatcher::default()
            .patch_file(dir.path(), &key("sum"), "1")
            .unwrap_err();
        assert!(matches!(err, PatchError::Read { .. }));
    }
}
