//! Lexer and parser for the literal subset of JavaScript used by corpus files.
//!
//! Corpus files are TypeScript/JavaScript modules exporting arrays of plain
//! object literals. Only literal syntax is understood here: objects with bare
//! or quoted keys, arrays, strings in all three quote styles, numbers,
//! `true`/`false`/`null`/`undefined`, comments, and trailing commas. Anything
//! computed (calls, identifiers, spreads, interpolated template strings) is a
//! [`LiteralError`], which sends the loader to its field-scan fallback.

use std::iter::Peekable;

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Failure to read a literal, with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

impl LiteralError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

pub type LiteralResult<T> = std::result::Result<T, LiteralError>;

/// Whether `ch` opens a string literal.
pub fn is_quote(ch: char) -> bool {
    matches!(ch, '\'' | '"' | '`')
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

// ── Strings ────────────────────────────────────────────────────────────────

/// Accumulates decoded string content, pairing UTF-16 surrogate escapes.
#[derive(Default)]
struct Utf16Aware {
    text: String,
    high: Option<u32>,
}

impl Utf16Aware {
    fn push(&mut self, ch: char) {
        self.flush_high();
        self.text.push(ch);
    }

    fn push_code(&mut self, code: u32, at: usize) -> LiteralResult<()> {
        match code {
            0xD800..=0xDBFF => {
                self.flush_high();
                self.high = Some(code);
            }
            0xDC00..=0xDFFF => match self.high.take() {
                Some(high) => {
                    let combined = 0x10000 + ((high - 0xD800) << 10) + (code - 0xDC00);
                    self.text
                        .push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
                None => self.text.push(char::REPLACEMENT_CHARACTER),
            },
            _ => {
                let ch = char::from_u32(code)
                    .ok_or_else(|| LiteralError::new(at, format!("invalid code point {code:#x}")))?;
                self.push(ch);
            }
        }
        Ok(())
    }

    fn flush_high(&mut self) {
        if self.high.take().is_some() {
            self.text.push(char::REPLACEMENT_CHARACTER);
        }
    }

    fn finish(mut self) -> String {
        self.flush_high();
        self.text
    }
}

/// Decode the string literal whose opening quote sits at byte `start`.
///
/// Returns the decoded content and the byte offset just past the closing
/// quote. Single- and double-quoted literals must close on the same line;
/// template literals may span lines but must not interpolate.
pub fn parse_string_literal(src: &str, start: usize) -> LiteralResult<(String, usize)> {
    let rest = src
        .get(start..)
        .ok_or_else(|| LiteralError::new(start, "offset is outside the source"))?;
    let mut chars = rest.char_indices().map(|(i, c)| (i + start, c)).peekable();
    let quote = match chars.next() {
        Some((_, c)) if is_quote(c) => c,
        _ => return Err(LiteralError::new(start, "expected a string literal")),
    };

    let mut out = Utf16Aware::default();
    while let Some((i, ch)) = chars.next() {
        match ch {
            c if c == quote => return Ok((out.finish(), i + c.len_utf8())),
            '\\' => decode_escape(&mut chars, &mut out, i)?,
            '$' if quote == '`' && chars.peek().is_some_and(|&(_, c)| c == '{') => {
                return Err(LiteralError::new(i, "template interpolation is not a literal"));
            }
            '\n' | '\r' if quote != '`' => {
                return Err(LiteralError::new(i, "unterminated string literal"));
            }
            // Template literals normalize CRLF to LF.
            '\r' if chars.peek().is_some_and(|&(_, c)| c == '\n') => {}
            c => out.push(c),
        }
    }
    Err(LiteralError::new(start, "unterminated string literal"))
}

fn decode_escape<I>(chars: &mut Peekable<I>, out: &mut Utf16Aware, at: usize) -> LiteralResult<()>
where
    I: Iterator<Item = (usize, char)>,
{
    let Some((_, ch)) = chars.next() else {
        return Err(LiteralError::new(at, "dangling escape at end of input"));
    };
    match ch {
        'n' => out.push('\n'),
        't' => out.push('\t'),
        'r' => out.push('\r'),
        'b' => out.push('\u{8}'),
        'f' => out.push('\u{c}'),
        'v' => out.push('\u{b}'),
        '0' if !chars.peek().is_some_and(|&(_, c)| c.is_ascii_digit()) => out.push('\0'),
        'x' => {
            let code = read_hex(chars, 2, at)?;
            out.push_code(code, at)?;
        }
        'u' => {
            let code = if chars.peek().is_some_and(|&(_, c)| c == '{') {
                chars.next();
                let mut code = 0u32;
                let mut digits = 0;
                loop {
                    match chars.next() {
                        Some((_, '}')) if digits > 0 => break,
                        Some((_, c)) if c.is_ascii_hexdigit() && digits < 6 => {
                            code = code * 16 + c.to_digit(16).unwrap_or(0);
                            digits += 1;
                        }
                        _ => return Err(LiteralError::new(at, "malformed \\u{...} escape")),
                    }
                }
                code
            } else {
                read_hex(chars, 4, at)?
            };
            out.push_code(code, at)?;
        }
        // Line continuations contribute nothing.
        '\r' => {
            if chars.peek().is_some_and(|&(_, c)| c == '\n') {
                chars.next();
            }
        }
        '\n' | '\u{2028}' | '\u{2029}' => {}
        other => out.push(other),
    }
    Ok(())
}

fn read_hex<I>(chars: &mut Peekable<I>, count: usize, at: usize) -> LiteralResult<u32>
where
    I: Iterator<Item = (usize, char)>,
{
    let mut code = 0u32;
    for _ in 0..count {
        match chars.next() {
            Some((_, c)) if c.is_ascii_hexdigit() => code = code * 16 + c.to_digit(16).unwrap_or(0),
            _ => return Err(LiteralError::new(at, "malformed hex escape")),
        }
    }
    Ok(code)
}

/// Encode `content` as a string literal delimited by `quote`.
///
/// Decoding the result with [`parse_string_literal`] yields `content` again.
pub fn encode_string_literal(content: &str, quote: char) -> String {
    let mut out = String::with_capacity(content.len() + 2);
    out.push(quote);
    let mut chars = content.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if quote == '`' && chars.peek() == Some(&'{') => out.push_str("\\$"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// ── Values ─────────────────────────────────────────────────────────────────

/// Recursive-descent parser over a source string, starting at a byte offset.
pub struct LiteralParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> LiteralParser<'a> {
    pub fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    /// Byte offset just past the last consumed token.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos..).and_then(|rest| rest.chars().next())
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError::new(self.pos, message)
    }

    /// Skip whitespace and comments.
    pub fn skip_trivia(&mut self) -> LiteralResult<()> {
        loop {
            let rest = &self.src[self.pos..];
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();
            if trimmed.starts_with("//") {
                match trimmed.find('\n') {
                    Some(n) => self.pos += n + 1,
                    None => self.pos = self.src.len(),
                }
            } else if let Some(body) = trimmed.strip_prefix("/*") {
                match body.find("*/") {
                    Some(n) => self.pos += n + 4,
                    None => return Err(self.error("unterminated block comment")),
                }
            } else {
                return Ok(());
            }
        }
    }

    /// Parse one literal value.
    pub fn parse_value(&mut self) -> LiteralResult<Value> {
        self.skip_trivia()?;
        match self.peek() {
            Some('[') => self.parse_array(),
            Some('{') => self.parse_object(),
            Some(c) if is_quote(c) => {
                let (text, end) = parse_string_literal(self.src, self.pos)?;
                self.pos = end;
                Ok(Value::String(text))
            }
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => {
                if self.src[self.pos..].starts_with("...") {
                    return Err(self.error("spread elements are not literals"));
                }
                self.parse_number()
            }
            Some(c) if is_ident_start(c) => self.parse_keyword(),
            Some(c) => Err(self.error(format!("unexpected character `{c}`"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_array(&mut self) -> LiteralResult<Value> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            if self.eat(']') {
                return Ok(Value::Array(items));
            }
            items.push(self.parse_value()?);
            self.skip_trivia()?;
            if self.eat(',') {
                continue;
            }
            if self.eat(']') {
                return Ok(Value::Array(items));
            }
            return Err(self.error("expected `,` or `]` in array"));
        }
    }

    fn parse_object(&mut self) -> LiteralResult<Value> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_trivia()?;
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            let key = self.parse_key()?;
            self.skip_trivia()?;
            if !self.eat(':') {
                return Err(self.error(format!("expected `:` after property `{key}`")));
            }
            let value = self.parse_value()?;
            map.insert(key, value);
            self.skip_trivia()?;
            if self.eat(',') {
                continue;
            }
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            return Err(self.error("expected `,` or `}` in object"));
        }
    }

    fn parse_key(&mut self) -> LiteralResult<String> {
        match self.peek() {
            Some('\'') | Some('"') => {
                let (text, end) = parse_string_literal(self.src, self.pos)?;
                self.pos = end;
                Ok(text)
            }
            Some(c) if is_ident_start(c) => Ok(self.take_ident().to_string()),
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '.') {
                    self.bump();
                }
                Ok(self.src[start..self.pos].to_string())
            }
            Some('[') => Err(self.error("computed property names are not literals")),
            Some('.') => Err(self.error("spread properties are not literals")),
            Some(c) => Err(self.error(format!("unexpected character `{c}` in property name"))),
            None => Err(self.error("unexpected end of input in object")),
        }
    }

    fn take_ident(&mut self) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn parse_keyword(&mut self) -> LiteralResult<Value> {
        let start = self.pos;
        match self.take_ident() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "null" | "undefined" => Ok(Value::Null),
            other => Err(LiteralError::new(
                start,
                format!("`{other}` is not a literal value"),
            )),
        }
    }

    fn take_digits(&mut self, radix: u32) {
        while self.peek().is_some_and(|c| c.is_digit(radix) || c == '_') {
            self.bump();
        }
    }

    fn parse_number(&mut self) -> LiteralResult<Value> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.bump();
                true
            }
            Some('+') => {
                self.bump();
                false
            }
            _ => false,
        };
        let body_start = self.pos;
        let rest = &self.src[self.pos..];

        let value = if rest.starts_with("0x") || rest.starts_with("0X") {
            self.pos += 2;
            let digits_start = self.pos;
            self.take_digits(16);
            let digits = self.src[digits_start..self.pos].replace('_', "");
            let magnitude = i64::from_str_radix(&digits, 16)
                .map_err(|_| LiteralError::new(start, "malformed hex number"))?;
            Value::Number(Number::from(if negative { -magnitude } else { magnitude }))
        } else {
            self.take_digits(10);
            let mut integral = true;
            if self.eat('.') {
                integral = false;
                self.take_digits(10);
            }
            if matches!(self.peek(), Some('e') | Some('E')) {
                integral = false;
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    self.bump();
                }
                self.take_digits(10);
            }
            let body = self.src[body_start..self.pos].replace('_', "");
            if body.is_empty() || body == "." {
                return Err(LiteralError::new(start, "malformed number"));
            }
            let text = if negative { format!("-{body}") } else { body };
            let parsed_int = if integral {
                text.parse::<i64>().ok().map(Number::from)
            } else {
                None
            };
            match parsed_int {
                Some(n) => Value::Number(n),
                None => {
                    let float = text
                        .parse::<f64>()
                        .map_err(|_| LiteralError::new(start, format!("malformed number `{text}`")))?;
                    Value::Number(
                        Number::from_f64(float)
                            .ok_or_else(|| LiteralError::new(start, "non-finite number"))?,
                    )
                }
            }
        };

        if self.peek().is_some_and(is_ident_continue) {
            return Err(self.error("unexpected suffix after number"));
        }
        Ok(value)
    }
}

/// Parse the array literal whose `[` sits at byte `open`.
///
/// Returns the elements and the offset just past the closing `]`.
pub fn parse_array_at(src: &str, open: usize) -> LiteralResult<(Vec<Value>, usize)> {
    let mut parser = LiteralParser::new(src, open);
    match parser.parse_value()? {
        Value::Array(items) => Ok((items, parser.position())),
        _ => Err(LiteralError::new(open, "expected an array literal")),
    }
}
