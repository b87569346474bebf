// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Turns decoded VCD text into a flat stream of classified tokens.

use crate::diagnostics::Diagnostic;
use crate::values::{binary_to_u64, LogicValue, Value};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    End,
    Version,
    Date,
    Comment,
    Timescale,
    Scope,
    Var,
    UpScope,
    EndDefinitions,
    DumpAll,
    DumpOff,
    DumpOn,
    DumpVars,
}

const VCD_KEYWORDS: [(&str, Keyword); 13] = [
    ("$end", Keyword::End),
    ("$version", Keyword::Version),
    ("$date", Keyword::Date),
    ("$comment", Keyword::Comment),
    ("$timescale", Keyword::Timescale),
    ("$scope", Keyword::Scope),
    ("$var", Keyword::Var),
    ("$upscope", Keyword::UpScope),
    ("$enddefinitions", Keyword::EndDefinitions),
    ("$dumpall", Keyword::DumpAll),
    ("$dumpoff", Keyword::DumpOff),
    ("$dumpon", Keyword::DumpOn),
    ("$dumpvars", Keyword::DumpVars),
];

impl Keyword {
    /// Only exact (case sensitive) matches of the reserved words are keywords.
    pub fn from_word(word: &str) -> Option<Self> {
        if !word.starts_with('$') {
            return None;
        }
        VCD_KEYWORDS
            .iter()
            .find(|(name, _)| *name == word)
            .map(|(_, keyword)| *keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::End => "$end",
            Keyword::Version => "$version",
            Keyword::Date => "$date",
            Keyword::Comment => "$comment",
            Keyword::Timescale => "$timescale",
            Keyword::Scope => "$scope",
            Keyword::Var => "$var",
            Keyword::UpScope => "$upscope",
            Keyword::EndDefinitions => "$enddefinitions",
            Keyword::DumpAll => "$dumpall",
            Keyword::DumpOff => "$dumpoff",
            Keyword::DumpOn => "$dumpon",
            Keyword::DumpVars => "$dumpvars",
        }
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    Keyword(Keyword),
    /// scalar value, e.g., the `1` in `1!`
    Logic(LogicValue),
    /// binary vector consisting only of `0` and `1`, already converted
    BinaryNum(u64),
    /// binary vector with `x` or `z` bits (or too wide for 64 bits), without the `b` prefix
    Binary(&'a str),
    Real(f64),
    /// string value without the `s` prefix
    Str(&'a str),
    Time(u64),
    Word,
    Space,
}

impl TokenKind<'_> {
    fn name(&self) -> &'static str {
        match self {
            TokenKind::Keyword(_) => "KEYWORD",
            TokenKind::Logic(_) => "DATA_LOGIC",
            TokenKind::BinaryNum(_) => "DATA_BINARY_NUM",
            TokenKind::Binary(_) => "DATA_BINARY",
            TokenKind::Real(_) => "DATA_REAL",
            TokenKind::Str(_) => "DATA_STRING",
            TokenKind::Time(_) => "TIME",
            TokenKind::Word => "WORD",
            TokenKind::Space => "SPACE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    /// Source text of the token. Whitespace that value tokens swallow is not included.
    pub text: &'a str,
    /// Byte offset of `text` in the input.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
}

impl<'a> Token<'a> {
    /// Byte offset right after `text`.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    #[inline]
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }

    /// The value carried by a value change token.
    pub fn value(&self) -> Option<Value> {
        kind_to_value(&self.kind)
    }
}

pub(crate) fn kind_to_value(kind: &TokenKind) -> Option<Value> {
    match kind {
        TokenKind::Logic(value) => Some(Value::Logic(*value)),
        TokenKind::BinaryNum(value) => Some(Value::Vector(*value)),
        TokenKind::Binary(bits) => Some(Value::Binary(bits.to_ascii_lowercase())),
        TokenKind::Real(value) => Some(Value::Real(*value)),
        TokenKind::Str(value) => Some(Value::String(value.to_string())),
        _ => None,
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = match &self.kind {
            TokenKind::Keyword(keyword) => keyword.to_string(),
            TokenKind::BinaryNum(value) => value.to_string(),
            TokenKind::Real(value) => value.to_string(),
            TokenKind::Time(value) => value.to_string(),
            _ => self.text.to_string(),
        };
        write!(
            f,
            "LexToken({},{:?},{},{})",
            self.kind.name(),
            value,
            self.line,
            self.offset
        )
    }
}

/// Whitespace other than the newline, which the lexer treats separately to count lines.
#[inline]
fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | 0x0b | 0x0c)
}

#[inline]
fn is_word_char(b: u8) -> bool {
    b.is_ascii_graphic()
}

/// A value token must be followed by whitespace or the end of the input.
#[inline]
fn ends_token(bytes: &[u8], pos: usize) -> bool {
    pos >= bytes.len() || bytes[pos].is_ascii_whitespace()
}

#[inline]
fn count_while(bytes: &[u8], cond: impl Fn(u8) -> bool) -> usize {
    bytes.iter().take_while(|b| cond(**b)).count()
}

/// Length of a `[-+]?(\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?` literal at the start of `bytes`.
fn real_literal_len(bytes: &[u8]) -> Option<usize> {
    let mut pos = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        pos += 1;
    }
    let int_digits = count_while(&bytes[pos..], |b| b.is_ascii_digit());
    pos += int_digits;
    if bytes.get(pos) == Some(&b'.') {
        let frac_digits = count_while(&bytes[pos + 1..], |b| b.is_ascii_digit());
        if int_digits == 0 && frac_digits == 0 {
            return None;
        }
        pos += 1 + frac_digits;
    } else if int_digits == 0 {
        return None;
    }
    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        let mut exp_start = pos + 1;
        if matches!(bytes.get(exp_start), Some(b'-' | b'+')) {
            exp_start += 1;
        }
        let exp_digits = count_while(&bytes[exp_start..], |b| b.is_ascii_digit());
        if exp_digits > 0 {
            pos = exp_start + exp_digits;
        }
    }
    Some(pos)
}

/// Tries the value and time rules at the start of `text`.
/// Returns the token kind and the length of the matched text (without trailing whitespace).
pub(crate) fn match_value(text: &str) -> Option<(TokenKind<'_>, usize)> {
    let bytes = text.as_bytes();
    match *bytes.first()? {
        first @ (b'0' | b'1' | b'x' | b'X' | b'z' | b'Z') => {
            let value = LogicValue::from_byte(first)?;
            Some((TokenKind::Logic(value), 1))
        }
        b'b' | b'B' => {
            let len = count_while(&bytes[1..], |b| LogicValue::from_byte(b).is_some());
            if len == 0 || !ends_token(bytes, 1 + len) {
                return None;
            }
            let bits = &text[1..1 + len];
            let kind = match binary_to_u64(bits.as_bytes()) {
                Some(value) => TokenKind::BinaryNum(value),
                None => TokenKind::Binary(bits),
            };
            Some((kind, 1 + len))
        }
        b'r' | b'R' => {
            let len = real_literal_len(&bytes[1..])?;
            if !ends_token(bytes, 1 + len) {
                return None;
            }
            let value = text[1..1 + len].parse::<f64>().ok()?;
            Some((TokenKind::Real(value), 1 + len))
        }
        b's' | b'S' => {
            let len = count_while(&bytes[1..], is_word_char);
            if len == 0 || !ends_token(bytes, 1 + len) {
                return None;
            }
            Some((TokenKind::Str(&text[1..1 + len]), 1 + len))
        }
        b'#' => {
            let len = count_while(&bytes[1..], |b| b.is_ascii_digit());
            if len == 0 || !ends_token(bytes, 1 + len) {
                return None;
            }
            let value = text[1..1 + len].parse::<u64>().ok()?;
            Some((TokenKind::Time(value), 1 + len))
        }
        _ => None,
    }
}

/// Produces tokens from a decoded and normalized text buffer.
///
/// Value changes and time markers are only recognized at the first non-blank position of
/// a line, everywhere else the same characters form a word.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    at_line_start: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            at_line_start: true,
            diagnostics: Vec::new(),
        }
    }

    /// Current byte offset into the input.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Current line (1-based).
    #[inline]
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns all lexical diagnostics recorded since the last call.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    #[inline]
    fn bytes(&self) -> &'a [u8] {
        self.input.as_bytes()
    }

    fn value_token(&mut self) -> Option<Token<'a>> {
        let input = self.input;
        let start = self.pos;
        let (kind, len) = match_value(&input[start..])?;
        self.pos += len;
        // swallow trailing whitespace, but leave newlines for the line counter
        self.pos += count_while(&self.bytes()[self.pos..], is_blank);
        Some(Token {
            kind,
            text: &input[start..start + len],
            offset: start,
            line: self.line,
        })
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let input = self.input;
        let bytes = self.bytes();
        loop {
            let b = *bytes.get(self.pos)?;

            if b == b'\n' {
                let newlines = count_while(&bytes[self.pos..], |b| b == b'\n');
                self.pos += newlines;
                self.line += newlines;
                self.at_line_start = true;
                continue;
            }

            if self.at_line_start && !is_blank(b) {
                self.at_line_start = false;
                if let Some(token) = self.value_token() {
                    return Some(token);
                }
            }

            let start = self.pos;
            if is_blank(b) {
                self.pos += count_while(&bytes[start..], is_blank);
                return Some(Token {
                    kind: TokenKind::Space,
                    text: &input[start..self.pos],
                    offset: start,
                    line: self.line,
                });
            }

            if is_word_char(b) {
                self.pos += count_while(&bytes[start..], is_word_char);
                let text = &input[start..self.pos];
                let kind = match Keyword::from_word(text) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Word,
                };
                return Some(Token {
                    kind,
                    text,
                    offset: start,
                    line: self.line,
                });
            }

            // nothing matched: report and skip a single character
            let illegal = input[start..].chars().next()?;
            self.diagnostics.push(Diagnostic::lexical(
                self.line,
                format!("illegal character {illegal:?}"),
            ));
            self.pos += illegal.len_utf8();
        }
    }
}
