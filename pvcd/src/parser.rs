// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Recursive descent parser over the token stream. Collects the declaration tree,
// the header info and the value changes per id code.

use crate::diagnostics::Diagnostic;
use crate::hierarchy::{DeclarationBuilder, Info, ScopeDecl, VarDecl};
use crate::lexer::{kind_to_value, match_value, Keyword, Lexer, Token, TokenKind};
use crate::values::{Time, Value};
use crate::ProgressCount;
use rustc_hash::FxHashMap;
use std::sync::atomic::Ordering;

/// Value changes of a single id code, in source order.
pub type Events = Vec<(Time, Value)>;

/// Parse result before the declarations and value changes are reconciled.
#[derive(Debug, Default)]
pub struct RawDocument {
    pub info: Info,
    /// committed top level scopes
    pub scopes: Vec<ScopeDecl>,
    pub data: FxHashMap<String, Events>,
    /// id codes that were used without being declared, in order of first use
    pub implicit: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// false if a syntax error aborted the parse
    pub complete: bool,
}

#[derive(Debug, thiserror::Error)]
enum SyntaxErrorKind {
    #[error("unexpected end of input in {0}")]
    UnexpectedEof(&'static str),
    #[error("unexpected `{0}` in {1}")]
    UnexpectedToken(String, &'static str),
    #[error("failed to parse variable size `{0}`")]
    InvalidSize(String),
    #[error("expected `$end` after variable `{0}`, found `{1}`")]
    TooManyWords(String, String),
    #[error("missing id code after value `{0}`")]
    MissingIdCode(String),
    #[error("`$enddefinitions` without any declarations")]
    EmptyHeader,
}

#[derive(Debug)]
struct SyntaxError {
    line: Option<usize>,
    kind: SyntaxErrorKind,
}

type ParseResult<T> = std::result::Result<T, SyntaxError>;

struct ProgressReporter {
    progress: Option<ProgressCount>,
    last_reported_pos: usize,
    report_increments: usize,
}

impl ProgressReporter {
    fn new(progress: Option<ProgressCount>, len: usize) -> Self {
        Self {
            progress,
            last_reported_pos: 0,
            report_increments: std::cmp::max(len / 1000, 512),
        }
    }

    #[inline]
    fn report(&mut self, pos: usize, always_report: bool) {
        if let Some(p) = self.progress.as_ref() {
            let increment = pos - self.last_reported_pos;
            if always_report || increment > self.report_increments {
                p.fetch_add(increment as u64, Ordering::SeqCst);
                self.last_reported_pos = pos;
            }
        }
    }
}

pub struct Parser<'a> {
    input: &'a str,
    lexer: Lexer<'a>,
    peeked: Option<Token<'a>>,
    progress: ProgressReporter,
    current_time: Time,
    decls: DeclarationBuilder,
    data: FxHashMap<String, Events>,
    implicit: Vec<String>,
    info: Info,
    diagnostics: Vec<Diagnostic>,
    /// `$dumpvars`, `$dumpall`, `$dumpon` and `$dumpoff` sections that wait for their `$end`
    open_sections: Vec<Keyword>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str, progress: Option<ProgressCount>) -> Self {
        Self {
            input,
            lexer: Lexer::new(input),
            peeked: None,
            progress: ProgressReporter::new(progress, input.len()),
            current_time: 0,
            decls: DeclarationBuilder::new(),
            data: FxHashMap::default(),
            implicit: Vec::new(),
            info: Info::default(),
            diagnostics: Vec::new(),
            open_sections: Vec::new(),
        }
    }

    /// Parses the complete input. Never fails: syntax errors end the parse early and are
    /// reported together with everything that was parsed up to that point.
    pub fn parse(mut self) -> RawDocument {
        let result = self.parse_header().and_then(|_| self.parse_content());
        let complete = match result {
            Ok(()) => true,
            Err(SyntaxError { line, kind }) => {
                self.diagnostics
                    .push(Diagnostic::syntax(line, kind.to_string()));
                false
            }
        };
        self.diagnostics.append(&mut self.lexer.take_diagnostics());
        self.progress.report(self.lexer.position(), true);
        log::debug!(
            "parsed {} bytes, {} id codes with value changes",
            self.lexer.position(),
            self.data.len()
        );
        RawDocument {
            info: self.info,
            scopes: self.decls.finish(),
            data: self.data,
            implicit: self.implicit,
            diagnostics: self.diagnostics,
            complete,
        }
    }

    //////////////// token stream

    fn next_token(&mut self) -> Option<Token<'a>> {
        let token = loop {
            match self.lexer.next() {
                Some(t) if t.kind == TokenKind::Space => continue,
                other => break other,
            }
        };
        self.diagnostics.append(&mut self.lexer.take_diagnostics());
        self.progress.report(self.lexer.position(), false);
        token
    }

    fn peek(&mut self) -> Option<&Token<'a>> {
        if self.peeked.is_none() {
            self.peeked = self.next_token();
        }
        self.peeked.as_ref()
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        match self.peeked.take() {
            Some(token) => Some(token),
            None => self.next_token(),
        }
    }

    fn expect_token(&mut self, context: &'static str) -> ParseResult<Token<'a>> {
        match self.bump() {
            Some(token) => Ok(token),
            None => Err(self.eof(context)),
        }
    }

    fn eof(&self, context: &'static str) -> SyntaxError {
        SyntaxError {
            line: Some(self.lexer.line()),
            kind: SyntaxErrorKind::UnexpectedEof(context),
        }
    }

    fn unexpected(token: &Token, context: &'static str) -> SyntaxError {
        SyntaxError {
            line: Some(token.line),
            kind: SyntaxErrorKind::UnexpectedToken(token.text.to_string(), context),
        }
    }

    /// Extends the source slice `start..end` with all tokens that directly follow it.
    fn glue(&mut self, start: usize, mut end: usize) -> &'a str {
        while let Some(next) = self.peek() {
            if next.offset != end || matches!(next.kind, TokenKind::Keyword(_)) {
                break;
            }
            end = next.end();
            self.bump();
        }
        let input = self.input;
        &input[start..end]
    }

    /// A word position accepts any non keyword token. Tokens without whitespace in between
    /// form a single word, so that e.g. `10ns` or the id `1!` survive value classification.
    fn word(&mut self, context: &'static str) -> ParseResult<(&'a str, Token<'a>)> {
        let token = self.expect_token(context)?;
        if matches!(token.kind, TokenKind::Keyword(_)) {
            return Err(Self::unexpected(&token, context));
        }
        let word = self.glue(token.offset, token.end());
        Ok((word, token))
    }

    /// Skips over free text until the closing `$end` and returns the trimmed text.
    fn text(&mut self, keyword: &Token<'a>, context: &'static str) -> ParseResult<&'a str> {
        loop {
            let token = self.expect_token(context)?;
            match token.kind {
                TokenKind::Keyword(Keyword::End) => {
                    let input = self.input;
                    return Ok(input[keyword.end()..token.offset].trim());
                }
                TokenKind::Keyword(_) => return Err(Self::unexpected(&token, context)),
                _ => {}
            }
        }
    }

    //////////////// header

    fn parse_header(&mut self) -> ParseResult<()> {
        let mut blocks = 0usize;
        loop {
            let token = self.expect_token("header")?;
            let TokenKind::Keyword(keyword) = token.kind else {
                return Err(Self::unexpected(&token, "header"));
            };
            match keyword {
                Keyword::Version => {
                    self.info.version = Some(self.text(&token, "$version")?.to_string());
                }
                Keyword::Date => {
                    self.info.date = Some(self.text(&token, "$date")?.to_string());
                }
                Keyword::Timescale => {
                    self.info.timescale = Some(self.text(&token, "$timescale")?.to_string());
                }
                Keyword::Comment => {
                    let comment = self.text(&token, "$comment")?.to_string();
                    self.info.comment.push(comment);
                }
                Keyword::Scope => self.parse_scopes(&token)?,
                Keyword::EndDefinitions => {
                    if blocks == 0 {
                        return Err(SyntaxError {
                            line: Some(token.line),
                            kind: SyntaxErrorKind::EmptyHeader,
                        });
                    }
                    self.text(&token, "$enddefinitions")?;
                    log::debug!("header done after {} bytes", token.end());
                    return Ok(());
                }
                _ => return Err(Self::unexpected(&token, "header")),
            }
            blocks += 1;
        }
    }

    /// Parses a top level scope including all nested scopes until the nesting depth
    /// returns to zero.
    fn parse_scopes(&mut self, first: &Token<'a>) -> ParseResult<()> {
        debug_assert_eq!(self.decls.depth(), 0);
        self.scope_decl(first)?;
        while self.decls.depth() > 0 {
            let token = self.expect_token("scope")?;
            match token.kind {
                TokenKind::Keyword(Keyword::Var) => self.var_decl(&token)?,
                TokenKind::Keyword(Keyword::Scope) => self.scope_decl(&token)?,
                TokenKind::Keyword(Keyword::UpScope) => {
                    self.text(&token, "$upscope")?;
                    self.decls.close_scope();
                }
                TokenKind::Keyword(Keyword::Comment) => {
                    let comment = self.text(&token, "$comment")?.to_string();
                    self.info.comment.push(comment);
                }
                _ => return Err(Self::unexpected(&token, "scope")),
            }
        }
        Ok(())
    }

    fn scope_decl(&mut self, keyword: &Token<'a>) -> ParseResult<()> {
        debug_assert!(keyword.is_keyword(Keyword::Scope));
        let (scope_type, _) = self.word("$scope")?;
        let (name, _) = self.word("$scope")?;
        self.expect_end("$scope")?;
        self.decls.open_scope(name, scope_type);
        Ok(())
    }

    fn expect_end(&mut self, context: &'static str) -> ParseResult<()> {
        let token = self.expect_token(context)?;
        if token.is_keyword(Keyword::End) {
            Ok(())
        } else {
            Err(Self::unexpected(&token, context))
        }
    }

    fn var_decl(&mut self, keyword: &Token<'a>) -> ParseResult<()> {
        debug_assert!(keyword.is_keyword(Keyword::Var));
        let (var_type, _) = self.word("$var")?;
        let (size_str, size_token) = self.word("$var")?;
        let size = match size_str.parse::<u32>() {
            Ok(0) => {
                self.diagnostics.push(Diagnostic::semantic(
                    size_token.line,
                    "variable with size 0, assuming a size of 1",
                ));
                1
            }
            Ok(size) => size,
            Err(_) => {
                return Err(SyntaxError {
                    line: Some(size_token.line),
                    kind: SyntaxErrorKind::InvalidSize(size_str.to_string()),
                })
            }
        };
        let (id_code, _) = self.word("$var")?;
        let (reference, _) = self.word("$var")?;

        let token = self.expect_token("$var")?;
        let bit_index = match token.kind {
            TokenKind::Keyword(Keyword::End) => None,
            TokenKind::Keyword(_) => return Err(Self::unexpected(&token, "$var")),
            _ => {
                let bit_index = self.glue(token.offset, token.end());
                let end = self.expect_token("$var")?;
                if !end.is_keyword(Keyword::End) {
                    return Err(SyntaxError {
                        line: Some(end.line),
                        kind: SyntaxErrorKind::TooManyWords(
                            reference.to_string(),
                            end.text.to_string(),
                        ),
                    });
                }
                Some(bit_index.to_string())
            }
        };

        let decl = VarDecl {
            id_code: id_code.to_string(),
            size,
            var_type: var_type.to_string(),
            reference: reference.to_string(),
            bit_index,
        };
        // `$var` is only parsed inside of a scope
        if self.decls.add_var(decl).is_err() {
            return Err(Self::unexpected(keyword, "header"));
        }
        Ok(())
    }

    //////////////// value changes

    fn parse_content(&mut self) -> ParseResult<()> {
        let input = self.input;
        while let Some(token) = self.bump() {
            match token.kind {
                TokenKind::Time(time) => self.set_time(time, token.line),
                TokenKind::Logic(_)
                | TokenKind::BinaryNum(_)
                | TokenKind::Binary(_)
                | TokenKind::Real(_)
                | TokenKind::Str(_) => {
                    let value = token.value().ok_or_else(|| Self::unexpected(&token, "data"))?;
                    let id_code = self.id_code(&token, token.end())?;
                    self.record(id_code, value, token.line);
                }
                TokenKind::Word => match match_value(&input[token.offset..]) {
                    Some((TokenKind::Time(time), _)) => self.set_time(time, token.line),
                    Some((kind, len)) => {
                        let value =
                            kind_to_value(&kind).ok_or_else(|| Self::unexpected(&token, "data"))?;
                        let id_code = self.id_code(&token, token.offset + len)?;
                        self.record(id_code, value, token.line);
                    }
                    None => return Err(Self::unexpected(&token, "data")),
                },
                TokenKind::Keyword(Keyword::Comment) => {
                    let comment = self.text(&token, "$comment")?.to_string();
                    self.info.comment.push(comment);
                }
                TokenKind::Keyword(
                    keyword @ (Keyword::DumpVars
                    | Keyword::DumpAll
                    | Keyword::DumpOn
                    | Keyword::DumpOff),
                ) => self.open_sections.push(keyword),
                TokenKind::Keyword(Keyword::End) => {
                    if self.open_sections.pop().is_none() {
                        return Err(Self::unexpected(&token, "data"));
                    }
                }
                TokenKind::Keyword(_) | TokenKind::Space => {
                    return Err(Self::unexpected(&token, "data"))
                }
            }
        }
        if self.open_sections.contains(&Keyword::DumpVars) {
            return Err(self.eof("$dumpvars"));
        }
        Ok(())
    }

    /// The id code starts right after the value, either still inside `value_token`
    /// (e.g. `1!`) or with the next token on the same line (e.g. `b1010 !`).
    fn id_code(&mut self, value_token: &Token<'a>, value_end: usize) -> ParseResult<&'a str> {
        let missing = || SyntaxError {
            line: Some(value_token.line),
            kind: SyntaxErrorKind::MissingIdCode(value_token.text.to_string()),
        };
        if value_end < value_token.end() {
            return Ok(self.glue(value_end, value_token.end()));
        }
        let line = value_token.line;
        match self.peek() {
            Some(next) if next.line == line && !matches!(next.kind, TokenKind::Keyword(_)) => {
                let (start, end) = (next.offset, next.end());
                self.bump();
                Ok(self.glue(start, end))
            }
            _ => Err(missing()),
        }
    }

    fn set_time(&mut self, time: Time, line: usize) {
        if time < self.current_time {
            self.diagnostics.push(Diagnostic::semantic(
                line,
                format!(
                    "time decreased from {} to {}, ignoring",
                    self.current_time, time
                ),
            ));
        } else {
            self.current_time = time;
        }
    }

    fn record(&mut self, id_code: &str, value: Value, line: usize) {
        let time = self.current_time;
        if let Some(events) = self.data.get_mut(id_code) {
            events.push((time, value));
            return;
        }
        if !self.decls.is_declared(id_code) {
            self.diagnostics.push(Diagnostic::semantic(
                line,
                format!("value change for undeclared id code `{id_code}`"),
            ));
            self.implicit.push(id_code.to_string());
        }
        self.data.insert(id_code.to_string(), vec![(time, value)]);
    }
}

/// Parses `input` into its raw form.
pub fn parse(input: &str, progress: Option<ProgressCount>) -> RawDocument {
    Parser::new(input, progress).parse()
}
