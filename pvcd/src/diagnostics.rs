// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Recoverable findings that are attached to a parse result instead of aborting it.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagnosticKind {
    /// Unrecognized character, the lexer skipped it.
    Lexical,
    /// Token sequence that violates the grammar. Aborts the remainder of the parse.
    Syntax,
    /// Well formed, but inconsistent input, e.g., a value change for an undeclared id.
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// 1-based source line, if known
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn lexical(line: usize, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Lexical, Severity::Warning, Some(line), message)
    }

    pub fn syntax(line: Option<usize>, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Syntax, Severity::Error, line, message)
    }

    pub fn semantic(line: usize, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Semantic, Severity::Warning, Some(line), message)
    }

    fn new(
        kind: DiagnosticKind,
        severity: Severity,
        line: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        let diagnostic = Self {
            kind,
            severity,
            line,
            message: message.into(),
        };
        diagnostic.log();
        diagnostic
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn log(&self) {
        match self.severity {
            Severity::Warning => log::warn!("{self}"),
            Severity::Error => log::error!("{self}"),
        }
    }
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::Lexical => write!(f, "lexical"),
            DiagnosticKind::Syntax => write!(f, "syntax"),
            DiagnosticKind::Semantic => write!(f, "semantic"),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.line {
            Some(line) => write!(
                f,
                "[vcd] {line:>3}: {} {severity}: {}",
                self.kind, self.message
            ),
            None => write!(f, "[vcd] {} {severity}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let d = Diagnostic::syntax(Some(12), "unexpected `$end`");
        assert!(d.is_error());
        assert_eq!(d.to_string(), "[vcd]  12: syntax error: unexpected `$end`");
        let d = Diagnostic::lexical(3, "illegal character '\\u{7}'");
        assert!(!d.is_error());
        assert_eq!(d.kind, DiagnosticKind::Lexical);
        assert!(d.to_string().starts_with("[vcd]   3: lexical warning"));
        let d = Diagnostic::syntax(None, "unexpected end of input");
        assert_eq!(d.to_string(), "[vcd] syntax error: unexpected end of input");
    }
}
