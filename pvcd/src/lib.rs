// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

mod diagnostics;
mod hierarchy;
pub mod input;
pub mod lexer;
pub mod parser;
pub mod simple;
mod tree;
mod values;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Cargo.toml version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of input bytes processed so far. Shared with a progress bar thread.
pub type ProgressCount = Arc<AtomicU64>;

#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub struct ParseOptions {
    /// Text encoding of the input file.
    pub encoding: input::Encoding,
    /// Indicates that a single top level `SystemC` scope should be replaced by its children.
    pub strip_systemc_root: bool,
    /// Replaces every non-ASCII character with an `&#xHHHH;` escape before lexing.
    pub normalize_non_ascii: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            encoding: input::Encoding::Auto,
            strip_systemc_root: false,
            normalize_non_ascii: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PvcdError {
    #[error("[vcd] failed to decode input as {0}: {1}")]
    Encoding(input::Encoding, String),
    #[error("[vcd] io error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PvcdError>;

pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
pub use hierarchy::{
    DeclItem, Info, ScopeDecl, Timescale, TimescaleUnit, VarDecl, VarIndex,
};
pub use input::Encoding;
pub use lexer::{Keyword, Token, TokenKind};
pub use tree::{Document, Node, Scope, Signal, SignalSeries};
pub use values::{LogicValue, Time, Value};
