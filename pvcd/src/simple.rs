// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Entry points that go from a file or a string all the way to the reconciled document.

use crate::diagnostics::Diagnostic;
use crate::lexer::{Lexer, Token};
use crate::{input, parser, tree, Document, ParseOptions, ProgressCount, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Parse VCD text with the default options.
pub fn parse_str(text: &str) -> Document {
    parse_str_with_options(text, &ParseOptions::default())
}

/// Parse VCD text. The encoding option is ignored since the text is already decoded.
pub fn parse_str_with_options(text: &str, options: &ParseOptions) -> Document {
    let text = if options.normalize_non_ascii {
        input::normalize(text)
    } else {
        text.into()
    };
    let raw = parser::parse(&text, None);
    tree::reconcile(raw, options)
}

/// Decode and parse raw file contents.
pub fn parse_bytes(bytes: &[u8], options: &ParseOptions) -> Result<Document> {
    parse_bytes_with_progress(bytes, options, None)
}

fn parse_bytes_with_progress(
    bytes: &[u8],
    options: &ParseOptions,
    progress: Option<ProgressCount>,
) -> Result<Document> {
    let text = input::prepare(bytes, options.encoding, options.normalize_non_ascii)?;
    let raw = parser::parse(&text, progress);
    Ok(tree::reconcile(raw, options))
}

/// Read a VCD file with the default options.
pub fn read<P: AsRef<Path>>(filename: P) -> Result<Document> {
    read_with_options(filename, &ParseOptions::default())
}

/// Read a VCD file.
pub fn read_with_options<P: AsRef<Path>>(filename: P, options: &ParseOptions) -> Result<Document> {
    read_with_progress(filename, options, None)
}

/// Read a VCD file while adding the number of processed bytes to `progress`.
/// The progress refers to the decoded text, which is usually the same size as the file.
pub fn read_with_progress<P: AsRef<Path>>(
    filename: P,
    options: &ParseOptions,
    progress: Option<ProgressCount>,
) -> Result<Document> {
    let mmap = input::map_file(filename.as_ref())?;
    let doc = parse_bytes_with_progress(&mmap[..], options, progress)?;
    log::info!(
        "{}: {} signals, {} diagnostics",
        filename.as_ref().display(),
        doc.signals().len(),
        doc.diagnostics.len()
    );
    Ok(doc)
}

/// Read several files in parallel. Results are in the same order as `filenames`.
pub fn read_many<P: AsRef<Path> + Sync>(
    filenames: &[P],
    options: &ParseOptions,
) -> Vec<(PathBuf, Result<Document>)> {
    filenames
        .par_iter()
        .map(|f| {
            let f = f.as_ref();
            (f.to_path_buf(), read_with_options(f, options))
        })
        .collect()
}

/// Runs only the lexer.
pub fn lex_str(text: &str) -> (Vec<Token<'_>>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(text);
    let tokens: Vec<_> = lexer.by_ref().collect();
    (tokens, lexer.take_diagnostics())
}
