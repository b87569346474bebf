// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>
//
// Turns raw file contents into the ASCII text that the lexer expects.

use crate::{PvcdError, Result};
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum Encoding {
    /// UTF-8 if the input is valid UTF-8, Latin-1 otherwise.
    #[default]
    Auto,
    Utf8,
    Latin1,
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Encoding::Auto),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(Encoding::Latin1),
            other => Err(format!("unknown encoding `{other}`, try auto, utf8 or latin1")),
        }
    }
}

impl Display for Encoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::Auto => write!(f, "auto"),
            Encoding::Utf8 => write!(f, "utf8"),
            Encoding::Latin1 => write!(f, "latin1"),
        }
    }
}

const UTF8_BOM: &[u8] = &[0xef, 0xbb, 0xbf];
const WIDE_BOMS: [(&[u8], &str); 4] = [
    // UTF-32 first, since its little endian BOM starts with the UTF-16 one
    (&[0xff, 0xfe, 0x00, 0x00], "UTF-32LE"),
    (&[0x00, 0x00, 0xfe, 0xff], "UTF-32BE"),
    (&[0xff, 0xfe], "UTF-16LE"),
    (&[0xfe, 0xff], "UTF-16BE"),
];

/// Decodes raw bytes into text.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<Cow<'_, str>> {
    match encoding {
        Encoding::Auto => {
            if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
                return decode(rest, Encoding::Utf8);
            }
            if let Some((_, name)) = WIDE_BOMS.iter().find(|(bom, _)| bytes.starts_with(bom)) {
                return Err(PvcdError::Encoding(
                    encoding,
                    format!("{name} input is not supported"),
                ));
            }
            match std::str::from_utf8(bytes) {
                Ok(text) => Ok(Cow::Borrowed(text)),
                Err(e) => {
                    log::debug!("input is not valid UTF-8 ({e}), falling back to Latin-1");
                    decode(bytes, Encoding::Latin1)
                }
            }
        }
        Encoding::Utf8 => {
            let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|e| PvcdError::Encoding(encoding, e.to_string()))
        }
        Encoding::Latin1 => {
            if bytes.is_ascii() {
                // ASCII is a subset of Latin-1 and valid UTF-8
                Ok(Cow::Borrowed(std::str::from_utf8(bytes).map_err(|e| {
                    PvcdError::Encoding(encoding, e.to_string())
                })?))
            } else {
                Ok(Cow::Owned(bytes.iter().map(|&b| b as char).collect()))
            }
        }
    }
}

/// Replaces every non-ASCII character with `&#xHHHH;`.
pub fn normalize(text: &str) -> Cow<'_, str> {
    if text.is_ascii() {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            out.push_str(&format!("&#x{:04x};", c as u32));
        }
    }
    Cow::Owned(out)
}

/// Decodes and optionally normalizes `bytes` according to the options.
pub fn prepare(bytes: &[u8], encoding: Encoding, normalize_non_ascii: bool) -> Result<Cow<'_, str>> {
    let text = decode(bytes, encoding)?;
    if !normalize_non_ascii {
        return Ok(text);
    }
    Ok(match text {
        Cow::Borrowed(text) => normalize(text),
        Cow::Owned(text) => match normalize(&text) {
            Cow::Borrowed(_) => Cow::Owned(text),
            Cow::Owned(normalized) => Cow::Owned(normalized),
        },
    })
}

/// Memory maps a file for reading.
pub fn map_file<P: AsRef<std::path::Path>>(filename: P) -> Result<memmap2::Mmap> {
    let f = std::fs::File::open(filename.as_ref())?;
    let mmap = unsafe { memmap2::Mmap::map(&f)? };
    log::debug!(
        "mapped {} bytes from {}",
        mmap.len(),
        filename.as_ref().display()
    );
    Ok(mmap)
}
