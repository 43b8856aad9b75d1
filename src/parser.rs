use std::path::Path;

use tracing::debug;

use crate::error::{PennyError, Result};

pub const NBSP: char = '\u{a0}';

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Split delimited text into rows of raw fields.
///
/// Quoted fields may hold the delimiter, newlines and `""` escapes. A bare `\r`
/// is dropped wherever it appears outside quotes. An unterminated quote swallows
/// the rest of the input as field content instead of failing.
pub fn parse_csv(text: &str, delimiter: char) -> Vec<Vec<String>> {
    let mut out: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            '\n' => {
                row.push(std::mem::take(&mut field));
                out.push(std::mem::take(&mut row));
            }
            '\r' => {}
            c if c == delimiter => row.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    row.push(field);
    out.push(row);

    if out.last().is_some_and(|r| r.iter().all(|c| c.is_empty())) {
        out.pop();
    }
    out
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

// Windows-1252 code points for 0x80..=0x9F; the undefined slots map to the C1 control.
const CP1252_HIGH: [char; 32] = [
    '\u{20ac}', '\u{81}', '\u{201a}', '\u{192}', '\u{201e}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{2c6}', '\u{2030}', '\u{160}', '\u{2039}', '\u{152}', '\u{8d}', '\u{17d}', '\u{8f}',
    '\u{90}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{2dc}', '\u{2122}', '\u{161}', '\u{203a}', '\u{153}', '\u{9d}', '\u{17e}', '\u{178}',
];

/// Decode file bytes as UTF-8, falling back to Windows-1252 for legacy bank exports.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            debug!("input is not valid UTF-8, decoding as windows-1252");
            bytes
                .iter()
                .map(|&b| match b {
                    0x80..=0x9f => CP1252_HIGH[(b - 0x80) as usize],
                    _ => b as char,
                })
                .collect()
        }
    }
}

fn is_csv_path(path: &Path) -> bool {
    path.extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"))
}

/// Read a CSV upload into a raw matrix (header row included).
pub fn read_csv_file(path: &Path, delimiter: char) -> Result<Vec<Vec<String>>> {
    let shown = path.display().to_string();
    if !is_csv_path(path) {
        return Err(PennyError::NotCsv(shown));
    }
    let bytes = std::fs::read(path)?;
    let text = decode_text(&bytes).replace(NBSP, " ");
    let matrix = parse_csv(&text, delimiter);
    if matrix.iter().all(|r| r.iter().all(|c| c.trim().is_empty())) {
        return Err(PennyError::EmptyFile(shown));
    }
    debug!(rows = matrix.len(), file = %shown, "tokenized csv");
    Ok(matrix)
}
