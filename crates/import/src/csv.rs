use std::fs;
use std::path::Path;

use regex::Regex;
use thiserror::Error;

use tally_core::RawTable;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("file contains no rows")]
    Empty,
}

/// Delimiters tried in order when sniffing; first in the list wins ties.
const DELIMITERS: &[u8] = b",\t;|";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Decodes a CSV byte stream into a RawTable. Legacy single-byte encodings
/// degrade to lossy UTF-8 rather than failing the file.
pub fn decode(data: &[u8]) -> Result<RawTable, DecodeError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    let text = String::from_utf8_lossy(data);
    decode_str(&text)
}

pub fn decode_path(path: &Path) -> Result<RawTable, DecodeError> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

pub fn decode_str(text: &str) -> Result<RawTable, DecodeError> {
    let delimiter = sniff_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut headers: Vec<String> = Vec::new();
    let mut rows: Vec<Vec<String>> = Vec::new();

    for result in reader.records() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let cells: Vec<String> = record.iter().map(|cell| cell.to_string()).collect();
        if headers.is_empty() {
            headers = cells;
        } else {
            rows.push(cells);
        }
    }

    if headers.is_empty() {
        return Err(DecodeError::Empty);
    }

    if let Some(first) = headers.first() {
        if looks_like_data(first) {
            tracing::warn!(cell = first.as_str(), "header row looks like data");
        }
    }

    // Ragged inputs are common; pad or cut every row to the header width so
    // downstream stages see a rectangular table.
    let width = headers.len();
    for row in &mut rows {
        row.resize(width, String::new());
    }

    Ok(RawTable::new(headers, rows))
}

fn sniff_delimiter(text: &str) -> u8 {
    let line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut best = b',';
    let mut best_count = 0usize;
    for &candidate in DELIMITERS {
        let count = line.matches(candidate as char).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// A header cell that is all digits, or a letter prefix followed by digits
/// ("D001", "R123"), is almost certainly an id from a headerless export.
fn looks_like_data(cell: &str) -> bool {
    let cell = cell.trim();
    if cell.is_empty() {
        return false;
    }
    if cell.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    Regex::new(r"^[A-Za-z]+\d+$")
        .map(|re| re.is_match(cell))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_basic_comma_csv() {
        let table = decode(b"order id,amount\nT1,10.00\nT2,20.00\n").unwrap();
        assert_eq!(table.headers, vec!["order id", "amount"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0], vec!["T1", "10.00"]);
    }

    #[test]
    fn decode_sniffs_tab_delimiter() {
        let table = decode(b"order id\tamount\nT1\t10.00\n").unwrap();
        assert_eq!(table.headers.len(), 2);
        assert_eq!(table.rows[0][1], "10.00");
    }

    #[test]
    fn decode_sniffs_semicolon_and_pipe() {
        let semi = decode(b"a;b;c\n1;2;3\n").unwrap();
        assert_eq!(semi.headers, vec!["a", "b", "c"]);
        let pipe = decode(b"a|b\n1|2\n").unwrap();
        assert_eq!(pipe.headers, vec!["a", "b"]);
    }

    #[test]
    fn decode_strips_utf8_bom() {
        let table = decode(b"\xef\xbb\xbforder id,amount\nT1,1\n").unwrap();
        assert_eq!(table.headers[0], "order id");
    }

    #[test]
    fn decode_pads_ragged_rows() {
        let table = decode(b"a,b,c\n1,2\n1,2,3,4\n").unwrap();
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
        assert_eq!(table.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn decode_skips_blank_lines() {
        let table = decode(b"a,b\n\n1,2\n,\n3,4\n").unwrap();
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn decode_empty_input_errors() {
        assert!(matches!(decode(b""), Err(DecodeError::Empty)));
        assert!(matches!(decode(b"\n\n"), Err(DecodeError::Empty)));
    }

    #[test]
    fn looks_like_data_heuristic() {
        assert!(looks_like_data("D001"));
        assert!(looks_like_data("12345"));
        assert!(!looks_like_data("order id"));
        assert!(!looks_like_data("amount (USD)"));
    }
}
