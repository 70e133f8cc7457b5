// Decoding of delimited text uploads.

use std::io::Read;

use log::debug;

use crate::config::{Record, ValidationIssue};

/// Candidate separators, by order of priority.
pub const SEPARATORS: [u8; 3] = [b';', b',', b'\t'];
pub const DEFAULT_SEPARATOR: u8 = b';';

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// A decoded upload: trimmed headers and one record per data row.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct DecodedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

/// Picks the separator that occurs the most in the first line.
pub fn detect_separator(input: &[u8]) -> u8 {
    let first_line = input.split(|b| *b == b'\n').next().unwrap_or(&[]);
    let mut best = DEFAULT_SEPARATOR;
    let mut best_count = 0;
    for sep in SEPARATORS {
        let count = first_line.iter().filter(|b| **b == sep).count();
        if count > best_count {
            best = sep;
            best_count = count;
        }
    }
    best
}

pub fn decode_from<R: Read>(mut reader: R) -> Result<DecodedTable, ValidationIssue> {
    let mut buf: Vec<u8> = Vec::new();
    reader
        .read_to_end(&mut buf)
        .map_err(|e| ValidationIssue::CsvError {
            message: e.to_string(),
        })?;
    decode(&buf)
}

/// Decodes an upload. The first row holds the headers.
///
/// Short rows are completed with empty values. Cells without a header are dropped.
pub fn decode(input: &[u8]) -> Result<DecodedTable, ValidationIssue> {
    let body = input.strip_prefix(&UTF8_BOM[..]).unwrap_or(input);
    if body.iter().filter(|b| **b == b'"').count() % 2 == 1 {
        return Err(ValidationIssue::CsvError {
            message: "unclosed or stray quote".to_string(),
        });
    }
    let separator = detect_separator(body);
    debug!("decode: separator: {:?}", separator as char);

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(separator)
        .has_headers(true)
        .flexible(true)
        .from_reader(body);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(csv_issue)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    debug!("decode: headers: {:?}", headers);

    let mut rows: Vec<Record> = Vec::new();
    for line_r in rdr.records() {
        let line = line_r.map_err(csv_issue)?;
        let mut record = Record::new();
        for (idx, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            record.insert(header, line.get(idx).unwrap_or(""));
        }
        rows.push(record);
    }
    Ok(DecodedTable { headers, rows })
}

fn csv_issue(e: csv::Error) -> ValidationIssue {
    ValidationIssue::CsvError {
        message: e.to_string(),
    }
}
