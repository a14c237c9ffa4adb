//! CSV codec for the record list.
//!
//! Reading is forgiving: the header line is optional, short rows are padded
//! with empty strings and values are trimmed. Writing is canonical:
//! header first, every field quoted, `\n` line endings.

use crate::error::Result;
use crate::record::{Record, HEADER_KEYS};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};

/// Payloads shorter than this (after trimming) are rejected before parsing.
pub const MIN_CSV_LEN: usize = 10;

/// Parse CSV text into normalized (but unvalidated) records.
pub fn parse_csv(text: &str) -> Result<Vec<Record>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut out = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let fields = result?;
        if i == 0 && is_header(&fields) {
            continue;
        }
        if fields.is_empty() {
            continue;
        }
        let value = |idx: usize| fields.get(idx).map(str::trim).unwrap_or_default();
        let record = Record::new(value(0), value(1), value(2), value(3), value(4));
        out.push(record.normalized());
    }
    Ok(out)
}

/// Serialize records with a header line and every field quoted. No trailing
/// newline; callers that write a file append one.
pub fn to_csv(rows: &[Record]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(HEADER_KEYS)?;
    for row in rows {
        let r = row.normalized();
        writer.write_record([&r.first_name, &r.last_name, &r.day, &r.month, &r.year])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_end_matches('\n').to_string())
}

/// `to_csv` plus the final newline, as stored on disk and committed upstream.
pub fn to_csv_file(rows: &[Record]) -> Result<String> {
    Ok(to_csv(rows)? + "\n")
}

/// True if the payload is long enough to be worth parsing.
pub fn is_plausible_payload(text: &str) -> bool {
    text.trim().chars().count() >= MIN_CSV_LEN
}

fn is_header(fields: &csv::StringRecord) -> bool {
    fields.len() == HEADER_KEYS.len()
        && fields
            .iter()
            .zip(HEADER_KEYS)
            .all(|(h, key)| h.replace('"', "").trim() == key)
}
