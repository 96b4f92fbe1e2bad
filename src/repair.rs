//! Repair of lead CSV files whose name column holds the not-found sentinel.
//!
//! Rows are copied byte for byte. The only edit ever made is replacing the
//! name field of a sentinel row with the place name decoded from that row's
//! link, so every other column, quoting style and line ending survives
//! unchanged. The result always goes to a new timestamped file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use csv::{ByteRecord, ReaderBuilder};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RepairConfig;
use crate::decoder::LinkPattern;
use crate::record::SENTINEL_NAME;

#[derive(Error, Debug)]
pub enum RepairError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Refusing to overwrite existing file: {0}")]
    OutputExists(PathBuf),

    #[error("Invalid link marker '{0}'")]
    InvalidMarker(String),
}

#[derive(Debug, Clone)]
pub struct RepairOptions {
    pub name_column: usize,
    pub link_column: usize,
    pub min_columns: usize,
    pub preview_rows: usize,
    pub output_prefix: String,
    /// Defaults to the input file's directory
    pub output_dir: Option<PathBuf>,
    pub link_pattern: LinkPattern,
}

impl Default for RepairOptions {
    fn default() -> Self {
        let cfg = RepairConfig::default();
        Self {
            name_column: cfg.name_column,
            link_column: cfg.link_column,
            min_columns: cfg.min_columns,
            preview_rows: cfg.preview_rows,
            output_prefix: cfg.output_prefix,
            output_dir: None,
            link_pattern: LinkPattern::default(),
        }
    }
}

impl RepairOptions {
    pub fn from_config(cfg: &RepairConfig, link_marker: &str) -> Result<Self, RepairError> {
        let link_pattern = LinkPattern::new(link_marker).map_err(|_| RepairError::InvalidMarker(link_marker.to_string()))?;
        Ok(Self {
            name_column: cfg.name_column,
            link_column: cfg.link_column,
            min_columns: cfg.min_columns,
            preview_rows: cfg.preview_rows,
            output_prefix: cfg.output_prefix.clone(),
            output_dir: None,
            link_pattern,
        })
    }

    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.output_dir = dir;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub output_path: PathBuf,
    /// Data rows, header excluded
    pub total_rows: usize,
    pub repaired_rows: usize,
    /// Rows with fewer than `min_columns` columns, passed through
    pub malformed_rows: usize,
    /// Sentinel rows whose link carries no decodable name
    pub unrepairable_rows: usize,
    /// First repaired names
    pub preview: Vec<String>,
}

/// Repair `input` into a new file and report what changed.
pub fn repair(input: &Path, options: &RepairOptions) -> Result<RepairReport, RepairError> {
    if !input.is_file() {
        return Err(RepairError::InputNotFound(input.to_path_buf()));
    }

    let bytes = fs::read(input)?;
    let mut report = RepairReport {
        output_path: output_path(input, options, Utc::now()),
        total_rows: 0,
        repaired_rows: 0,
        malformed_rows: 0,
        unrepairable_rows: 0,
        preview: Vec::new(),
    };

    let repaired = repair_bytes(&bytes, options, &mut report)?;
    write_new(&report.output_path, &repaired)?;

    info!(
        "Repaired {} of {} rows into {}",
        report.repaired_rows,
        report.total_rows,
        report.output_path.display()
    );
    Ok(report)
}

/// Rewrite a whole CSV document. Gaps between records (blank lines, CRLF
/// remainders) and the trailing bytes are copied as-is.
fn repair_bytes(bytes: &[u8], options: &RepairOptions, report: &mut RepairReport) -> Result<Vec<u8>, RepairError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut out = Vec::with_capacity(bytes.len());
    let mut record = ByteRecord::new();
    let mut cursor = 0usize;
    let mut row = 0usize;

    while reader.read_byte_record(&mut record)? {
        let start = record
            .position()
            .map(|p| p.byte() as usize)
            .unwrap_or(cursor)
            .clamp(cursor, bytes.len());
        let end = (reader.position().byte() as usize).clamp(start, bytes.len());

        out.extend_from_slice(&bytes[cursor..start]);
        let raw = &bytes[start..end];
        cursor = end;

        if row == 0 {
            out.extend_from_slice(raw);
        } else {
            report.total_rows += 1;
            match repair_row(raw, &record, options, report) {
                Some(fixed) => out.extend_from_slice(&fixed),
                None => out.extend_from_slice(raw),
            }
        }
        row += 1;
    }

    out.extend_from_slice(&bytes[cursor..]);
    Ok(out)
}

/// Repaired bytes for one row, or `None` to pass it through unchanged.
fn repair_row(raw: &[u8], record: &ByteRecord, options: &RepairOptions, report: &mut RepairReport) -> Option<Vec<u8>> {
    if record.len() < options.min_columns {
        debug!("Row {} has {} columns, passing through", report.total_rows, record.len());
        report.malformed_rows += 1;
        return None;
    }

    if record.get(options.name_column)? != SENTINEL_NAME.as_bytes() {
        return None;
    }

    let name = record
        .get(options.link_column)
        .and_then(|link| std::str::from_utf8(link).ok())
        .and_then(|link| options.link_pattern.place_name(link));
    let Some(name) = name else {
        debug!("Row {}: sentinel without a decodable link", report.total_rows);
        report.unrepairable_rows += 1;
        return None;
    };

    let spans = field_spans(raw);
    if spans.len() != record.len() {
        warn!(
            "Row {}: scanned {} fields but parsed {}, leaving row untouched",
            report.total_rows,
            spans.len(),
            record.len()
        );
        report.unrepairable_rows += 1;
        return None;
    }

    let span = spans[options.name_column].clone();
    let mut fixed = Vec::with_capacity(raw.len() + name.len());
    fixed.extend_from_slice(&raw[..span.start]);
    fixed.extend_from_slice(quote_field(&name).as_bytes());
    fixed.extend_from_slice(&raw[span.end..]);

    report.repaired_rows += 1;
    if report.preview.len() < options.preview_rows {
        report.preview.push(name);
    }
    Some(fixed)
}

/// Byte ranges of each field in one raw record, quotes included. Leading
/// line terminators are skipped and scanning stops at the first unquoted
/// line terminator.
pub fn field_spans(raw: &[u8]) -> Vec<Range<usize>> {
    let mut i = raw.iter().take_while(|b| **b == b'\r' || **b == b'\n').count();
    let mut spans = Vec::new();
    let mut start = i;
    let mut in_quotes = false;

    while i < raw.len() {
        let b = raw[i];
        if in_quotes {
            if b == b'"' {
                if raw.get(i + 1) == Some(&b'"') {
                    i += 2;
                    continue;
                }
                in_quotes = false;
            }
        } else {
            match b {
                b'"' if i == start => in_quotes = true,
                b',' => {
                    spans.push(start..i);
                    start = i + 1;
                }
                b'\r' | b'\n' => break,
                _ => {}
            }
        }
        i += 1;
    }
    spans.push(start..i);
    spans
}

/// Always-quoted CSV field.
pub fn quote_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// `<prefix>_<timestamp>.csv` with an ISO-8601 UTC timestamp whose colons
/// are replaced by dashes.
pub fn output_file_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.csv", prefix, now.format("%Y-%m-%dT%H-%M-%S%.3fZ"))
}

fn output_path(input: &Path, options: &RepairOptions, now: DateTime<Utc>) -> PathBuf {
    let dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None => input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    dir.join(output_file_name(&options.output_prefix, now))
}

fn write_new(path: &Path, contents: &[u8]) -> Result<(), RepairError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => RepairError::OutputExists(path.to_path_buf()),
            _ => RepairError::Io(e),
        })?;
    file.write_all(contents)?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run(input: &str) -> (String, RepairReport) {
        let mut report = RepairReport {
            output_path: PathBuf::from("unused.csv"),
            total_rows: 0,
            repaired_rows: 0,
            malformed_rows: 0,
            unrepairable_rows: 0,
            preview: Vec::new(),
        };
        let out = repair_bytes(input.as_bytes(), &RepairOptions::default(), &mut report).unwrap();
        (String::from_utf8(out).unwrap(), report)
    }

    #[test]
    fn test_field_spans_respect_quotes() {
        let raw = br#""a,b",c,"say ""hi""",d"#;
        let spans = field_spans(raw);
        assert_eq!(spans.len(), 4);
        assert_eq!(&raw[spans[0].clone()], br#""a,b""#);
        assert_eq!(&raw[spans[2].clone()], br#""say ""hi""""#);
        assert_eq!(&raw[spans[3].clone()], b"d");
    }

    #[test]
    fn test_field_spans_skip_leading_terminator() {
        let raw = b"\na,b\r";
        let spans = field_spans(raw);
        assert_eq!(spans, vec![1..2, 3..4]);
    }

    #[test]
    fn test_sentinel_row_is_repaired() {
        let input = "id,name,rating,reviews,details,link\n\
            \"id1\",\"Nome não encontrado\",\"\",\"\",\"\",\"https://maps.example/maps/place/Padaria+Bella+Paulista/@-23.5\"\n";
        let (out, report) = run(input);
        assert!(out.contains("\"id1\",\"Padaria Bella Paulista\",\"\""));
        assert_eq!(report.repaired_rows, 1);
        assert_eq!(report.preview, vec!["Padaria Bella Paulista".to_string()]);
    }

    #[test]
    fn test_crlf_and_unquoted_columns_preserved() {
        let input = "h0,h1,h2,h3,h4,h5\r\n7,Nome não encontrado,4.5,12,x,https://m.example/maps/place/Bar%26Co/\r\n8,Ok,,,,\r\n";
        let (out, report) = run(input);
        assert_eq!(
            out,
            "h0,h1,h2,h3,h4,h5\r\n7,\"Bar&Co\",4.5,12,x,https://m.example/maps/place/Bar%26Co/\r\n8,Ok,,,,\r\n"
        );
        assert_eq!(report.total_rows, 2);
    }

    #[test]
    fn test_short_rows_pass_through() {
        let input = "a,b,c,d,e,f\n1,Nome não encontrado,x\n";
        let (out, report) = run(input);
        assert_eq!(out, input);
        assert_eq!(report.malformed_rows, 1);
        assert_eq!(report.repaired_rows, 0);
    }

    #[test]
    fn test_sentinel_without_link_is_unrepairable() {
        let input = "a,b,c,d,e,f\n1,Nome não encontrado,,,,https://m.example/search/x\n";
        let (out, report) = run(input);
        assert_eq!(out, input);
        assert_eq!(report.unrepairable_rows, 1);
    }

    #[test]
    fn test_output_file_name_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 12).unwrap() + chrono::Duration::milliseconds(345);
        assert_eq!(
            output_file_name("leads_corrigidos_manual", now),
            "leads_corrigidos_manual_2026-10-18T09-30-12.345Z.csv"
        );
    }

    #[test]
    fn test_quote_field_escapes() {
        assert_eq!(quote_field(r#"Bar "do" Zé"#), r#""Bar ""do"" Zé""#);
    }
}
