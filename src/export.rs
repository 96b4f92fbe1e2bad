use crate::record::CandidateRecord;
use crate::session::Diagnostics;
use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::{QuoteStyle, WriterBuilder};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Columns of the lead CSV. Name and link sit where the repair pipeline
/// expects them (1 and 5).
pub const CSV_HEADERS: [&str; 6] = ["id", "name", "rating", "reviews", "details", "link"];

pub fn export_csv(records: &[CandidateRecord], output_path: &Path) -> Result<()> {
    debug!("Exporting {} records to CSV: {}", records.len(), output_path.display());

    let file = File::create(output_path)?;
    let mut wtr = WriterBuilder::new().quote_style(QuoteStyle::Always).from_writer(file);

    wtr.write_record(CSV_HEADERS)?;

    for (i, record) in records.iter().enumerate() {
        let id = (i + 1).to_string();
        wtr.write_record([
            id.as_str(),
            record.name.as_str(),
            record.field("rating").unwrap_or(""),
            record.field("reviews").unwrap_or(""),
            record.field("details").unwrap_or(""),
            record.source_url.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.flush()?;
    info!("Exported {} records to CSV: {}", records.len(), output_path.display());

    Ok(())
}

pub fn export_json(records: &[CandidateRecord], diagnostics: &Diagnostics, output_path: &Path) -> Result<()> {
    debug!("Exporting {} records to JSON: {}", records.len(), output_path.display());

    let json_output = JsonExport {
        summary: ExportSummary {
            query: &diagnostics.query,
            generated_at: Utc::now(),
            total_records: records.len(),
            with_link: records.iter().filter(|r| r.source_url.is_some()).count(),
            sentinel_records: records.iter().filter(|r| r.is_sentinel()).count(),
        },
        diagnostics,
        records,
    };

    let json_string = serde_json::to_string_pretty(&json_output)?;

    let mut file = File::create(output_path)?;
    file.write_all(json_string.as_bytes())?;

    info!("Exported {} records to JSON: {}", records.len(), output_path.display());

    Ok(())
}

#[derive(serde::Serialize)]
struct JsonExport<'a> {
    summary: ExportSummary<'a>,
    diagnostics: &'a Diagnostics,
    records: &'a [CandidateRecord],
}

#[derive(serde::Serialize)]
struct ExportSummary<'a> {
    query: &'a str,
    generated_at: DateTime<Utc>,
    total_records: usize,
    with_link: usize,
    sentinel_records: usize,
}

/// Lowercased query with runs of non-alphanumerics collapsed to `-`.
pub fn query_slug(query: &str) -> String {
    let mut slug = String::with_capacity(query.len());
    for ch in query.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug.to_string()
    }
}

/// `leads_<slug>_<timestamp>.<extension>` inside `dir`.
pub fn leads_output_path(dir: &Path, query: &str, extension: &str, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!(
        "leads_{}_{}.{}",
        query_slug(query),
        now.format("%Y-%m-%dT%H-%M-%S%.3fZ"),
        extension
    ))
}

pub fn print_session_summary(records: &[CandidateRecord], diagnostics: &Diagnostics) {
    if records.is_empty() {
        println!("No leads found for '{}'.", diagnostics.query);
    }

    println!("\n=== Extraction Summary ===");
    println!("Query: {}", diagnostics.query);
    println!("Result nodes seen: {}", diagnostics.nodes_seen);
    println!("Leads collected: {}", diagnostics.records_yielded);
    println!("Rejected nodes: {}", diagnostics.rejected);
    println!("Duplicates skipped: {}", diagnostics.duplicates);
    if diagnostics.sentinel_records > 0 {
        println!("Leads without a name: {}", diagnostics.sentinel_records);
    }

    if !diagnostics.strategy_hits.is_empty() {
        println!("Names found by:");
        for (strategy, count) in &diagnostics.strategy_hits {
            println!("  {}: {}", strategy, count);
        }
    }

    for (field, missing) in &diagnostics.empty_fields {
        println!("  Missing {}: {}", field, missing);
    }

    for record in records.iter().take(5) {
        println!("  - {}", record.name);
    }

    println!("==========================\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_slug() {
        assert_eq!(query_slug("Padarias em São Paulo"), "padarias-em-são-paulo");
        assert_eq!(query_slug("  --  "), "query");
        assert_eq!(query_slug("café & bar!"), "café-bar");
    }

    #[test]
    fn test_leads_output_path() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 12).unwrap();
        let path = leads_output_path(Path::new("out"), "Pizza SP", "csv", now);
        assert_eq!(path, PathBuf::from("out/leads_pizza-sp_2026-10-18T09-30-12.000Z.csv"));
    }

    #[test]
    fn test_export_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leads.csv");
        let mut record =
            CandidateRecord::new("Padaria Bella", Some("https://maps.example/maps/place/Padaria+Bella/".to_string()))
                .unwrap();
        record.set_field("rating", "4.6".to_string());

        export_csv(&[record], &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some(r#""id","name","rating","reviews","details","link""#));
        assert_eq!(
            lines.next(),
            Some(r#""1","Padaria Bella","4.6","","","https://maps.example/maps/place/Padaria+Bella/""#)
        );
    }
}
