//! Report export as delimited text.
//!
//! Both reports are written as comma-separated UTF-8 prefixed with a
//! byte-order marker so spreadsheet tools open them with the right encoding.

use crate::aggregate::{DetailEntry, SummaryEntry};

/// Download name of the per-term summary report.
pub const SUMMARY_FILE_NAME: &str = "utm_term_inserzioni.csv";

/// Download name of the per-lead detail report.
pub const DETAIL_FILE_NAME: &str = "lead_dettagliati_con_inserzioni.csv";

pub const SUMMARY_HEADERS: [&str; 3] = ["utm_term", "nome_inserzione", "numero_lead"];
pub const DETAIL_HEADERS: [&str; 7] = [
    "utm_term",
    "utm_campaign",
    "utm_content",
    "data",
    "ora",
    "email",
    "nome_inserzione",
];

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Renders the summary report.
///
/// # Errors
///
/// Returns `csv::Error` if a record cannot be written.
pub fn write_summary_csv(entries: &[SummaryEntry]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(SUMMARY_HEADERS)?;
    for entry in entries {
        let count = entry.lead_count.to_string();
        writer.write_record([
            entry.utm_term.as_str(),
            entry.creative_name.as_str(),
            count.as_str(),
        ])?;
    }
    finish(writer)
}

/// Renders the detail report.
///
/// # Errors
///
/// Returns `csv::Error` if a record cannot be written.
pub fn write_detail_csv(entries: &[DetailEntry]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(DETAIL_HEADERS)?;
    for entry in entries {
        writer.write_record([
            entry.utm_term.as_str(),
            entry.utm_campaign.as_str(),
            entry.utm_content.as_str(),
            entry.date.as_str(),
            entry.time.as_str(),
            entry.email.as_str(),
            entry.creative_name.as_str(),
        ])?;
    }
    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, csv::Error> {
    let body = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    let mut out = Vec::with_capacity(UTF8_BOM.len() + body.len());
    out.extend_from_slice(UTF8_BOM);
    out.extend_from_slice(&body);
    Ok(out)
}
