//! Lead rows as read from an uploaded CSV export.

use crate::aggregate::AggregateError;

/// Header of the required source-URL column in uploaded files.
pub const SOURCE_COLUMN: &str = "SORGENTE";

const DATE_COLUMN: &str = "Data";
const TIME_COLUMN: &str = "Ora";
const EMAIL_COLUMN: &str = "Email";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// One row of the uploaded export, immutable once read. Metadata columns are
/// optional; only the source URL takes part in attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadRow {
    pub date: Option<String>,
    pub time: Option<String>,
    pub email: Option<String>,
    pub source_url: String,
}

/// Parses CSV bytes into lead rows.
///
/// A leading UTF-8 BOM is ignored (spreadsheet tools commonly write one).
/// The `SORGENTE` column is required; `Data`, `Ora` and `Email` are carried
/// through when present.
///
/// # Errors
///
/// - [`AggregateError::MissingColumn`] when no `SORGENTE` header exists.
/// - [`AggregateError::Csv`] when the input is not parseable as CSV.
pub fn read_leads(data: &[u8]) -> Result<Vec<LeadRow>, AggregateError> {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
    let headers = reader.headers()?.clone();

    let source_idx = headers
        .iter()
        .position(|h| h == SOURCE_COLUMN)
        .ok_or_else(|| {
            AggregateError::MissingColumn(format!(
                "the file must contain a '{SOURCE_COLUMN}' column"
            ))
        })?;
    let date_idx = headers.iter().position(|h| h == DATE_COLUMN);
    let time_idx = headers.iter().position(|h| h == TIME_COLUMN);
    let email_idx = headers.iter().position(|h| h == EMAIL_COLUMN);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(std::string::ToString::to_string)
        };
        rows.push(LeadRow {
            date: field(date_idx),
            time: field(time_idx),
            email: field(email_idx),
            source_url: record.get(source_idx).unwrap_or("").to_string(),
        });
    }
    Ok(rows)
}
