//! Group-by-term attribution of lead rows.
//!
//! The pipeline mirrors the upload flow end to end: prefilter rows whose URL
//! cannot possibly match, extract UTM parameters, group by `utm_term` and
//! resolve one human-readable creative name per term from the most frequent
//! `utm_content` value.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::extract_utm;
use crate::lead::{read_leads, LeadRow};

#[derive(Debug, Error)]
pub enum AggregateError {
    /// The input has no identifiable source-URL column. Carries a
    /// user-presentable message.
    #[error("{0}")]
    MissingColumn(String),

    /// No row survived filtering: nothing carries a usable `utm_term`.
    #[error("no lead with a utm_term parameter was found in the file")]
    EmptyResult,

    #[error("invalid CSV input: {0}")]
    Csv(#[from] csv::Error),
}

/// One creative in the summary report. Serialized field names match the
/// report schema consumed by the frontend and the CSV exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub utm_term: String,
    #[serde(rename = "nome_inserzione")]
    pub creative_name: String,
    #[serde(rename = "numero_lead")]
    pub lead_count: usize,
}

/// One qualifying lead in the detail report, input order preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailEntry {
    pub utm_term: String,
    pub utm_campaign: String,
    pub utm_content: String,
    #[serde(rename = "data")]
    pub date: String,
    #[serde(rename = "ora")]
    pub time: String,
    pub email: String,
    #[serde(rename = "nome_inserzione")]
    pub creative_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub total_rows: usize,
    pub rows_with_utm_term: usize,
    pub unique_creatives: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub summary: Vec<SummaryEntry>,
    pub detail: Vec<DetailEntry>,
    pub counts: AggregateCounts,
}

#[derive(Default)]
struct TermGroup {
    lead_count: usize,
    // content values in first-encounter order, counts alongside
    content_order: Vec<String>,
    content_counts: HashMap<String, usize>,
}

impl TermGroup {
    fn record_content(&mut self, content: &str) {
        match self.content_counts.entry(content.to_string()) {
            Entry::Vacant(e) => {
                self.content_order.push(content.to_string());
                e.insert(1);
            }
            Entry::Occupied(mut e) => *e.get_mut() += 1,
        }
    }

    /// Most frequent content; ties resolved in favour of the value first
    /// encountered in input order.
    fn creative_name(&self, term: &str) -> String {
        let mut best: Option<(&String, usize)> = None;
        for content in &self.content_order {
            let count = self.content_counts[content];
            if best.is_none_or(|(_, best_count)| count > best_count) {
                best = Some((content, count));
            }
        }
        best.map_or_else(|| term.to_string(), |(content, _)| content.clone())
    }
}

/// Runs the full attribution pipeline over lead rows.
///
/// Deterministic for a fixed input: summary ordering (by `lead_count`
/// descending, ties keeping first-appearance order of the term), counts and
/// detail rows are all reproducible across calls.
///
/// # Errors
///
/// Returns [`AggregateError::EmptyResult`] when no row carries a usable
/// `utm_term`.
pub fn aggregate(rows: &[LeadRow]) -> Result<Aggregation, AggregateError> {
    // Substring prefilter before URL parsing: a row whose raw URL never
    // mentions utm_term cannot qualify.
    let qualifying: Vec<_> = rows
        .iter()
        .filter(|row| row.source_url.contains("utm_term"))
        .filter_map(|row| {
            let triple = extract_utm(&row.source_url);
            let term = triple.term.clone()?;
            Some((row, triple, term))
        })
        .collect();

    if qualifying.is_empty() {
        return Err(AggregateError::EmptyResult);
    }

    let mut term_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, TermGroup> = HashMap::new();
    for (_, triple, term) in &qualifying {
        let group = match groups.entry(term.clone()) {
            Entry::Vacant(e) => {
                term_order.push(term.clone());
                e.insert(TermGroup::default())
            }
            Entry::Occupied(e) => e.into_mut(),
        };
        group.lead_count += 1;
        if let Some(content) = &triple.content {
            group.record_content(content);
        }
    }

    let creative_names: HashMap<&String, String> = term_order
        .iter()
        .map(|term| (term, groups[term].creative_name(term)))
        .collect();

    let mut summary: Vec<SummaryEntry> = term_order
        .iter()
        .map(|term| SummaryEntry {
            utm_term: term.clone(),
            creative_name: creative_names[term].clone(),
            lead_count: groups[term].lead_count,
        })
        .collect();
    // stable sort: ties keep first-appearance order
    summary.sort_by(|a, b| b.lead_count.cmp(&a.lead_count));

    let detail: Vec<DetailEntry> = qualifying
        .iter()
        .map(|(row, triple, term)| DetailEntry {
            date: row.date.clone().unwrap_or_default(),
            time: row.time.clone().unwrap_or_default(),
            email: row.email.clone().unwrap_or_default(),
            utm_term: term.clone(),
            utm_campaign: triple.campaign.clone().unwrap_or_default(),
            utm_content: triple.content.clone().unwrap_or_default(),
            creative_name: creative_names[term].clone(),
        })
        .collect();

    let counts = AggregateCounts {
        total_rows: rows.len(),
        rows_with_utm_term: detail.len(),
        unique_creatives: summary.len(),
    };

    Ok(Aggregation {
        summary,
        detail,
        counts,
    })
}

/// Convenience entry point for the server and CLI: parse CSV bytes and run
/// the attribution pipeline in one step.
///
/// # Errors
///
/// Propagates [`AggregateError`] from either stage.
pub fn analyze_csv(data: &[u8]) -> Result<Aggregation, AggregateError> {
    let rows = read_leads(data)?;
    aggregate(&rows)
}
