//! Core lead-attribution logic: UTM extraction, aggregation, report export,
//! and application configuration. Everything here is pure computation over
//! in-memory data; network and HTTP concerns live in the sibling crates.

use thiserror::Error;

pub mod aggregate;
mod app_config;
pub mod config;
pub mod export;
pub mod extract;
pub mod lead;

pub use aggregate::{
    aggregate, analyze_csv, AggregateCounts, AggregateError, Aggregation, DetailEntry,
    SummaryEntry,
};
pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use extract::{extract_utm, UtmTriple};
pub use lead::{read_leads, LeadRow, SOURCE_COLUMN};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
