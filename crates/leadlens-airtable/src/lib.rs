//! Typed client for the Airtable base that backs identity and entitlement:
//! user credentials, per-application licenses and user preferences.
//!
//! The base is treated as a black-box tabular store over HTTPS. All calls
//! are single-attempt; callers decide how upstream failures surface.

mod client;
mod error;
mod types;

pub use client::AirtableClient;
pub use error::AirtableError;
pub use types::{LicenseCheck, LicenseRecord, PreferenceUpdate, UserPreferences, UserProfile, UserRecord};
