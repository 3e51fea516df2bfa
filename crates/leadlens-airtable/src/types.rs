//! Wire shapes for the Airtable REST API and the domain types exposed to
//! callers. Table and field names mirror the production base (`Utenti`,
//! `Licenze`, `Preferenze utente`).

use serde::{Deserialize, Serialize};

/// One page of a table listing. Airtable returns at most 100 records per
/// page and an `offset` cursor while more pages remain.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordsPage<F> {
    #[serde(default = "Vec::new")]
    pub records: Vec<Record<F>>,
    pub offset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Record<F> {
    pub id: String,
    pub fields: F,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UserFields {
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Incrementale")]
    pub incrementale: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LicenseFields {
    #[serde(rename = "Stato")]
    pub status: Option<String>,
    #[serde(rename = "Applicazione")]
    pub application: Option<String>,
    #[serde(rename = "Username")]
    pub username: Option<String>,
    #[serde(rename = "Tipo_Licenza")]
    pub license_type: Option<String>,
    #[serde(rename = "Data_Creazione")]
    pub created_on: Option<String>,
    #[serde(rename = "Data_Scadenza")]
    pub expires_on: Option<String>,
    #[serde(rename = "Utente_Collegato", default)]
    pub linked_users: Vec<String>,
    #[serde(rename = "Funzionalita_Abilitate", default)]
    pub enabled_features: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PreferenceFields {
    #[serde(rename = "Tema interfaccia")]
    pub theme: Option<String>,
    #[serde(rename = "json pref")]
    pub json_pref: Option<String>,
}

/// An authenticated user, as resolved by [`crate::AirtableClient::find_user`].
///
/// `record_id` is the Airtable record identifier (used for record-addressed
/// reads/writes); `user_id` is the application-level identifier stored in
/// the `user_id` field and referenced by license linked-user arrays.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub record_id: String,
    pub user_id: String,
    pub username: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LicenseRecord {
    pub id: String,
    pub status: Option<String>,
    pub application: Option<String>,
    pub username: Option<String>,
    pub license_type: Option<String>,
    pub created_on: Option<String>,
    pub expires_on: Option<String>,
    pub enabled_features: Vec<String>,
}

/// Outcome of an entitlement check. Distinct from `Err(...)` so callers can
/// never conflate "no active license" with "the check itself failed".
#[derive(Debug, Clone)]
pub enum LicenseCheck {
    Active(LicenseRecord),
    Inactive,
}

impl LicenseCheck {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, LicenseCheck::Active(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub record_id: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub name: Option<String>,
    pub incrementale: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPreferences {
    pub record_id: String,
    pub theme: Option<String>,
    pub json_pref: Option<String>,
}

/// Fields to write on a preference upsert; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PreferenceUpdate {
    pub theme: Option<String>,
    pub json_pref: Option<String>,
}
