//! HTTP client for the Airtable record store.
//!
//! Wraps `reqwest` with bearer authentication, cursor-following pagination
//! and typed response deserialization. Filter formulas are kept as simple as
//! the store's query language allows; anything it cannot express (array
//! containment in particular) is done as a documented client-side post-filter.

use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::AirtableError;
use crate::types::{
    LicenseCheck, LicenseFields, LicenseRecord, PreferenceFields, PreferenceUpdate, Record,
    RecordsPage, UserFields, UserPreferences, UserProfile, UserRecord,
};

const DEFAULT_BASE_URL: &str = "https://api.airtable.com/v0/";

const USERS_TABLE: &str = "Utenti";
const LICENSES_TABLE: &str = "Licenze";
const PREFERENCES_TABLE: &str = "Preferenze utente";

/// The literal marker of an active license in the `Stato` field.
const ACTIVE_STATUS: &str = "Attivo";

/// Client for one Airtable base.
///
/// Use [`AirtableClient::new`] for production or
/// [`AirtableClient::with_base_url`] to point at a mock server in tests.
pub struct AirtableClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl AirtableClient {
    /// Creates a client pointed at the production Airtable API.
    ///
    /// # Errors
    ///
    /// Returns [`AirtableError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_key: &str, base_id: &str, timeout_secs: u64) -> Result<Self, AirtableError> {
        Self::with_base_url(api_key, base_id, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`AirtableError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`AirtableError::InvalidUrl`] if `base_url`
    /// is not a valid URL.
    pub fn with_base_url(
        api_key: &str,
        base_id: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, AirtableError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("leadlens/0.1 (lead-attribution)")
            .build()?;

        // Normalise: the base URL must end with exactly one slash so that
        // joins append table segments instead of replacing the last one.
        let normalised = format!("{}/{base_id}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            AirtableError::InvalidUrl(format!("invalid base URL '{base_url}': {e}"))
        })?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
        })
    }

    /// Looks up a user by username and verifies the password.
    ///
    /// Returns `Ok(None)` both when no user matches and when the password
    /// does not match, so the two cases are indistinguishable to callers.
    /// The store holds plaintext passwords and this compares them verbatim
    /// (case-sensitive); hashing here would break against the values already
    /// stored upstream. That deficiency is inherited, not introduced.
    ///
    /// # Errors
    ///
    /// - [`AirtableError::Http`] on network failure or non-2xx status.
    /// - [`AirtableError::Deserialize`] if the response shape is unexpected.
    pub async fn find_user(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, AirtableError> {
        let formula = format!(
            "TRIM({{username}}) = '{}'",
            escape_formula_value(username)
        );
        let page: RecordsPage<UserFields> = self
            .get_page(
                USERS_TABLE,
                &[("filterByFormula", &formula), ("maxRecords", "1")],
            )
            .await?;

        let Some(record) = page.records.into_iter().next() else {
            return Ok(None);
        };

        if record.fields.password.as_deref() != Some(password) {
            return Ok(None);
        }

        let user_id = record
            .fields
            .user_id
            .unwrap_or_else(|| record.id.clone());
        Ok(Some(UserRecord {
            record_id: record.id,
            user_id,
            username: record.fields.username.unwrap_or_else(|| username.to_owned()),
            name: record.fields.name,
        }))
    }

    /// Licenses for one application that link the given user.
    ///
    /// The store's formula language cannot express "contains in array", so
    /// this filters server-side by application name only and post-filters
    /// the `Utente_Collegato` array membership here. All result pages are
    /// followed via the `offset` cursor before filtering.
    ///
    /// # Errors
    ///
    /// - [`AirtableError::Http`] on network failure or non-2xx status.
    /// - [`AirtableError::Deserialize`] if the response shape is unexpected.
    pub async fn list_licenses(
        &self,
        user_id: &str,
        app_name: &str,
    ) -> Result<Vec<LicenseRecord>, AirtableError> {
        let formula = format!(
            "{{Applicazione}} = '{}'",
            escape_formula_value(app_name)
        );
        let records: Vec<Record<LicenseFields>> =
            self.fetch_all(LICENSES_TABLE, Some(&formula)).await?;

        Ok(records
            .into_iter()
            .filter(|record| {
                record
                    .fields
                    .linked_users
                    .iter()
                    .any(|linked| linked == user_id)
            })
            .map(license_from_record)
            .collect())
    }

    /// All licenses linked to the user, regardless of application.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`AirtableClient::list_licenses`].
    pub async fn list_all_licenses(
        &self,
        user_id: &str,
    ) -> Result<Vec<LicenseRecord>, AirtableError> {
        let formula = format!("{{Utente_Link}} = '{}'", escape_formula_value(user_id));
        let records: Vec<Record<LicenseFields>> =
            self.fetch_all(LICENSES_TABLE, Some(&formula)).await?;
        Ok(records.into_iter().map(license_from_record).collect())
    }

    /// Entitlement check: does the user hold an active license for the app?
    ///
    /// A license counts as active only when its `Stato` equals `Attivo` AND
    /// its linked-user array contains `user_id` (the latter enforced by
    /// [`AirtableClient::list_licenses`]).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`AirtableClient::list_licenses`]; an `Err`
    /// means the check could not run, which is distinct from
    /// [`LicenseCheck::Inactive`].
    pub async fn active_license(
        &self,
        user_id: &str,
        app_name: &str,
    ) -> Result<LicenseCheck, AirtableError> {
        let licenses = self.list_licenses(user_id, app_name).await?;
        Ok(licenses
            .into_iter()
            .find(|license| license.status.as_deref() == Some(ACTIVE_STATUS))
            .map_or(LicenseCheck::Inactive, LicenseCheck::Active))
    }

    /// Fetches a user record by its Airtable record id.
    ///
    /// # Errors
    ///
    /// - [`AirtableError::Http`] on network failure or non-2xx status
    ///   (including 404 for an unknown record).
    /// - [`AirtableError::Deserialize`] if the response shape is unexpected.
    pub async fn get_user_profile(&self, record_id: &str) -> Result<UserProfile, AirtableError> {
        let url = self.record_url(USERS_TABLE, record_id)?;
        let body = self.request_json(url).await?;
        let record: Record<UserFields> =
            serde_json::from_value(body).map_err(|e| AirtableError::Deserialize {
                context: format!("get_user_profile({record_id})"),
                source: e,
            })?;
        Ok(UserProfile {
            record_id: record.id,
            user_id: record.fields.user_id,
            username: record.fields.username,
            name: record.fields.name,
            incrementale: record.fields.incrementale,
        })
    }

    /// Patches fields on a user record. Callers are responsible for
    /// restricting `fields` to the writable allow-list.
    ///
    /// # Errors
    ///
    /// [`AirtableError::Http`] on network failure or non-2xx status.
    pub async fn update_user_profile(
        &self,
        record_id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AirtableError> {
        let url = self.record_url(USERS_TABLE, record_id)?;
        self.client
            .patch(url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "fields": fields }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetches the preference record for a user, `None` when absent.
    ///
    /// # Errors
    ///
    /// - [`AirtableError::Http`] on network failure or non-2xx status.
    /// - [`AirtableError::Deserialize`] if the response shape is unexpected.
    pub async fn get_user_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<UserPreferences>, AirtableError> {
        Ok(self
            .find_preference_record(user_id)
            .await?
            .map(|record| UserPreferences {
                record_id: record.id,
                theme: record.fields.theme,
                json_pref: record.fields.json_pref,
            }))
    }

    /// Upserts the preference record for a user: patches the existing record
    /// when one exists, otherwise creates one linked to the user.
    ///
    /// # Errors
    ///
    /// - [`AirtableError::Http`] on network failure or non-2xx status.
    /// - [`AirtableError::Deserialize`] if the lookup response is malformed.
    pub async fn update_user_preferences(
        &self,
        user_id: &str,
        update: &PreferenceUpdate,
    ) -> Result<(), AirtableError> {
        let mut fields = serde_json::Map::new();
        if let Some(theme) = &update.theme {
            fields.insert("Tema interfaccia".to_owned(), theme.clone().into());
        }
        if let Some(json_pref) = &update.json_pref {
            fields.insert("json pref".to_owned(), json_pref.clone().into());
        }

        if let Some(existing) = self.find_preference_record(user_id).await? {
            let url = self.record_url(PREFERENCES_TABLE, &existing.id)?;
            self.client
                .patch(url)
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "fields": fields }))
                .send()
                .await?
                .error_for_status()?;
        } else {
            fields.insert(
                "Utente".to_owned(),
                serde_json::json!([user_id]),
            );
            let url = self.table_url(PREFERENCES_TABLE)?;
            self.client
                .post(url)
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "fields": fields }))
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }

    async fn find_preference_record(
        &self,
        user_id: &str,
    ) -> Result<Option<Record<PreferenceFields>>, AirtableError> {
        let formula = format!("{{user_id}} = '{}'", escape_formula_value(user_id));
        let page: RecordsPage<PreferenceFields> = self
            .get_page(
                PREFERENCES_TABLE,
                &[("filterByFormula", &formula), ("maxRecords", "1")],
            )
            .await?;
        Ok(page.records.into_iter().next())
    }

    /// Fetches every page of a table listing, following `offset` cursors
    /// until the store stops returning one.
    async fn fetch_all<F: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        filter: Option<&str>,
    ) -> Result<Vec<Record<F>>, AirtableError> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut params: Vec<(&str, &str)> = Vec::new();
            if let Some(formula) = filter {
                params.push(("filterByFormula", formula));
            }
            if let Some(cursor) = offset.as_deref() {
                params.push(("offset", cursor));
            }
            let page: RecordsPage<F> = self.get_page(table, &params).await?;
            records.extend(page.records);
            match page.offset {
                Some(cursor) => {
                    tracing::debug!(table, "following pagination cursor");
                    offset = Some(cursor);
                }
                None => break,
            }
        }
        Ok(records)
    }

    async fn get_page<F: serde::de::DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, &str)],
    ) -> Result<RecordsPage<F>, AirtableError> {
        let mut url = self.table_url(table)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        let context = format!("{table} listing");
        let body = self.request_json(url).await?;
        serde_json::from_value(body).map_err(|e| AirtableError::Deserialize {
            context,
            source: e,
        })
    }

    /// Sends a GET request, asserts a 2xx HTTP status, and parses the body
    /// as JSON.
    async fn request_json(&self, url: Url) -> Result<serde_json::Value, AirtableError> {
        let context = url.to_string();
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = response.error_for_status()?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AirtableError::Deserialize {
            context,
            source: e,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, AirtableError> {
        self.base_url
            .join(table)
            .map_err(|e| AirtableError::InvalidUrl(format!("table '{table}': {e}")))
    }

    fn record_url(&self, table: &str, record_id: &str) -> Result<Url, AirtableError> {
        self.base_url
            .join(&format!("{table}/{record_id}"))
            .map_err(|e| AirtableError::InvalidUrl(format!("record '{table}/{record_id}': {e}")))
    }
}

fn license_from_record(record: Record<LicenseFields>) -> LicenseRecord {
    LicenseRecord {
        id: record.id,
        status: record.fields.status,
        application: record.fields.application,
        username: record.fields.username,
        license_type: record.fields.license_type,
        created_on: record.fields.created_on,
        expires_on: record.fields.expires_on,
        enabled_features: record.fields.enabled_features,
    }
}

/// Escapes a value for interpolation into a single-quoted formula string.
fn escape_formula_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
