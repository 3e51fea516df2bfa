//! Profile and preference endpoints for the current session's user.

use axum::{extract::State, Extension, Json};
use leadlens_airtable::PreferenceUpdate;
use serde::Deserialize;
use serde_json::json;

use crate::api::{map_airtable_error, ApiError, AppState};
use crate::middleware::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    email: Option<String>,
    nome: Option<String>,
    cognome: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PreferenceUpdateRequest {
    theme: Option<String>,
    json_pref: Option<String>,
}

/// `GET /api/users/profile`.
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(session)): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let profile = state
        .airtable
        .get_user_profile(&session.record_id)
        .await
        .map_err(|e| map_airtable_error(&e))?;

    let preferences = match state.airtable.get_user_preferences(&session.user_id).await {
        Ok(prefs) => prefs,
        Err(e) => {
            tracing::warn!(error = %e, "preference lookup failed");
            None
        }
    };

    Ok(Json(json!({
        "success": true,
        "profile": profile,
        "preferences": preferences,
    })))
}

/// `PUT /api/users/profile`.
///
/// Only the allow-listed fields are forwarded to the store; anything else in
/// the body is rejected by the typed extractor before it gets here.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(session)): Extension<CurrentUser>,
    Json(body): Json<ProfileUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut fields = serde_json::Map::new();
    if let Some(email) = body.email {
        fields.insert("Email".to_owned(), email.into());
    }
    if let Some(nome) = body.nome {
        fields.insert("Nome".to_owned(), nome.into());
    }
    if let Some(cognome) = body.cognome {
        fields.insert("Cognome".to_owned(), cognome.into());
    }
    if fields.is_empty() {
        return Err(ApiError::validation("no updatable fields provided"));
    }

    state
        .airtable
        .update_user_profile(&session.record_id, fields)
        .await
        .map_err(|e| map_airtable_error(&e))?;

    Ok(Json(json!({ "success": true, "message": "profile updated" })))
}

/// `GET /api/users/preferences`. 404 when the user has no preference record.
pub async fn get_preferences(
    State(state): State<AppState>,
    Extension(CurrentUser(session)): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let preferences = state
        .airtable
        .get_user_preferences(&session.user_id)
        .await
        .map_err(|e| map_airtable_error(&e))?
        .ok_or_else(|| ApiError::not_found("no preferences stored for this user"))?;

    Ok(Json(json!({ "success": true, "preferences": preferences })))
}

/// `PUT /api/users/preferences`.
///
/// The JSON blob is stored as an opaque string but must at least parse, so a
/// broken client cannot poison the record for every later reader.
pub async fn update_preferences(
    State(state): State<AppState>,
    Extension(CurrentUser(session)): Extension<CurrentUser>,
    Json(body): Json<PreferenceUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.theme.is_none() && body.json_pref.is_none() {
        return Err(ApiError::validation(
            "at least one of theme or json_pref is required",
        ));
    }

    if let Some(blob) = body.json_pref.as_deref() {
        if serde_json::from_str::<serde_json::Value>(blob).is_err() {
            return Err(ApiError::validation("json_pref is not well-formed JSON"));
        }
    }

    let update = PreferenceUpdate {
        theme: body.theme,
        json_pref: body.json_pref,
    };
    state
        .airtable
        .update_user_preferences(&session.user_id, &update)
        .await
        .map_err(|e| map_airtable_error(&e))?;

    Ok(Json(json!({ "success": true, "message": "preferences updated" })))
}
