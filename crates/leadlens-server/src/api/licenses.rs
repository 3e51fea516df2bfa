//! License verification and feature-flag checks for the current session.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use leadlens_airtable::LicenseCheck;
use serde::Deserialize;
use serde_json::json;

use crate::api::{map_airtable_error, ApiError, AppState};
use crate::middleware::CurrentUser;

#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    app_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckFeaturesRequest {
    #[serde(default)]
    feature_name: String,
    app_name: Option<String>,
}

/// `GET /api/licenses/verify?app_name=...`.
pub async fn verify(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<VerifyParams>,
) -> Result<Response, ApiError> {
    verify_inner(&state, &current, params.app_name).await
}

/// `POST /api/licenses/verify` with `{app_name}` in the body.
pub async fn verify_post(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(params): Json<VerifyParams>,
) -> Result<Response, ApiError> {
    verify_inner(&state, &current, params.app_name).await
}

/// Verification reports entitlement rather than guarding a resource: an
/// inactive license is a 403 with a descriptive body, not the guard error.
async fn verify_inner(
    state: &AppState,
    CurrentUser(session): &CurrentUser,
    app_name: Option<String>,
) -> Result<Response, ApiError> {
    let app_name = app_name.unwrap_or_else(|| state.config.app_name.clone());
    let check = state
        .airtable
        .active_license(&session.user_id, &app_name)
        .await
        .map_err(|e| map_airtable_error(&e))?;

    match check {
        LicenseCheck::Active(license) => Ok(Json(json!({
            "success": true,
            "license_active": true,
            "app_name": app_name,
            "license": license,
        }))
        .into_response()),
        LicenseCheck::Inactive => Ok((
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": true,
                "license_active": false,
                "app_name": app_name,
                "message": "no active license for this application",
            })),
        )
            .into_response()),
    }
}

/// `GET /api/licenses/list` — every license linked to the user, any app.
pub async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(session)): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let licenses = state
        .airtable
        .list_all_licenses(&session.user_id)
        .await
        .map_err(|e| map_airtable_error(&e))?;

    Ok(Json(json!({
        "success": true,
        "count": licenses.len(),
        "licenses": licenses,
    })))
}

/// `POST /api/licenses/check-features` — membership test against the active
/// license's enabled-features array.
pub async fn check_features(
    State(state): State<AppState>,
    Extension(CurrentUser(session)): Extension<CurrentUser>,
    Json(body): Json<CheckFeaturesRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let feature_name = body.feature_name.trim();
    if feature_name.is_empty() {
        return Err(ApiError::validation("feature_name is required"));
    }

    let app_name = body
        .app_name
        .unwrap_or_else(|| state.config.app_name.clone());
    let check = state
        .airtable
        .active_license(&session.user_id, &app_name)
        .await
        .map_err(|e| map_airtable_error(&e))?;

    match check {
        LicenseCheck::Active(license) => {
            let enabled = license
                .enabled_features
                .iter()
                .any(|feature| feature == feature_name);
            Ok(Json(json!({
                "success": true,
                "feature_name": feature_name,
                "feature_enabled": enabled,
            })))
        }
        LicenseCheck::Inactive => Err(ApiError::new(
            "license_denied",
            "no active license for this application",
        )),
    }
}
