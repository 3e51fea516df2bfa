//! Login, logout and session introspection.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::{map_airtable_error, ApiError, AppState};
use crate::middleware::{extract_bearer_token, CurrentUser};
use crate::session::Session;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

/// `POST /api/auth/login`.
///
/// Verifies credentials against the record store and mints a bearer token.
/// Preferences are attached opportunistically: a failed preference lookup is
/// logged and reported as `null`, never a login failure.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::validation("username and password are required"));
    }

    let user = state
        .airtable
        .find_user(username, &body.password)
        .await
        .map_err(|e| map_airtable_error(&e))?
        .ok_or_else(|| ApiError::new("auth_required", "invalid username or password"))?;

    let session = state.sessions.create(&user, "user").await;
    tracing::info!(username = %session.username, "user logged in");

    let preferences = match state.airtable.get_user_preferences(&session.user_id).await {
        Ok(prefs) => prefs,
        Err(e) => {
            tracing::warn!(error = %e, "preference lookup failed during login");
            None
        }
    };

    Ok(Json(json!({
        "success": true,
        "token": session.token,
        "user": user_summary(&session),
        "preferences": preferences,
    })))
}

/// `POST /api/auth/logout`. Always succeeds for a live session.
pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentUser(session)): Extension<CurrentUser>,
) -> Json<serde_json::Value> {
    state.sessions.remove(&session.token).await;
    tracing::info!(username = %session.username, "user logged out");
    Json(json!({ "success": true, "message": "logged out" }))
}

/// `GET /api/auth/check-session`.
///
/// Public route: it answers the question "is this token alive" instead of
/// rejecting outright, so the token is pulled from the header by hand rather
/// than through the session guard.
pub async fn check_session(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = extract_bearer_token(req.headers().get(AUTHORIZATION))
        .ok_or_else(|| ApiError::new("auth_required", "authentication required"))?;

    let timeout = std::time::Duration::from_secs(state.config.session_timeout_secs);
    let session = state
        .sessions
        .authenticate(token, timeout)
        .await
        .ok_or_else(|| ApiError::new("auth_required", "session expired or unknown"))?;

    Ok(Json(json!({
        "success": true,
        "authenticated": true,
        "user": user_summary(&session),
    })))
}

fn user_summary(session: &Session) -> serde_json::Value {
    json!({
        "user_id": session.user_id,
        "record_id": session.record_id,
        "username": session.username,
        "role": session.role,
    })
}
