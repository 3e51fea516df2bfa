use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::session::Session;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The authenticated session for the current request, injected by
/// [`require_session`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

#[derive(Debug, Serialize)]
struct GuardErrorBody {
    success: bool,
    code: &'static str,
    message: &'static str,
}

fn guard_error(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    (
        status,
        Json(GuardErrorBody {
            success: false,
            code,
            message,
        }),
    )
        .into_response()
}

fn auth_required() -> Response {
    guard_error(
        StatusCode::UNAUTHORIZED,
        "auth_required",
        "authentication required",
    )
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware gating protected routes on a live session.
///
/// A missing, unknown or idle-expired bearer token yields 401
/// `auth_required`; otherwise the (refreshed) session is injected as
/// [`CurrentUser`].
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(req.headers().get(AUTHORIZATION)) else {
        return auth_required();
    };

    let timeout = Duration::from_secs(state.config.session_timeout_secs);
    match state.sessions.authenticate(token, timeout).await {
        Some(session) => {
            req.extensions_mut().insert(CurrentUser(session));
            next.run(req).await
        }
        None => auth_required(),
    }
}

/// Middleware gating license-protected routes, layered inside
/// [`require_session`].
///
/// Entitlement is orthogonal to authentication: a live session without an
/// active license gets 403 `license_denied`, never 401. A failed check (the
/// record store being unreachable) is reported as unavailable rather than
/// being conflated with a denial.
pub async fn require_license(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(CurrentUser(session)) = req.extensions().get::<CurrentUser>().cloned() else {
        return auth_required();
    };

    match state
        .airtable
        .active_license(&session.user_id, &state.config.app_name)
        .await
    {
        Ok(check) if check.is_active() => next.run(req).await,
        Ok(_) => guard_error(
            StatusCode::FORBIDDEN,
            "license_denied",
            "no active license for this application",
        ),
        Err(e) => {
            tracing::error!(error = %e, user_id = %session.user_id, "license check failed");
            guard_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream_unavailable",
                "license service unavailable",
            )
        }
    }
}

pub fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}
