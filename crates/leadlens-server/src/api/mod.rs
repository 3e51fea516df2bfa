mod auth;
mod licenses;
mod reports;
mod users;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use leadlens_airtable::{AirtableClient, AirtableError};
use leadlens_core::AppConfig;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::{request_id, require_license, require_session};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub airtable: Arc<AirtableClient>,
    pub sessions: SessionStore,
    /// Path of the most recently uploaded file; report downloads re-derive
    /// their data from it.
    pub latest_upload: Arc<Mutex<Option<PathBuf>>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, airtable: Arc<AirtableClient>) -> Self {
        Self {
            config,
            airtable,
            sessions: SessionStore::new(),
            latest_upload: Arc::new(Mutex::new(None)),
        }
    }
}

/// JSON error in the `{success, code, message}` envelope the frontend
/// consumes; the HTTP status follows from the code.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code.as_str() {
            "validation_error" => StatusCode::BAD_REQUEST,
            "auth_required" => StatusCode::UNAUTHORIZED,
            "license_denied" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Every record-store failure collapses to one client-facing outcome; the
/// detail lands in the logs, not the response. The only exception is a
/// record-addressed 404, which is a legitimate "not found".
pub(super) fn map_airtable_error(error: &AirtableError) -> ApiError {
    if let AirtableError::Http(e) = error {
        if e.status() == Some(reqwest::StatusCode::NOT_FOUND) {
            return ApiError::not_found("record not found");
        }
    }
    tracing::error!(error = %error, "record store call failed");
    ApiError::new("upstream_unavailable", "record store unavailable")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn session_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/licenses/verify",
            get(licenses::verify).post(licenses::verify_post),
        )
        .route("/api/licenses/list", get(licenses::list))
        .route("/api/licenses/check-features", post(licenses::check_features))
        .route(
            "/api/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route(
            "/api/users/preferences",
            get(users::get_preferences).put(users::update_preferences),
        )
        .layer(axum::middleware::from_fn_with_state(state, require_session))
}

fn license_router(state: AppState) -> Router<AppState> {
    let max_upload = state.config.max_upload_bytes;
    Router::new()
        .route("/api/reports/upload", post(reports::upload))
        .route("/api/reports/download/{file}", get(reports::download))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    require_session,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state,
                    require_license,
                )),
        )
}

pub fn build_app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/check-session", get(auth::check_session));

    Router::new()
        .merge(public_routes)
        .merge(session_router(state.clone()))
        .merge(license_router(state.clone()))
        .layer(axum::middleware::from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors())
        .with_state(state)
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "success": true,
        "status": "ok",
        "app_name": state.config.app_name,
        "version": state.config.app_version,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use leadlens_core::export::{DETAIL_FILE_NAME, SUMMARY_FILE_NAME};
    use leadlens_core::Environment;
    use tower::ServiceExt;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_BASE_ID: &str = "appTEST";
    const TEST_APP_NAME: &str = "Estrattore UTM Term";

    #[test]
    fn validation_error_maps_to_bad_request() {
        let response = ApiError::validation("bad input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn auth_required_maps_to_unauthorized() {
        let response = ApiError::new("auth_required", "nope").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn license_denied_maps_to_forbidden() {
        let response = ApiError::new("license_denied", "nope").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn unknown_code_maps_to_internal_error() {
        let response = ApiError::new("upstream_unavailable", "boom").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    fn test_state(store_url: &str, session_timeout_secs: u64) -> AppState {
        let config = Arc::new(AppConfig {
            env: Environment::Test,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_owned(),
            app_name: TEST_APP_NAME.to_owned(),
            app_version: "0.0.0-test".to_owned(),
            airtable_api_key: "test-key".to_owned(),
            airtable_base_id: TEST_BASE_ID.to_owned(),
            airtable_timeout_secs: 5,
            session_timeout_secs,
            max_upload_bytes: 16 * 1024 * 1024,
            upload_dir: std::env::temp_dir().join(format!("leadlens-test-{}", Uuid::new_v4())),
        });
        let airtable = Arc::new(
            AirtableClient::with_base_url("test-key", TEST_BASE_ID, 5, store_url)
                .expect("test client"),
        );
        AppState::new(config, airtable)
    }

    async fn mount_user(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(format!("/{TEST_BASE_ID}/Utenti")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [{
                    "id": "recUSER1",
                    "fields": {
                        "user_id": "user-1",
                        "username": "mario.rossi",
                        "password": "s3cret",
                        "Name": "Mario Rossi"
                    }
                }]
            })))
            .mount(server)
            .await;
    }

    async fn mount_licenses(server: &MockServer, status: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/{TEST_BASE_ID}/Licenze")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "records": [{
                    "id": "recLIC1",
                    "fields": {
                        "Stato": status,
                        "Applicazione": TEST_APP_NAME,
                        "Utente_Collegato": ["user-1"],
                        "Funzionalita_Abilitate": ["export_csv"]
                    }
                }]
            })))
            .mount(server)
            .await;
    }

    async fn login(app: &Router) -> String {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"username":"mario.rossi","password":"s3cret"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .expect("login response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        json["token"].as_str().expect("token in body").to_owned()
    }

    const MULTIPART_BOUNDARY: &str = "leadlens-test-boundary";

    fn multipart_csv(file_name: &str, csv: &str) -> (String, Vec<u8>) {
        let content_type = format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}");
        let body = format!(
            "--{MULTIPART_BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
             Content-Type: text/csv\r\n\r\n\
             {csv}\r\n\
             --{MULTIPART_BOUNDARY}--\r\n"
        );
        (content_type, body.into_bytes())
    }

    fn upload_request(token: &str, content_type: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/reports/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).expect("json body")
    }

    const SAMPLE_CSV: &str = "\
SORGENTE,Data,Ora,Email\n\
https://example.it/landing?utm_term=kw-a&utm_campaign=spring&utm_content=ad-1,01/02/2024,09:00,a@example.it\n\
https://example.it/landing?utm_term=kw-a&utm_campaign=spring&utm_content=ad-1,01/02/2024,09:05,b@example.it\n\
https://example.it/landing?utm_term=kw-b&utm_campaign=spring,01/02/2024,09:10,c@example.it\n";

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(test_state("http://127.0.0.1:1", 3600));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["app_name"], TEST_APP_NAME);
    }

    #[tokio::test]
    async fn login_then_check_session_roundtrip() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/check-session")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["authenticated"], true);
        assert_eq!(json["user"]["username"], "mario.rossi");
        assert_eq!(json["user"]["user_id"], "user-1");
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_unauthorized() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        let app = build_app(test_state(&server.uri(), 3600));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"username":"mario.rossi","password":"wrong"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["code"], "auth_required");
    }

    #[tokio::test]
    async fn login_without_credentials_is_a_validation_error() {
        let app = build_app(test_state("http://127.0.0.1:1", 3600));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"username":"","password":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expired_session_yields_auth_required_not_license_denied() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Attivo").await;
        // Zero-second idle window: the token dies between login and use.
        let app = build_app(test_state(&server.uri(), 0));

        let token = login(&app).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let (content_type, body) = multipart_csv("leads.csv", SAMPLE_CSV);
        let response = app
            .oneshot(upload_request(&token, &content_type, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = json_body(response).await;
        assert_eq!(json["code"], "auth_required");
    }

    #[tokio::test]
    async fn upload_without_active_license_is_forbidden() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Scaduto").await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        let (content_type, body) = multipart_csv("leads.csv", SAMPLE_CSV);
        let response = app
            .oneshot(upload_request(&token, &content_type, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = json_body(response).await;
        assert_eq!(json["code"], "license_denied");
    }

    #[tokio::test]
    async fn upload_then_download_both_reports() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Attivo").await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        let (content_type, body) = multipart_csv("leads.csv", SAMPLE_CSV);
        let response = app
            .clone()
            .oneshot(upload_request(&token, &content_type, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["counts"]["total_rows"], 3);
        assert_eq!(json["counts"]["rows_with_utm_term"], 3);
        assert_eq!(json["summary"][0]["utm_term"], "kw-a");
        assert_eq!(json["summary"][0]["nome_inserzione"], "ad-1");
        assert_eq!(json["summary"][0]["numero_lead"], 2);
        assert_eq!(json["chart"]["labels"][0], "kw-a");
        assert_eq!(json["chart"]["values"][0], 2);

        for name in [SUMMARY_FILE_NAME, DETAIL_FILE_NAME] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/reports/download/{name}"))
                        .header(header::AUTHORIZATION, format!("Bearer {token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "text/csv; charset=utf-8"
            );
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            assert!(body.starts_with(b"\xef\xbb\xbf"));
        }
    }

    #[tokio::test]
    async fn upload_without_source_column_is_a_validation_error() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Attivo").await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        let (content_type, body) =
            multipart_csv("leads.csv", "Data,Ora,Email\n01/02/2024,09:00,a@example.it\n");
        let response = app
            .oneshot(upload_request(&token, &content_type, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["code"], "validation_error");
    }

    #[tokio::test]
    async fn upload_rejects_non_csv_file_names() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Attivo").await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        let (content_type, body) = multipart_csv("leads.xlsx", SAMPLE_CSV);
        let response = app
            .oneshot(upload_request(&token, &content_type, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_of_unknown_report_name_is_a_validation_error() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Attivo").await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/reports/download/evil.csv")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_before_any_upload_is_not_found() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Attivo").await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/reports/download/{SUMMARY_FILE_NAME}"))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn logout_invalidates_the_token() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/logout")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/check-session")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn license_verify_reports_active_entitlement() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Attivo").await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/licenses/verify")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["license_active"], true);
        assert_eq!(json["license"]["status"], "Attivo");
    }

    #[tokio::test]
    async fn feature_check_tests_array_membership() {
        let server = MockServer::start().await;
        mount_user(&server).await;
        mount_licenses(&server, "Attivo").await;
        let app = build_app(test_state(&server.uri(), 3600));

        let token = login(&app).await;
        for (feature, expected) in [("export_csv", true), ("bulk_import", false)] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/api/licenses/check-features")
                        .header(header::AUTHORIZATION, format!("Bearer {token}"))
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(format!(r#"{{"feature_name":"{feature}"}}"#)))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = json_body(response).await;
            assert_eq!(json["feature_enabled"], expected, "feature {feature}");
        }
    }

    #[tokio::test]
    async fn responses_echo_the_request_id() {
        let app = build_app(test_state("http://127.0.0.1:1", 3600));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }
}
