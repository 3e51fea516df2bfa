//! Lead CSV upload and report downloads (license-gated).

use std::path::PathBuf;

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use leadlens_core::aggregate::AggregateError;
use leadlens_core::export::{
    write_detail_csv, write_summary_csv, DETAIL_FILE_NAME, SUMMARY_FILE_NAME,
};
use leadlens_core::{analyze_csv, Aggregation};
use serde_json::json;
use uuid::Uuid;

use crate::api::{ApiError, AppState};

const CHART_TOP_N: usize = 10;

/// `POST /api/reports/upload`.
///
/// Accepts a multipart form with a `file` field holding the lead CSV,
/// analyzes it, persists the raw upload for later report downloads, and
/// returns the per-term summary plus chart data.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_owned();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("failed to read upload: {e}")))?;
        upload = Some((file_name, data.to_vec()));
        break;
    }

    let Some((file_name, data)) = upload else {
        return Err(ApiError::validation("no file field in upload"));
    };
    if !file_name.to_lowercase().ends_with(".csv") {
        return Err(ApiError::validation("only .csv files are accepted"));
    }
    if data.is_empty() {
        return Err(ApiError::validation("uploaded file is empty"));
    }

    let aggregation = analyze_csv(&data).map_err(map_aggregate_error)?;

    let saved_path = persist_upload(&state, &file_name, &data).await?;
    *state.latest_upload.lock().await = Some(saved_path);

    tracing::info!(
        file_name = %file_name,
        total_rows = aggregation.counts.total_rows,
        rows_with_utm_term = aggregation.counts.rows_with_utm_term,
        "lead file analyzed"
    );

    Ok(Json(upload_response(&aggregation)))
}

/// `GET /api/reports/download/{file}`.
///
/// `file` must be one of the two fixed export names. The report is
/// re-derived from the most recent upload, so downloads always reflect the
/// file the client just analyzed.
pub async fn download(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    if file != SUMMARY_FILE_NAME && file != DETAIL_FILE_NAME {
        return Err(ApiError::validation("unknown report name"));
    }

    let source = state
        .latest_upload
        .lock()
        .await
        .clone()
        .ok_or_else(|| ApiError::not_found("no file uploaded yet"))?;

    let data = tokio::fs::read(&source).await.map_err(|e| {
        tracing::error!(error = %e, path = %source.display(), "stored upload unreadable");
        ApiError::new("upstream_unavailable", "stored upload is unreadable")
    })?;
    let aggregation = analyze_csv(&data).map_err(map_aggregate_error)?;

    let body = if file == SUMMARY_FILE_NAME {
        write_summary_csv(&aggregation.summary)
    } else {
        write_detail_csv(&aggregation.detail)
    }
    .map_err(|e| {
        tracing::error!(error = %e, "report rendering failed");
        ApiError::new("upstream_unavailable", "report rendering failed")
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file}\""),
            ),
        ],
        body,
    )
        .into_response())
}

/// Analysis failures are the uploader's problem: a missing source column or
/// a file with no qualifying rows both come back as 400 with the reason.
fn map_aggregate_error(error: AggregateError) -> ApiError {
    ApiError::validation(error.to_string())
}

async fn persist_upload(
    state: &AppState,
    original_name: &str,
    data: &[u8],
) -> Result<PathBuf, ApiError> {
    let dir = &state.config.upload_dir;
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        tracing::error!(error = %e, dir = %dir.display(), "cannot create upload dir");
        ApiError::new("upstream_unavailable", "upload storage unavailable")
    })?;

    // Unique per request so concurrent uploads never clobber each other.
    let path = dir.join(format!("{}_{}", Uuid::new_v4(), sanitize_name(original_name)));
    tokio::fs::write(&path, data).await.map_err(|e| {
        tracing::error!(error = %e, path = %path.display(), "cannot store upload");
        ApiError::new("upstream_unavailable", "upload storage unavailable")
    })?;
    Ok(path)
}

/// Strips path separators and shell-hostile characters from a client-supplied
/// file name before it touches the filesystem.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "upload.csv".to_owned()
    } else {
        cleaned
    }
}

fn upload_response(aggregation: &Aggregation) -> serde_json::Value {
    let top = &aggregation.summary[..aggregation.summary.len().min(CHART_TOP_N)];
    let labels: Vec<&str> = top.iter().map(|entry| entry.utm_term.as_str()).collect();
    let values: Vec<usize> = top.iter().map(|entry| entry.lead_count).collect();

    json!({
        "success": true,
        "message": "file analyzed",
        "counts": {
            "total_rows": aggregation.counts.total_rows,
            "rows_with_utm_term": aggregation.counts.rows_with_utm_term,
            "unique_creatives": aggregation.counts.unique_creatives,
        },
        "summary": aggregation.summary,
        "chart": { "labels": labels, "values": values },
        "downloads": [SUMMARY_FILE_NAME, DETAIL_FILE_NAME],
    })
}
