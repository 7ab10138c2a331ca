//! Sheet lifecycle endpoints
//!
//! - POST /api/sheets/import/url - Import a shared Google Sheet
//! - POST /api/sheets/import/csv - Import pasted CSV text
//! - POST /api/sheets/import/file - Upload a CSV or spreadsheet (multipart)
//! - POST /api/sheets/demo - Load the bundled demo leads
//! - GET /api/sheets - List open sheets
//! - PUT /api/sheets/active - Switch the active sheet
//! - DELETE /api/sheets/{id} - Close a sheet
//! - POST /api/sheets/{id}/refresh - Re-fetch a URL-imported sheet
//! - GET /api/sheets/{id}/export - Download as CSV

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::info;

use crate::dashboard;
use crate::export::{export_csv, todays_export_file_name};
use crate::models::{
    AppState, ImportCsvRequest, ImportResponse, ImportUrlRequest, SetActiveRequest, SheetSummary,
    SheetsResponse,
};
use crate::types::{AppError, AppResult};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sheets", get(list_sheets))
        .route("/api/sheets/active", put(set_active))
        .route("/api/sheets/import/url", post(import_url))
        .route("/api/sheets/import/csv", post(import_csv))
        .route(
            "/api/sheets/import/file",
            post(import_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/sheets/demo", post(import_demo))
        .route("/api/sheets/{id}", delete(close_sheet))
        .route("/api/sheets/{id}/refresh", post(refresh_sheet))
        .route("/api/sheets/{id}/export", get(export_sheet))
        .with_state(state)
}

fn created(response: ImportResponse) -> (StatusCode, Json<ImportResponse>) {
    let status = if response.reused {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (status, Json(response))
}

async fn list_sheets(State(state): State<AppState>) -> Json<SheetsResponse> {
    let response = state
        .session
        .read(|ws| SheetsResponse {
            active_sheet_id: ws.active_sheet_id().map(str::to_string),
            sheets: ws.summaries(),
        })
        .await;
    Json(response)
}

async fn set_active(
    State(state): State<AppState>,
    Json(request): Json<SetActiveRequest>,
) -> AppResult<Json<SheetsResponse>> {
    state.session.write(|ws| ws.set_active(&request.sheet_id)).await?;
    Ok(list_sheets(State(state)).await)
}

async fn import_url(
    State(state): State<AppState>,
    Json(request): Json<ImportUrlRequest>,
) -> AppResult<impl IntoResponse> {
    info!(url = %request.url, "Sheet URL import requested");
    Ok(created(dashboard::import_from_url(&state, request).await?))
}

async fn import_csv(
    State(state): State<AppState>,
    Json(request): Json<ImportCsvRequest>,
) -> AppResult<impl IntoResponse> {
    Ok(created(dashboard::import_csv(&state, request).await?))
}

async fn import_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("Malformed upload: {}", e)))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidRequest(format!("Malformed upload: {}", e)))?;
                upload = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidRequest(format!("Malformed name field: {}", e)))?;
                name = Some(text);
            }
            _ => {}
        }
    }

    let (file_name, content_type, bytes) = upload
        .ok_or_else(|| AppError::InvalidRequest("multipart field 'file' is required".to_string()))?;
    info!(file_name = %file_name, size = bytes.len(), "File upload received");

    let response =
        dashboard::import_file(&state, &file_name, content_type.as_deref(), &bytes, name).await?;
    Ok(created(response))
}

async fn import_demo(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(created(dashboard::import_demo(&state).await?))
}

async fn close_sheet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .session
        .write(|ws| ws.close(&id))
        .await
        .ok_or_else(|| AppError::NotFound(format!("sheet {}", id)))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_sheet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SheetSummary>> {
    Ok(Json(dashboard::refresh_sheet(&state, &id).await?))
}

async fn export_sheet(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let sheet = state.session.sheet(&id).await?;
    let body = export_csv(&sheet.leads)?;
    let disposition = format!("attachment; filename=\"{}\"", todays_export_file_name());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
