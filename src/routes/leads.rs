//! Lead endpoints, scoped to one open sheet
//!
//! - GET /api/sheets/{id}/leads - Search, filter and paginate
//! - GET /api/sheets/{id}/leads/facets - Distinct city/category values
//! - GET /api/sheets/{id}/leads/{lead_id} - One lead
//! - PATCH /api/sheets/{id}/leads/{lead_id} - Update status / sub-status
//! - POST /api/sheets/{id}/leads/{lead_id}/notes - Add a note
//! - POST /api/sheets/{id}/leads/{lead_id}/sync - Push the lead to the sync URL
//! - POST /api/sheets/{id}/leads/{lead_id}/email - Draft a cold outreach email
//! - POST /api/sheets/{id}/leads/{lead_id}/analysis - Suggest how to approach the lead

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};

use crate::assist::{AssistKind, AssistReply};
use crate::dashboard;
use crate::models::{AddNoteRequest, AppState, Lead, LeadEditResponse, UpdateLeadRequest};
use crate::query::{facets, Facets, LeadPage, LeadQuery};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sheets/{id}/leads", get(list_leads))
        .route("/api/sheets/{id}/leads/facets", get(lead_facets))
        .route(
            "/api/sheets/{id}/leads/{lead_id}",
            get(get_lead).patch(update_lead),
        )
        .route("/api/sheets/{id}/leads/{lead_id}/notes", post(add_note))
        .route("/api/sheets/{id}/leads/{lead_id}/sync", post(sync_lead))
        .route("/api/sheets/{id}/leads/{lead_id}/email", post(draft_email))
        .route("/api/sheets/{id}/leads/{lead_id}/analysis", post(analyze_lead))
        .with_state(state)
}

async fn list_leads(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LeadQuery>,
) -> AppResult<Json<LeadPage>> {
    let page = state
        .session
        .read(|ws| {
            let sheet = ws
                .sheet(&id)
                .ok_or_else(|| AppError::NotFound(format!("sheet {}", id)))?;
            query.apply(&sheet.leads)
        })
        .await?;
    Ok(Json(page))
}

async fn lead_facets(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Facets>> {
    let sheet = state.session.sheet(&id).await?;
    Ok(Json(facets(&sheet.leads)))
}

async fn find_lead(state: &AppState, id: &str, lead_id: &str) -> AppResult<Lead> {
    state
        .session
        .read(|ws| ws.sheet(id).and_then(|s| s.lead(lead_id)).cloned())
        .await
        .ok_or_else(|| AppError::NotFound(format!("lead {}", lead_id)))
}

async fn get_lead(
    State(state): State<AppState>,
    Path((id, lead_id)): Path<(String, String)>,
) -> AppResult<Json<Lead>> {
    Ok(Json(find_lead(&state, &id, &lead_id).await?))
}

async fn update_lead(
    State(state): State<AppState>,
    Path((id, lead_id)): Path<(String, String)>,
    Json(request): Json<UpdateLeadRequest>,
) -> AppResult<Json<LeadEditResponse>> {
    Ok(Json(dashboard::update_lead(&state, &id, &lead_id, request).await?))
}

async fn add_note(
    State(state): State<AppState>,
    Path((id, lead_id)): Path<(String, String)>,
    Json(request): Json<AddNoteRequest>,
) -> AppResult<Json<LeadEditResponse>> {
    Ok(Json(dashboard::add_note(&state, &id, &lead_id, request).await?))
}

async fn sync_lead(
    State(state): State<AppState>,
    Path((id, lead_id)): Path<(String, String)>,
) -> AppResult<Json<LeadEditResponse>> {
    Ok(Json(dashboard::sync_lead(&state, &id, &lead_id).await?))
}

async fn draft_email(
    State(state): State<AppState>,
    Path((id, lead_id)): Path<(String, String)>,
) -> AppResult<Json<AssistReply>> {
    let lead = find_lead(&state, &id, &lead_id).await?;
    Ok(Json(state.assist.assist(AssistKind::ColdEmail, &lead).await))
}

async fn analyze_lead(
    State(state): State<AppState>,
    Path((id, lead_id)): Path<(String, String)>,
) -> AppResult<Json<AssistReply>> {
    let lead = find_lead(&state, &id, &lead_id).await?;
    Ok(Json(state.assist.assist(AssistKind::Analysis, &lead).await))
}
