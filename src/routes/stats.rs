use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::models::AppState;
use crate::stats::StatsResponse;
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/stats", get(active_stats))
        .route("/api/sheets/{id}/stats", get(sheet_stats))
        .with_state(state)
}

/// Stats of the active sheet; all zeros when nothing is open.
async fn active_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let response = state
        .session
        .read(|ws| match ws.active() {
            Some(sheet) => StatsResponse::new(Some(sheet.id.clone()), &sheet.leads),
            None => StatsResponse::new(None, &[]),
        })
        .await;
    Json(response)
}

async fn sheet_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<StatsResponse>> {
    let sheet = state.session.sheet(&id).await?;
    Ok(Json(StatsResponse::new(Some(sheet.id), &sheet.leads)))
}
