use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::dashboard;
use crate::models::{AppState, ImportResponse, LibraryItem};
use crate::types::AppResult;

pub fn router(state: AppState) -> Router {
    Router::new()
        // One segment is a user id for GET and an item id for DELETE.
        .route("/api/library/{id}", get(list_items).delete(delete_item))
        .route("/api/library/{user_id}/{item_id}/open", post(open_item))
        .with_state(state)
}

async fn list_items(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<LibraryItem>>> {
    Ok(Json(state.library.list(&user_id).await?))
}

async fn open_item(
    State(state): State<AppState>,
    Path((user_id, item_id)): Path<(String, String)>,
) -> AppResult<Json<ImportResponse>> {
    Ok(Json(dashboard::open_from_library(&state, &user_id, &item_id).await?))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<StatusCode> {
    dashboard::remove_from_library(&state, &item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
