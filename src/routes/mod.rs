//! API Routes
//!
//! This module organizes all HTTP endpoints for the application:
//! - `/api/health` - Health checks
//! - `/api/sheets` - Import, list, switch, close, refresh and export sheets
//! - `/api/sheets/{id}/leads` - Lead search, detail, edits and write-back
//! - `/api/stats`, `/api/sheets/{id}/stats` - Funnel statistics
//! - `/api/library` - Saved sheet sources per user

pub mod health;
pub mod leads;
pub mod library;
pub mod sheets;
pub mod stats;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::apply_cors;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let allowed_origins = state.config.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .merge(health::router(state.clone()))
        .merge(sheets::router(state.clone()))
        .merge(leads::router(state.clone()))
        .merge(stats::router(state.clone()))
        .merge(library::router(state));

    apply_cors(api_router, &allowed_origins).layer(TraceLayer::new_for_http())
}
