// LeadGenie - lead pipeline backend over imported spreadsheets

pub mod assist;
pub mod config;
pub mod dashboard;
pub mod export;
pub mod ingest;
pub mod library;
pub mod middleware;
pub mod models;
pub mod query;
pub mod routes;
pub mod session;
pub mod sheets;
pub mod stats;
pub mod sync;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
