//! HTTP Routes
//!
//! - `/` - the explorer page
//! - `/api/query` - upload a database and (optionally) ask a question
//! - `/api/health` - health check

pub mod health;
pub mod query;
pub mod ui;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(ui::router(state.clone()))
        .merge(query::router(state.clone()))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
}
