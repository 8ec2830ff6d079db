// SQLite Explorer - ask questions about an uploaded SQLite database in plain language

pub mod config;
pub mod db;
pub mod models;
pub mod types;
pub mod agents;
pub mod llm;
pub mod storage;   // Staging of uploaded database files
pub mod routes;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
