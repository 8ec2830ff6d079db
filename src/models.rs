use std::sync::Arc;

use axum::http::StatusCode;

use crate::agents::QueryOutcome;
use crate::config::Config;
use crate::llm::LLMConnector;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub connector: Arc<dyn LLMConnector>,
}

impl AppState {
    pub fn new(config: Config, connector: Arc<dyn LLMConnector>) -> Self {
        Self { config, connector }
    }
}

// API Request/Response types

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Staging, connection or agent construction failed
    Setup,
    /// The agent failed while answering
    Execution,
}

/// Body of `POST /api/query`
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryResponse {
    Idle,
    Success { result: String },
    Error { kind: FailureKind, message: String },
}

impl QueryResponse {
    pub fn setup_error(message: impl Into<String>) -> Self {
        QueryResponse::Error {
            kind: FailureKind::Setup,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            QueryResponse::Idle | QueryResponse::Success { .. } => StatusCode::OK,
            QueryResponse::Error { kind: FailureKind::Setup, .. } => StatusCode::UNPROCESSABLE_ENTITY,
            QueryResponse::Error { kind: FailureKind::Execution, .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        match outcome {
            QueryOutcome::Idle => QueryResponse::Idle,
            QueryOutcome::Answered(result) => QueryResponse::Success { result },
            QueryOutcome::SetupFailed(message) => QueryResponse::setup_error(message),
            QueryOutcome::ExecutionFailed(message) => QueryResponse::Error {
                kind: FailureKind::Execution,
                message,
            },
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub llm_provider: String,
    pub model: String,
}
