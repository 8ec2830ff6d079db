//! Agent System
//!
//! Everything that happens for one upload-and-ask interaction:
//!
//! - **Staging**: the uploaded bytes go to a unique temporary file
//! - **Session**: a database handle, an LLM client, the SQL toolkit and the
//!   agent are composed over that file
//! - **Query**: the agent answers the question (skipped when it is blank)
//! - **Cleanup**: the pool is closed and the staged file removed
//!
//! ```text
//! upload ──► stage ──► build session ──► answer ──► close ──► remove file
//!              │             │              │
//!              └── setup ────┘          execution
//!                  failure               failure
//! ```

pub mod session;
pub mod sql_agent;
pub mod toolkit;

pub use session::AgentSession;
pub use sql_agent::{AgentOptions, SqlAgent};
pub use toolkit::{SqlTool, SqlToolkit};

use std::time::Instant;

use tracing::{error, info};

use crate::config::Config;
use crate::llm::LLMConnector;
use crate::storage::{FileStager, StagedFile};

/// What one interaction produced, ready to be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The database was accepted but no question was asked
    Idle,
    Answered(String),
    SetupFailed(String),
    ExecutionFailed(String),
}

/// Stage the upload, wire a session, answer the question, clean up.
///
/// Never returns an error: every failure is logged where it is caught and
/// turned into a [`QueryOutcome`]. The staged file is removed on every path.
pub async fn execute_query_pipeline(
    filename: &str,
    bytes: &[u8],
    question: &str,
    config: &Config,
    connector: &dyn LLMConnector,
) -> QueryOutcome {
    info!(filename = %filename, size = bytes.len(), "Starting query pipeline");

    let stager = FileStager::new(&config.staging);
    let staged = match stager.stage(filename, bytes) {
        Ok(staged) => staged,
        Err(e) => {
            error!(error = %e, filename = %filename, "Failed to stage upload");
            return QueryOutcome::SetupFailed(e.to_string());
        }
    };

    let outcome = run_session(&staged, question, config, connector).await;
    staged.cleanup();
    outcome
}

async fn run_session(
    staged: &StagedFile,
    question: &str,
    config: &Config,
    connector: &dyn LLMConnector,
) -> QueryOutcome {
    let session = match AgentSession::build(staged.path(), config, connector).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, filename = %staged.original_name(), "Failed to set up session");
            return QueryOutcome::SetupFailed(e.to_string());
        }
    };

    let question = question.trim();
    if question.is_empty() {
        info!(tables = session.tables().len(), "No question submitted, skipping agent");
        session.close().await;
        return QueryOutcome::Idle;
    }

    let started = Instant::now();
    let outcome = match session.answer(question).await {
        Ok(answer) => {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                answer_len = answer.len(),
                "Question answered"
            );
            QueryOutcome::Answered(answer)
        }
        Err(e) => {
            error!(error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "Agent failed");
            QueryOutcome::ExecutionFailed(e.to_string())
        }
    };

    session.close().await;
    outcome
}
