// Session wiring: database handle + LLM client + toolkit + agent, per request

use std::path::Path;

use tracing::{error, info};

use crate::agents::sql_agent::{AgentOptions, SqlAgent};
use crate::agents::toolkit::SqlToolkit;
use crate::config::Config;
use crate::db::{self, DatabaseOperations};
use crate::llm::LLMConnector;
use crate::types::AppResult;

pub struct AgentSession {
    agent: SqlAgent,
    tables: Vec<String>,
}

impl AgentSession {
    /// Compose a fresh agent over the database file at `path`.
    ///
    /// On failure nothing is left open: the pool is closed before returning.
    pub async fn build(
        path: &Path,
        config: &Config,
        connector: &dyn LLMConnector,
    ) -> AppResult<Self> {
        let pool = db::open_staged(path, &config.database).await?;

        let tables = match DatabaseOperations::list_tables(&pool).await {
            Ok(tables) => tables,
            Err(e) => {
                db::close(pool).await;
                return Err(e);
            }
        };

        let llm = match connector.connect(&config.llm) {
            Ok(llm) => llm,
            Err(e) => {
                error!(error = %e, "Failed to construct LLM client");
                db::close(pool).await;
                return Err(e);
            }
        };

        let toolkit = SqlToolkit::new(pool, llm.clone(), config.llm.model.clone(), &config.database);
        let options = AgentOptions::new(config.llm.model.clone(), Some(config.llm.max_tokens), &config.agent);
        let agent = SqlAgent::new(llm, toolkit, options);

        info!(
            tables = tables.len(),
            provider = %config.llm.provider,
            model = %config.llm.model,
            "Agent session ready"
        );

        Ok(Self { agent, tables })
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub async fn answer(&self, question: &str) -> AppResult<String> {
        self.agent.answer(question).await
    }

    pub async fn close(self) {
        db::close(self.agent.toolkit().pool().clone()).await;
    }
}
