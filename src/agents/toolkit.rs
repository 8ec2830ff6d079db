//! SQL Toolkit
//!
//! The capability bundle handed to the agent: schema introspection and query
//! execution over one staged database, plus an LLM-backed query checker.

use std::sync::Arc;

use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::db::DatabaseOperations;
use crate::llm::LLMAdapter;
use crate::types::{AppResult, LLMMessage, LLMRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlTool {
    ListTables,
    Schema,
    Query,
    QueryChecker,
}

impl SqlTool {
    pub const ALL: [SqlTool; 4] = [
        SqlTool::Query,
        SqlTool::Schema,
        SqlTool::ListTables,
        SqlTool::QueryChecker,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SqlTool::ListTables => "sql_db_list_tables",
            SqlTool::Schema => "sql_db_schema",
            SqlTool::Query => "sql_db_query",
            SqlTool::QueryChecker => "sql_db_query_checker",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SqlTool::ListTables => {
                "Input is an empty string, output is a comma-separated list of tables in the database."
            }
            SqlTool::Schema => {
                "Input is a comma-separated list of tables, output is the schema and sample rows for those tables. \
                 Be sure the tables exist by calling sql_db_list_tables first! Example Input: table1, table2, table3"
            }
            SqlTool::Query => {
                "Input is a detailed and correct SQL query, output is a result from the database. \
                 If the query is not correct, an error message will be returned. If an error is returned, \
                 rewrite the query, check the query, and try again. If you encounter an issue with an unknown \
                 column, use sql_db_schema to query the correct table fields."
            }
            SqlTool::QueryChecker => {
                "Use this tool to double check if your query is correct before executing it. \
                 Always use this tool before executing a query with sql_db_query!"
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_matches('`').trim();
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }
}

pub struct SqlToolkit {
    pool: SqlitePool,
    llm: Arc<dyn LLMAdapter>,
    model: String,
    max_rows: usize,
    sample_rows: usize,
}

impl SqlToolkit {
    pub fn new(
        pool: SqlitePool,
        llm: Arc<dyn LLMAdapter>,
        model: impl Into<String>,
        config: &DatabaseConfig,
    ) -> Self {
        Self {
            pool,
            llm,
            model: model.into(),
            max_rows: config.max_rows,
            sample_rows: config.sample_rows,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tools(&self) -> &'static [SqlTool] {
        &SqlTool::ALL
    }

    /// One `name: description` line per tool, for the agent prompt
    pub fn describe_tools(&self) -> String {
        self.tools()
            .iter()
            .map(|t| format!("{}: {}", t.name(), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run a tool and produce the observation text shown to the agent.
    ///
    /// Database failures become `Error: ...` observations so the agent can
    /// correct its query. LLM failures in the checker are returned as errors.
    pub async fn invoke(&self, tool: SqlTool, input: &str) -> AppResult<String> {
        debug!(tool = tool.name(), input_len = input.len(), "Invoking SQL tool");

        let observation = match tool {
            SqlTool::ListTables => match DatabaseOperations::list_tables(&self.pool).await {
                Ok(tables) => tables.join(", "),
                Err(e) => format!("Error: {}", e),
            },
            SqlTool::Schema => {
                let tables: Vec<String> = input
                    .split(',')
                    .map(|t| t.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
                match DatabaseOperations::table_info(&self.pool, &tables, self.sample_rows).await {
                    Ok(info) => info,
                    Err(e) => format!("Error: {}", e),
                }
            }
            SqlTool::Query => {
                match DatabaseOperations::run_query(&self.pool, input, self.max_rows).await {
                    Ok(output) => output.render(),
                    Err(e) => format!("Error: {}", e),
                }
            }
            SqlTool::QueryChecker => self.check_query(input).await?,
        };

        Ok(observation)
    }

    async fn check_query(&self, query: &str) -> AppResult<String> {
        let prompt = format!(
            r#"{query}

Review the SQLite query above for common mistakes:
- NOT IN against a subquery that may return NULL
- UNION where UNION ALL was intended
- BETWEEN used for an exclusive range
- mismatched data types in predicates
- unquoted identifiers that need quoting
- wrong number of arguments to a function
- missing casts to the correct type
- joining on the wrong columns

If you find any of these, rewrite the query. Otherwise reproduce the original query unchanged.

Respond with the SQL query only."#,
            query = query
        );

        let request = LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(prompt)],
            max_tokens: None,
            temperature: Some(0.0),
            stop: None,
        };

        let response = self.llm.create_chat_completion(&request).await?;
        Ok(strip_code_fence(&response.content))
    }
}

/// Remove a surrounding markdown code fence, if any
pub(crate) fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ScriptedLLM;
    use crate::db::{open_staged, test_support};
    use tempfile::TempDir;

    fn db_config() -> DatabaseConfig {
        DatabaseConfig {
            read_only: true,
            max_rows: 50,
            sample_rows: 2,
        }
    }

    async fn toolkit(dir: &TempDir, llm: Arc<ScriptedLLM>) -> SqlToolkit {
        let path = test_support::create_sample_db(dir.path(), "toolkit.db").await;
        let pool = open_staged(&path, &db_config()).await.unwrap();
        SqlToolkit::new(pool, llm, "test-model", &db_config())
    }

    #[test]
    fn test_tool_names_round_trip() {
        for tool in SqlTool::ALL {
            assert_eq!(SqlTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(SqlTool::from_name(" `sql_db_query` "), Some(SqlTool::Query));
        assert_eq!(SqlTool::from_name("drop_everything"), None);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fence("```\nSELECT 2\n```"), "SELECT 2");
        assert_eq!(strip_code_fence("  SELECT 3  "), "SELECT 3");
    }

    #[tokio::test]
    async fn test_list_tables_tool() {
        let dir = TempDir::new().unwrap();
        let kit = toolkit(&dir, Arc::new(ScriptedLLM::new(Vec::<&str>::new()))).await;

        let observation = kit.invoke(SqlTool::ListTables, "").await.unwrap();
        assert_eq!(observation, "big_orders, customers, orders");
    }

    #[tokio::test]
    async fn test_schema_tool_accepts_quoted_names() {
        let dir = TempDir::new().unwrap();
        let kit = toolkit(&dir, Arc::new(ScriptedLLM::new(Vec::<&str>::new()))).await;

        let observation = kit.invoke(SqlTool::Schema, "'customers', orders").await.unwrap();
        assert!(observation.contains("CREATE TABLE customers"));
        assert!(observation.contains("CREATE TABLE orders"));
        assert!(observation.contains("2 rows from orders table:"));
    }

    #[tokio::test]
    async fn test_query_errors_become_observations() {
        let dir = TempDir::new().unwrap();
        let kit = toolkit(&dir, Arc::new(ScriptedLLM::new(Vec::<&str>::new()))).await;

        let observation = kit.invoke(SqlTool::Query, "SELECT nope FROM customers").await.unwrap();
        assert!(observation.starts_with("Error:"));

        let observation = kit.invoke(SqlTool::Schema, "ghosts").await.unwrap();
        assert!(observation.starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_query_tool() {
        let dir = TempDir::new().unwrap();
        let kit = toolkit(&dir, Arc::new(ScriptedLLM::new(Vec::<&str>::new()))).await;

        let observation = kit
            .invoke(SqlTool::Query, "SELECT country, COUNT(*) AS n FROM customers WHERE country = 'NO' GROUP BY country")
            .await
            .unwrap();
        assert_eq!(observation, "country | n\nNO | 2");
    }

    #[tokio::test]
    async fn test_query_checker_uses_llm_at_zero_temperature() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new(["```sql\nSELECT COUNT(*) FROM customers\n```"]));
        let kit = toolkit(&dir, llm.clone()).await;

        let observation = kit
            .invoke(SqlTool::QueryChecker, "SELECT COUNT(*) FROM customers")
            .await
            .unwrap();
        assert_eq!(observation, "SELECT COUNT(*) FROM customers");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(0.0));
        assert!(requests[0].messages[0].content.contains("SELECT COUNT(*) FROM customers"));
    }

    #[tokio::test]
    async fn test_query_checker_propagates_llm_failure() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new(Vec::<&str>::new()));
        let kit = toolkit(&dir, llm).await;

        assert!(kit.invoke(SqlTool::QueryChecker, "SELECT 1").await.is_err());
    }
}
