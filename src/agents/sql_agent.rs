//! SQL Agent
//!
//! Answers a natural-language question by letting the model pick toolkit
//! actions in a Thought / Action / Observation loop until it produces a
//! final answer.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::agents::toolkit::{strip_code_fence, SqlTool, SqlToolkit};
use crate::config::AgentConfig;
use crate::llm::LLMAdapter;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest};

const FINAL_ANSWER: &str = "Final Answer:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";
const OPENING_THOUGHT: &str = "I should look at the tables in the database to see what I can query.";

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_iterations: usize,
    pub top_k: usize,
    pub verbose: bool,
}

impl AgentOptions {
    /// Deterministic options: temperature is always zero
    pub fn new(model: impl Into<String>, max_tokens: Option<u32>, config: &AgentConfig) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            max_tokens,
            max_iterations: config.max_iterations,
            top_k: config.top_k,
            verbose: config.verbose,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AgentStep {
    Action { tool: String, input: String },
    Finish(String),
}

pub struct SqlAgent {
    llm: Arc<dyn LLMAdapter>,
    toolkit: SqlToolkit,
    options: AgentOptions,
}

impl SqlAgent {
    pub fn new(llm: Arc<dyn LLMAdapter>, toolkit: SqlToolkit, options: AgentOptions) -> Self {
        Self { llm, toolkit, options }
    }

    pub fn toolkit(&self) -> &SqlToolkit {
        &self.toolkit
    }

    fn tool_names(&self) -> String {
        self.toolkit
            .tools()
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are an agent that answers questions by querying a SQLite database.
Given a question, write a syntactically correct SQLite query, run it, look at the result and answer.
Unless the question asks for a specific number of examples, limit queries to at most {top_k} rows.
Order results by a relevant column to return the most interesting examples.
Only select the columns relevant to the question, never every column of a table.
Only use the tools below and only the information they return to build your answer.
Check each query before running it. If a query fails, rewrite it and try again.
Do not run INSERT, UPDATE, DELETE, DROP or any other statement that modifies the database.
If the question is unrelated to the database, answer "I don't know".

Tools:
{tools}

Use this format:

Question: the question to answer
Thought: what to do next
Action: the tool to use, one of [{tool_names}]
Action Input: the input to the tool
Observation: the tool result
... (Thought/Action/Action Input/Observation can repeat)
Thought: I now know the final answer
Final Answer: the final answer to the question"#,
            top_k = self.options.top_k,
            tools = self.toolkit.describe_tools(),
            tool_names = self.tool_names(),
        )
    }

    fn log_step(&self, label: &str, text: &str) {
        if self.options.verbose {
            info!(step = label, "{}", text);
        } else {
            debug!(step = label, "{}", text);
        }
    }

    /// Answer one question. Blocks until the agent finishes or fails.
    pub async fn answer(&self, question: &str) -> AppResult<String> {
        let system = self.system_prompt();
        let mut scratchpad = String::new();

        for iteration in 0..self.options.max_iterations {
            let request = LLMRequest {
                model: self.options.model.clone(),
                messages: vec![
                    LLMMessage::system(system.clone()),
                    LLMMessage::user(format!(
                        "Question: {}\nThought: {}\n{}",
                        question, OPENING_THOUGHT, scratchpad
                    )),
                ],
                max_tokens: self.options.max_tokens,
                temperature: Some(self.options.temperature),
                stop: Some(vec![format!("\n{}", OBSERVATION)]),
            };

            let reply = self.llm.create_chat_completion(&request).await?.content;
            self.log_step("thought", reply.trim());

            match parse_step(&reply)? {
                AgentStep::Finish(answer) => {
                    info!(iterations = iteration + 1, answer_len = answer.len(), "Agent finished");
                    return Ok(answer);
                }
                AgentStep::Action { tool, input } => {
                    let observation = match SqlTool::from_name(&tool) {
                        Some(sql_tool) => self.toolkit.invoke(sql_tool, &input).await?,
                        None => {
                            warn!(tool = %tool, "Agent requested unknown tool");
                            format!(
                                "{} is not a valid tool, try one of [{}].",
                                tool,
                                self.tool_names()
                            )
                        }
                    };
                    self.log_step("observation", &observation);

                    scratchpad.push_str(&format!(
                        "{}\n{} {}\nThought: ",
                        reply.trim(),
                        OBSERVATION,
                        observation
                    ));
                }
            }
        }

        Err(AppError::Agent(format!(
            "Agent stopped after {} iterations without a final answer",
            self.options.max_iterations
        )))
    }
}

/// Parse one model turn into an action or a final answer
pub(crate) fn parse_step(text: &str) -> AppResult<AgentStep> {
    if let Some(action_at) = text.find(ACTION) {
        let rest = &text[action_at + ACTION.len()..];
        if let Some(input_at) = rest.find(ACTION_INPUT) {
            let tool = rest[..input_at].trim().to_string();
            let input = clean_action_input(&rest[input_at + ACTION_INPUT.len()..]);
            return Ok(AgentStep::Action { tool, input });
        }
    }

    if let Some(answer_at) = text.rfind(FINAL_ANSWER) {
        let answer = text[answer_at + FINAL_ANSWER.len()..].trim().to_string();
        return Ok(AgentStep::Finish(answer));
    }

    Err(AppError::Agent(format!(
        "Could not parse model output: `{}`",
        text.trim()
    )))
}

fn clean_action_input(raw: &str) -> String {
    let raw = match raw.find(&format!("\n{}", OBSERVATION)) {
        Some(cut) => &raw[..cut],
        None => raw,
    };
    let unfenced = strip_code_fence(raw);
    let trimmed = unfenced.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ScriptedLLM;
    use crate::config::DatabaseConfig;
    use crate::db::{open_staged, test_support};
    use tempfile::TempDir;

    fn agent_config(max_iterations: usize) -> AgentConfig {
        AgentConfig {
            verbose: true,
            max_iterations,
            top_k: 10,
        }
    }

    async fn agent(dir: &TempDir, llm: Arc<ScriptedLLM>, max_iterations: usize) -> SqlAgent {
        let db_config = DatabaseConfig {
            read_only: true,
            max_rows: 50,
            sample_rows: 3,
        };
        let path = test_support::create_sample_db(dir.path(), "agent.db").await;
        let pool = open_staged(&path, &db_config).await.unwrap();
        let toolkit = SqlToolkit::new(pool, llm.clone(), "test-model", &db_config);
        SqlAgent::new(
            llm,
            toolkit,
            AgentOptions::new("test-model", Some(256), &agent_config(max_iterations)),
        )
    }

    #[test]
    fn test_parse_action() {
        let step = parse_step(
            " I should count rows.\nAction: sql_db_query\nAction Input: \"SELECT COUNT(*) FROM customers\"",
        )
        .unwrap();
        assert_eq!(
            step,
            AgentStep::Action {
                tool: "sql_db_query".to_string(),
                input: "SELECT COUNT(*) FROM customers".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_action_strips_fence_and_hallucinated_observation() {
        let step = parse_step(
            "Action: sql_db_query\nAction Input: ```sql\nSELECT 1\n```\nObservation: 1",
        )
        .unwrap();
        assert_eq!(
            step,
            AgentStep::Action {
                tool: "sql_db_query".to_string(),
                input: "SELECT 1".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_final_answer() {
        let step = parse_step(" I now know the final answer\nFinal Answer: There are 4 customers.").unwrap();
        assert_eq!(step, AgentStep::Finish("There are 4 customers.".to_string()));
    }

    #[test]
    fn test_parse_garbage_is_error() {
        assert!(matches!(parse_step("I like turtles"), Err(AppError::Agent(_))));
    }

    #[tokio::test]
    async fn test_answer_runs_tools_and_returns_final_answer() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new([
            "Action: sql_db_list_tables\nAction Input: ",
            " The customers table looks relevant.\nAction: sql_db_schema\nAction Input: customers",
            " I can count the Norwegian customers.\nAction: sql_db_query\nAction Input: SELECT COUNT(*) AS n FROM customers WHERE country = 'NO'",
            " I now know the final answer\nFinal Answer: There are 2 customers in Norway.",
        ]));
        let agent = agent(&dir, llm.clone(), 15).await;

        let answer = agent.answer("How many customers are in Norway?").await.unwrap();
        assert_eq!(answer, "There are 2 customers in Norway.");

        let requests = llm.requests();
        assert_eq!(requests.len(), 4);
        for request in &requests {
            assert_eq!(request.temperature, Some(0.0));
            assert_eq!(request.stop, Some(vec!["\nObservation:".to_string()]));
        }

        // Observations are fed back to the model.
        let last_prompt = &requests[3].messages[1].content;
        assert!(last_prompt.contains("Observation: big_orders, customers, orders"));
        assert!(last_prompt.contains("CREATE TABLE customers"));
        assert!(last_prompt.contains("Observation: n\n2"));
        assert!(requests[0].messages[0].content.contains("at most 10 rows"));
    }

    #[tokio::test]
    async fn test_answer_is_deterministic_for_fixed_script() {
        let script = [
            " Action: sql_db_query\nAction Input: SELECT name FROM customers ORDER BY id LIMIT 1",
            "Final Answer: Alice",
        ];

        let mut answers = Vec::new();
        for _ in 0..2 {
            let dir = TempDir::new().unwrap();
            let agent = agent(&dir, Arc::new(ScriptedLLM::new(script)), 15).await;
            answers.push(agent.answer("Who is the first customer?").await.unwrap());
        }
        assert_eq!(answers, vec!["Alice", "Alice"]);
    }

    #[tokio::test]
    async fn test_sql_error_is_recoverable() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new([
            "Action: sql_db_query\nAction Input: SELECT total FROM order",
            "Action: sql_db_query\nAction Input: SELECT SUM(total) AS s FROM orders",
            "Final Answer: 118.75",
        ]));
        let agent = agent(&dir, llm.clone(), 15).await;

        assert_eq!(agent.answer("What is the order total?").await.unwrap(), "118.75");
        assert!(llm.requests()[1].messages[1].content.contains("Observation: Error:"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_to_model() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new([
            "Action: python_repl\nAction Input: print(1)",
            "Final Answer: I don't know",
        ]));
        let agent = agent(&dir, llm.clone(), 15).await;

        assert_eq!(agent.answer("anything").await.unwrap(), "I don't know");
        assert!(llm.requests()[1].messages[1]
            .content
            .contains("python_repl is not a valid tool"));
    }

    #[tokio::test]
    async fn test_unparseable_output_fails() {
        let dir = TempDir::new().unwrap();
        let agent = agent(&dir, Arc::new(ScriptedLLM::new(["no idea what format you want"])), 15).await;

        let err = agent.answer("How many orders?").await.unwrap_err();
        assert!(matches!(err, AppError::Agent(_)));
    }

    #[tokio::test]
    async fn test_model_error_fails() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::with_results(vec![Err("upstream unavailable".to_string())]));
        let agent = agent(&dir, llm, 15).await;

        let err = agent.answer("How many orders?").await.unwrap_err();
        assert!(matches!(err, AppError::LLMApi(_)));
    }

    #[tokio::test]
    async fn test_iteration_budget() {
        let dir = TempDir::new().unwrap();
        let llm = Arc::new(ScriptedLLM::new([
            "Action: sql_db_list_tables\nAction Input: ",
            "Action: sql_db_list_tables\nAction Input: ",
            "Action: sql_db_list_tables\nAction Input: ",
        ]));
        let agent = agent(&dir, llm.clone(), 3).await;

        let err = agent.answer("loop forever").await.unwrap_err();
        assert!(err.to_string().contains("3 iterations"));
        assert_eq!(llm.requests().len(), 3);
    }
}
