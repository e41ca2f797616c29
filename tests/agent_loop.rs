//! End-to-end exercises of the reasoning loop against a scripted engine and
//! in-memory tools. No database or network involved.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use nl_sql_agent::agent::tools::{Observation, Tool};
use nl_sql_agent::agent::transcript::NullSink;
use nl_sql_agent::agent::SqlAgent;
use nl_sql_agent::db::manager::QueryResult;
use nl_sql_agent::llm::{ChatModel, LlmError};

/// Replays a fixed sequence of engine replies, then errors out.
struct ScriptedEngine {
    replies: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedEngine {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| LlmError::ConnectionError("script exhausted".to_string()))
    }
}

/// Always fails, for exercising the engine failure path.
struct BrokenEngine;

#[async_trait]
impl ChatModel for BrokenEngine {
    async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::ConnectionError("connection refused".to_string()))
    }
}

struct FakeListTables;

#[async_trait]
impl Tool for FakeListTables {
    fn name(&self) -> &str {
        "list_tables"
    }
    fn description(&self) -> &str {
        "lists tables"
    }
    async fn invoke(&self, _input: &str) -> Observation {
        Observation::text("SalesLT.Customer, SalesLT.Product, dbo.BuildVersion")
    }
}

struct FakeExecuteQuery;

#[async_trait]
impl Tool for FakeExecuteQuery {
    fn name(&self) -> &str {
        "execute_query"
    }
    fn description(&self) -> &str {
        "runs sql"
    }
    async fn invoke(&self, input: &str) -> Observation {
        let result = QueryResult {
            columns: vec!["count".to_string()],
            rows: vec![vec![serde_json::json!(847)]],
            row_count: 1,
            execution_time_ms: 3,
        };
        Observation {
            text: format!("count\n847\n1 row(s) returned. (for: {})", input.trim()),
            rows: Some(result),
        }
    }
}

/// Rejects the first statement the way a bad table name would, then succeeds.
#[derive(Default)]
struct FailingThenSucceedingQuery {
    failed_once: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Tool for FailingThenSucceedingQuery {
    fn name(&self) -> &str {
        "execute_query"
    }
    fn description(&self) -> &str {
        "runs sql"
    }
    async fn invoke(&self, input: &str) -> Observation {
        if !self
            .failed_once
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            return Observation::text(
                "Error: query execution error: relation \"SalesLT.Customers\" does not exist. \
                 Check that every table name is schema-qualified and try again.",
            );
        }
        FakeExecuteQuery.invoke(input).await
    }
}

fn agent_with(engine: Arc<dyn ChatModel>, max_iterations: usize) -> SqlAgent {
    let tools: Vec<Box<dyn Tool>> = vec![Box::new(FakeListTables), Box::new(FakeExecuteQuery)];
    SqlAgent::with_parts(
        engine,
        tools,
        None,
        "AVAILABLE TABLES IN THE DATABASE:\n\nSchema 'SalesLT': Customer, Product".to_string(),
        max_iterations,
    )
}

#[tokio::test]
async fn full_loop_reaches_final_answer_with_sql_and_rows() {
    let engine = ScriptedEngine::new(&[
        "Thought: I need to count customers\nAction: execute_query\nAction Input: SELECT COUNT(*) FROM SalesLT.Customer",
        "Thought: I now know the final answer\nFinal Answer: There are 847 customers.",
    ]);
    let agent = agent_with(engine.clone(), 10);

    let resolution = agent.ask("How many customers are there?", &NullSink).await;

    assert_eq!(resolution.answer, "There are 847 customers.");
    assert_eq!(
        resolution.sql.as_deref(),
        Some("SELECT COUNT(*) FROM SalesLT.Customer")
    );
    let rows = resolution.rows.expect("rows from execute_query");
    assert_eq!(rows.row_count, 1);

    // The second prompt must replay the first round's observation.
    let prompts = engine.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Observation: count\n847"));
}

#[tokio::test]
async fn malformed_output_gets_a_corrective_observation_and_loop_recovers() {
    let engine = ScriptedEngine::new(&[
        "Sure! Let me think about the best way to answer that.",
        "Thought: done\nFinal Answer: Recovered.",
    ]);
    let agent = agent_with(engine.clone(), 10);

    let resolution = agent.ask("How many products?", &NullSink).await;

    assert_eq!(resolution.answer, "Recovered.");
    let prompts = engine.prompts();
    assert!(prompts[1].contains("Invalid response format"));
    assert!(prompts[1].contains("Sure! Let me think"));
}

#[tokio::test]
async fn failed_query_becomes_an_observation_and_the_loop_continues() {
    let engine = ScriptedEngine::new(&[
        "Thought: count them\nAction: execute_query\nAction Input: SELECT COUNT(*) FROM SalesLT.Customers",
        "Thought: wrong table name, correcting\nAction: execute_query\nAction Input: SELECT COUNT(*) FROM SalesLT.Customer",
        "Thought: I now know the final answer\nFinal Answer: There are 847 customers.",
    ]);
    let tools: Vec<Box<dyn Tool>> = vec![Box::new(FailingThenSucceedingQuery::default())];
    let agent = SqlAgent::with_parts(engine.clone(), tools, None, "ctx".to_string(), 10);

    let resolution = agent.ask("How many customers are there?", &NullSink).await;

    // The failure reached the engine as an observation, not a terminal error.
    let prompts = engine.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("Observation: Error: query execution error"));
    assert!(prompts[1].contains("does not exist"));

    assert_eq!(resolution.answer, "There are 847 customers.");
    assert_eq!(
        resolution.sql.as_deref(),
        Some("SELECT COUNT(*) FROM SalesLT.Customer")
    );
    assert!(resolution.rows.is_some());
}

#[tokio::test]
async fn unknown_tool_name_is_reported_back_to_the_engine() {
    let engine = ScriptedEngine::new(&[
        "Thought: guessing\nAction: drop_database\nAction Input: all",
        "Final Answer: I will use a valid tool next time.",
    ]);
    let agent = agent_with(engine.clone(), 10);

    agent.ask("anything", &NullSink).await;

    let prompts = engine.prompts();
    assert!(prompts[1].contains("drop_database is not a valid tool"));
    assert!(prompts[1].contains("list_tables"));
}

#[tokio::test]
async fn iteration_cap_counts_malformed_rounds_and_still_answers() {
    let engine = ScriptedEngine::new(&["no grammar here", "still none", "nope"]);
    let agent = agent_with(engine.clone(), 3);

    let resolution = agent.ask("How many products?", &NullSink).await;

    assert_eq!(engine.prompts().len(), 3);
    // Salvage falls through to the corrective observation text.
    assert!(resolution.answer.contains("Invalid response format"));
}

#[tokio::test]
async fn engine_failure_without_database_resolves_to_error_answer() {
    let agent = agent_with(Arc::new(BrokenEngine), 10);

    let resolution = agent.ask("How many customers?", &NullSink).await;

    assert!(resolution.answer.starts_with("Error: agent execution failed"));
    assert!(resolution.answer.contains("connection refused"));
    assert!(resolution.sql.is_none());
}

#[tokio::test]
async fn enumeration_question_carries_catalog_into_the_prompt() {
    let engine = ScriptedEngine::new(&["Final Answer: SalesLT.Customer and SalesLT.Product."]);
    let agent = agent_with(engine.clone(), 10);

    agent.ask("show me all tables in all schemas", &NullSink).await;

    let prompts = engine.prompts();
    assert!(prompts[0].contains("table inventory discovered across all schemas"));
    assert!(prompts[0].contains("Schema 'SalesLT'"));
}

#[tokio::test]
async fn hallucinated_observation_is_ignored_in_favor_of_the_real_tool() {
    let engine = ScriptedEngine::new(&[
        "Thought: listing\nAction: list_tables\nAction Input: \nObservation: fake.Table1, fake.Table2",
        "Final Answer: The real tables are in SalesLT and dbo.",
    ]);
    let agent = agent_with(engine.clone(), 10);

    agent.ask("what do we have", &NullSink).await;

    let prompts = engine.prompts();
    assert!(prompts[1].contains("SalesLT.Customer, SalesLT.Product, dbo.BuildVersion"));
    assert!(!prompts[1].contains("fake.Table1"));
}
