pub mod react;
pub mod tools;
pub mod transcript;

use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::warn;

use crate::config::AgentConfig;
use crate::context::assemble_context;
use crate::db::manager::DatabaseManager;
use crate::llm::ChatModel;
use crate::resolver::{resolve, Resolution};
use react::ReactLoop;
use tools::{default_toolset, Tool};
use transcript::{ProgressSink, Termination};

/// Orchestrates one question end to end: reasoning loop, transcript
/// resolution, and the direct-execution escape hatch for when the engine's
/// invocation machinery itself fails.
pub struct SqlAgent {
    react: ReactLoop,
    db: Option<Arc<DatabaseManager>>,
    context: String,
}

impl SqlAgent {
    pub fn new(llm: Arc<dyn ChatModel>, db: Arc<DatabaseManager>, cfg: &AgentConfig) -> Self {
        let context = assemble_context(db.all_tables());
        let tools = default_toolset(Arc::clone(&db), cfg.max_observation_rows);
        Self {
            react: ReactLoop::new(llm, tools, cfg.max_iterations),
            db: Some(db),
            context,
        }
    }

    /// Assembles an agent from explicit parts. Used where no live database is
    /// available (the direct fallback is then disabled).
    pub fn with_parts(
        llm: Arc<dyn ChatModel>,
        tools: Vec<Box<dyn Tool>>,
        db: Option<Arc<DatabaseManager>>,
        context: String,
        max_iterations: usize,
    ) -> Self {
        Self {
            react: ReactLoop::new(llm, tools, max_iterations),
            db,
            context,
        }
    }

    /// Runs the reasoning loop and resolves the transcript. Total: every path
    /// ends in a populated answer.
    pub async fn ask(&self, question: &str, sink: &dyn ProgressSink) -> Resolution {
        let transcript = self.react.run(question, &self.context, sink).await;

        if let Termination::EngineFailure(err) = &transcript.termination {
            warn!("Reasoning engine failed: {}", err);
            if let Some(db) = &self.db {
                if let Some(schema) = direct_fallback_schema(question) {
                    match db.list_tables_in_schema(&schema).await {
                        Ok(result) => {
                            return Resolution {
                                answer: format!(
                                    "Tables in schema '{}':\n{}",
                                    schema,
                                    result.render(100)
                                ),
                                sql: Some(format!(
                                    "SELECT table_schema, table_name, table_type \
                                     FROM information_schema.tables \
                                     WHERE table_schema = '{}' \
                                     AND table_type IN ('BASE TABLE', 'VIEW') \
                                     ORDER BY table_name",
                                    schema
                                )),
                                rows: Some(result),
                            };
                        }
                        Err(fallback_err) => {
                            return Resolution {
                                answer: format!(
                                    "Error: agent invocation failed ({}) and the direct \
                                     fallback also failed ({})",
                                    err, fallback_err
                                ),
                                sql: None,
                                rows: None,
                            };
                        }
                    }
                }
            }
        }

        resolve(&transcript)
    }
}

static NAMED_FIRST: OnceLock<Regex> = OnceLock::new();
static SCHEMA_FIRST: OnceLock<Regex> = OnceLock::new();

/// Lexical match for the one question shape the direct fallback handles:
/// listing the tables of a named schema.
pub fn direct_fallback_schema(question: &str) -> Option<String> {
    if !question.to_lowercase().contains("table") {
        return None;
    }
    let named_first = NAMED_FIRST.get_or_init(|| {
        Regex::new(r"(?i)tables?\s+(?:are\s+)?in\s+(?:the\s+)?([A-Za-z_][A-Za-z0-9_]*)\s+schema")
            .unwrap()
    });
    if let Some(caps) = named_first.captures(question) {
        let schema = caps[1].to_string();
        if !schema.eq_ignore_ascii_case("schema") {
            return Some(schema);
        }
    }
    let schema_first = SCHEMA_FIRST.get_or_init(|| {
        Regex::new(r"(?i)tables?\s+(?:are\s+)?in\s+(?:the\s+)?schema\s+([A-Za-z_][A-Za-z0-9_]*)")
            .unwrap()
    });
    schema_first
        .captures(question)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_schema_is_extracted_from_both_phrasings() {
        assert_eq!(
            direct_fallback_schema("list tables in the SalesLT schema"),
            Some("SalesLT".to_string())
        );
        assert_eq!(
            direct_fallback_schema("what tables are in schema dbo?"),
            Some("dbo".to_string())
        );
    }

    #[test]
    fn fallback_patterns_survive_repeated_use() {
        // Second and later calls hit the cached compiled patterns.
        for _ in 0..3 {
            assert_eq!(
                direct_fallback_schema("which tables are in the dbo schema?"),
                Some("dbo".to_string())
            );
        }
    }

    #[test]
    fn fallback_ignores_unrelated_questions() {
        assert_eq!(direct_fallback_schema("how many customers are there?"), None);
        assert_eq!(direct_fallback_schema("show me the schema design"), None);
    }
}
