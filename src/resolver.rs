//! Turns a finished agent transcript into a user-facing resolution.
//!
//! Resolution is total: every transcript, including one with zero steps,
//! maps to an answer string. Failures surface as answers prefixed with
//! `Error:` so callers can render them inline with chat history.

use crate::agent::transcript::{AgentTranscript, Termination};
use crate::db::manager::QueryResult;

/// What the caller gets back for one question.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub answer: String,
    pub sql: Option<String>,
    pub rows: Option<QueryResult>,
}

const SQL_KEYWORDS: [&str; 12] = [
    "SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "FROM", "WHERE", "JOIN", "GROUP", "ORDER",
    "HAVING", "LIMIT",
];

pub fn resolve(transcript: &AgentTranscript) -> Resolution {
    let answer = match &transcript.termination {
        Termination::FinalAnswer(answer) => answer.clone(),
        Termination::IterationLimit => salvage_answer(transcript),
        Termination::EngineFailure(e) => format!("Error: agent execution failed: {}", e),
    };

    Resolution {
        sql: last_executed_sql(transcript).or_else(|| extract_sql_block(&answer)),
        rows: transcript.last_result.clone(),
        answer,
    }
}

/// Best-effort answer when the loop hit its iteration cap: the newest
/// non-empty thought, else the newest observation, else an error marker.
fn salvage_answer(transcript: &AgentTranscript) -> String {
    for step in transcript.steps.iter().rev() {
        if !step.action.is_empty() && !step.thought.is_empty() {
            return step.thought.clone();
        }
    }
    for step in transcript.steps.iter().rev() {
        if !step.observation.is_empty() {
            return step.observation.clone();
        }
    }
    "Error: the agent stopped before reaching an answer. Try rephrasing the question.".to_string()
}

/// The SQL the agent most recently ran, straight from the tool input.
fn last_executed_sql(transcript: &AgentTranscript) -> Option<String> {
    transcript
        .steps
        .iter()
        .rev()
        .find(|s| s.action == "execute_query" && !s.input.trim().is_empty())
        .map(|s| s.input.trim().to_string())
}

/// Lexical fallback: the first contiguous run of lines that open with a SQL
/// keyword. Good enough to surface "the query" in a prose answer when no
/// execute_query step exists.
pub fn extract_sql_block(text: &str) -> Option<String> {
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim().trim_start_matches('`');
        let starts_sql = SQL_KEYWORDS
            .iter()
            .any(|k| trimmed.to_uppercase().starts_with(k));
        if starts_sql {
            block.push(trimmed);
        } else if !block.is_empty() {
            break;
        }
    }
    if block.is_empty() {
        None
    } else {
        Some(block.join("\n").trim_end_matches(';').to_string() + ";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::transcript::AgentStep;

    fn step(action: &str, input: &str, observation: &str) -> AgentStep {
        AgentStep {
            thought: "thinking".to_string(),
            action: action.to_string(),
            input: input.to_string(),
            observation: observation.to_string(),
        }
    }

    #[test]
    fn final_answer_passes_through_with_last_sql() {
        let transcript = AgentTranscript {
            question: "how many customers?".to_string(),
            steps: vec![step(
                "execute_query",
                "SELECT COUNT(*) FROM SalesLT.Customer",
                "count\n847",
            )],
            termination: Termination::FinalAnswer("There are 847 customers.".to_string()),
            last_result: None,
        };
        let resolution = resolve(&transcript);
        assert_eq!(resolution.answer, "There are 847 customers.");
        assert_eq!(
            resolution.sql.as_deref(),
            Some("SELECT COUNT(*) FROM SalesLT.Customer")
        );
    }

    #[test]
    fn extracts_sql_from_prose_when_no_query_ran() {
        let answer = "You could run this:\nSELECT COUNT(*)\nFROM SalesLT.Customer\nto count them.";
        let transcript = AgentTranscript {
            question: "q".to_string(),
            steps: vec![],
            termination: Termination::FinalAnswer(answer.to_string()),
            last_result: None,
        };
        let resolution = resolve(&transcript);
        assert_eq!(
            resolution.sql.as_deref(),
            Some("SELECT COUNT(*)\nFROM SalesLT.Customer;")
        );
    }

    #[test]
    fn iteration_limit_salvages_latest_thought() {
        let transcript = AgentTranscript {
            question: "q".to_string(),
            steps: vec![step("list_tables", "", "SalesLT.Customer")],
            termination: Termination::IterationLimit,
            last_result: None,
        };
        assert_eq!(resolve(&transcript).answer, "thinking");
    }

    #[test]
    fn empty_transcript_resolves_to_error_marker() {
        let transcript = AgentTranscript {
            question: "q".to_string(),
            steps: vec![],
            termination: Termination::IterationLimit,
            last_result: None,
        };
        let resolution = resolve(&transcript);
        assert!(resolution.answer.starts_with("Error:"));
        assert!(resolution.sql.is_none());
        assert!(resolution.rows.is_none());
    }

    #[test]
    fn engine_failure_becomes_error_answer() {
        let transcript = AgentTranscript {
            question: "q".to_string(),
            steps: vec![],
            termination: Termination::EngineFailure("connection refused".to_string()),
            last_result: None,
        };
        assert_eq!(
            resolve(&transcript).answer,
            "Error: agent execution failed: connection refused"
        );
    }

    #[test]
    fn no_sql_in_plain_prose() {
        assert!(extract_sql_block("there are three schemas in this database").is_none());
    }
}
