use std::sync::Arc;
use tracing::{debug, warn};

use crate::agent::tools::Tool;
use crate::agent::transcript::{AgentStep, AgentTranscript, ProgressSink, Termination};
use crate::llm::ChatModel;

const CORRECTIVE_OBSERVATION: &str = "Invalid response format. Reply with either \
'Action: <tool name>' followed by 'Action Input: <input>', or 'Final Answer: <answer>'.";

/// Bounded think/act/observe loop over a fixed toolset. The engine's free
/// text is parsed against the action grammar; recoverable parse failures
/// become corrective observations and the loop continues under the same
/// iteration cap.
pub struct ReactLoop {
    llm: Arc<dyn ChatModel>,
    tools: Vec<Box<dyn Tool>>,
    max_iterations: usize,
}

/// One parsed engine reply.
#[derive(Debug, PartialEq)]
pub enum ParsedOutput {
    Act {
        thought: String,
        action: String,
        input: String,
    },
    Final {
        answer: String,
    },
    Malformed,
}

impl ReactLoop {
    pub fn new(llm: Arc<dyn ChatModel>, tools: Vec<Box<dyn Tool>>, max_iterations: usize) -> Self {
        Self {
            llm,
            tools,
            max_iterations,
        }
    }

    fn tool_names(&self) -> String {
        self.tools
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn build_system_prompt(&self, context: &str) -> String {
        let mut tool_lines = String::new();
        for tool in &self.tools {
            tool_lines.push_str(&format!("{}: {}\n", tool.name(), tool.description()));
        }

        format!(
            "You are an expert SQL assistant answering questions about a live relational database.\n\
             \n\
             {context}\n\
             \n\
             CRITICAL SQL GUIDELINES:\n\
             1. ALWAYS use fully qualified table names with the schema prefix\n\
             2. The database may contain tables in multiple schemas\n\
             3. If a query fails because a relation does not exist, use catalog_search to verify the name\n\
             4. Use standard SQL syntax and double quotes for mixed-case identifiers\n\
             \n\
             You have access to the following tools:\n\
             \n\
             {tool_lines}\n\
             Use the following format:\n\
             \n\
             Question: the input question\n\
             Thought: reason about what to do next\n\
             Action: the tool to use, one of [{names}]\n\
             Action Input: the input to the tool\n\
             Observation: the result of the action\n\
             ... (Thought/Action/Action Input/Observation can repeat)\n\
             Thought: I now know the final answer\n\
             Final Answer: the final answer to the original question\n\
             \n\
             Begin!",
            context = context,
            tool_lines = tool_lines,
            names = self.tool_names(),
        )
    }

    /// Runs the loop to a terminal marker. Total: engine transport failures
    /// terminate with `EngineFailure` rather than an error.
    pub async fn run(
        &self,
        question: &str,
        context: &str,
        sink: &dyn ProgressSink,
    ) -> AgentTranscript {
        let effective_question = augment_question(question, context);
        let system = self.build_system_prompt(context);
        let mut steps: Vec<AgentStep> = Vec::new();
        let mut last_result = None;

        for iteration in 0..self.max_iterations {
            let prompt = build_scratchpad(&effective_question, &steps);
            let raw = match self.llm.complete(&system, &prompt).await {
                Ok(raw) => raw,
                Err(e) => {
                    return AgentTranscript {
                        question: question.to_string(),
                        steps,
                        termination: Termination::EngineFailure(e.to_string()),
                        last_result,
                    };
                }
            };

            match parse_react_output(&raw) {
                ParsedOutput::Final { answer } => {
                    debug!("Final answer after {} iterations", iteration + 1);
                    sink.on_thought(iteration, &answer);
                    return AgentTranscript {
                        question: question.to_string(),
                        steps,
                        termination: Termination::FinalAnswer(answer),
                        last_result,
                    };
                }
                ParsedOutput::Act {
                    thought,
                    action,
                    input,
                } => {
                    sink.on_thought(iteration, &thought);
                    sink.on_action(iteration, &action, &input);

                    let observation = match self.tools.iter().find(|t| t.name() == action) {
                        Some(tool) => {
                            let obs = tool.invoke(&input).await;
                            if let Some(rows) = obs.rows {
                                last_result = Some(rows);
                            }
                            obs.text
                        }
                        None => format!(
                            "{} is not a valid tool. Valid tools: [{}].",
                            action,
                            self.tool_names()
                        ),
                    };

                    sink.on_observation(iteration, &observation);
                    steps.push(AgentStep {
                        thought,
                        action,
                        input,
                        observation,
                    });
                }
                ParsedOutput::Malformed => {
                    warn!("Unparseable engine output at iteration {}", iteration);
                    sink.on_observation(iteration, CORRECTIVE_OBSERVATION);
                    steps.push(AgentStep {
                        thought: raw,
                        action: String::new(),
                        input: String::new(),
                        observation: CORRECTIVE_OBSERVATION.to_string(),
                    });
                }
            }
        }

        warn!(
            "Reasoning loop stopped at the iteration cap ({})",
            self.max_iterations
        );
        AgentTranscript {
            question: question.to_string(),
            steps,
            termination: Termination::IterationLimit,
            last_result,
        }
    }
}

fn build_scratchpad(question: &str, steps: &[AgentStep]) -> String {
    let mut out = format!("Question: {}\n", question);
    for step in steps {
        if step.action.is_empty() {
            // Parse-recovery round: replay the raw output and the corrective
            // observation verbatim.
            out.push_str(&step.thought);
            out.push('\n');
        } else {
            out.push_str(&format!(
                "Thought: {}\nAction: {}\nAction Input: {}\n",
                step.thought, step.action, step.input
            ));
        }
        out.push_str(&format!("Observation: {}\n", step.observation));
    }
    out.push_str("Thought:");
    out
}

/// Parses one engine reply against the action grammar. Text after a
/// hallucinated `Observation:` is discarded before parsing.
pub fn parse_react_output(raw: &str) -> ParsedOutput {
    let text = match raw.find("\nObservation:") {
        Some(idx) => &raw[..idx],
        None => raw,
    };

    let final_idx = text.find("Final Answer:");
    let action_idx = text.find("Action:");

    match (final_idx, action_idx) {
        (Some(f), a) if a.map_or(true, |a| f < a) => {
            let answer = text[f + "Final Answer:".len()..].trim().to_string();
            if answer.is_empty() {
                ParsedOutput::Malformed
            } else {
                ParsedOutput::Final { answer }
            }
        }
        (_, Some(a)) => {
            let thought = text[..a]
                .trim()
                .trim_start_matches("Thought:")
                .trim()
                .to_string();
            let rest = &text[a + "Action:".len()..];
            let (action_part, input) = match rest.find("Action Input:") {
                Some(i) => (
                    &rest[..i],
                    rest[i + "Action Input:".len()..].trim().to_string(),
                ),
                None => (rest, String::new()),
            };
            let action = action_part
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .trim_matches(|c| c == '[' || c == ']' || c == '`' || c == '"')
                .to_string();
            if action.is_empty() {
                ParsedOutput::Malformed
            } else {
                ParsedOutput::Act {
                    thought,
                    action,
                    input,
                }
            }
        }
        _ => ParsedOutput::Malformed,
    }
}

/// Injects the assembled catalog into questions that ask for an enumeration
/// of tables or schemas, biasing the engine toward a comprehensive,
/// schema-qualified answer.
pub fn augment_question(question: &str, context: &str) -> String {
    let lower = question.to_lowercase();
    let topical = ["table", "schema"].iter().any(|k| lower.contains(k));
    let enumerating = ["all", "list", "show", "what"]
        .iter()
        .any(|k| lower.contains(k));

    if topical && enumerating {
        format!(
            "{}\n\nCONTEXT: this is the table inventory discovered across all schemas:\n{}\n\
             Use this inventory to give a comprehensive answer that covers every schema \
             and uses fully qualified table names.",
            question, context
        )
    } else {
        question.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_final_answer() {
        let out = parse_react_output("Thought: done\nFinal Answer: There are 847 customers.");
        assert_eq!(
            out,
            ParsedOutput::Final {
                answer: "There are 847 customers.".to_string()
            }
        );
    }

    #[test]
    fn parses_action_with_multiline_input() {
        let raw = "Thought: I should count rows\nAction: execute_query\nAction Input: SELECT COUNT(*)\nFROM SalesLT.Customer";
        match parse_react_output(raw) {
            ParsedOutput::Act {
                thought,
                action,
                input,
            } => {
                assert_eq!(thought, "I should count rows");
                assert_eq!(action, "execute_query");
                assert!(input.contains("FROM SalesLT.Customer"));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn prefers_action_when_it_precedes_final_answer() {
        let raw = "Action: list_tables\nAction Input: \nFinal Answer: maybe";
        match parse_react_output(raw) {
            ParsedOutput::Act { action, .. } => assert_eq!(action, "list_tables"),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn truncates_hallucinated_observation() {
        let raw = "Action: list_tables\nAction Input: all\nObservation: made-up tables";
        match parse_react_output(raw) {
            ParsedOutput::Act { input, .. } => assert_eq!(input, "all"),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn cleans_bracketed_action_names() {
        let raw = "Thought: x\nAction: [catalog_search]\nAction Input:";
        match parse_react_output(raw) {
            ParsedOutput::Act { action, .. } => assert_eq!(action, "catalog_search"),
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn prose_without_grammar_is_malformed() {
        assert_eq!(
            parse_react_output("Sure! Here is what I would do next."),
            ParsedOutput::Malformed
        );
    }

    #[test]
    fn augments_enumeration_questions_with_catalog() {
        let context = "Schema 'SalesLT': SalesLT.Customer";
        let augmented = augment_question("show me all tables in all schemas", context);
        assert!(augmented.contains("SalesLT.Customer"));
        assert!(augmented.contains("show me all tables in all schemas"));
    }

    #[test]
    fn leaves_ordinary_questions_untouched() {
        let question = "how many customers are there?";
        assert_eq!(augment_question(question, "ctx"), question);
    }
}
