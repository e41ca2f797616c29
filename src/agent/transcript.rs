use serde::Serialize;

use crate::db::manager::QueryResult;

/// One think/act/observe round. Parse-recovery rounds keep the raw engine
/// output in `thought` with an empty action name.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStep {
    pub thought: String,
    pub action: String,
    pub input: String,
    pub observation: String,
}

/// Terminal marker of a reasoning-loop run.
#[derive(Debug, Clone, Serialize)]
pub enum Termination {
    FinalAnswer(String),
    /// The iteration cap was hit before the engine finalized; the resolver
    /// still produces a best-effort answer.
    IterationLimit,
    /// The engine's invocation machinery failed outside the normal flow.
    EngineFailure(String),
}

/// The ordered trace of one reasoning-loop execution. Owned by the loop for
/// the duration of one query, then handed to the resolver and discarded.
#[derive(Debug, Clone, Serialize)]
pub struct AgentTranscript {
    pub question: String,
    pub steps: Vec<AgentStep>,
    pub termination: Termination,
    /// Rows from the most recent successful execute_query invocation.
    pub last_result: Option<QueryResult>,
}

/// Live observer the loop streams intermediate events to. Implementations
/// must not block; all methods default to no-ops.
pub trait ProgressSink: Send + Sync {
    fn on_thought(&self, _iteration: usize, _thought: &str) {}
    fn on_action(&self, _iteration: usize, _action: &str, _input: &str) {}
    fn on_observation(&self, _iteration: usize, _observation: &str) {}
}

/// Sink that discards every event.
pub struct NullSink;

impl ProgressSink for NullSink {}
