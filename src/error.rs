use std::error::Error;
use std::fmt;

/// Failure classes for the query core. Most variants are recovered close to
/// where they arise; only `Connection` is normally surfaced to the caller.
#[derive(Debug, Clone)]
pub enum AgentError {
    /// Driver/network/auth failure while establishing or testing the connection.
    Connection(String),
    /// Catalog queries failed; recovered locally via the fallback query.
    Discovery(String),
    /// SQL chosen by the reasoning engine failed at the database. Fed back
    /// into the loop as an observation, never fatal.
    QueryExecution(String),
    /// The reasoning loop's invocation machinery failed outside the normal
    /// think/act/observe flow.
    AgentExecution(String),
    /// Engine output did not match the expected action grammar.
    Parse(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Connection(msg) => write!(f, "connection error: {}", msg),
            AgentError::Discovery(msg) => write!(f, "catalog discovery error: {}", msg),
            AgentError::QueryExecution(msg) => write!(f, "query execution error: {}", msg),
            AgentError::AgentExecution(msg) => write!(f, "agent execution error: {}", msg),
            AgentError::Parse(msg) => write!(f, "action parse error: {}", msg),
        }
    }
}

impl Error for AgentError {}
