pub mod agent;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod llm;
pub mod resolver;
pub mod session;
pub mod util;

pub use agent::SqlAgent;
pub use db::manager::DatabaseManager;
pub use error::AgentError;
pub use session::{ChatEntry, SessionContext};
