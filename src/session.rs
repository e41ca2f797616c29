//! Per-conversation state: an append-only chat history plus the connection
//! banner from the most recent database attach.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::manager::QueryResult;
use crate::resolver::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation. Assistant entries carry the SQL and result
/// set that produced the answer, when the agent ran one.
#[derive(Debug, Clone, Serialize)]
pub struct ChatEntry {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<QueryResult>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SessionContext {
    history: Vec<ChatEntry>,
    connection_banner: Option<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connection_banner(&mut self, banner: String) {
        self.connection_banner = Some(banner);
    }

    pub fn connection_banner(&self) -> Option<&str> {
        self.connection_banner.as_deref()
    }

    pub fn record_question(&mut self, question: &str) {
        self.history.push(ChatEntry {
            role: Role::User,
            content: question.to_string(),
            sql: None,
            rows: None,
            timestamp: Utc::now(),
        });
    }

    pub fn record_resolution(&mut self, resolution: &Resolution) {
        self.history.push(ChatEntry {
            role: Role::Assistant,
            content: resolution.answer.clone(),
            sql: resolution.sql.clone(),
            rows: resolution.rows.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn history(&self) -> &[ChatEntry] {
        &self.history
    }

    /// Drops the conversation but keeps the connection banner, matching a
    /// "clear chat" action that leaves the database attached.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
