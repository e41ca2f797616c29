use postgres::types::Type;
use postgres::Row;
use r2d2::Pool;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::config::DatabaseConfig;
use crate::db::catalog::{self, ColumnDescriptor, SchemaSummary, TableDescriptor};
use crate::db::connect::{troubleshooting_hint, Credentials};
use crate::db::pool::{build_pool, PgConnectionManager};
use crate::error::AgentError;

/// Tabular result of one SQL execution.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Plain-text rendering, truncated to `max_rows`, for tool observations
    /// and the CLI.
    pub fn render(&self, max_rows: usize) -> String {
        if self.columns.is_empty() {
            return format!("{} row(s) affected.", self.row_count);
        }
        let mut out = String::new();
        out.push_str(&self.columns.join(" | "));
        out.push('\n');
        for row in self.rows.iter().take(max_rows) {
            let cells: Vec<String> = row.iter().map(render_value).collect();
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
        if self.rows.len() > max_rows {
            out.push_str(&format!(
                "... ({} more rows not shown)\n",
                self.rows.len() - max_rows
            ));
        }
        out.push_str(&format!("{} row(s) returned.", self.row_count));
        out
    }
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Owns the connection pool and the catalog snapshot for one session. The
/// snapshot is built at connect time and treated as read-only afterwards;
/// reconnecting builds a fresh manager.
pub struct DatabaseManager {
    pool: Pool<PgConnectionManager>,
    tables: Arc<Vec<TableDescriptor>>,
}

impl DatabaseManager {
    /// Connects, validates the connection, and discovers the catalog.
    /// Returns the manager together with a human-readable summary message;
    /// on failure the error message carries heuristic troubleshooting text.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<(Self, String), AgentError> {
        let credentials = Credentials::from(cfg);
        let pool_size = cfg.pool_size;
        let recycle = cfg.recycle_seconds;
        let database = cfg.database.clone();

        let (pool, tables) = tokio::task::spawn_blocking(
            move || -> Result<(Pool<PgConnectionManager>, Vec<TableDescriptor>), AgentError> {
                let pool = build_pool(&credentials, pool_size, recycle).map_err(|e| {
                    let msg = e.to_string();
                    AgentError::Connection(format!("{}{}", msg, troubleshooting_hint(&msg)))
                })?;

                let mut conn = pool
                    .get()
                    .map_err(|e| AgentError::Connection(e.to_string()))?;
                conn.simple_query("SELECT 1").map_err(|e| {
                    let msg = e.to_string();
                    AgentError::Connection(format!("{}{}", msg, troubleshooting_hint(&msg)))
                })?;

                // Discovery degrades rather than failing the connect.
                let tables = catalog::discover_tables(&mut conn);
                Ok((pool, tables))
            },
        )
        .await
        .map_err(|e| AgentError::Connection(format!("connect task failed: {}", e)))??;

        let schema_count = catalog::schema_summaries(&tables).len();
        let base_tables = tables
            .iter()
            .filter(|t| t.kind == catalog::TableKind::BaseTable)
            .count();
        let message = if tables.is_empty() {
            format!(
                "Connected to {}. Catalog discovery returned no tables; continuing in auto-discovery mode.",
                database
            )
        } else {
            format!(
                "Connected to {}. Found {} tables ({} base tables) across {} schemas.",
                database,
                tables.len(),
                base_tables,
                schema_count
            )
        };
        info!("{}", message);

        Ok((
            Self {
                pool,
                tables: Arc::new(tables),
            },
            message,
        ))
    }

    /// The catalog snapshot for this session.
    pub fn all_tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn schema_summaries(&self) -> Vec<SchemaSummary> {
        catalog::schema_summaries(&self.tables)
    }

    /// Comprehensive human-readable schema report for the presentation layer.
    pub fn get_table_info(&self) -> String {
        if self.tables.is_empty() {
            return "No tables discovered in this database.".to_string();
        }

        let summaries = self.schema_summaries();
        let mut parts: Vec<String> = Vec::new();

        parts.push("DATABASE SCHEMA SUMMARY".to_string());
        parts.push(format!("Total schemas: {}", summaries.len()));
        parts.push(format!("Total tables: {}", self.tables.len()));
        parts.push(String::new());
        parts.push("SCHEMAS AND TABLES".to_string());

        for summary in &summaries {
            parts.push(format!(
                "\nSchema: {} ({} tables)",
                summary.schema_name, summary.table_count
            ));
            for table in self
                .tables
                .iter()
                .filter(|t| t.schema_name == summary.schema_name)
            {
                parts.push(format!(
                    "  {} ({})",
                    table.full_qualified_name,
                    table.kind.as_str()
                ));
            }
        }

        parts.push(String::new());
        parts.push("IMPORTANT NOTES".to_string());
        parts.push("- Always use fully qualified table names (e.g. SalesLT.Customer)".to_string());
        parts.push("- Schema names can be case-sensitive; quote mixed-case identifiers".to_string());
        parts.push("- Never assume a table lives in the default schema".to_string());

        parts.join("\n")
    }

    /// Ordered column descriptors for one table; empty on error.
    pub async fn get_table_columns(&self, schema: &str, table: &str) -> Vec<ColumnDescriptor> {
        let pool = self.pool.clone();
        let schema = schema.to_string();
        let table = table.to_string();
        tokio::task::spawn_blocking(move || match pool.get() {
            Ok(mut conn) => catalog::get_table_columns(&mut conn, &schema, &table),
            Err(e) => {
                error!("Failed to check out connection for column read: {}", e);
                Vec::new()
            }
        })
        .await
        .unwrap_or_default()
    }

    /// Executes one SQL statement. The connection checkout is scoped to this
    /// call and released on every path.
    pub async fn execute(&self, sql: &str) -> Result<QueryResult, AgentError> {
        let pool = self.pool.clone();
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || -> Result<QueryResult, AgentError> {
            let start = Instant::now();
            let mut conn = pool
                .get()
                .map_err(|e| AgentError::QueryExecution(e.to_string()))?;

            let stmt = conn
                .prepare(&sql)
                .map_err(|e| AgentError::QueryExecution(e.to_string()))?;
            let rows = conn
                .query(&stmt, &[])
                .map_err(|e| AgentError::QueryExecution(e.to_string()))?;

            let columns: Vec<String> = stmt
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();

            let mut result_rows = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut values = Vec::with_capacity(columns.len());
                for (i, col) in stmt.columns().iter().enumerate() {
                    values.push(value_to_json(row, i, col.type_()));
                }
                result_rows.push(values);
            }

            let row_count = result_rows.len();
            Ok(QueryResult {
                columns,
                rows: result_rows,
                row_count,
                execution_time_ms: start.elapsed().as_millis() as u64,
            })
        })
        .await
        .map_err(|e| AgentError::QueryExecution(format!("query task failed: {}", e)))?
    }

    /// Fixed, parameterized introspection query used by the resolver's
    /// direct-execution fallback when the reasoning engine itself fails.
    pub async fn list_tables_in_schema(&self, schema: &str) -> Result<QueryResult, AgentError> {
        let pool = self.pool.clone();
        let schema = schema.to_string();
        tokio::task::spawn_blocking(move || -> Result<QueryResult, AgentError> {
            let start = Instant::now();
            let mut conn = pool
                .get()
                .map_err(|e| AgentError::QueryExecution(e.to_string()))?;
            let rows = conn
                .query(
                    "SELECT table_schema::text AS schema,
                            table_name::text   AS table_name,
                            table_type::text   AS type
                       FROM information_schema.tables
                      WHERE table_schema = $1
                        AND table_type IN ('BASE TABLE', 'VIEW')
                      ORDER BY table_name",
                    &[&schema],
                )
                .map_err(|e| AgentError::QueryExecution(e.to_string()))?;

            let result_rows: Vec<Vec<serde_json::Value>> = rows
                .iter()
                .map(|row| {
                    vec![
                        serde_json::Value::String(row.get(0)),
                        serde_json::Value::String(row.get(1)),
                        serde_json::Value::String(row.get(2)),
                    ]
                })
                .collect();
            let row_count = result_rows.len();
            Ok(QueryResult {
                columns: vec!["schema".into(), "table_name".into(), "type".into()],
                rows: result_rows,
                row_count,
                execution_time_ms: start.elapsed().as_millis() as u64,
            })
        })
        .await
        .map_err(|e| AgentError::QueryExecution(format!("query task failed: {}", e)))?
    }
}

fn value_to_json(row: &Row, idx: usize, pg_type: &Type) -> serde_json::Value {
    match *pg_type {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(serde_json::Value::Bool)
            .unwrap_or(serde_json::Value::Null),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::Number(v.into()))
            .unwrap_or(serde_json::Value::Null),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::Number(v.into()))
            .unwrap_or(serde_json::Value::Null),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::Number(v.into()))
            .unwrap_or(serde_json::Value::Null),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(v as f64))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .ok()
            .flatten()
            .unwrap_or(serde_json::Value::Null),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::String(v.to_string()))
            .unwrap_or(serde_json::Value::Null),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::String(v.to_rfc3339()))
            .unwrap_or(serde_json::Value::Null),
        Type::DATE => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(|v| serde_json::Value::String(v.to_string()))
            .unwrap_or(serde_json::Value::Null),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
    }
}
