use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::db::catalog::schema_summaries;
use crate::db::manager::{DatabaseManager, QueryResult};

/// Result of one tool invocation. Errors are reported in `text`; a tool never
/// fails the loop.
pub struct Observation {
    pub text: String,
    pub rows: Option<QueryResult>,
}

impl Observation {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rows: None,
        }
    }
}

/// A named capability exposed to the reasoning engine. The toolset is a
/// closed set dispatched by name lookup.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn invoke(&self, input: &str) -> Observation;
}

/// The fixed toolset backed by a live session.
pub fn default_toolset(db: Arc<DatabaseManager>, max_rows: usize) -> Vec<Box<dyn Tool>> {
    vec![
        Box::new(ListTablesTool {
            db: Arc::clone(&db),
        }),
        Box::new(GetSchemaTool {
            db: Arc::clone(&db),
        }),
        Box::new(ExecuteQueryTool {
            db: Arc::clone(&db),
            max_rows,
        }),
        Box::new(CatalogSearchTool { db }),
    ]
}

pub struct ListTablesTool {
    db: Arc<DatabaseManager>,
}

#[async_trait]
impl Tool for ListTablesTool {
    fn name(&self) -> &str {
        "list_tables"
    }

    fn description(&self) -> &str {
        "Lists the fully qualified (schema.table) names of every table and view \
         in the database. Input is ignored."
    }

    async fn invoke(&self, _input: &str) -> Observation {
        let tables = self.db.all_tables();
        if tables.is_empty() {
            return Observation::text(
                "No tables were discovered. Use catalog_search for details or query \
                 information_schema.tables directly.",
            );
        }
        let names: Vec<&str> = tables
            .iter()
            .map(|t| t.full_qualified_name.as_str())
            .collect();
        Observation::text(names.join(", "))
    }
}

pub struct GetSchemaTool {
    db: Arc<DatabaseManager>,
}

#[async_trait]
impl Tool for GetSchemaTool {
    fn name(&self) -> &str {
        "get_schema"
    }

    fn description(&self) -> &str {
        "Returns the column definitions for the named tables. Input: a \
         comma-separated list of fully qualified names, e.g. \
         'SalesLT.Customer, dbo.BuildVersion'."
    }

    async fn invoke(&self, input: &str) -> Observation {
        let mut out = String::new();
        let names: Vec<&str> = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if names.is_empty() {
            return Observation::text(
                "Error: no table names given. Pass fully qualified names such as \
                 'SalesLT.Customer'.",
            );
        }

        for name in names {
            let Some((schema, table)) = name.split_once('.') else {
                out.push_str(&format!(
                    "-- {}: not schema-qualified; use schema.table\n",
                    name
                ));
                continue;
            };
            let columns = self.db.get_table_columns(schema, table).await;
            if columns.is_empty() {
                out.push_str(&format!(
                    "-- {}.{}: no columns found (check the name with catalog_search)\n",
                    schema, table
                ));
                continue;
            }
            out.push_str(&format!("CREATE TABLE {}.{} (\n", schema, table));
            for (i, col) in columns.iter().enumerate() {
                let null_str = if col.nullable { "" } else { " NOT NULL" };
                let suffix = if i < columns.len() - 1 { "," } else { "" };
                out.push_str(&format!(
                    "    {} {}{}{}\n",
                    col.name, col.data_type, null_str, suffix
                ));
            }
            out.push_str(");\n");
        }
        Observation::text(out)
    }
}

pub struct ExecuteQueryTool {
    db: Arc<DatabaseManager>,
    max_rows: usize,
}

#[async_trait]
impl Tool for ExecuteQueryTool {
    fn name(&self) -> &str {
        "execute_query"
    }

    fn description(&self) -> &str {
        "Executes a SQL query against the live database and returns the rows. \
         Input: a single SQL statement with schema-qualified table names."
    }

    async fn invoke(&self, input: &str) -> Observation {
        let sql = strip_code_fences(input);
        if sql.is_empty() {
            return Observation::text("Error: empty SQL statement.");
        }
        debug!("execute_query: {}", sql);
        match self.db.execute(&sql).await {
            Ok(result) => Observation {
                text: result.render(self.max_rows),
                rows: Some(result),
            },
            // Query errors feed back into the loop so the engine can
            // self-correct; they are never fatal.
            Err(e) => Observation::text(format!(
                "Error: {}. Check that every table name is schema-qualified and try again.",
                e
            )),
        }
    }
}

pub struct CatalogSearchTool {
    db: Arc<DatabaseManager>,
}

#[async_trait]
impl Tool for CatalogSearchTool {
    fn name(&self) -> &str {
        "catalog_search"
    }

    fn description(&self) -> &str {
        "Returns the complete table inventory across ALL schemas, including \
         entries the other tools may under-report. Use this when a table you \
         expect is missing from list_tables or get_schema. Input is ignored."
    }

    async fn invoke(&self, _input: &str) -> Observation {
        let tables = self.db.all_tables();
        if tables.is_empty() {
            return Observation::text(
                "The enhanced catalog is empty. Query information_schema.tables directly.",
            );
        }

        let summaries = schema_summaries(tables);
        let mut out = String::from("COMPLETE TABLE LIST ACROSS ALL SCHEMAS:\n");
        for summary in &summaries {
            out.push_str(&format!(
                "\n{} schema ({} tables):\n",
                summary.schema_name, summary.table_count
            ));
            for table in tables.iter().filter(|t| t.schema_name == summary.schema_name) {
                out.push_str(&format!(
                    "  {} ({})\n",
                    table.full_qualified_name,
                    table.kind.as_str()
                ));
            }
        }
        out.push_str(&format!(
            "\nTotal: {} tables across {} schemas. Always use fully qualified \
             (schema.table) names in queries.\n",
            tables.len(),
            summaries.len()
        ));
        Observation::text(out)
    }
}

/// Strips markdown code fences and stray backticks from engine-provided SQL.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    let without_fence = if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("sql").unwrap_or(after);
        match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        }
    } else {
        trimmed
    };
    without_fence.replace('`', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sql_code_fences() {
        let input = "```sql\nSELECT 1;\n```";
        assert_eq!(strip_code_fences(input), "SELECT 1;");
    }

    #[test]
    fn strips_bare_fences_and_backticks() {
        assert_eq!(strip_code_fences("```\nSELECT 2\n```"), "SELECT 2");
        assert_eq!(strip_code_fences("`SELECT 3`"), "SELECT 3");
        assert_eq!(strip_code_fences("  SELECT 4  "), "SELECT 4");
    }
}
