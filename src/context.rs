use std::collections::BTreeMap;

use crate::db::catalog::TableDescriptor;

/// How many fully-qualified example names to anchor per schema.
const EXAMPLES_PER_SCHEMA: usize = 3;

/// Renders the catalog snapshot into the grounding context handed to the
/// reasoning engine. Deterministic for a given snapshot: schemas and tables
/// are emitted in sorted order. Built once per connection and reused for
/// every question in the session.
pub fn assemble_context(tables: &[TableDescriptor]) -> String {
    if tables.is_empty() {
        return "No table inventory is available for this database. \
                Always use fully qualified schema.table names in queries; \
                common schemas are public, dbo and sys. Use the catalog_search \
                tool to discover what exists."
            .to_string();
    }

    let mut by_schema: BTreeMap<&str, Vec<&TableDescriptor>> = BTreeMap::new();
    for table in tables {
        by_schema
            .entry(table.schema_name.as_str())
            .or_default()
            .push(table);
    }

    let mut out = String::from("AVAILABLE TABLES IN THE DATABASE:\n");
    for (schema, schema_tables) in &by_schema {
        out.push_str(&format!(
            "\nSchema '{}' ({} tables):\n",
            schema,
            schema_tables.len()
        ));
        for table in schema_tables {
            if table.column_count > 0 {
                out.push_str(&format!(
                    "  - {} ({}, {} columns)\n",
                    table.full_qualified_name,
                    table.kind.as_str(),
                    table.column_count
                ));
            } else {
                out.push_str(&format!(
                    "  - {} ({})\n",
                    table.full_qualified_name,
                    table.kind.as_str()
                ));
            }
        }
    }

    out.push_str(
        "\nIMPORTANT: every table reference must be schema-qualified \
         (schema.table). Never assume a table lives in the default schema.\n",
    );

    out.push_str("Example qualified names:");
    for (_, schema_tables) in &by_schema {
        for table in schema_tables.iter().take(EXAMPLES_PER_SCHEMA) {
            out.push_str(&format!(" {}", table.full_qualified_name));
        }
    }
    out.push('\n');

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::{dedup_tables, RawTable};

    fn sample_catalog() -> Vec<TableDescriptor> {
        dedup_tables(vec![
            RawTable {
                schema_name: "SalesLT".into(),
                table_name: "Customer".into(),
                kind: "BASE TABLE".into(),
                column_count: 15,
            },
            RawTable {
                schema_name: "SalesLT".into(),
                table_name: "vCustomer".into(),
                kind: "VIEW".into(),
                column_count: 15,
            },
            RawTable {
                schema_name: "dbo".into(),
                table_name: "BuildVersion".into(),
                kind: "BASE TABLE".into(),
                column_count: 4,
            },
        ])
    }

    #[test]
    fn context_mentions_every_schema_and_gives_examples() {
        let context = assemble_context(&sample_catalog());
        assert!(context.contains("Schema 'SalesLT'"));
        assert!(context.contains("Schema 'dbo'"));
        assert!(context.contains("SalesLT.Customer"));
        assert!(context.contains("SalesLT.vCustomer (VIEW"));
        assert!(context.contains("schema-qualified"));
    }

    #[test]
    fn context_is_deterministic() {
        let catalog = sample_catalog();
        assert_eq!(assemble_context(&catalog), assemble_context(&catalog));
    }

    #[test]
    fn empty_catalog_falls_back_to_generic_instruction() {
        let context = assemble_context(&[]);
        assert!(context.contains("fully qualified schema.table"));
        assert!(context.contains("common schemas"));
        assert!(!context.contains("AVAILABLE TABLES"));
    }
}
