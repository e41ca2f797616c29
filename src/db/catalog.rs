use postgres::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Relation kinds as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TableKind {
    BaseTable,
    View,
    SystemTable,
    Other,
}

impl TableKind {
    pub fn from_catalog(kind: &str) -> Self {
        match kind {
            "BASE TABLE" => TableKind::BaseTable,
            "VIEW" => TableKind::View,
            "SYSTEM TABLE" => TableKind::SystemTable,
            _ => TableKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::BaseTable => "BASE TABLE",
            TableKind::View => "VIEW",
            TableKind::SystemTable => "SYSTEM TABLE",
            TableKind::Other => "OTHER",
        }
    }
}

/// One relation in the catalog snapshot. Immutable once built for a session;
/// the snapshot is rebuilt wholesale on reconnect.
#[derive(Debug, Clone, Serialize)]
pub struct TableDescriptor {
    pub schema_name: String,
    pub table_name: String,
    /// `schema.table`, unique within a snapshot.
    pub full_qualified_name: String,
    pub kind: TableKind,
    pub column_count: i64,
}

/// One column of a table, ordered by ordinal position.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDescriptor {
    pub table_fqn: String,
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub max_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
}

/// Derived aggregate over the snapshot, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub schema_name: String,
    pub table_count: usize,
}

/// Row shape shared by the discovery queries, kept separate from
/// `TableDescriptor` so deduplication stays a pure function.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub schema_name: String,
    pub table_name: String,
    pub kind: String,
    pub column_count: i64,
}

/// The information-schema view unioned with the lower-level system catalog,
/// which surfaces relations (partitioned/foreign tables, toast-adjacent
/// objects) the portable view can omit. The information-schema branch sorts
/// first so deduplication prefers it.
const DISCOVERY_QUERY: &str = "\
SELECT schema_name, table_name, table_type, column_count FROM (
    SELECT t.table_schema::text AS schema_name,
           t.table_name::text   AS table_name,
           t.table_type::text   AS table_type,
           (SELECT COUNT(*) FROM information_schema.columns c
             WHERE c.table_schema = t.table_schema
               AND c.table_name = t.table_name) AS column_count,
           0 AS source_rank
      FROM information_schema.tables t
     WHERE t.table_type IN ('BASE TABLE', 'VIEW')
       AND t.table_schema NOT IN ('pg_catalog', 'information_schema')

    UNION ALL

    SELECT n.nspname::text,
           c.relname::text,
           CASE c.relkind
                WHEN 'r' THEN 'BASE TABLE'
                WHEN 'p' THEN 'BASE TABLE'
                WHEN 'v' THEN 'VIEW'
                WHEN 'm' THEN 'VIEW'
                WHEN 't' THEN 'SYSTEM TABLE'
                ELSE 'OTHER'
           END,
           0::bigint,
           1 AS source_rank
      FROM pg_catalog.pg_class c
      JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
     WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f')
       AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
) u
ORDER BY source_rank, schema_name, table_name";

/// Minimal base-table-only query for when the union query is not permitted.
const FALLBACK_QUERY: &str = "\
SELECT table_schema::text, table_name::text
  FROM information_schema.tables
 WHERE table_type = 'BASE TABLE'
   AND table_schema NOT IN ('pg_catalog', 'information_schema')
 ORDER BY table_schema, table_name";

const COLUMNS_QUERY: &str = "\
SELECT column_name::text,
       data_type::text,
       is_nullable::text,
       column_default::text,
       character_maximum_length::int,
       numeric_precision::int,
       numeric_scale::int
  FROM information_schema.columns
 WHERE table_schema = $1 AND table_name = $2
 ORDER BY ordinal_position";

/// Discovers the complete, deduplicated table inventory. Database errors are
/// caught and logged; the worst case is an empty snapshot and the caller
/// proceeds in auto-discovery mode.
pub fn discover_tables(client: &mut Client) -> Vec<TableDescriptor> {
    match client.query(DISCOVERY_QUERY, &[]) {
        Ok(rows) => {
            let raw: Vec<RawTable> = rows
                .iter()
                .map(|row| RawTable {
                    schema_name: row.get(0),
                    table_name: row.get(1),
                    kind: row.get(2),
                    column_count: row.get(3),
                })
                .collect();
            let tables = dedup_tables(raw);
            debug!("Catalog discovery found {} tables", tables.len());
            tables
        }
        Err(e) => {
            warn!("Catalog discovery query failed, using fallback: {}", e);
            match client.query(FALLBACK_QUERY, &[]) {
                Ok(rows) => rows
                    .iter()
                    .map(|row| {
                        let schema: String = row.get(0);
                        let table: String = row.get(1);
                        TableDescriptor {
                            full_qualified_name: format!("{}.{}", schema, table),
                            schema_name: schema,
                            table_name: table,
                            kind: TableKind::BaseTable,
                            column_count: 0,
                        }
                    })
                    .collect(),
                Err(e2) => {
                    error!("Fallback catalog query also failed: {}", e2);
                    Vec::new()
                }
            }
        }
    }
}

/// Deduplicates discovery rows by (schema, table), first-seen entry wins.
/// A later duplicate only backfills the column count when the kept entry has
/// none.
pub fn dedup_tables(raw: Vec<RawTable>) -> Vec<TableDescriptor> {
    let mut tables: Vec<TableDescriptor> = Vec::with_capacity(raw.len());
    let mut seen: HashMap<(String, String), usize> = HashMap::new();

    for row in raw {
        let key = (row.schema_name.clone(), row.table_name.clone());
        match seen.get(&key) {
            Some(&idx) => {
                if tables[idx].column_count == 0 && row.column_count > 0 {
                    tables[idx].column_count = row.column_count;
                }
            }
            None => {
                seen.insert(key, tables.len());
                tables.push(TableDescriptor {
                    full_qualified_name: format!("{}.{}", row.schema_name, row.table_name),
                    schema_name: row.schema_name,
                    table_name: row.table_name,
                    kind: TableKind::from_catalog(&row.kind),
                    column_count: row.column_count,
                });
            }
        }
    }

    tables
}

/// Ordered column list for one table; empty on any error.
pub fn get_table_columns(client: &mut Client, schema: &str, table: &str) -> Vec<ColumnDescriptor> {
    let rows = match client.query(COLUMNS_QUERY, &[&schema, &table]) {
        Ok(rows) => rows,
        Err(e) => {
            error!("Failed to read columns for {}.{}: {}", schema, table, e);
            return Vec::new();
        }
    };

    let fqn = format!("{}.{}", schema, table);
    rows.iter()
        .map(|row| ColumnDescriptor {
            table_fqn: fqn.clone(),
            name: row.get(0),
            data_type: row.get(1),
            nullable: row.get::<_, String>(2) == "YES",
            default: row.get(3),
            max_length: row.get(4),
            numeric_precision: row.get(5),
            numeric_scale: row.get(6),
        })
        .collect()
}

/// Schema-level aggregate, derived from the snapshot rather than persisted.
pub fn schema_summaries(tables: &[TableDescriptor]) -> Vec<SchemaSummary> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for table in tables {
        *counts.entry(table.schema_name.as_str()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(schema_name, table_count)| SchemaSummary {
            schema_name: schema_name.to_string(),
            table_count,
        })
        .collect()
}
