//! Live schema metadata, loaded once per connection.
//!
//! Relations are matched by bare name across every schema on the connection's
//! search path. When two schemas hold the same name, the one earlier on the
//! search path wins, which is the relation PostgreSQL itself resolves the
//! unqualified name to.

use crate::client::{TextClient, TextRowExt};
use crate::error::{GenError, GenResult};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    /// Columns in physical ordinal order.
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    /// Columns in ordinal order, minus those named in `exclude`.
    pub fn selected_columns<'a>(&'a self, exclude: &BTreeSet<String>) -> Vec<&'a ColumnInfo> {
        self.columns
            .iter()
            .filter(|c| !exclude.contains(&c.name))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbSchema {
    /// Tables ordered by search-path position, then name.
    pub tables: Vec<TableInfo>,
}

impl DbSchema {
    pub fn find_table(&self, table: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name == table)
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.find_table(table).is_some()
    }

    /// Like [`DbSchema::find_table`], failing with [`GenError::TableNotFound`].
    pub fn require_table(&self, table: &str) -> GenResult<&TableInfo> {
        self.find_table(table)
            .ok_or_else(|| GenError::TableNotFound(table.to_string()))
    }

    /// Column names of `table` in ordinal order, minus `exclude`.
    pub fn columns(&self, table: &str, exclude: &BTreeSet<String>) -> GenResult<Vec<String>> {
        Ok(self
            .require_table(table)?
            .selected_columns(exclude)
            .into_iter()
            .map(|c| c.name.clone())
            .collect())
    }
}

const SCHEMA_SQL: &str = r#"
SELECT
  n.nspname::text AS schema_name,
  c.relname::text AS table_name,
  a.attname::text AS column_name,
  pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.oid
WHERE c.relkind IN ('r', 'p', 'v', 'm', 'f')
  AND a.attnum > 0
  AND NOT a.attisdropped
  AND n.nspname = ANY(pg_catalog.current_schemas(false))
ORDER BY
  array_position(pg_catalog.current_schemas(false), n.nspname),
  c.relname,
  a.attnum
"#;

/// Read every relation visible on the search path, with its columns.
pub async fn load_schema_from_db<C: TextClient>(client: &C) -> GenResult<DbSchema> {
    let rows = client.query_text(SCHEMA_SQL, &[]).await?;

    let mut tables: Vec<TableInfo> = Vec::new();
    for row in &rows {
        let schema_name = row.required(0, "schema_name")?;
        let table_name = row.required(1, "table_name")?;
        let column = ColumnInfo {
            name: row.required(2, "column_name")?.to_string(),
            data_type: row.required(3, "data_type")?.to_string(),
        };

        // Rows arrive grouped by (schema, table), so only the last entry can match.
        match tables.last_mut() {
            Some(t) if t.schema == schema_name && t.name == table_name => t.columns.push(column),
            _ => tables.push(TableInfo {
                schema: schema_name.to_string(),
                name: table_name.to_string(),
                columns: vec![column],
            }),
        }
    }

    tracing::debug!(tables = tables.len(), "loaded schema metadata");
    Ok(DbSchema { tables })
}
