//! Literal INSERT / DELETE synthesis.
//!
//! For each [`QuerySpec`] the synthesizer selects the matching rows of the live
//! source table (every column projected as text) and renders one literal
//! `INSERT ... ON CONFLICT (id) ...;` statement per row, plus a single
//! `DELETE FROM ... WHERE <condition>;` that reverses the whole batch.
//!
//! Rendering rules:
//! - `id` is emitted as its raw text form, never quoted
//! - every other column is a quoted literal, or `NULL`
//! - tables in the upsert set get `DO UPDATE SET col = EXCLUDED.col, ...`,
//!   every other table gets `DO NOTHING`

use crate::client::{TextClient, TextRow};
use crate::error::{GenError, GenResult};
use crate::ident::Ident;
use crate::literal::{ParamValue, bind_condition, quote_nullable, raw_nullable};
use crate::query::QuerySpec;
use crate::schema_introspect::DbSchema;
use std::collections::BTreeSet;

/// The conflict target of every generated INSERT.
pub const PRIMARY_KEY: &str = "id";

/// What a generated INSERT does when the primary key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// `ON CONFLICT (id) DO NOTHING`
    DoNothing,
    /// `ON CONFLICT (id) DO UPDATE SET col = EXCLUDED.col, ...`
    Upsert,
}

impl ConflictPolicy {
    /// Upsert for members of `upsert_tables`, ignore for everything else.
    pub fn for_table(table: &str, upsert_tables: &BTreeSet<String>) -> Self {
        if upsert_tables.contains(table) {
            Self::Upsert
        } else {
            Self::DoNothing
        }
    }
}

/// A prepared INSERT statement shape for one table.
#[derive(Debug, Clone)]
pub struct InsertTemplate {
    table: Ident,
    columns: Vec<Ident>,
    /// `INSERT INTO t (a, b) VALUES (`
    head: String,
    /// `) ON CONFLICT (id) ...;`
    tail: String,
}

impl InsertTemplate {
    pub fn new(table: Ident, columns: Vec<Ident>, policy: ConflictPolicy) -> GenResult<Self> {
        if columns.is_empty() {
            return Err(GenError::validation(format!(
                "no columns left to insert into {table} after exclusions"
            )));
        }

        let column_list = columns
            .iter()
            .map(Ident::to_sql)
            .collect::<Vec<_>>()
            .join(", ");
        let head = format!("INSERT INTO {table} ({column_list}) VALUES (");
        let tail = format!(") {};", conflict_clause(&columns, policy));

        Ok(Self {
            table,
            columns,
            head,
            tail,
        })
    }

    pub fn table(&self) -> &Ident {
        &self.table
    }

    pub fn columns(&self) -> &[Ident] {
        &self.columns
    }

    /// The query that projects every template column as text for rows matching `condition`.
    pub fn selection_sql(&self, condition: &str) -> String {
        let projection = self
            .columns
            .iter()
            .map(|c| format!("{c}::text"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {projection} FROM {} WHERE {condition}",
            self.table
        )
    }

    /// Render one selected row as a literal INSERT statement.
    pub fn render_row(&self, row: &TextRow) -> GenResult<String> {
        if row.len() != self.columns.len() {
            return Err(GenError::validation(format!(
                "expected {} column(s) for {}, got {}",
                self.columns.len(),
                self.table,
                row.len()
            )));
        }

        let literals = self
            .columns
            .iter()
            .zip(row)
            .map(|(col, value)| {
                if col.name() == PRIMARY_KEY {
                    raw_nullable(value.as_deref())
                } else {
                    quote_nullable(value.as_deref())
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = String::with_capacity(self.head.len() + literals.len() + self.tail.len());
        out.push_str(&self.head);
        out.push_str(&literals);
        out.push_str(&self.tail);
        Ok(out)
    }
}

fn conflict_clause(columns: &[Ident], policy: ConflictPolicy) -> String {
    let assignments = columns
        .iter()
        .filter(|c| c.name() != PRIMARY_KEY)
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>();

    match policy {
        ConflictPolicy::Upsert if !assignments.is_empty() => format!(
            "ON CONFLICT ({PRIMARY_KEY}) DO UPDATE SET {}",
            assignments.join(", ")
        ),
        // An upsert with nothing to assign has no valid DO UPDATE form.
        ConflictPolicy::Upsert | ConflictPolicy::DoNothing => {
            format!("ON CONFLICT ({PRIMARY_KEY}) DO NOTHING")
        }
    }
}

/// `DELETE FROM <table> WHERE <condition>;` for an already-bound condition.
pub fn delete_statement(table: &Ident, condition: &str) -> String {
    format!("DELETE FROM {table} WHERE {condition};")
}

/// Statements generated for one [`QuerySpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStatements {
    pub table: String,
    /// One statement per matching row.
    pub inserts: Vec<String>,
    /// Present only when `inserts` is non-empty.
    pub delete: Option<String>,
}

impl TableStatements {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
    }
}

/// Drives INSERT/DELETE synthesis against one database's cached schema.
#[derive(Debug, Clone, Copy)]
pub struct Synthesizer<'a> {
    schema: &'a DbSchema,
    upsert_tables: &'a BTreeSet<String>,
}

impl<'a> Synthesizer<'a> {
    pub fn new(schema: &'a DbSchema, upsert_tables: &'a BTreeSet<String>) -> Self {
        Self {
            schema,
            upsert_tables,
        }
    }

    /// Build the INSERT template for `spec` from the cached schema.
    pub fn template(&self, spec: &QuerySpec) -> GenResult<InsertTemplate> {
        let table = Ident::parse(&spec.table_name)?;
        let info = self.schema.require_table(table.name())?;
        let columns = info
            .selected_columns(&spec.exclude_columns)
            .into_iter()
            .map(|c| Ident::from_catalog(c.name.as_str()))
            .collect();
        let policy = ConflictPolicy::for_table(table.name(), self.upsert_tables);
        InsertTemplate::new(table, columns, policy)
    }

    /// Generate the statements for `spec`, with `params` already resolved.
    ///
    /// No matching rows yields no INSERTs and no DELETE.
    pub async fn synthesize<C: TextClient>(
        &self,
        client: &C,
        spec: &QuerySpec,
        params: &[ParamValue],
    ) -> GenResult<TableStatements> {
        let template = self.template(spec)?;
        let condition = bind_condition(&spec.condition, params)?;

        let rows = client
            .query_text(&template.selection_sql(&condition), &[])
            .await?;
        let inserts = rows
            .iter()
            .map(|row| template.render_row(row))
            .collect::<GenResult<Vec<_>>>()?;

        let delete = if inserts.is_empty() {
            None
        } else {
            Some(delete_statement(template.table(), &condition))
        };

        Ok(TableStatements {
            table: template.table().name().to_string(),
            inserts,
            delete,
        })
    }
}
