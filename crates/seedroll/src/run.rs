//! Per-database run orchestration.
//!
//! [`process_database`] walks one database's [`QuerySpec`]s in order. For each
//! table that matches rows it appends a DELETE section (unless the table is
//! delete-excluded) and an INSERT section to the insert/delete script, and
//! records the DELETE for the rollback script. A failing table is logged and
//! skipped; the rollback script is written once, after the last table.

use crate::artifact::{Artifact, ArtifactPaths, Section};
use crate::client::TextClient;
use crate::error::GenResult;
use crate::ident::Ident;
use crate::query::{QuerySpec, RunParameters};
use crate::rollback::RollbackBundle;
use crate::schema_introspect::load_schema_from_db;
use crate::synth::Synthesizer;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Table sets shared by every database of a run.
#[derive(Debug, Clone, Default)]
pub struct TablePolicy {
    /// Dependency order for rollback sections (children before parents).
    pub ordered_tables: Vec<String>,
    /// Tables whose INSERTs update existing rows on conflict.
    pub upsert_tables: BTreeSet<String>,
    /// Insert-only tables: no DELETE in either script.
    pub delete_excluded_tables: BTreeSet<String>,
}

impl TablePolicy {
    pub fn allows_delete(&self, table: &str) -> bool {
        !self.delete_excluded_tables.contains(table)
    }

    /// Fold every table name the way a [`QuerySpec::table_name`] is folded, so
    /// `Options` in a set matches a spec naming `Options` or `options`.
    pub fn canonicalized(self) -> GenResult<Self> {
        Ok(Self {
            ordered_tables: self
                .ordered_tables
                .iter()
                .map(|t| canonical_table(t))
                .collect::<GenResult<_>>()?,
            upsert_tables: self
                .upsert_tables
                .iter()
                .map(|t| canonical_table(t))
                .collect::<GenResult<_>>()?,
            delete_excluded_tables: self
                .delete_excluded_tables
                .iter()
                .map(|t| canonical_table(t))
                .collect::<GenResult<_>>()?,
        })
    }
}

fn canonical_table(name: &str) -> GenResult<String> {
    Ok(Ident::parse(name)?.name().to_string())
}

/// Everything a run needs besides the database session.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Scopes the rollback script name (the service code).
    pub run_id: String,
    /// Directory the scripts are written into.
    pub output_dir: PathBuf,
    pub params: RunParameters,
    pub policy: TablePolicy,
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    ResolvingIdentifiers,
    ProcessingTables { index: usize, total: usize },
    FlushingRollback,
    Done,
}

impl RunPhase {
    /// Log the transition into this phase.
    pub fn enter(self) {
        tracing::debug!(phase = %self, "run phase");
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::ResolvingIdentifiers => f.write_str("resolving identifiers"),
            Self::ProcessingTables { index, total } => {
                write!(f, "processing table {}/{}", index + 1, total)
            }
            Self::FlushingRollback => f.write_str("flushing rollback"),
            Self::Done => f.write_str("done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// Rows matched; `delete` is false for delete-excluded tables.
    Generated { inserts: usize, delete: bool },
    /// No rows matched, nothing written.
    NoRows,
    /// Processing failed; the message was logged.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
}

/// What happened to one database's tables.
#[derive(Debug, Clone)]
pub struct DatabaseReport {
    pub database: String,
    pub paths: ArtifactPaths,
    pub tables: Vec<TableReport>,
    pub rollback_statements: usize,
}

impl DatabaseReport {
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Failed(_)))
    }

    pub fn generated(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Generated { .. }))
    }

    pub fn inserts(&self) -> usize {
        self.tables
            .iter()
            .map(|t| match t.outcome {
                TableOutcome::Generated { inserts, .. } => inserts,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, pred: impl Fn(&TableOutcome) -> bool) -> usize {
        self.tables.iter().filter(|t| pred(&t.outcome)).count()
    }
}

/// Generate the insert/delete and rollback scripts for one database.
///
/// Errors only when a script cannot be opened or the rollback cannot be
/// written. Per-table failures, including a schema metadata load that fails
/// every table, are logged and reported in the returned [`DatabaseReport`].
pub async fn process_database<C: TextClient>(
    client: &C,
    database: &str,
    specs: &[QuerySpec],
    ctx: &RunContext,
) -> GenResult<DatabaseReport> {
    let paths = ArtifactPaths::new(&ctx.output_dir, database, &ctx.run_id);
    let script = Artifact::open(&paths.insert_script)?;
    if script.was_fresh() {
        script.append_header(&[
            format!("Insert/delete statements for database: {database}"),
            format!("Run: {}", ctx.run_id),
        ])?;
    }

    let mut rollback = RollbackBundle::new(ctx.policy.ordered_tables.iter().cloned());
    let mut tables = Vec::with_capacity(specs.len());

    // Without schema metadata no table can be synthesized; each one fails on its own.
    match load_schema_from_db(client).await {
        Ok(schema) => {
            let synth = Synthesizer::new(&schema, &ctx.policy.upsert_tables);
            for (index, spec) in specs.iter().enumerate() {
                RunPhase::ProcessingTables {
                    index,
                    total: specs.len(),
                }
                .enter();

                let outcome =
                    match process_table(client, &synth, spec, ctx, &script, &mut rollback).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(table = %spec.table_name, error = %e, "error processing table");
                            TableOutcome::Failed(e.to_string())
                        }
                    };
                tables.push(TableReport {
                    table: spec.table_name.clone(),
                    outcome,
                });
            }
        }
        Err(e) => {
            tracing::error!(database, error = %e, "error loading schema metadata");
            tables.extend(specs.iter().map(|spec| TableReport {
                table: spec.table_name.clone(),
                outcome: TableOutcome::Failed(e.to_string()),
            }));
        }
    }

    RunPhase::FlushingRollback.enter();
    let rollback_script = Artifact::open(&paths.rollback_script)?;
    if !rollback.is_empty() {
        if rollback_script.was_fresh() {
            rollback_script.append_header(&[
                format!("Rollback for database: {database}"),
                format!("Run: {}", ctx.run_id),
            ])?;
        }
        rollback.flush(&mut rollback_script.writer()?)?;
    }
    tracing::info!(
        database,
        path = %rollback_script.path().display(),
        count = rollback.len(),
        "rollback statements written"
    );

    Ok(DatabaseReport {
        database: database.to_string(),
        rollback_statements: rollback.len(),
        paths,
        tables,
    })
}

async fn process_table<C: TextClient>(
    client: &C,
    synth: &Synthesizer<'_>,
    spec: &QuerySpec,
    ctx: &RunContext,
    script: &Artifact,
    rollback: &mut RollbackBundle,
) -> GenResult<TableOutcome> {
    let params = ctx.params.resolve(spec);
    let statements = synth.synthesize(client, spec, &params).await?;

    // Nothing inserted means nothing to delete or roll back.
    if statements.is_empty() {
        tracing::info!(table = %statements.table, "no insert statements generated");
        return Ok(TableOutcome::NoRows);
    }

    let table = statements.table.as_str();
    let delete = statements
        .delete
        .as_ref()
        .filter(|_| ctx.policy.allows_delete(table));

    if let Some(delete) = delete {
        script.append_section(Section::Delete, table, std::slice::from_ref(delete))?;
    }
    script.append_section(Section::Insert, table, &statements.inserts)?;
    if let Some(delete) = delete {
        rollback.record(table, delete.as_str());
    }

    tracing::info!(
        table,
        count = statements.inserts.len(),
        path = %script.path().display(),
        "insert and delete statements appended"
    );

    Ok(TableOutcome::Generated {
        inserts: statements.inserts.len(),
        delete: delete.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_policy() {
        let policy = TablePolicy {
            delete_excluded_tables: BTreeSet::from(["audit".to_string()]),
            ..TablePolicy::default()
        };
        assert!(policy.allows_delete("options"));
        assert!(!policy.allows_delete("audit"));
    }

    #[test]
    fn canonicalized_policy_folds_like_table_names() {
        let policy = TablePolicy {
            ordered_tables: vec!["Options".into(), "\"Forms\"".into()],
            upsert_tables: BTreeSet::from(["Options".to_string()]),
            delete_excluded_tables: BTreeSet::from(["AUDIT".to_string()]),
        }
        .canonicalized()
        .unwrap();

        assert_eq!(policy.ordered_tables, ["options", "Forms"]);
        assert!(policy.upsert_tables.contains("options"));
        assert!(!policy.allows_delete("audit"));
    }

    #[test]
    fn canonicalized_policy_rejects_qualified_names() {
        let policy = TablePolicy {
            ordered_tables: vec!["public.options".into()],
            ..TablePolicy::default()
        };
        assert!(policy.canonicalized().is_err());
    }

    #[test]
    fn phase_display() {
        assert_eq!(
            RunPhase::ProcessingTables { index: 0, total: 3 }.to_string(),
            "processing table 1/3"
        );
        assert_eq!(RunPhase::FlushingRollback.to_string(), "flushing rollback");
    }

    #[test]
    fn report_counts() {
        let report = DatabaseReport {
            database: "forms".into(),
            paths: ArtifactPaths::new(std::path::Path::new("/out"), "forms", "svc"),
            tables: vec![
                TableReport {
                    table: "a".into(),
                    outcome: TableOutcome::Generated {
                        inserts: 2,
                        delete: true,
                    },
                },
                TableReport {
                    table: "b".into(),
                    outcome: TableOutcome::NoRows,
                },
                TableReport {
                    table: "c".into(),
                    outcome: TableOutcome::Failed("boom".into()),
                },
            ],
            rollback_statements: 1,
        };
        assert_eq!(report.generated(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.inserts(), 2);
    }
}
