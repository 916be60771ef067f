use crate::cli::GenerateArgs;
use crate::config::{CONFIG_DATABASE, ProjectConfig};
use crate::connect::{Connector, PgConnector};
use chrono::{DateTime, Local};
use seedroll::artifact::file_component;
use seedroll::{DatabaseReport, RunContext, RunPhase, TableOutcome, process_database, resolve_service};
use std::path::{Path, PathBuf};

pub async fn run(args: GenerateArgs) -> anyhow::Result<()> {
    RunPhase::Init.enter();
    let project = ProjectConfig::load(args.config.clone())?;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| project.output_dir());

    let summary = generate(&PgConnector, &project, &args.code, &output_dir, Local::now()).await?;

    RunPhase::Done.enter();
    if let Some(key) = &summary.stopped_at {
        tracing::warn!(query_key = %key, "run stopped before processing every database");
    }
    tracing::info!(
        path = %summary.run_dir.display(),
        databases = summary.reports.len(),
        "run finished"
    );
    Ok(())
}

/// What a run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    /// One report per processed database, in configuration order.
    pub reports: Vec<DatabaseReport>,
    /// Query key whose database stopped the run, if any.
    pub stopped_at: Option<String>,
}

/// Resolve the service, then process every configured database in file order.
///
/// Fails only before table processing starts (configuration, connecting to the
/// lookup database, identifier resolution, creating the run directory). After
/// that, a database that cannot be connected to or written out stops the run
/// and is reported in [`RunSummary::stopped_at`].
pub async fn generate<K: Connector>(
    connector: &K,
    project: &ProjectConfig,
    code: &str,
    output_dir: &Path,
    now: DateTime<Local>,
) -> anyhow::Result<RunSummary> {
    RunPhase::ResolvingIdentifiers.enter();
    let ids = {
        let (name, conn) = project.database_for_key(CONFIG_DATABASE)?;
        let client = connector.connect(name, conn).await?;
        resolve_service(&client, code).await?
    };
    tracing::info!(
        code = %ids.code,
        service_id = %ids.service_id,
        form_id = %ids.form_id,
        "resolved service"
    );

    let run_dir = run_directory(output_dir, code, now);
    std::fs::create_dir_all(&run_dir)
        .map_err(|e| anyhow::anyhow!("failed to create directory {}: {e}", run_dir.display()))?;

    let ctx = RunContext {
        run_id: code.to_string(),
        output_dir: run_dir.clone(),
        params: ids.run_parameters(),
        policy: project.table_policy()?,
    };

    let mut summary = RunSummary {
        run_dir,
        reports: Vec::new(),
        stopped_at: None,
    };

    for (key, specs) in &project.file.queries {
        let (name, conn) = project.database_for_key(key)?;
        let database = conn.database_name(name);

        let client = match connector.connect(name, conn).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(query_key = %key, error = %format!("{e:#}"), "error while processing; stopping");
                summary.stopped_at = Some(key.clone());
                break;
            }
        };

        match process_database(&client, &database, specs, &ctx).await {
            Ok(report) => {
                log_report(key, &report);
                summary.reports.push(report);
            }
            Err(e) => {
                tracing::error!(query_key = %key, database = %database, error = %e, "error while processing; stopping");
                summary.stopped_at = Some(key.clone());
                break;
            }
        }
    }

    Ok(summary)
}

/// `<output_dir>/generated_<YYYYMMDDHHMM>_<code>`
fn run_directory(output_dir: &Path, code: &str, now: DateTime<Local>) -> PathBuf {
    output_dir.join(format!(
        "generated_{}_{}",
        now.format("%Y%m%d%H%M"),
        file_component(code)
    ))
}

fn log_report(key: &str, report: &DatabaseReport) {
    for table in &report.tables {
        if let TableOutcome::Failed(message) = &table.outcome {
            tracing::warn!(table = %table.table, error = %message, "table skipped");
        }
    }
    tracing::info!(
        query_key = key,
        database = %report.database,
        tables = report.tables.len(),
        generated = report.generated(),
        failed = report.failed(),
        inserts = report.inserts(),
        rollback = report.rollback_statements,
        path = %report.paths.insert_script.display(),
        "database processed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::connect::ConnectionConfig;
    use chrono::TimeZone;
    use seedroll::{GenError, GenResult, TextClient, TextRow};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio_postgres::types::ToSql;

    const OPTIONS_SELECTION: &str =
        "SELECT id::text, form_id::text, label::text FROM options WHERE form_id = '42'";

    /// Answers the catalog query from `tables` and everything else from the
    /// first `rows` entry whose key the SQL contains.
    #[derive(Clone, Default)]
    struct FakeDb {
        tables: Vec<(&'static str, Vec<&'static str>)>,
        rows: Vec<(&'static str, Vec<TextRow>)>,
        catalog_unavailable: bool,
    }

    impl FakeDb {
        fn lookup_db(service_ids: &[&str]) -> Self {
            let ids = |v: &[&str]| -> Vec<TextRow> {
                v.iter().map(|id| vec![Some(id.to_string())]).collect()
            };
            Self {
                rows: vec![
                    ("FROM services", ids(service_ids)),
                    ("FROM forms WHERE service", ids(&["42"])),
                ],
                ..Self::default()
            }
        }

        fn options_db() -> Self {
            Self {
                tables: vec![("options", vec!["id", "form_id", "label"])],
                rows: vec![(
                    OPTIONS_SELECTION,
                    vec![vec![Some("1".into()), Some("42".into()), Some("Yes".into())]],
                )],
                ..Self::default()
            }
        }
    }

    impl TextClient for FakeDb {
        async fn query_text(
            &self,
            sql: &str,
            _params: &[&(dyn ToSql + Sync)],
        ) -> GenResult<Vec<TextRow>> {
            if sql.contains("pg_catalog.pg_attribute") {
                if self.catalog_unavailable {
                    return Err(GenError::validation("catalog query failed"));
                }
                return Ok(self
                    .tables
                    .iter()
                    .flat_map(|(table, columns)| {
                        columns.iter().map(move |c| {
                            vec![
                                Some("public".to_string()),
                                Some(table.to_string()),
                                Some(c.to_string()),
                                Some("text".to_string()),
                            ]
                        })
                    })
                    .collect());
            }
            Ok(self
                .rows
                .iter()
                .find(|(key, _)| sql.contains(*key))
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default())
        }
    }

    /// Hands out a [`FakeDb`] per configured database; unknown names refuse to connect.
    struct FakeConnector {
        dbs: HashMap<&'static str, FakeDb>,
        connected: Mutex<Vec<String>>,
    }

    impl FakeConnector {
        fn new(dbs: &[(&'static str, FakeDb)]) -> Self {
            Self {
                dbs: dbs.iter().cloned().collect(),
                connected: Mutex::new(Vec::new()),
            }
        }

        fn connected(&self) -> Vec<String> {
            self.connected.lock().unwrap().clone()
        }
    }

    impl Connector for FakeConnector {
        type Client = FakeDb;

        async fn connect(&self, name: &str, _conn: &ConnectionConfig) -> anyhow::Result<FakeDb> {
            self.connected.lock().unwrap().push(name.to_string());
            self.dbs
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("failed to connect to database {name}: connection refused"))
        }
    }

    fn project(dir: &Path, keys: &[&str]) -> ProjectConfig {
        let mut toml = String::from(
            "ordered_tables = [\"options\"]\n\
             [databases.config]\nhost = \"localhost\"\n\
             [databases.zeta]\nhost = \"localhost\"\ndatabase = \"zeta_db\"\n\
             [databases.alpha]\nhost = \"localhost\"\n\
             [databases.billing]\nhost = \"localhost\"\n",
        );
        for key in keys {
            toml.push_str(&format!(
                "[[queries.{key}]]\ntable_name = \"options\"\ncondition = \"form_id = %s\"\nparams = [\"formId\"]\n"
            ));
        }
        let file: ConfigFile = toml::from_str(&toml).unwrap();
        ProjectConfig {
            config_path: dir.join("seedroll.toml"),
            config_dir: dir.to_path_buf(),
            file,
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 59).unwrap()
    }

    #[test]
    fn run_directory_uses_minute_timestamp_and_code() {
        assert_eq!(
            run_directory(Path::new("generated"), "svc-01", now()),
            PathBuf::from("generated/generated_202403091405_svc-01")
        );
        assert_eq!(
            run_directory(Path::new("out"), "a/b", now()),
            PathBuf::from("out/generated_202403091405_a_b")
        );
    }

    #[tokio::test]
    async fn databases_are_processed_in_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(&[
            ("config", FakeDb::lookup_db(&["7"])),
            ("zeta", FakeDb::options_db()),
            ("alpha", FakeDb::options_db()),
        ]);

        let summary = generate(
            &connector,
            &project(dir.path(), &["zeta", "alpha_extra"]),
            "svc-01",
            dir.path(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(connector.connected(), ["config", "zeta", "alpha"]);
        assert_eq!(summary.stopped_at, None);
        assert_eq!(
            summary
                .reports
                .iter()
                .map(|r| r.database.as_str())
                .collect::<Vec<_>>(),
            ["zeta_db", "alpha"]
        );
        assert_eq!(summary.run_dir, dir.path().join("generated_202403091405_svc-01"));

        let script =
            std::fs::read_to_string(summary.run_dir.join("zeta_db_insert_statements.sql")).unwrap();
        assert!(script.contains("DELETE FROM options WHERE form_id = '42';"));
        assert!(summary.run_dir.join("rollback_alpha_svc-01.sql").exists());
    }

    #[tokio::test]
    async fn unresolved_service_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(&[
            ("config", FakeDb::lookup_db(&[])),
            ("zeta", FakeDb::options_db()),
        ]);

        let err = generate(&connector, &project(dir.path(), &["zeta"]), "nope", dir.path(), now())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("No service found for code: nope"), "{err}");
        assert_eq!(connector.connected(), ["config"]);
        assert!(!dir.path().join("generated_202403091405_nope").exists());
    }

    #[tokio::test]
    async fn lookup_database_connect_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(&[("zeta", FakeDb::options_db())]);

        let err = generate(&connector, &project(dir.path(), &["zeta"]), "svc-01", dir.path(), now())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("connection refused"), "{err}");
    }

    #[tokio::test]
    async fn connect_failure_stops_remaining_databases() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(&[
            ("config", FakeDb::lookup_db(&["7"])),
            ("zeta", FakeDb::options_db()),
            ("alpha", FakeDb::options_db()),
        ]);

        let summary = generate(
            &connector,
            &project(dir.path(), &["zeta", "billing", "alpha"]),
            "svc-01",
            dir.path(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(connector.connected(), ["config", "zeta", "billing"]);
        assert_eq!(summary.stopped_at.as_deref(), Some("billing"));
        assert_eq!(summary.reports.len(), 1);
        assert!(!summary.run_dir.join("alpha_insert_statements.sql").exists());
    }

    #[tokio::test]
    async fn schema_failure_moves_on_to_next_database() {
        let dir = tempfile::tempdir().unwrap();
        let broken = FakeDb {
            catalog_unavailable: true,
            ..FakeDb::options_db()
        };
        let connector = FakeConnector::new(&[
            ("config", FakeDb::lookup_db(&["7"])),
            ("zeta", broken),
            ("alpha", FakeDb::options_db()),
        ]);

        let summary = generate(
            &connector,
            &project(dir.path(), &["zeta", "alpha"]),
            "svc-01",
            dir.path(),
            now(),
        )
        .await
        .unwrap();

        assert_eq!(summary.stopped_at, None);
        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.reports[0].failed(), 1);
        assert_eq!(summary.reports[1].generated(), 1);
    }
}
