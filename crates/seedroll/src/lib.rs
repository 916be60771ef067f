//! # seedroll
//!
//! Package a PostgreSQL data migration together with its reverse.
//!
//! For every configured table seedroll reads the rows matching a condition from a
//! live database and writes them out as literal, replayable SQL:
//!
//! - one `INSERT ... ON CONFLICT (id) DO NOTHING;` (or `DO UPDATE SET ...` for
//!   upsert tables) per matching row
//! - one `DELETE FROM <table> WHERE <condition>;` reversing the batch
//! - a rollback script with those DELETEs in foreign-key-safe order
//!
//! No statement contains a bind placeholder; every value is rendered as a
//! quoted literal by [`literal`].
//!
//! ```ignore
//! use seedroll::{QuerySpec, RunContext, RunParameters, TablePolicy, process_database};
//!
//! let specs = vec![
//!     QuerySpec::new("options", "form_id = %s")
//!         .param("formId")
//!         .exclude("created_at"),
//! ];
//! let ctx = RunContext {
//!     run_id: "svc-01".into(),
//!     output_dir: "generated".into(),
//!     params: RunParameters::new().with("formId", "42"),
//!     policy: TablePolicy {
//!         ordered_tables: vec!["options".into(), "forms".into()],
//!         ..Default::default()
//!     },
//! };
//! let report = process_database(&client, "forms", &specs, &ctx).await?;
//! ```

pub mod artifact;
pub mod client;
pub mod error;
pub mod ident;
pub mod literal;
pub mod query;
pub mod resolve;
pub mod rollback;
pub mod run;
pub mod schema_introspect;
pub mod synth;

pub use artifact::{Artifact, ArtifactPaths, Section};
pub use client::{TextClient, TextRow, TextRowExt};
pub use error::{GenError, GenResult};
pub use ident::Ident;
pub use literal::{ParamValue, bind_condition, quote_literal};
pub use query::{QuerySpec, RunParameters};
pub use resolve::{ServiceIds, resolve_service};
pub use rollback::RollbackBundle;
pub use run::{
    DatabaseReport, RunContext, RunPhase, TableOutcome, TablePolicy, TableReport,
    process_database,
};
pub use schema_introspect::{ColumnInfo, DbSchema, TableInfo, load_schema_from_db};
pub use synth::{ConflictPolicy, InsertTemplate, Synthesizer, TableStatements};
