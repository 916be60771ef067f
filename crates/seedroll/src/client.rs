//! Text-mode database access.
//!
//! Every query seedroll issues projects its columns as `text`, so rows are handed
//! around as plain `Vec<Option<String>>`. This keeps the inspector, synthesizer
//! and resolver independent of `tokio_postgres::Row`, which cannot be built
//! outside a live connection.

use crate::error::{GenError, GenResult};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// One result row, every column decoded as nullable text.
pub type TextRow = Vec<Option<String>>;

/// A PostgreSQL session that returns rows as text.
///
/// Implemented for `tokio_postgres::Client`.
pub trait TextClient: Send + Sync {
    /// Execute a query and return all rows as text.
    ///
    /// Every selected column must be of a type that decodes as text
    /// (cast with `::text` when in doubt).
    fn query_text(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = GenResult<Vec<TextRow>>> + Send;
}

impl TextClient for tokio_postgres::Client {
    async fn query_text(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> GenResult<Vec<TextRow>> {
        let rows = tokio_postgres::Client::query(self, sql, params).await?;
        rows.iter().map(decode_text_row).collect()
    }
}

fn decode_text_row(row: &Row) -> GenResult<TextRow> {
    (0..row.len())
        .map(|idx| {
            row.try_get::<_, Option<String>>(idx).map_err(|e| {
                let column = row
                    .columns()
                    .get(idx)
                    .map(|c| c.name().to_string())
                    .unwrap_or_else(|| idx.to_string());
                GenError::decode(column, e.to_string())
            })
        })
        .collect()
}

/// Extension trait for reading columns out of a [`TextRow`].
pub trait TextRowExt {
    /// Column `idx`, which may be null.
    fn nullable(&self, idx: usize, column: &str) -> GenResult<Option<&str>>;

    /// Column `idx`, which must be non-null.
    fn required(&self, idx: usize, column: &str) -> GenResult<&str> {
        self.nullable(idx, column)?
            .ok_or_else(|| GenError::decode(column, "unexpected NULL"))
    }
}

impl TextRowExt for TextRow {
    fn nullable(&self, idx: usize, column: &str) -> GenResult<Option<&str>> {
        self.get(idx)
            .map(|v| v.as_deref())
            .ok_or_else(|| GenError::decode(column, format!("row has no column {idx}")))
    }
}
