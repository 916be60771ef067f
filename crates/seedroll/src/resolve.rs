//! Service and form identifier lookup.
//!
//! A run is scoped to one service code. Before any table is processed the code
//! is resolved to its service id, and the service id to its form id, against
//! the configuration database. Soft-deleted rows (`deleted_at IS NOT NULL`) are
//! invisible. Ids are fetched as text, whatever their column type.

use crate::client::{TextClient, TextRowExt};
use crate::error::{GenError, GenResult};
use crate::query::RunParameters;

const SERVICE_SQL: &str = "SELECT id::text FROM services WHERE code = $1 AND deleted_at IS NULL";

const FORM_SQL: &str =
    "SELECT id::text FROM forms WHERE service::text = $1 AND deleted_at IS NULL";

/// Run parameter holding the service code.
pub const PARAM_CODE: &str = "code";
/// Run parameter holding the resolved service id.
pub const PARAM_SERVICE_ID: &str = "serviceId";
/// Run parameter holding the resolved form id.
pub const PARAM_FORM_ID: &str = "formId";

/// The identifiers a run is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIds {
    pub code: String,
    pub service_id: String,
    pub form_id: String,
}

impl ServiceIds {
    /// `code`, `serviceId` and `formId`, all as text values.
    pub fn run_parameters(&self) -> RunParameters {
        RunParameters::new()
            .with(PARAM_CODE, self.code.as_str())
            .with(PARAM_SERVICE_ID, self.service_id.as_str())
            .with(PARAM_FORM_ID, self.form_id.as_str())
    }
}

/// Resolve `code` to its live service and form ids.
pub async fn resolve_service<C: TextClient>(client: &C, code: &str) -> GenResult<ServiceIds> {
    let service_id = lookup_id(client, SERVICE_SQL, code)
        .await?
        .ok_or_else(|| GenError::not_found(format!("No service found for code: {code}")))?;
    tracing::debug!(service_id = %service_id, "resolved service");

    let form_id = lookup_id(client, FORM_SQL, &service_id)
        .await?
        .ok_or_else(|| {
            GenError::not_found(format!("No form found for service ID: {service_id}"))
        })?;
    tracing::debug!(form_id = %form_id, "resolved form");

    Ok(ServiceIds {
        code: code.to_string(),
        service_id,
        form_id,
    })
}

async fn lookup_id<C: TextClient>(client: &C, sql: &str, key: &str) -> GenResult<Option<String>> {
    let rows = client.query_text(sql, &[&key]).await?;
    if rows.len() > 1 {
        tracing::warn!(key, matches = rows.len(), "lookup matched several rows; using the first");
    }
    match rows.first() {
        Some(row) => Ok(Some(row.required(0, "id")?.to_string())),
        None => Ok(None),
    }
}
