//! Per-table query specifications and run-scoped parameters.

use crate::literal::ParamValue;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// One table to copy: which rows, and how the generated statements look.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuerySpec {
    /// Unqualified relation name.
    pub table_name: String,
    /// Boolean expression with `%s` placeholders, e.g. `form_id = %s`.
    pub condition: String,
    /// Parameter names (resolved against [`RunParameters`]) or literal values.
    #[serde(default)]
    pub params: Vec<ParamValue>,
    /// Columns left out of the generated column list.
    #[serde(default)]
    pub exclude_columns: BTreeSet<String>,
    /// Wrap every resolved parameter as `%value%`.
    #[serde(default)]
    pub like_condition: bool,
}

impl QuerySpec {
    pub fn new(table_name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            condition: condition.into(),
            params: Vec::new(),
            exclude_columns: BTreeSet::new(),
            like_condition: false,
        }
    }

    pub fn param(mut self, value: impl Into<ParamValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn exclude(mut self, column: impl Into<String>) -> Self {
        self.exclude_columns.insert(column.into());
        self
    }

    pub fn like(mut self) -> Self {
        self.like_condition = true;
        self
    }
}

/// Named values shared by every [`QuerySpec`] of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunParameters {
    values: BTreeMap<String, ParamValue>,
}

impl RunParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Resolve a spec's params into concrete values.
    ///
    /// Text params naming a run parameter are replaced by its value; anything else
    /// passes through as a literal. With `like_condition`, every resolved value is
    /// then wrapped as `%value%`.
    pub fn resolve(&self, spec: &QuerySpec) -> Vec<ParamValue> {
        spec.params
            .iter()
            .map(|p| {
                let resolved = p
                    .as_text()
                    .and_then(|name| self.values.get(name))
                    .unwrap_or(p);
                if spec.like_condition {
                    resolved.like_pattern()
                } else {
                    resolved.clone()
                }
            })
            .collect()
    }
}
