//! Literal SQL rendering.
//!
//! Every generated statement is replayable text, so every value that ends up in
//! one goes through this module. [`quote_literal`] mirrors PostgreSQL's
//! `quote_literal()`; [`bind_condition`] substitutes `%s` placeholders of a
//! condition template with rendered [`ParamValue`]s.

use crate::error::{GenError, GenResult};
use serde::Deserialize;
use std::fmt;

/// The text emitted for a SQL null.
pub const NULL: &str = "NULL";

/// Quote `value` as a SQL string literal.
///
/// Single quotes are doubled. A value containing a backslash is emitted in the
/// escape-string form (`E'...'`) with every backslash doubled, so the literal reads
/// back identically whatever `standard_conforming_strings` is set to.
pub fn quote_literal(value: &str) -> String {
    let has_backslash = value.contains('\\');
    let mut out = String::with_capacity(value.len() + 3);
    if has_backslash {
        out.push('E');
    }
    out.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Quote a nullable text value, rendering `None` as `NULL`.
pub fn quote_nullable(value: Option<&str>) -> String {
    match value {
        Some(v) => quote_literal(v),
        None => NULL.to_string(),
    }
}

/// Render a nullable text value verbatim, rendering `None` as `NULL`.
///
/// Used for the primary key, whose text form is emitted unquoted.
pub fn raw_nullable(value: Option<&str>) -> String {
    value.unwrap_or(NULL).to_string()
}

/// A value substituted into a condition template.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl ParamValue {
    /// Render the value as a SQL literal: text quoted, everything else bare.
    ///
    /// Negative numbers get a leading space so a preceding `-` in the template
    /// never forms a `--` comment.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Bool(true) => "TRUE".to_string(),
            Self::Bool(false) => "FALSE".to_string(),
            Self::Integer(n) => signed_number(n.to_string()),
            Self::Float(f) if f.is_finite() => signed_number(f.to_string()),
            Self::Float(f) => quote_literal(&f.to_string()),
            Self::Text(s) => quote_literal(s),
            Self::Null => NULL.to_string(),
        }
    }

    /// Wrap the value as a `%value%` pattern for `LIKE` conditions.
    ///
    /// The result is always text; `Null` stays `Null`.
    pub fn like_pattern(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            other => Self::Text(format!("%{other}%")),
        }
    }

    /// The value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

fn signed_number(text: String) -> String {
    if text.starts_with('-') {
        format!(" {text}")
    } else {
        text
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Null => f.write_str(NULL),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Substitute the `%s` placeholders of `template` with literal `params`, in order.
///
/// `%%` renders a single `%`. Any other `%` sequence, or a placeholder count that
/// differs from `params.len()`, is a validation error.
pub fn bind_condition(template: &str, params: &[ParamValue]) -> GenResult<String> {
    let mut out = String::with_capacity(template.len() + params.len() * 8);
    let mut remaining = params.iter();
    let mut used = 0usize;
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => {
                let Some(param) = remaining.next() else {
                    return Err(GenError::validation(format!(
                        "condition '{template}' has more placeholders than the {} supplied parameter(s)",
                        params.len()
                    )));
                };
                used += 1;
                out.push_str(&param.to_sql_literal());
            }
            Some('%') => out.push('%'),
            Some(other) => {
                return Err(GenError::validation(format!(
                    "unsupported placeholder '%{other}' in condition '{template}' (use %s, or %% for a literal %)"
                )));
            }
            None => {
                return Err(GenError::validation(format!(
                    "dangling '%' at end of condition '{template}'"
                )));
            }
        }
    }

    if used != params.len() {
        return Err(GenError::validation(format!(
            "condition '{template}' uses {used} placeholder(s) but {} parameter(s) were supplied",
            params.len()
        )));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_plain_text() {
        assert_eq!(quote_literal("hello"), "'hello'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn quote_doubles_single_quotes() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal("''"), "''''''");
    }

    #[test]
    fn quote_backslash_uses_escape_string() {
        assert_eq!(quote_literal(r"C:\temp"), r"E'C:\\temp'");
        assert_eq!(quote_literal(r"it's \n"), r"E'it''s \\n'");
    }

    #[test]
    fn quote_keeps_unicode_and_newlines() {
        assert_eq!(quote_literal("héllo\nwörld"), "'héllo\nwörld'");
    }

    #[test]
    fn nullable_rendering() {
        assert_eq!(quote_nullable(None), "NULL");
        assert_eq!(quote_nullable(Some("x")), "'x'");
        assert_eq!(raw_nullable(Some("42")), "42");
        assert_eq!(raw_nullable(None), "NULL");
    }

    #[test]
    fn param_literals() {
        assert_eq!(ParamValue::from("42").to_sql_literal(), "'42'");
        assert_eq!(ParamValue::Integer(42).to_sql_literal(), "42");
        assert_eq!(ParamValue::Float(1.5).to_sql_literal(), "1.5");
        assert_eq!(ParamValue::Float(f64::NAN).to_sql_literal(), "'NaN'");
        assert_eq!(ParamValue::Bool(true).to_sql_literal(), "TRUE");
        assert_eq!(ParamValue::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn like_pattern_wraps_as_text() {
        assert_eq!(
            ParamValue::from("abc").like_pattern(),
            ParamValue::Text("%abc%".into())
        );
        assert_eq!(
            ParamValue::Integer(7).like_pattern(),
            ParamValue::Text("%7%".into())
        );
        assert_eq!(ParamValue::Null.like_pattern(), ParamValue::Null);
    }

    #[test]
    fn params_deserialize_by_json_type() {
        let values: Vec<ParamValue> =
            serde_json::from_str(r#"["formId", 3, 2.5, true, null]"#).unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Text("formId".into()),
                ParamValue::Integer(3),
                ParamValue::Float(2.5),
                ParamValue::Bool(true),
                ParamValue::Null,
            ]
        );
    }

    #[test]
    fn bind_single_placeholder() {
        let sql = bind_condition("form_id = %s", &["42".into()]).unwrap();
        assert_eq!(sql, "form_id = '42'");
    }

    #[test]
    fn bind_multiple_placeholders_in_order() {
        let sql = bind_condition(
            "form_id = %s AND position > %s",
            &["42".into(), ParamValue::Integer(3)],
        )
        .unwrap();
        assert_eq!(sql, "form_id = '42' AND position > 3");
    }

    #[test]
    fn negative_numbers_never_open_a_comment() {
        assert_eq!(ParamValue::Integer(-5).to_sql_literal(), " -5");
        assert_eq!(ParamValue::Float(-0.5).to_sql_literal(), " -0.5");

        let sql = bind_condition(
            "position = -%s AND form_id = %s",
            &[ParamValue::Integer(-5), "42".into()],
        )
        .unwrap();
        assert_eq!(sql, "position = - -5 AND form_id = '42'");
        assert!(!sql.contains("--"));
    }

    #[test]
    fn bind_escapes_text() {
        let sql = bind_condition("label = %s", &["it's".into()]).unwrap();
        assert_eq!(sql, "label = 'it''s'");
    }

    #[test]
    fn bind_double_percent_is_literal() {
        let sql = bind_condition("code LIKE 'svc%%' AND id = %s", &[ParamValue::Integer(1)]).unwrap();
        assert_eq!(sql, "code LIKE 'svc%' AND id = 1");
    }

    #[test]
    fn bind_without_params() {
        assert_eq!(bind_condition("active", &[]).unwrap(), "active");
    }

    #[test]
    fn bind_rejects_missing_params() {
        assert!(bind_condition("a = %s AND b = %s", &["1".into()]).is_err());
    }

    #[test]
    fn bind_rejects_unused_params() {
        assert!(bind_condition("a = %s", &["1".into(), "2".into()]).is_err());
    }

    #[test]
    fn bind_rejects_unknown_escape() {
        assert!(bind_condition("a = %d", &[ParamValue::Integer(1)]).is_err());
        assert!(bind_condition("a LIKE 'x%", &[]).is_err());
    }
}
