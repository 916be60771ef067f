//! SQL identifier handling for generated statements.
//!
//! Table names come from configuration and are validated with [`Ident::parse`].
//! Column names come from the catalog and are wrapped with [`Ident::from_catalog`].
//! Either way, [`Ident::to_sql`] renders the name so PostgreSQL resolves it back to
//! the same relation or column:
//!
//! - plain lowercase names (`[a-z_][a-z0-9_$]*`, not a reserved word) render bare
//! - everything else renders double-quoted, with `"` escaped as `""`
//!
//! Names are matched on the bare relation name only, so schema-qualified names
//! (`public.users`) are rejected.

use crate::error::{GenError, GenResult};

/// Keywords PostgreSQL reserves in every position; these cannot be used as bare column names.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "system_user", "table", "then",
    "to", "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
];

/// A single SQL identifier, stored as the name the catalog knows it by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    name: String,
}

impl Ident {
    /// Wrap a name exactly as it appears in the catalog (no case folding).
    pub fn from_catalog(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Parse an identifier as it would be written in SQL.
    ///
    /// - Unquoted: must match `[A-Za-z_][A-Za-z0-9_$]*`, folded to lowercase.
    /// - Quoted: `"CamelCase"`, kept verbatim, `""` unescapes to `"`.
    pub fn parse(s: &str) -> GenResult<Self> {
        if s.is_empty() {
            return Err(GenError::validation("Identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(GenError::validation(
                "Identifier cannot contain NUL character",
            ));
        }

        let mut chars = s.chars().peekable();

        if chars.peek() == Some(&'"') {
            chars.next(); // opening quote
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some('"') => {
                        // Escaped quote: ""
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            name.push('"');
                        } else {
                            break;
                        }
                    }
                    Some(c) => name.push(c),
                    None => return Err(GenError::validation("Unclosed quoted identifier")),
                }
            }
            if name.is_empty() {
                return Err(GenError::validation("Empty quoted identifier"));
            }
            if let Some(c) = chars.next() {
                return Err(unexpected_after_ident(s, c));
            }
            return Ok(Self { name });
        }

        let mut name = String::with_capacity(s.len());
        for c in chars {
            if name.is_empty() {
                if c == '_' || c.is_ascii_alphabetic() {
                    name.push(c.to_ascii_lowercase());
                } else {
                    return Err(GenError::validation(format!(
                        "Invalid identifier start character: '{c}'"
                    )));
                }
            } else if c == '_' || c == '$' || c.is_ascii_alphanumeric() {
                name.push(c.to_ascii_lowercase());
            } else {
                return Err(unexpected_after_ident(s, c));
            }
        }

        Ok(Self { name })
    }

    /// The catalog name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        if !needs_quotes(&self.name) {
            return self.name.clone();
        }
        let mut out = String::with_capacity(self.name.len() + 2);
        out.push('"');
        for ch in self.name.chars() {
            if ch == '"' {
                out.push('"');
            }
            out.push(ch);
        }
        out.push('"');
        out
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}

fn unexpected_after_ident(s: &str, c: char) -> GenError {
    if c == '.' {
        GenError::validation(format!(
            "Table names are matched by name only; drop the schema qualifier from '{s}'"
        ))
    } else {
        GenError::validation(format!("Invalid character in identifier: '{c}'"))
    }
}

/// Whether `name` has to be double-quoted to survive PostgreSQL's case folding.
pub fn needs_quotes(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    if !(first == '_' || first.is_ascii_lowercase()) {
        return true;
    }
    if !chars.all(|c| c == '_' || c == '$' || c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return true;
    }
    RESERVED.contains(&name)
}
