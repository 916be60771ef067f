use crate::cli::InitArgs;
use std::path::Path;

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    write_template(&args.config)?;
    println!("wrote {}", args.config.display());
    Ok(())
}

fn write_template(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("refusing to overwrite existing file: {}", path.display());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("failed to create directory {}: {e}", parent.display())
            })?;
        }
    }

    std::fs::write(path, TEMPLATE.trim_start_matches('\n'))
        .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))
}

const TEMPLATE: &str = r#"
version = "1"

# Scripts go to <output_dir>/generated_<YYYYMMDDHHMM>_<service code>/
output_dir = "generated"

# Rollback order: children before parents.
ordered_tables = ["options", "questions", "forms"]

# INSERTs for these tables update existing rows on id conflict.
upsert_tables = []

# Insert-only tables: no DELETE is generated for them.
delete_excluded_tables = []

# `config` holds the services/forms lookup tables and is required.
[databases.config]
url = "${CONFIG_DATABASE_URL}"

[databases.forms]
host = "localhost"
port = 5432
database = "forms"
user = "${PGUSER}"
password = "${PGPASSWORD}"

# Query keys target the database named by the key up to its first `_`.
# Params name run parameters (code, serviceId, formId) or are literal values.
[[queries.forms]]
table_name = "options"
condition = "form_id = %s"
params = ["formId"]
exclude_columns = ["created_at"]

[[queries.forms]]
table_name = "forms"
condition = "id = %s"
params = ["formId"]

# [[queries.forms_search]]
# table_name = "questions"
# condition = "label LIKE %s"
# params = ["code"]
# like_condition = true
"#;
