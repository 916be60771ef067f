use crate::connect::ConnectionConfig;
use indexmap::IndexMap;
use seedroll::{QuerySpec, TablePolicy};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Database holding the `services` and `forms` lookup tables.
pub const CONFIG_DATABASE: &str = "config";

#[derive(Debug, Clone)]
pub struct ProjectConfig {
    #[allow(dead_code)]
    pub config_path: PathBuf,
    pub config_dir: PathBuf,
    pub file: ConfigFile,
}

impl ProjectConfig {
    pub fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        let config_dir = config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            anyhow::anyhow!(
                "failed to read config file {}: {e}",
                config_path.display()
            )
        })?;

        let mut file = ConfigFile::parse(&config_path, &raw).map_err(|e| {
            anyhow::anyhow!(
                "failed to parse config file {}: {e}",
                config_path.display()
            )
        })?;

        file.expand_env()?;
        file.validate()?;

        Ok(Self {
            config_path,
            config_dir,
            file,
        })
    }

    pub fn resolve_path(&self, p: impl AsRef<Path>) -> PathBuf {
        let p = p.as_ref();
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config_dir.join(p)
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.file.output_dir)
    }

    pub fn table_policy(&self) -> anyhow::Result<TablePolicy> {
        self.file.table_policy()
    }

    /// Connection parameters for the database a query key targets.
    pub fn database_for_key(&self, key: &str) -> anyhow::Result<(&str, &ConnectionConfig)> {
        let name = database_key(key);
        self.file
            .databases
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| {
                anyhow::anyhow!("database connection parameters not found for '{name}' (query key: {key})")
            })
    }
}

/// The database a query key targets: the key up to its first `_`.
pub fn database_key(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default)]
    pub ordered_tables: Vec<String>,

    #[serde(default, alias = "exculded_do_nothing_tables")]
    pub upsert_tables: BTreeSet<String>,

    #[serde(default, alias = "exculded_delete_tables")]
    pub delete_excluded_tables: BTreeSet<String>,

    #[serde(default)]
    pub databases: IndexMap<String, ConnectionConfig>,

    #[serde(default)]
    pub queries: IndexMap<String, Vec<QuerySpec>>,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_output_dir() -> String {
    "generated".to_string()
}

impl ConfigFile {
    fn parse(path: &Path, raw: &str) -> anyhow::Result<Self> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Ok(serde_json::from_str(raw)?)
        } else {
            Ok(toml::from_str(raw)?)
        }
    }

    fn expand_env(&mut self) -> anyhow::Result<()> {
        self.output_dir = expand_env_vars(&self.output_dir)?;

        for conn in self.databases.values_mut() {
            for field in [
                &mut conn.url,
                &mut conn.host,
                &mut conn.database,
                &mut conn.user,
                &mut conn.password,
            ] {
                if let Some(v) = field.as_mut() {
                    *v = expand_env_vars(v)?;
                }
            }
        }

        Ok(())
    }

    /// Table lists with names folded like `table_name`.
    fn table_policy(&self) -> anyhow::Result<TablePolicy> {
        TablePolicy {
            ordered_tables: self.ordered_tables.clone(),
            upsert_tables: self.upsert_tables.clone(),
            delete_excluded_tables: self.delete_excluded_tables.clone(),
        }
        .canonicalized()
        .map_err(|e| anyhow::anyhow!("invalid table name in table lists: {e}"))
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.version.trim() != "1" {
            anyhow::bail!("unsupported config version: {}", self.version);
        }

        let mut missing = Vec::new();
        if self.databases.is_empty() {
            missing.push("databases");
        }
        if self.queries.is_empty() {
            missing.push("queries");
        }
        if self.ordered_tables.is_empty() {
            missing.push("ordered_tables");
        }
        if !missing.is_empty() {
            anyhow::bail!(
                "configuration is missing required sections: {}",
                missing.join(", ")
            );
        }

        if !self.databases.contains_key(CONFIG_DATABASE) {
            anyhow::bail!("databases.{CONFIG_DATABASE} is required for service lookup");
        }
        for (name, conn) in &self.databases {
            conn.validate(name)?;
        }

        for (key, specs) in &self.queries {
            let name = database_key(key);
            if !self.databases.contains_key(name) {
                anyhow::bail!(
                    "database connection parameters not found for '{name}' (query key: {key})"
                );
            }
            for spec in specs {
                if spec.table_name.trim().is_empty() {
                    anyhow::bail!("queries.{key}: table_name must not be empty");
                }
                if spec.condition.trim().is_empty() {
                    anyhow::bail!(
                        "queries.{key}: condition must not be empty (table: {})",
                        spec.table_name
                    );
                }
            }
        }

        self.table_policy()?;

        if self.output_dir.trim().is_empty() {
            anyhow::bail!("output_dir must not be empty");
        }

        Ok(())
    }
}

fn expand_env_vars(input: &str) -> anyhow::Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            out.push(c);
            continue;
        }
        chars.next();

        let mut key = String::new();
        let mut closed = false;
        for ch in chars.by_ref() {
            if ch == '}' {
                closed = true;
                break;
            }
            key.push(ch);
        }

        if !closed {
            anyhow::bail!("unterminated env var reference: ${{{key}}}");
        }
        if key.is_empty() {
            anyhow::bail!("invalid env var reference: ${{}}");
        }

        let v = std::env::var(&key)
            .map_err(|_| anyhow::anyhow!("missing env var for config expansion: {key}"))?;
        out.push_str(&v);
    }

    Ok(out)
}
