//! Append-only output scripts.
//!
//! Each database gets an insert/delete script and a rollback script. Both are
//! only ever appended to, so running twice with the same run identifier
//! accumulates output; a script that was missing or empty when opened is
//! reported as fresh so the caller can write a header first.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File locations for one database within a run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// `<dir>/<database>_insert_statements.sql`
    pub insert_script: PathBuf,
    /// `<dir>/rollback_<database>_<run id>.sql`
    pub rollback_script: PathBuf,
}

impl ArtifactPaths {
    pub fn new(dir: &Path, database: &str, run_id: &str) -> Self {
        let database = file_component(database);
        let run_id = file_component(run_id);
        Self {
            insert_script: dir.join(format!("{database}_insert_statements.sql")),
            rollback_script: dir.join(format!("rollback_{database}_{run_id}.sql")),
        }
    }
}

/// Replace anything that is not safe in a file name with `_`.
pub fn file_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Which kind of statements a labeled section holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Insert,
    Delete,
}

impl Section {
    pub fn label(self, table: &str) -> String {
        match self {
            Self::Insert => format!("-- Inserting into table: {table}"),
            Self::Delete => format!("-- Deleting from table: {table}"),
        }
    }
}

/// An append-only text file.
#[derive(Debug, Clone)]
pub struct Artifact {
    path: PathBuf,
    fresh: bool,
}

impl Artifact {
    /// Open (creating if needed) the file at `path`, creating parent directories.
    ///
    /// Fails if the file cannot be created or opened for appending.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let fresh = match std::fs::metadata(&path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e),
        };
        OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self { path, fresh })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file was missing or empty when opened.
    pub fn was_fresh(&self) -> bool {
        self.fresh
    }

    /// A handle that appends to the file.
    pub fn writer(&self) -> std::io::Result<File> {
        OpenOptions::new().append(true).open(&self.path)
    }

    pub fn append(&self, text: &str) -> std::io::Result<()> {
        let mut file = self.writer()?;
        file.write_all(text.as_bytes())?;
        file.flush()
    }

    /// Append a `-- ...` header block.
    pub fn append_header<S: AsRef<str>>(&self, lines: &[S]) -> std::io::Result<()> {
        let mut text = String::new();
        for line in lines {
            text.push_str("-- ");
            text.push_str(line.as_ref());
            text.push('\n');
        }
        text.push('\n');
        self.append(&text)
    }

    /// Append a labeled section: the label, one statement per line, then a blank line.
    pub fn append_section(
        &self,
        section: Section,
        table: &str,
        statements: &[String],
    ) -> std::io::Result<()> {
        let mut text = section.label(table);
        text.push('\n');
        for statement in statements {
            text.push_str(statement);
            text.push('\n');
        }
        text.push('\n');
        self.append(&text)
    }
}
