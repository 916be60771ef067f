//! Dependency-ordered rollback script assembly.

use std::collections::HashMap;
use std::io::Write;

/// DELETE statements grouped by table, flushed in a fixed dependency order.
///
/// Tables named in the order given to [`RollbackBundle::new`] get their own
/// labeled section, in that order. Statements for any other table go to an
/// overflow list written last, without labels.
#[derive(Debug, Clone, Default)]
pub struct RollbackBundle {
    ordered: Vec<(String, Vec<String>)>,
    positions: HashMap<String, usize>,
    overflow: Vec<String>,
}

impl RollbackBundle {
    pub fn new<I, S>(ordered_tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut bundle = Self::default();
        for table in ordered_tables {
            let table = table.into();
            if bundle.positions.contains_key(&table) {
                continue;
            }
            bundle.positions.insert(table.clone(), bundle.ordered.len());
            bundle.ordered.push((table, Vec::new()));
        }
        bundle
    }

    /// Append a statement to `table`'s bucket, or to the overflow list.
    pub fn record(&mut self, table: &str, statement: impl Into<String>) {
        let statement = statement.into();
        match self.positions.get(table) {
            Some(&idx) => self.ordered[idx].1.push(statement),
            None => self.overflow.push(statement),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.overflow.is_empty() && self.ordered.iter().all(|(_, s)| s.is_empty())
    }

    /// Total number of recorded statements.
    pub fn len(&self) -> usize {
        self.overflow.len() + self.ordered.iter().map(|(_, s)| s.len()).sum::<usize>()
    }

    /// Render the script: labeled ordered sections, then the overflow.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (table, statements) in &self.ordered {
            if statements.is_empty() {
                continue;
            }
            out.push_str("-- Rollback for table: ");
            out.push_str(table);
            out.push('\n');
            for statement in statements {
                out.push_str(statement);
                out.push('\n');
            }
        }
        for statement in &self.overflow {
            out.push_str(statement);
            out.push('\n');
        }
        out
    }

    /// Write [`RollbackBundle::render`] to `writer`.
    pub fn flush<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.render().as_bytes())?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_sections_follow_dependency_order_not_record_order() {
        let mut bundle = RollbackBundle::new(["options", "fields", "forms"]);
        bundle.record("forms", "DELETE FROM forms WHERE id = '42';");
        bundle.record("options", "DELETE FROM options WHERE form_id = '42';");
        bundle.record("fields", "DELETE FROM fields WHERE form_id = '42';");

        assert_eq!(
            bundle.render(),
            "-- Rollback for table: options\n\
             DELETE FROM options WHERE form_id = '42';\n\
             -- Rollback for table: fields\n\
             DELETE FROM fields WHERE form_id = '42';\n\
             -- Rollback for table: forms\n\
             DELETE FROM forms WHERE id = '42';\n"
        );
    }

    #[test]
    fn statements_within_a_table_keep_record_order() {
        let mut bundle = RollbackBundle::new(["options"]);
        bundle.record("options", "DELETE 2;");
        bundle.record("options", "DELETE 1;");
        assert_eq!(
            bundle.render(),
            "-- Rollback for table: options\nDELETE 2;\nDELETE 1;\n"
        );
    }

    #[test]
    fn overflow_is_unlabeled_and_last() {
        let mut bundle = RollbackBundle::new(["forms"]);
        bundle.record("audit", "DELETE FROM audit WHERE a = 1;");
        bundle.record("forms", "DELETE FROM forms WHERE id = 1;");
        bundle.record("notes", "DELETE FROM notes WHERE n = 1;");

        assert_eq!(
            bundle.render(),
            "-- Rollback for table: forms\n\
             DELETE FROM forms WHERE id = 1;\n\
             DELETE FROM audit WHERE a = 1;\n\
             DELETE FROM notes WHERE n = 1;\n"
        );
        assert_eq!(bundle.len(), 3);
    }

    #[test]
    fn empty_buckets_emit_nothing() {
        let bundle = RollbackBundle::new(["options", "forms"]);
        assert!(bundle.is_empty());
        assert_eq!(bundle.render(), "");
    }

    #[test]
    fn duplicate_order_entries_keep_first_position() {
        let mut bundle = RollbackBundle::new(["a", "b", "a"]);
        bundle.record("a", "DELETE a;");
        bundle.record("b", "DELETE b;");
        assert_eq!(
            bundle.render(),
            "-- Rollback for table: a\nDELETE a;\n-- Rollback for table: b\nDELETE b;\n"
        );
    }

    #[test]
    fn flush_writes_rendered_script() {
        let mut bundle = RollbackBundle::new(["forms"]);
        bundle.record("forms", "DELETE FROM forms WHERE id = 1;");
        let mut buf = Vec::new();
        bundle.flush(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), bundle.render());
    }
}
