//! MySQL/MariaDB SQL builders.
//!
//! Pure string builders so the connector stays about I/O and the SQL can be
//! unit tested.

use crate::core::{split_column_list, TableSchema};

/// MySQL placeholder limit per statement.
pub const MYSQL_MAX_PLACEHOLDERS: usize = 65_535;

/// MySQL/MariaDB dialect. Compatible with MySQL 5.7+, 8.0+ and MariaDB 10.2+.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &str {
        "mariadb"
    }

    /// Quote an identifier with backticks, doubling embedded backticks.
    pub fn quote_ident(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Quote a possibly database-qualified name (`db.table`) segment by segment.
    pub fn quote_table(&self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_ident(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quote a comma-joined column list.
    pub fn quote_column_list(&self, list: &str) -> String {
        split_column_list(list)
            .into_iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn select_list(&self, schema: &TableSchema) -> String {
        if schema.columns.is_empty() {
            return "*".to_string();
        }
        schema
            .columns
            .iter()
            .map(|c| self.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn count(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_table(table))
    }

    /// Paginated read; binds `LIMIT ?` then `OFFSET ?`.
    pub fn select_batch(&self, table: &str, schema: &TableSchema) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT ? OFFSET ?",
            self.select_list(schema),
            self.quote_table(table),
            self.quote_column_list(&schema.primary_key)
        )
    }

    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_table(table))
    }

    /// `CREATE TABLE` from explicit column definitions.
    pub fn create_table(&self, table: &str, schema: &TableSchema) -> String {
        let mut defs: Vec<String> = schema
            .columns
            .iter()
            .map(|col| {
                let mut def = format!("{} {}", self.quote_ident(&col.name), col.data_type);
                if !col.is_nullable {
                    def.push_str(" NOT NULL");
                }
                if col.auto_increment {
                    def.push_str(" AUTO_INCREMENT");
                }
                def
            })
            .collect();

        if schema.has_primary_key() {
            defs.push(format!(
                "PRIMARY KEY ({})",
                self.quote_column_list(&schema.primary_key)
            ));
        }
        for index in &schema.indexes {
            let cols = self.quote_column_list(index);
            if !cols.is_empty() {
                defs.push(format!("INDEX ({})", cols));
            }
        }

        format!("CREATE TABLE {} ({})", self.quote_table(table), defs.join(", "))
    }

    /// Multi-row INSERT for `rows` rows of `columns`.
    pub fn insert(&self, table: &str, columns: &[String], rows: usize) -> String {
        let col_list = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let row = format!("({})", vec!["?"; columns.len()].join(", "));
        let values = std::iter::repeat_n(row, rows).collect::<Vec<_>>().join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_table(table),
            col_list,
            values
        )
    }

    /// Single atomic two-way rename.
    pub fn swap(&self, original: &str, backup: &str, temp: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}, {} TO {}",
            self.quote_table(original),
            self.quote_table(backup),
            self.quote_table(temp),
            self.quote_table(original)
        )
    }

    pub fn rename(&self, from: &str, to: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.quote_table(from),
            self.quote_table(to)
        )
    }

    pub fn call(&self, procedure: &str, args: usize) -> String {
        format!(
            "CALL {}({})",
            self.quote_table(procedure),
            vec!["?"; args].join(", ")
        )
    }

    /// Zero-row temporary table shaped like the query result.
    pub fn probe_table(&self, probe: &str, query: &str) -> String {
        format!(
            "CREATE TEMPORARY TABLE {} AS SELECT * FROM ({}) AS q LIMIT 0",
            self.quote_ident(probe),
            query.trim().trim_end_matches(';')
        )
    }
}

/// Split `db.table` into an optional database and the table name.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((db, table)) => (Some(db), table),
        None => (None, name),
    }
}
