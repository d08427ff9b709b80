//! PostgreSQL SQL builders.

use crate::core::{split_column_list, ColumnInfo, TableSchema};

/// PostgreSQL bind parameter limit per statement.
pub const PG_MAX_PARAMS: usize = 65_535;

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &str {
        "postgres"
    }

    /// Quote an identifier with double quotes, doubling embedded quotes.
    pub fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quote a possibly schema-qualified name (`schema.table`) segment by segment.
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

    pub fn count(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quote_table(table))
    }

    /// Paginated read; binds `$1` = limit, `$2` = offset.
    pub fn select_batch(&self, table: &str, schema: &TableSchema) -> String {
        let cols = if schema.columns.is_empty() {
            "*".to_string()
        } else {
            schema
                .columns
                .iter()
                .map(|c| self.quote_ident(&c.name))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT $1 OFFSET $2",
            cols,
            self.quote_table(table),
            self.quote_column_list(&schema.primary_key)
        )
    }

    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_table(table))
    }

    fn column_def(&self, col: &ColumnInfo) -> String {
        let mut def = format!("{} {}", self.quote_ident(&col.name), col.data_type);
        let serial = col.data_type.to_lowercase().contains("serial");
        if col.auto_increment && !serial {
            def.push_str(" GENERATED BY DEFAULT AS IDENTITY");
        }
        if !col.is_nullable {
            def.push_str(" NOT NULL");
        }
        def
    }

    /// `CREATE TABLE` plus one `CREATE INDEX` per index entry.
    ///
    /// Index and constraint names are left to the server so they never
    /// collide with the ones carried over by a previous rename.
    pub fn create_table(&self, table: &str, schema: &TableSchema) -> Vec<String> {
        let mut defs: Vec<String> = schema.columns.iter().map(|c| self.column_def(c)).collect();
        if schema.has_primary_key() {
            defs.push(format!(
                "PRIMARY KEY ({})",
                self.quote_column_list(&schema.primary_key)
            ));
        }

        let quoted = self.quote_table(table);
        let mut statements = vec![format!("CREATE TABLE {} ({})", quoted, defs.join(", "))];
        for index in &schema.indexes {
            let cols = self.quote_column_list(index);
            if !cols.is_empty() {
                statements.push(format!("CREATE INDEX ON {} ({})", quoted, cols));
            }
        }
        statements
    }

    /// Multi-row INSERT with `$n` placeholders for `rows` rows of `columns`.
    pub fn insert(&self, table: &str, columns: &[String], rows: usize) -> String {
        let col_list = columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let width = columns.len();
        let values = (0..rows)
            .map(|r| {
                let params = (1..=width)
                    .map(|c| format!("${}", r * width + c))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", params)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote_table(table),
            col_list,
            values
        )
    }

    /// `ALTER TABLE ... RENAME TO`. The new name stays in the table's schema,
    /// so only its last segment is used.
    pub fn rename(&self, from: &str, to: &str) -> String {
        let to = to.rsplit('.').next().unwrap_or(to);
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_table(from),
            self.quote_ident(to)
        )
    }

    /// Statements of the three-step swap, run inside one transaction.
    pub fn swap(&self, original: &str, backup: &str, temp: &str) -> Vec<String> {
        vec![
            self.drop_table(backup),
            self.rename(original, backup),
            self.rename(temp, original),
        ]
    }

    pub fn call(&self, procedure: &str, args: usize) -> String {
        let params = (1..=args)
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CALL {}({})", self.quote_table(procedure), params)
    }
}
