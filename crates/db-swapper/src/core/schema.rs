//! Table shape metadata shared by every connector.

use serde::{Deserialize, Serialize};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    /// Column name as the engine reports it.
    pub name: String,

    /// Engine-native type string (e.g. `varchar(64)`, `bigint`).
    #[serde(default)]
    pub data_type: String,

    /// Whether the column accepts NULL.
    #[serde(default)]
    pub is_nullable: bool,

    /// Whether the engine generates the value (auto_increment/identity).
    #[serde(default)]
    pub auto_increment: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            auto_increment: false,
        }
    }

    /// Name used for column matching: lower-cased, underscores removed.
    pub fn normalized_name(&self) -> String {
        normalize_column_name(&self.name)
    }
}

/// Normalize a column name for source/target matching.
///
/// `VENDOR_NAME`, `vendor_name` and `vendorName` all normalize to
/// `vendorname`.
pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Table shape: ordered columns, pagination key and secondary indexes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Column definitions in table order.
    pub columns: Vec<ColumnInfo>,

    /// Primary key column, or a comma-joined list for composite keys.
    pub primary_key: String,

    /// Secondary index entries, each a column or comma-joined column list.
    pub indexes: Vec<String>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn with_primary_key(mut self, pk: impl Into<String>) -> Self {
        self.primary_key = pk.into();
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<String>) -> Self {
        self.indexes = indexes;
        self
    }

    /// Whether any column is known.
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Whether a pagination key is set.
    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.trim().is_empty()
    }

    /// Primary key split into its column names.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        split_column_list(&self.primary_key)
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Columns the engine does not generate, in table order.
    ///
    /// These are the columns written on insert.
    pub fn insertable_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.auto_increment)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Split a comma-joined column list, trimming whitespace and empty entries.
pub fn split_column_list(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_name() {
        assert_eq!(normalize_column_name("VENDOR_NAME"), "vendorname");
        assert_eq!(normalize_column_name("vendorName"), "vendorname");
        assert_eq!(normalize_column_name("TAC"), "tac");
        assert_eq!(normalize_column_name("__id__"), "id");
        assert_eq!(
            ColumnInfo::new("MODEL_NAME", "varchar").normalized_name(),
            ColumnInfo::new("modelName", "text").normalized_name()
        );
    }

    #[test]
    fn test_primary_key_columns() {
        let schema = TableSchema::default().with_primary_key("tenant_id, id");
        assert_eq!(schema.primary_key_columns(), vec!["tenant_id", "id"]);
        assert!(schema.has_primary_key());
        assert!(!TableSchema::default().with_primary_key("  ").has_primary_key());
    }

    #[test]
    fn test_insertable_columns_skip_auto_increment() {
        let mut id = ColumnInfo::new("id", "bigint");
        id.auto_increment = true;
        let schema = TableSchema::new(vec![
            id,
            ColumnInfo::new("imsi", "varchar(16)"),
            ColumnInfo::new("status", "int"),
        ]);
        assert_eq!(schema.insertable_columns(), vec!["imsi", "status"]);
        assert_eq!(schema.column_names(), vec!["id", "imsi", "status"]);
    }

    #[test]
    fn test_column_config_deserializes_camel_case() {
        let col: ColumnInfo =
            serde_yaml::from_str("{name: id, dataType: bigint, autoIncrement: true}").unwrap();
        assert_eq!(col.data_type, "bigint");
        assert!(col.auto_increment);
        assert!(!col.is_nullable);
    }
}
