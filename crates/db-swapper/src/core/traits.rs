//! The connector contract every database engine implements.
//!
//! The sync engine only ever talks to a [`DatabaseConnector`]; engine-specific
//! SQL lives in the driver modules.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::TableSchema;
use super::value::{Record, Value};

/// Capability set for one database engine.
///
/// Implementations own their connection pool and must be safe to share
/// between concurrently running jobs.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Registry name of this connection (from configuration).
    fn name(&self) -> &str;

    /// Database type identifier (e.g. "mariadb", "postgres").
    fn db_type(&self) -> &str;

    // ===== Lifecycle =====

    /// Open the connection pool.
    async fn connect(&self) -> Result<()>;

    /// Verify the pool can reach the server. Fails if not connected.
    async fn ping(&self) -> Result<()>;

    /// Close the connection pool.
    async fn disconnect(&self) -> Result<()>;

    // ===== Reading =====

    /// Total rows in `table`. Requires a primary key in `schema`.
    async fn get_count(&self, table: &str, schema: &TableSchema) -> Result<u64>;

    /// Read up to `limit` rows starting at `offset`, ordered by the primary key.
    ///
    /// Selects the schema's columns, or all columns when the schema has none.
    async fn get_batch(
        &self,
        table: &str,
        offset: u64,
        limit: usize,
        schema: &TableSchema,
    ) -> Result<Vec<Record>>;

    /// Introspect an existing table: columns, primary key, autoincrement
    /// flags and secondary indexes.
    async fn describe_table(&self, table: &str) -> Result<TableSchema>;

    // ===== Writing =====

    /// Drop `temp` if present and create it shaped like `schema`.
    ///
    /// `original` names the live table the temp table will replace. A
    /// schema without columns is rejected.
    async fn create_temp_table(&self, original: &str, temp: &str, schema: &TableSchema)
        -> Result<()>;

    /// Insert all `records` into `table` in one all-or-nothing unit.
    ///
    /// Missing record keys bind NULL. An empty `columns` list means the
    /// first record's keys.
    async fn insert_batch(&self, table: &str, records: &[Record], columns: &[String])
        -> Result<u64>;

    /// Replace `original` with `temp`, keeping the previous contents as
    /// `original_backup`.
    async fn swap_tables(&self, original: &str, temp: &str) -> Result<()>;

    /// Drop a table. Succeeds when the table does not exist.
    async fn drop_table(&self, table: &str) -> Result<()>;

    // ===== Ad-hoc SQL =====

    /// Call a stored procedure, returning the affected row count.
    async fn execute_procedure(&self, name: &str, args: &[Value]) -> Result<u64>;

    /// Run a query and return every row.
    async fn execute_select(&self, query: &str, args: &[Value]) -> Result<Vec<Record>>;

    /// Determine the result shape of a query without reading its rows.
    async fn execute_select_with_schema(&self, query: &str, args: &[Value])
        -> Result<TableSchema>;
}

/// Name of the backup table kept by a swap.
pub fn backup_table_name(original: &str) -> String {
    format!("{}_backup", original)
}
