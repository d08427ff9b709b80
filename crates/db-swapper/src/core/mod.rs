//! Core abstractions shared by the sync engine and the drivers.
//!
//! - [`schema`]: table and column metadata
//! - [`value`]: dynamically typed values and records
//! - [`traits`]: the [`DatabaseConnector`] contract
//!
//! Drivers (`drivers/mysql`, `drivers/postgres`) implement the contract; the
//! sync engine depends on nothing else, so it can be exercised with an
//! in-memory connector.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{normalize_column_name, split_column_list, ColumnInfo, TableSchema};
pub use traits::{backup_table_name, DatabaseConnector};
pub use value::{Record, Value};
