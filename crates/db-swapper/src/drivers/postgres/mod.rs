//! PostgreSQL database driver.
//!
//! - [`PostgresDialect`]: SQL builders
//! - [`PostgresConnector`]: the [`DatabaseConnector`](crate::core::DatabaseConnector)
//!   implementation, pooled through deadpool-postgres
//!
//! DDL is transactional in PostgreSQL, so the swap runs its drop and two
//! renames inside a single transaction.

mod connector;
mod dialect;
mod value;

pub use connector::PostgresConnector;
pub use dialect::PostgresDialect;
