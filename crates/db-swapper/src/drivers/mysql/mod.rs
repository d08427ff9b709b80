//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: SQL builders
//! - [`MysqlConnector`]: the [`DatabaseConnector`](crate::core::DatabaseConnector)
//!   implementation
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+
//!
//! The swap uses a single multi-table `RENAME TABLE`, which both engines
//! execute atomically.

mod connector;
mod dialect;

pub use connector::MysqlConnector;
pub use dialect::MysqlDialect;
