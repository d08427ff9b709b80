//! Database driver implementations.
//!
//! - [`mysql`]: MariaDB/MySQL driver (SQLx)
//! - [`postgres`]: PostgreSQL driver (tokio-postgres + deadpool)
//! - [`common`]: Shared utilities (TLS)
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement [`DatabaseConnector`] for its connector
//! 3. Add a [`DbType`] variant and a config section
//! 4. Extend [`connector_for`]

pub mod common;
pub mod mysql;
pub mod postgres;

use std::sync::Arc;

pub use common::{SslMode, TlsBuilder};
pub use mysql::{MysqlConnector, MysqlDialect};
pub use postgres::{PostgresConnector, PostgresDialect};

use crate::config::{DatabaseConfig, DbType};
use crate::core::DatabaseConnector;

/// Build an unconnected connector for a declared database.
pub fn connector_for(db_type: DbType, config: DatabaseConfig) -> Arc<dyn DatabaseConnector> {
    match db_type {
        DbType::MariaDb => Arc::new(MysqlConnector::new(config)),
        DbType::Postgres => Arc::new(PostgresConnector::new(config)),
    }
}
