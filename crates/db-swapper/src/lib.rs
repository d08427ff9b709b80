//! # db-swapper
//!
//! Scheduled replication of tables (or query results) between MariaDB and
//! PostgreSQL with atomic cutover.
//!
//! Every cycle rebuilds the target into a staging table, then swaps it in
//! with renames, so readers only ever see the previous or the new content:
//!
//! - **Connectors** for MariaDB/MySQL (SQLx) and PostgreSQL (deadpool-postgres)
//! - **Column mapping** by normalized name plus optional named transforms
//! - **One task per job** with fixed-interval scheduling and bounded shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use db_swapper::{bootstrap_jobs, Config, ConnectionRegistry, Supervisor, TransformRegistry};
//!
//! #[tokio::main]
//! async fn main() -> db_swapper::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let registry = ConnectionRegistry::connect_all(&config).await?;
//!     let jobs = bootstrap_jobs(&config, &registry, &TransformRegistry::new()).await?;
//!
//!     let mut supervisor = Supervisor::new(config.shutdown_timeout);
//!     for job in jobs {
//!         supervisor.spawn(job);
//!     }
//!     supervisor
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     registry.disconnect_all().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod sync;

pub use config::{Config, DatabaseConfig, DbType, EndpointConfig, JobConfig, ProcedureConfig};
pub use crate::core::{ColumnInfo, DatabaseConnector, Record, TableSchema, Value};
pub use drivers::{connector_for, MysqlConnector, PostgresConnector};
pub use error::{Result, SyncError};
pub use orchestrator::{
    bootstrap_jobs, ConnectionRegistry, HealthStatus, ShutdownReport, Supervisor,
};
pub use sync::{CycleReport, RenameColumns, SyncJob, TransformRegistry};
