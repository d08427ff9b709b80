//! Configuration type definitions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{ColumnInfo, Value};
use crate::error::SyncError;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging defaults (CLI flags take precedence).
    #[serde(default)]
    pub logger: LoggerConfig,

    /// Abort startup when any database or job fails to initialize.
    #[serde(default)]
    pub strict_startup: bool,

    /// Grace period for in-flight cycles on shutdown (default: 30s).
    #[serde(default = "default_shutdown_timeout", with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// MariaDB/MySQL databases.
    #[serde(default)]
    pub mariadb: Vec<DatabaseConfig>,

    /// PostgreSQL databases.
    #[serde(default)]
    pub postgres: Vec<DatabaseConfig>,

    /// Oracle databases. Parsed so validation can reject them with a clear
    /// message; no Oracle driver is provided.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub oracle: Vec<DatabaseConfig>,

    /// Sync groups.
    #[serde(default)]
    pub sync: Vec<SyncGroupConfig>,
}

impl Config {
    /// Every declared database with the engine its section implies.
    pub fn databases(&self) -> impl Iterator<Item = (DbType, &DatabaseConfig)> {
        self.mariadb
            .iter()
            .map(|db| (DbType::MariaDb, db))
            .chain(self.postgres.iter().map(|db| (DbType::Postgres, db)))
    }

    /// Find a database by name.
    pub fn find_database(&self, name: &str) -> Option<(DbType, &DatabaseConfig)> {
        self.databases().find(|(_, db)| db.name == name)
    }

    /// Resolve every sync group into its per-table jobs.
    pub fn jobs(&self) -> Vec<JobConfig> {
        self.sync.iter().flat_map(SyncGroupConfig::jobs).collect()
    }
}

/// Logger settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Log level (debug, info, warn, error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Output format (text or json).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Where log lines go (default: stderr).
    #[serde(default)]
    pub target: LogTarget,

    /// Log file path, required when `target` is `file`. Appended to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Log destination.
///
/// `stdout` mixes log lines with `--output-json` results, so stderr is the
/// default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Stderr,
    Stdout,
    File,
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// MariaDB or MySQL.
    #[serde(alias = "mysql")]
    MariaDb,
    /// PostgreSQL.
    #[serde(alias = "postgresql")]
    Postgres,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::MariaDb => "mariadb",
            DbType::Postgres => "postgres",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DbType::MariaDb => 3306,
            DbType::Postgres => 5432,
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DbType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mariadb" | "mysql" => Ok(DbType::MariaDb),
            "postgres" | "postgresql" | "pg" => Ok(DbType::Postgres),
            other => Err(SyncError::Config(format!(
                "unsupported database type '{}' (expected mariadb, mysql or postgres)",
                other
            ))),
        }
    }
}

/// Connection settings for one named database.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Unique name referenced by sync groups.
    pub name: String,

    /// Database host.
    pub host: String,

    /// Database port (default: engine default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Database name.
    pub dbname: String,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full (default: disable).
    #[serde(default = "default_sslmode")]
    pub sslmode: String,

    /// Connect timeout in seconds (default: 5).
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,

    /// Maximum pool size (default: 10).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Effective port for the given engine.
    pub fn port_for(&self, db_type: DbType) -> u16 {
        self.port.unwrap_or_else(|| db_type.default_port())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("dbname", &self.dbname)
            .field("sslmode", &self.sslmode)
            .field("timeout", &self.timeout)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Source or target side of a table mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Table name (optionally schema-qualified).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Ad-hoc query. On a source it supplies the rows; on a target it is
    /// only used to probe the column shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Positional parameters bound to `query`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Value>,

    /// Explicit column list; skips introspection when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnInfo>,

    /// Secondary index entries (column or comma-joined columns).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<String>,

    /// Primary key column(s), comma-joined for composite keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

impl EndpointConfig {
    pub fn is_empty(&self) -> bool {
        self.table.is_none() && self.query.is_none()
    }

    /// Short label for job names and logs.
    pub fn label(&self) -> &str {
        match (&self.table, &self.query) {
            (Some(table), _) => table,
            (None, Some(_)) => "(query)",
            (None, None) => "(none)",
        }
    }
}

/// A stored procedure run after every successful swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureConfig {
    pub procedure_name: String,

    #[serde(default)]
    pub procedure_params: Vec<Value>,
}

/// One sync group: a source/target database pair and its tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncGroupConfig {
    /// Name of the source database.
    pub source_db: String,

    /// Name of the target database.
    pub target_db: String,

    /// Expected source engine; checked against the named database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,

    /// Expected target engine; checked against the named database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Name of a registered record transform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_function: Option<String>,

    /// Tables to sync. When empty, `source`/`target` define a single job.
    #[serde(default)]
    pub tables: Vec<TableSyncConfig>,

    #[serde(default)]
    pub source: EndpointConfig,

    #[serde(default)]
    pub target: EndpointConfig,

    /// Rows per extracted batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Suffix appended to the target table for the staging table (default: "_temp").
    #[serde(default = "default_temp_table_suffix")]
    pub temp_table_suffix: String,

    /// Initial capacity of the processing buffer (default: 5000).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Time between cycles (default: 5m).
    #[serde(default = "default_sync_interval", with = "humantime_serde")]
    pub sync_interval: Duration,

    /// Procedures run after each successful swap, in order.
    #[serde(default)]
    pub post_procedure_list: Vec<ProcedureConfig>,
}

impl SyncGroupConfig {
    /// Resolve the group into jobs, applying per-table overrides.
    pub fn jobs(&self) -> Vec<JobConfig> {
        if self.tables.is_empty() {
            if self.source.is_empty() && self.target.is_empty() {
                return Vec::new();
            }
            return vec![self.job(self.source.clone(), self.target.clone(), None)];
        }

        self.tables
            .iter()
            .map(|t| self.job(t.source.clone(), t.target.clone(), Some(t)))
            .collect()
    }

    fn job(
        &self,
        source: EndpointConfig,
        target: EndpointConfig,
        table: Option<&TableSyncConfig>,
    ) -> JobConfig {
        let mut job = JobConfig {
            name: format!(
                "{}.{} -> {}.{}",
                self.source_db,
                source.label(),
                self.target_db,
                target.label()
            ),
            source_db: self.source_db.clone(),
            target_db: self.target_db.clone(),
            source,
            target,
            transform_function: self.transform_function.clone(),
            batch_size: self.batch_size,
            temp_table_suffix: self.temp_table_suffix.clone(),
            buffer_size: self.buffer_size,
            sync_interval: self.sync_interval,
            post_procedures: self.post_procedure_list.clone(),
        };

        if let Some(t) = table {
            if let Some(v) = t.batch_size {
                job.batch_size = v;
            }
            if let Some(v) = &t.temp_table_suffix {
                job.temp_table_suffix = v.clone();
            }
            if let Some(v) = t.buffer_size {
                job.buffer_size = v;
            }
            if let Some(v) = t.sync_interval {
                job.sync_interval = v;
            }
            if !t.post_procedure_list.is_empty() {
                job.post_procedures = t.post_procedure_list.clone();
            }
            if t.transform_function.is_some() {
                job.transform_function = t.transform_function.clone();
            }
        }

        job
    }
}

/// Per-table entry of a sync group. Unset fields inherit the group value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSyncConfig {
    pub source: EndpointConfig,

    pub target: EndpointConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_table_suffix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,

    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub sync_interval: Option<Duration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_procedure_list: Vec<ProcedureConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_function: Option<String>,
}

/// Fully resolved settings for one sync job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// `<source_db>.<source> -> <target_db>.<target_table>`
    pub name: String,
    pub source_db: String,
    pub target_db: String,
    pub source: EndpointConfig,
    pub target: EndpointConfig,
    pub transform_function: Option<String>,
    pub batch_size: usize,
    pub temp_table_suffix: String,
    pub buffer_size: usize,
    pub sync_interval: Duration,
    pub post_procedures: Vec<ProcedureConfig>,
}

impl JobConfig {
    /// Live target table name. Validation guarantees it is set.
    pub fn target_table(&self) -> &str {
        self.target.table.as_deref().unwrap_or_default()
    }

    /// Staging table name for this job's cycles.
    pub fn temp_table(&self) -> String {
        format!("{}{}", self.target_table(), self.temp_table_suffix)
    }
}

// Default value functions for serde
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_sslmode() -> String {
    "disable".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_max_connections() -> u32 {
    10
}

fn default_batch_size() -> usize {
    1000
}

fn default_temp_table_suffix() -> String {
    "_temp".to_string()
}

fn default_buffer_size() -> usize {
    5000
}

fn default_sync_interval() -> Duration {
    Duration::from_secs(300)
}
