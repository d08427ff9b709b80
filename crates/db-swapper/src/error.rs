//! Error types for the replication engine.

use thiserror::Error;

/// Main error type for sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, bad references).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A named database could not be connected or pinged.
    #[error("Connection to database '{name}' failed: {message}")]
    Connection { name: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Source or target shape could not be resolved.
    #[error("Schema resolution failed: {0}")]
    SchemaResolution(String),

    /// Creating the temp table for a cycle failed.
    #[error("Creating temp table {table} failed: {message}")]
    TempTable { table: String, message: String },

    /// Reading a batch (or the row count) from the source failed.
    #[error("Extraction from {table} failed: {message}")]
    Extraction { table: String, message: String },

    /// Writing a batch into the temp table failed.
    #[error("Insert into {table} failed: {message}")]
    Insertion { table: String, message: String },

    /// The rename sequence that publishes the temp table failed.
    #[error("Swap of {table} failed: {message}")]
    Swap { table: String, message: String },

    /// Dropping the vacated temp table name after a swap failed.
    #[error("Cleanup of {table} failed: {message}")]
    Cleanup { table: String, message: String },

    /// A post-cycle procedure failed.
    #[error("Procedure {name} failed: {message}")]
    Procedure { name: String, message: String },

    /// MariaDB/MySQL driver error
    #[error("MySQL error: {0}")]
    Database(#[from] sqlx::Error),

    /// PostgreSQL driver error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Shutdown was requested before the operation finished.
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    pub fn connection(name: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Connection {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub fn temp_table(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::TempTable {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn extraction(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Extraction {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn insertion(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Insertion {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn swap(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Swap {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn cleanup(table: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Cleanup {
            table: table.into(),
            message: message.to_string(),
        }
    }

    pub fn procedure(name: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Procedure {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error prevents a job from being created at startup.
    pub fn is_bootstrap_error(&self) -> bool {
        matches!(
            self,
            SyncError::Connection { .. } | SyncError::SchemaResolution(_)
        )
    }

    /// Process exit code for this error.
    ///
    /// Configuration problems exit with 2, bootstrap (connection/schema)
    /// problems with 3, everything else with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Yaml(_) => 2,
            SyncError::Connection { .. } | SyncError::SchemaResolution(_) => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<deadpool_postgres::PoolError> for SyncError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        SyncError::pool(e, "acquiring PostgreSQL connection")
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
