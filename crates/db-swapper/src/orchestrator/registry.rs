//! Named, shared database connectors.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::DatabaseConnector;
use crate::drivers::connector_for;
use crate::error::{Result, SyncError};

/// Result of pinging one registered database.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub db_type: String,
    pub connected: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Connectors keyed by their configured name, shared by every job that
/// references them.
#[derive(Default)]
pub struct ConnectionRegistry {
    connectors: BTreeMap<String, Arc<dyn DatabaseConnector>>,
    /// name -> (engine, connect error)
    failed: BTreeMap<String, (String, String)>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already built connector under its own name.
    pub fn insert(&mut self, connector: Arc<dyn DatabaseConnector>) {
        self.connectors.insert(connector.name().to_string(), connector);
    }

    /// Build a connector per configured database and connect them all
    /// concurrently.
    ///
    /// With `strict_startup` the first connection failure aborts. Otherwise
    /// failed databases are remembered and only the jobs using them are
    /// skipped later.
    pub async fn connect_all(config: &Config) -> Result<Self> {
        let connectors: Vec<Arc<dyn DatabaseConnector>> = config
            .databases()
            .map(|(db_type, db)| connector_for(db_type, db.clone()))
            .collect();

        let results = join_all(connectors.iter().map(|c| c.connect())).await;

        let mut registry = Self::new();
        let mut first_error = None;
        for (connector, result) in connectors.into_iter().zip(results) {
            match result {
                Ok(()) => registry.insert(connector),
                Err(e) => {
                    error!("Database {} unavailable: {}", connector.name(), e);
                    registry.failed.insert(
                        connector.name().to_string(),
                        (connector.db_type().to_string(), e.to_string()),
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error.filter(|_| config.strict_startup) {
            registry.disconnect_all().await;
            return Err(e);
        }

        info!(
            "Connected {} database(s), {} failed",
            registry.connectors.len(),
            registry.failed.len()
        );
        Ok(registry)
    }

    /// Look up a connected database by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn DatabaseConnector>> {
        if let Some(connector) = self.connectors.get(name) {
            return Ok(Arc::clone(connector));
        }
        let reason = self
            .failed
            .get(name)
            .map(|(_, err)| err.as_str())
            .unwrap_or("not registered");
        Err(SyncError::connection(name, reason))
    }

    pub fn names(&self) -> Vec<&str> {
        self.connectors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    /// Ping every database, including the ones that failed to connect.
    pub async fn health_check(&self) -> Vec<HealthStatus> {
        let pings = self.connectors.values().map(|connector| async move {
            let started = Instant::now();
            let result = connector.ping().await;
            HealthStatus {
                name: connector.name().to_string(),
                db_type: connector.db_type().to_string(),
                connected: result.is_ok(),
                latency_ms: started.elapsed().as_millis() as u64,
                error: result.err().map(|e| e.to_string()),
            }
        });
        let mut statuses = join_all(pings).await;

        statuses.extend(self.failed.iter().map(|(name, (db_type, err))| HealthStatus {
            name: name.clone(),
            db_type: db_type.clone(),
            connected: false,
            latency_ms: 0,
            error: Some(err.clone()),
        }));
        statuses
    }

    /// Close every pool. Errors are logged.
    pub async fn disconnect_all(&self) {
        for connector in self.connectors.values() {
            if let Err(e) = connector.disconnect().await {
                warn!("Failed to disconnect {}: {}", connector.name(), e);
            }
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connected", &self.names())
            .field("failed", &self.failed.keys().collect::<Vec<_>>())
            .finish()
    }
}
