//! Schema resolution at job creation.
//!
//! Order of precedence: explicit columns from configuration, introspection
//! of an existing table, then the result shape of an ad-hoc query. A
//! configured `primaryKey`/`indexes` always overrides what introspection
//! reported.

use tracing::{debug, info};

use crate::config::EndpointConfig;
use crate::core::{DatabaseConnector, TableSchema};
use crate::error::{Result, SyncError};

fn schema_error(what: &str, err: SyncError) -> SyncError {
    SyncError::SchemaResolution(format!("{}: {}", what, err))
}

fn from_config(endpoint: &EndpointConfig) -> Option<TableSchema> {
    if endpoint.columns.is_empty() {
        return None;
    }
    Some(TableSchema::new(endpoint.columns.clone()))
}

fn apply_overrides(mut schema: TableSchema, endpoint: &EndpointConfig) -> TableSchema {
    if let Some(pk) = endpoint.primary_key.as_deref().filter(|pk| !pk.trim().is_empty()) {
        schema.primary_key = pk.to_string();
    }
    if !endpoint.indexes.is_empty() {
        schema.indexes = endpoint.indexes.clone();
    }
    schema
}

/// Resolve the source shape.
///
/// A table source must end up with a primary key, since pagination orders
/// by it.
pub async fn resolve_source_schema(
    connector: &dyn DatabaseConnector,
    endpoint: &EndpointConfig,
) -> Result<TableSchema> {
    let schema = if let Some(schema) = from_config(endpoint) {
        debug!("Source schema taken from configuration");
        schema
    } else if let Some(table) = endpoint.table.as_deref() {
        connector
            .describe_table(table)
            .await
            .map_err(|e| schema_error(&format!("describing source table {}", table), e))?
    } else if let Some(query) = endpoint.query.as_deref() {
        connector
            .execute_select_with_schema(query, &endpoint.params)
            .await
            .map_err(|e| schema_error("probing source query shape", e))?
    } else {
        return Err(SyncError::SchemaResolution(
            "source has neither table nor query".into(),
        ));
    };

    let schema = apply_overrides(schema, endpoint);

    if !schema.has_columns() {
        return Err(SyncError::SchemaResolution(format!(
            "source {} resolved to no columns",
            endpoint.label()
        )));
    }
    if endpoint.table.is_some() && !schema.has_primary_key() {
        return Err(SyncError::SchemaResolution(format!(
            "source table {} has no primary key; set source.primaryKey",
            endpoint.label()
        )));
    }

    Ok(schema)
}

/// Resolve the target shape.
///
/// When the target table does not exist yet and no columns or shape query
/// are configured, the source shape is used, so the first cycle creates
/// the table like the source. Column types are engine-native, so this only
/// works when both sides run the same engine.
pub async fn resolve_target_schema(
    connector: &dyn DatabaseConnector,
    endpoint: &EndpointConfig,
    source: &TableSchema,
    source_engine: &str,
) -> Result<TableSchema> {
    let schema = if let Some(schema) = from_config(endpoint) {
        debug!("Target schema taken from configuration");
        schema
    } else {
        let described = match endpoint.table.as_deref() {
            Some(table) => match connector.describe_table(table).await {
                Ok(schema) if schema.has_columns() => Some(schema),
                Ok(_) => None,
                Err(e) => {
                    debug!("Target table {} not introspectable: {}", table, e);
                    None
                }
            },
            None => None,
        };

        match (described, endpoint.query.as_deref()) {
            (Some(schema), _) => schema,
            (None, Some(query)) => connector
                .execute_select_with_schema(query, &endpoint.params)
                .await
                .map_err(|e| schema_error("probing target query shape", e))?,
            (None, None) if source_engine != connector.db_type() => {
                return Err(SyncError::SchemaResolution(format!(
                    "target table {} does not exist and the {} source shape cannot be \
                     created on {}; set target.columns",
                    endpoint.label(),
                    source_engine,
                    connector.db_type()
                )));
            }
            (None, None) => {
                info!(
                    "Target table {} not found, using the source shape",
                    endpoint.label()
                );
                source.clone()
            }
        }
    };

    let schema = apply_overrides(schema, endpoint);

    if !schema.has_columns() {
        return Err(SyncError::SchemaResolution(format!(
            "target {} resolved to no columns",
            endpoint.label()
        )));
    }

    Ok(schema)
}
