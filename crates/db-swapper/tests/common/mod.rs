#![allow(dead_code)]

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use db_swapper::config::{EndpointConfig, JobConfig, ProcedureConfig};
use db_swapper::core::{ColumnInfo, Record, TableSchema, Value};
use db_swapper::sync::{Identity, SyncJob};

pub use memory::MemoryConnector;

/// Build a record from `(column, value)` pairs.
pub fn record<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// `id, name` table keyed by `id`.
pub fn people_schema() -> TableSchema {
    let mut id = ColumnInfo::new("id", "bigint");
    id.is_nullable = false;
    TableSchema::new(vec![id, ColumnInfo::new("name", "varchar(64)")]).with_primary_key("id")
}

pub fn people(n: i64) -> Vec<Record> {
    (1..=n)
        .map(|i| record([("id", Value::Int(i)), ("name", Value::from(format!("person {}", i)))]))
        .collect()
}

pub fn table_endpoint(table: &str) -> EndpointConfig {
    EndpointConfig {
        table: Some(table.to_string()),
        ..Default::default()
    }
}

pub fn job_config(source: EndpointConfig, target: EndpointConfig, batch_size: usize) -> JobConfig {
    let name = format!("src.{} -> dst.{}", source.label(), target.label());
    JobConfig {
        name,
        source_db: "src".to_string(),
        target_db: "dst".to_string(),
        source,
        target,
        transform_function: None,
        batch_size,
        temp_table_suffix: "_temp".to_string(),
        buffer_size: 5000,
        sync_interval: Duration::from_secs(60),
        post_procedures: Vec::new(),
    }
}

pub fn procedure(name: &str) -> ProcedureConfig {
    ProcedureConfig {
        procedure_name: name.to_string(),
        procedure_params: vec![Value::Int(1)],
    }
}

pub async fn bootstrap(
    config: JobConfig,
    source: &Arc<MemoryConnector>,
    target: &Arc<MemoryConnector>,
) -> SyncJob {
    SyncJob::bootstrap(config, source.clone(), target.clone(), Arc::new(Identity))
        .await
        .expect("bootstrap")
}

/// Rows sorted by their `id` column.
pub fn sorted_by_id(mut rows: Vec<Record>) -> Vec<Record> {
    rows.sort_by_key(|r| r.get("id").and_then(Value::as_i64).unwrap_or_default());
    rows
}
