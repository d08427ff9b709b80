//! In-memory `DatabaseConnector` that records calls and injects failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use db_swapper::core::{backup_table_name, DatabaseConnector, Record, TableSchema, Value};
use db_swapper::{Result, SyncError};

#[derive(Debug, Clone, Default)]
pub struct MemTable {
    pub schema: TableSchema,
    pub rows: Vec<Record>,
}

#[derive(Default)]
struct Failures {
    /// Fail the n-th insert call (1-based, counted over the connector's lifetime).
    insert_on_call: Option<usize>,
    get_batch: bool,
    swap: bool,
    drop: bool,
    procedures: HashSet<String>,
}

#[derive(Default)]
struct State {
    connected: bool,
    tables: BTreeMap<String, MemTable>,
    queries: HashMap<String, MemTable>,
    calls: Vec<String>,
    insert_calls: usize,
    insert_sizes: Vec<usize>,
    insert_delay: Option<Duration>,
    failures: Failures,
}

pub struct MemoryConnector {
    name: String,
    db_type: String,
    state: Mutex<State>,
}

impl MemoryConnector {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            db_type: "memory".to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// Report a different engine from `db_type`.
    pub fn with_db_type(mut self, db_type: &str) -> Self {
        self.db_type = db_type.to_string();
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn with_table(self, name: &str, schema: TableSchema, rows: Vec<Record>) -> Self {
        self.state()
            .tables
            .insert(name.to_string(), MemTable { schema, rows });
        self
    }

    pub fn with_query(self, query: &str, schema: TableSchema, rows: Vec<Record>) -> Self {
        self.state()
            .queries
            .insert(query.to_string(), MemTable { schema, rows });
        self
    }

    pub fn table(&self, name: &str) -> Option<MemTable> {
        self.state().tables.get(name).cloned()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state().tables.contains_key(name)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn insert_sizes(&self) -> Vec<usize> {
        self.state().insert_sizes.clone()
    }

    pub fn fail_insert_on(&self, call: usize) {
        self.state().failures.insert_on_call = Some(call);
    }

    pub fn fail_get_batch(&self) {
        self.state().failures.get_batch = true;
    }

    pub fn fail_swap(&self) {
        self.state().failures.swap = true;
    }

    pub fn fail_drop(&self) {
        self.state().failures.drop = true;
    }

    pub fn fail_procedure(&self, name: &str) {
        self.state().failures.procedures.insert(name.to_string());
    }

    pub fn set_insert_delay(&self, delay: Duration) {
        self.state().insert_delay = Some(delay);
    }

    pub fn clear_insert_delay(&self) {
        self.state().insert_delay = None;
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

fn injected(what: &str) -> SyncError {
    SyncError::Config(format!("injected {} failure", what))
}

#[async_trait]
impl DatabaseConnector for MemoryConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn db_type(&self) -> &str {
        &self.db_type
    }

    async fn connect(&self) -> Result<()> {
        self.state().connected = true;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        if self.state().connected {
            Ok(())
        } else {
            Err(SyncError::connection(&self.name, "not connected"))
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.state().connected = false;
        Ok(())
    }

    async fn get_count(&self, table: &str, schema: &TableSchema) -> Result<u64> {
        self.record(format!("get_count({})", table));
        if !schema.has_primary_key() {
            return Err(SyncError::SchemaResolution("primary key required".into()));
        }
        let state = self.state();
        let t = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::extraction(table, "no such table"))?;
        Ok(t.rows.len() as u64)
    }

    async fn get_batch(
        &self,
        table: &str,
        offset: u64,
        limit: usize,
        schema: &TableSchema,
    ) -> Result<Vec<Record>> {
        self.record(format!("get_batch({},{},{})", table, offset, limit));
        let state = self.state();
        if state.failures.get_batch {
            return Err(injected("get_batch"));
        }
        if !schema.has_primary_key() {
            return Err(SyncError::SchemaResolution("primary key required".into()));
        }
        let t = state
            .tables
            .get(table)
            .ok_or_else(|| SyncError::extraction(table, "no such table"))?;
        Ok(t.rows
            .iter()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema> {
        self.record(format!("describe_table({})", table));
        self.state()
            .tables
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| SyncError::SchemaResolution(format!("table {} not found", table)))
    }

    async fn create_temp_table(
        &self,
        _original: &str,
        temp: &str,
        schema: &TableSchema,
    ) -> Result<()> {
        self.record(format!("create_temp_table({})", temp));
        if !schema.has_columns() {
            return Err(SyncError::temp_table(temp, "schema has no columns"));
        }
        let mut state = self.state();
        state.tables.remove(temp);
        state.tables.insert(
            temp.to_string(),
            MemTable {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn insert_batch(
        &self,
        table: &str,
        records: &[Record],
        columns: &[String],
    ) -> Result<u64> {
        let delay = {
            let mut state = self.state();
            state.insert_calls += 1;
            state.insert_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.record(format!("insert_batch({},{})", table, records.len()));
        let mut state = self.state();
        if state.failures.insert_on_call == Some(state.insert_calls) {
            return Err(injected("insert"));
        }
        let columns: Vec<String> = if columns.is_empty() {
            records
                .first()
                .map(|r| r.keys().cloned().collect())
                .unwrap_or_default()
        } else {
            columns.to_vec()
        };
        let rows: Vec<Record> = records
            .iter()
            .map(|r| {
                columns
                    .iter()
                    .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();

        state.insert_sizes.push(rows.len());
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| SyncError::insertion(table, "no such table"))?;
        t.rows.extend(rows);
        Ok(records.len() as u64)
    }

    async fn swap_tables(&self, original: &str, temp: &str) -> Result<()> {
        self.record(format!("swap_tables({},{})", original, temp));
        let mut state = self.state();
        if state.failures.swap {
            return Err(injected("swap"));
        }
        let new = state
            .tables
            .remove(temp)
            .ok_or_else(|| SyncError::swap(original, "temp table missing"))?;
        if let Some(old) = state.tables.remove(original) {
            state.tables.insert(backup_table_name(original), old);
        }
        state.tables.insert(original.to_string(), new);
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.record(format!("drop_table({})", table));
        let mut state = self.state();
        if state.failures.drop {
            return Err(injected("drop"));
        }
        state.tables.remove(table);
        Ok(())
    }

    async fn execute_procedure(&self, name: &str, args: &[Value]) -> Result<u64> {
        self.record(format!("execute_procedure({},{})", name, args.len()));
        if self.state().failures.procedures.contains(name) {
            return Err(injected("procedure"));
        }
        Ok(1)
    }

    async fn execute_select(&self, query: &str, _args: &[Value]) -> Result<Vec<Record>> {
        self.record("execute_select".to_string());
        self.state()
            .queries
            .get(query)
            .map(|q| q.rows.clone())
            .ok_or_else(|| SyncError::extraction("(query)", "unknown query"))
    }

    async fn execute_select_with_schema(&self, query: &str, _args: &[Value]) -> Result<TableSchema> {
        self.record("execute_select_with_schema".to_string());
        self.state()
            .queries
            .get(query)
            .map(|q| q.schema.clone())
            .ok_or_else(|| SyncError::SchemaResolution("unknown query".into()))
    }
}
