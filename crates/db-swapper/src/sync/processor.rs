//! Column mapping, transform and buffering between extraction and insert.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::core::{Record, TableSchema};

use super::transform::{Identity, RecordTransform};

/// Pair source columns with target columns by normalized name.
///
/// For each source column the first target column with the same normalized
/// name wins. Unmatched columns on either side are left out.
pub fn build_column_mapping(source: &TableSchema, target: &TableSchema) -> HashMap<String, String> {
    let mut mapping = HashMap::with_capacity(source.columns.len());
    for src in &source.columns {
        let key = src.normalized_name();
        if let Some(tgt) = target.columns.iter().find(|t| t.normalized_name() == key) {
            mapping.insert(src.name.clone(), tgt.name.clone());
        }
    }
    mapping
}

struct State {
    buffer: VecDeque<Record>,
    preloaded: Option<Arc<Vec<Record>>>,
}

/// Maps and transforms extracted records and holds them until insert.
///
/// In streaming mode records go through [`process`](Self::process) into a
/// FIFO buffer and come out through [`drain`](Self::drain). In preloaded
/// mode a query result fetched once is sliced lazily with
/// [`preloaded_batch`](Self::preloaded_batch) and never mutated.
pub struct DataProcessor {
    mapping: HashMap<String, String>,
    transform: Arc<dyn RecordTransform>,
    target_columns: Vec<String>,
    buffer_size: usize,
    state: Mutex<State>,
}

impl DataProcessor {
    pub fn new(source: &TableSchema, target: &TableSchema, buffer_size: usize) -> Self {
        Self {
            mapping: build_column_mapping(source, target),
            transform: Arc::new(Identity),
            target_columns: target.insertable_columns(),
            buffer_size,
            state: Mutex::new(State {
                buffer: VecDeque::with_capacity(buffer_size),
                preloaded: None,
            }),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn RecordTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Switch to preloaded mode with a query result set.
    pub fn with_preloaded(self, records: Vec<Record>) -> Self {
        self.lock().preloaded = Some(Arc::new(records));
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Source column name to target column name.
    pub fn mapping(&self) -> &HashMap<String, String> {
        &self.mapping
    }

    /// Non-autoincrement target columns in schema order.
    pub fn target_columns(&self) -> &[String] {
        &self.target_columns
    }

    fn map_record(&self, record: Record) -> Record {
        let mapped: Record = record
            .into_iter()
            .filter_map(|(key, value)| self.mapping.get(&key).map(|t| (t.clone(), value)))
            .collect();
        self.transform.transform(mapped)
    }

    /// Map, transform and buffer a batch of extracted records.
    pub fn process(&self, batch: Vec<Record>) {
        let processed: Vec<Record> = batch.into_iter().map(|r| self.map_record(r)).collect();

        let mut state = self.lock();
        let before = state.buffer.len();
        state.buffer.extend(processed);
        if before <= self.buffer_size && state.buffer.len() > self.buffer_size {
            warn!(
                "Processing buffer grew to {} records (buffer_size {})",
                state.buffer.len(),
                self.buffer_size
            );
        }
    }

    /// Remove and return up to `n` buffered records in arrival order.
    pub fn drain(&self, n: usize) -> Vec<Record> {
        let mut state = self.lock();
        let n = n.min(state.buffer.len());
        state.buffer.drain(..n).collect()
    }

    /// Records currently buffered.
    pub fn buffered(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Discard everything buffered.
    pub fn clear(&self) {
        self.lock().buffer.clear();
    }

    pub fn has_preloaded(&self) -> bool {
        self.lock().preloaded.is_some()
    }

    /// Number of preloaded records, if in preloaded mode.
    pub fn preloaded_len(&self) -> Option<usize> {
        self.lock().preloaded.as_ref().map(|p| p.len())
    }

    /// Mapped and transformed copy of `preloaded[offset..offset + size]`.
    ///
    /// Out-of-range offsets yield an empty batch.
    pub fn preloaded_batch(&self, offset: usize, size: usize) -> Vec<Record> {
        let Some(preloaded) = self.lock().preloaded.clone() else {
            return Vec::new();
        };
        if offset >= preloaded.len() {
            return Vec::new();
        }
        let end = offset.saturating_add(size).min(preloaded.len());
        preloaded[offset..end]
            .iter()
            .map(|r| self.map_record(r.clone()))
            .collect()
    }
}

impl std::fmt::Debug for DataProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataProcessor")
            .field("mapping", &self.mapping)
            .field("target_columns", &self.target_columns)
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnInfo, Value};
    use crate::sync::transform::RenameColumns;
    use std::collections::HashSet;

    fn schema(cols: &[&str]) -> TableSchema {
        TableSchema::new(cols.iter().map(|c| ColumnInfo::new(*c, "text")).collect())
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_mapping_by_normalized_name() {
        let source = schema(&["VENDOR_NAME", "MODEL_NAME", "TAC", "INTERNAL_ONLY"]);
        let target = schema(&["id", "vendorName", "modelName", "tac"]);
        let mapping = build_column_mapping(&source, &target);

        assert_eq!(mapping.get("VENDOR_NAME").map(String::as_str), Some("vendorName"));
        assert_eq!(mapping.get("MODEL_NAME").map(String::as_str), Some("modelName"));
        assert_eq!(mapping.get("TAC").map(String::as_str), Some("tac"));
        assert!(!mapping.contains_key("INTERNAL_ONLY"));
    }

    #[test]
    fn test_first_target_match_wins() {
        let source = schema(&["user_id"]);
        let target = schema(&["userId", "USER_ID"]);
        let mapping = build_column_mapping(&source, &target);
        assert_eq!(mapping.get("user_id").map(String::as_str), Some("userId"));
    }

    #[test]
    fn test_process_keys_are_image_of_mapped_domain() {
        let source = schema(&["VENDOR_NAME", "MODEL_NAME", "TAC", "EXTRA"]);
        let target = schema(&["vendorName", "modelName", "tac"]);
        let processor = DataProcessor::new(&source, &target, 10);

        processor.process(vec![record(&[
            ("VENDOR_NAME", Value::from("Acme")),
            ("MODEL_NAME", Value::from("X1")),
            ("TAC", Value::Int(35_000_001)),
            ("EXTRA", Value::from("dropped")),
            ("NOT_IN_SCHEMA", Value::Null),
        ])]);

        let out = processor.drain(10);
        assert_eq!(out.len(), 1);
        let keys: HashSet<&str> = out[0].keys().map(String::as_str).collect();
        assert_eq!(keys, HashSet::from(["vendorName", "modelName", "tac"]));
        assert_eq!(out[0]["vendorName"], Value::from("Acme"));
        assert_eq!(out[0]["modelName"], Value::from("X1"));
        assert_eq!(out[0]["tac"], Value::Int(35_000_001));
    }

    #[test]
    fn test_transform_runs_after_mapping() {
        let source = schema(&["CLIENT"]);
        let target = schema(&["client", "customer"]);
        let processor = DataProcessor::new(&source, &target, 10)
            .with_transform(Arc::new(RenameColumns::new([("client", "customer")])));

        processor.process(vec![record(&[("CLIENT", Value::from("acme"))])]);
        let out = processor.drain(1);
        assert_eq!(out[0].get("customer"), Some(&Value::from("acme")));
        assert!(!out[0].contains_key("client"));
    }

    #[test]
    fn test_drain_is_fifo_and_bounded() {
        let source = schema(&["n"]);
        let processor = DataProcessor::new(&source, &source, 4);
        processor.process((0..5).map(|i| record(&[("n", Value::Int(i))])).collect());
        assert_eq!(processor.buffered(), 5);

        let first = processor.drain(3);
        let values: Vec<&Value> = first.iter().map(|r| &r["n"]).collect();
        assert_eq!(values, vec![&Value::Int(0), &Value::Int(1), &Value::Int(2)]);

        let rest = processor.drain(10);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0]["n"], Value::Int(3));
        assert!(processor.drain(1).is_empty());
    }

    #[test]
    fn test_clear() {
        let source = schema(&["n"]);
        let processor = DataProcessor::new(&source, &source, 4);
        processor.process(vec![record(&[("n", Value::Int(1))])]);
        processor.clear();
        assert_eq!(processor.buffered(), 0);
    }

    #[test]
    fn test_preloaded_batch_is_repeatable() {
        let source = schema(&["ICCID"]);
        let target = schema(&["iccid"]);
        let rows: Vec<Record> = (0..7)
            .map(|i| record(&[("ICCID", Value::Int(i))]))
            .collect();
        let processor = DataProcessor::new(&source, &target, 10).with_preloaded(rows);

        assert!(processor.has_preloaded());
        assert_eq!(processor.preloaded_len(), Some(7));

        let a = processor.preloaded_batch(3, 3);
        let b = processor.preloaded_batch(3, 3);
        assert_eq!(a, b);
        assert_eq!(a[0]["iccid"], Value::Int(3));

        assert_eq!(processor.preloaded_batch(6, 3).len(), 1);
        assert!(processor.preloaded_batch(7, 3).is_empty());
        assert_eq!(processor.buffered(), 0);
    }

    #[test]
    fn test_target_columns_skip_auto_increment() {
        let mut id = ColumnInfo::new("id", "bigint");
        id.auto_increment = true;
        let target = TableSchema::new(vec![id, ColumnInfo::new("imsi", "text")]);
        let processor = DataProcessor::new(&schema(&["IMSI"]), &target, 1);
        assert_eq!(processor.target_columns(), &["imsi".to_string()]);
    }

    #[test]
    fn test_concurrent_process_and_drain() {
        let source = schema(&["n"]);
        let processor = Arc::new(DataProcessor::new(&source, &source, 100));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let p = Arc::clone(&processor);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        p.process(vec![record(&[("n", Value::Int(t * 100 + i))])]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut total = 0;
        loop {
            let batch = processor.drain(33);
            if batch.is_empty() {
                break;
            }
            total += batch.len();
        }
        assert_eq!(total, 200);
    }
}
