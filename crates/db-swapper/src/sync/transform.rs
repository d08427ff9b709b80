//! Named record transforms applied after column mapping.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::core::Record;

/// A `Record -> Record` transformation.
///
/// Any `Fn(Record) -> Record` closure is a transform.
pub trait RecordTransform: Send + Sync {
    fn transform(&self, record: Record) -> Record;
}

impl<F> RecordTransform for F
where
    F: Fn(Record) -> Record + Send + Sync,
{
    fn transform(&self, record: Record) -> Record {
        self(record)
    }
}

/// Returns records unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl RecordTransform for Identity {
    fn transform(&self, record: Record) -> Record {
        record
    }
}

/// Renames keys; keys without a rule pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct RenameColumns {
    renames: Vec<(String, String)>,
}

impl RenameColumns {
    pub fn new<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            renames: pairs
                .into_iter()
                .map(|(from, to)| (from.into(), to.into()))
                .collect(),
        }
    }
}

impl RecordTransform for RenameColumns {
    fn transform(&self, mut record: Record) -> Record {
        for (from, to) in &self.renames {
            if let Some(value) = record.remove(from) {
                record.insert(to.clone(), value);
            }
        }
        record
    }
}

/// Transforms keyed by the name used in `transform_function`.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn RecordTransform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transform under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, transform: impl RecordTransform + 'static) {
        self.transforms.insert(name.into(), Arc::new(transform));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, name: impl Into<String>, transform: impl RecordTransform + 'static) -> Self {
        self.register(name, transform);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn RecordTransform>> {
        self.transforms.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transforms.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Resolve an optional transform name. Absent or unknown names give
    /// [`Identity`]; unknown names are logged.
    pub fn resolve(&self, name: Option<&str>) -> Arc<dyn RecordTransform> {
        match name.filter(|n| !n.is_empty()) {
            None => Arc::new(Identity),
            Some(name) => self.get(name).unwrap_or_else(|| {
                warn!(
                    "Unknown transform_function '{}', records will pass through unchanged",
                    name
                );
                Arc::new(Identity)
            }),
        }
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}
