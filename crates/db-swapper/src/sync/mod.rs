//! The replication engine: schema resolution, record processing and the
//! per-job create-populate-swap cycle.

pub mod job;
pub mod processor;
pub mod resolve;
pub mod transform;

pub use job::{CycleReport, SyncJob};
pub use processor::{build_column_mapping, DataProcessor};
pub use transform::{Identity, RecordTransform, RenameColumns, TransformRegistry};
