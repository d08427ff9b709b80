//! A single table replication job and its create-populate-swap cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::config::JobConfig;
use crate::core::{DatabaseConnector, Record, TableSchema};
use crate::error::{Result, SyncError};

use super::processor::DataProcessor;
use super::resolve::{resolve_source_schema, resolve_target_schema};
use super::transform::RecordTransform;

/// Outcome of one successful cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Rows read from the source (or the preloaded set).
    pub rows_extracted: u64,
    /// Rows the target reported as inserted into the temp table.
    pub rows_inserted: u64,
    /// Insert calls issued.
    pub batches: usize,
    /// Post-cycle procedures that failed.
    pub procedures_failed: usize,
    /// Wall-clock time of the cycle.
    pub duration: Duration,
}

/// One source/target pair synchronized on a schedule.
///
/// Schemas, column mapping and transform are fixed when the job is
/// bootstrapped and reused by every cycle.
pub struct SyncJob {
    config: JobConfig,
    source: Arc<dyn DatabaseConnector>,
    target: Arc<dyn DatabaseConnector>,
    source_schema: TableSchema,
    target_schema: TableSchema,
    processor: DataProcessor,
}

impl SyncJob {
    /// Resolve schemas, build the column mapping and, for query sources,
    /// fetch the full result set once.
    pub async fn bootstrap(
        config: JobConfig,
        source: Arc<dyn DatabaseConnector>,
        target: Arc<dyn DatabaseConnector>,
        transform: Arc<dyn RecordTransform>,
    ) -> Result<Self> {
        let source_schema = resolve_source_schema(source.as_ref(), &config.source).await?;
        let target_schema = resolve_target_schema(
            target.as_ref(),
            &config.target,
            &source_schema,
            source.db_type(),
        )
        .await?;

        let mut processor = DataProcessor::new(&source_schema, &target_schema, config.buffer_size)
            .with_transform(transform);

        if config.source.table.is_none() {
            if let Some(query) = config.source.query.as_deref() {
                let rows = source
                    .execute_select(query, &config.source.params)
                    .await
                    .map_err(|e| SyncError::extraction(config.source.label(), e))?;
                info!("Preloaded {} records from source query", rows.len());
                processor = processor.with_preloaded(rows);
            }
        }

        let unmapped: Vec<&str> = source_schema
            .columns
            .iter()
            .filter(|c| !processor.mapping().contains_key(&c.name))
            .map(|c| c.name.as_str())
            .collect();
        if !unmapped.is_empty() {
            debug!("Source columns without a target match: {:?}", unmapped);
        }
        if processor.mapping().is_empty() {
            warn!(
                "No source column of {} matches a target column; cycles will insert empty rows",
                config.name
            );
        }

        info!(
            "Job {} ready: {} source columns, {} target columns, {} mapped",
            config.name,
            source_schema.columns.len(),
            target_schema.columns.len(),
            processor.mapping().len()
        );

        Ok(Self {
            config,
            source,
            target,
            source_schema,
            target_schema,
            processor,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn interval(&self) -> Duration {
        self.config.sync_interval
    }

    pub fn source_schema(&self) -> &TableSchema {
        &self.source_schema
    }

    pub fn target_schema(&self) -> &TableSchema {
        &self.target_schema
    }

    pub fn processor(&self) -> &DataProcessor {
        &self.processor
    }

    /// Run one create-populate-swap-cleanup cycle.
    ///
    /// Extraction and insert failures drop the temp table and leave the
    /// live table untouched. A swap failure leaves the temp table in place.
    /// Cleanup and procedure failures are logged only.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let target_table = self.config.target_table();
        let temp_table = self.config.temp_table();
        let mut report = CycleReport::default();

        self.target
            .create_temp_table(target_table, &temp_table, &self.target_schema)
            .await
            .map_err(|e| SyncError::temp_table(&temp_table, e))?;
        debug!("Created temp table {}", temp_table);

        if let Err(e) = self.populate(&temp_table, &mut report).await {
            if let Err(drop_err) = self.target.drop_table(&temp_table).await {
                error!(
                    "Failed to drop temp table {} after error: {}",
                    temp_table, drop_err
                );
            }
            return Err(e);
        }

        if let Err(e) = self.target.swap_tables(target_table, &temp_table).await {
            error!(
                "Swap failed, temp table {} left in place for inspection",
                temp_table
            );
            return Err(SyncError::swap(target_table, e));
        }
        info!("Swapped {} into {}", temp_table, target_table);

        if let Err(e) = self.target.drop_table(&temp_table).await {
            warn!("{}", SyncError::cleanup(&temp_table, e));
        }

        for proc in &self.config.post_procedures {
            match self
                .target
                .execute_procedure(&proc.procedure_name, &proc.procedure_params)
                .await
            {
                Ok(count) => info!(
                    "Procedure {} processed: {} rows",
                    proc.procedure_name, count
                ),
                Err(e) => {
                    report.procedures_failed += 1;
                    error!("{}", SyncError::procedure(&proc.procedure_name, e));
                }
            }
        }

        report.duration = started.elapsed();
        Ok(report)
    }

    async fn populate(&self, temp_table: &str, report: &mut CycleReport) -> Result<()> {
        self.processor.clear();

        match self.processor.preloaded_len() {
            Some(total) => self.populate_preloaded(temp_table, total, report).await,
            None => self.populate_paginated(temp_table, report).await,
        }
    }

    async fn populate_preloaded(
        &self,
        temp_table: &str,
        total: usize,
        report: &mut CycleReport,
    ) -> Result<()> {
        debug!("Using preloaded data, count: {}", total);
        let batch_size = self.config.batch_size;
        let mut offset = 0;

        while offset < total {
            let batch = self.processor.preloaded_batch(offset, batch_size);
            if batch.is_empty() {
                break;
            }
            offset += batch.len();
            report.rows_extracted += batch.len() as u64;
            self.insert(temp_table, &batch, report).await?;
            info!("Progress: {}/{} records processed", offset, total);
        }

        Ok(())
    }

    async fn populate_paginated(&self, temp_table: &str, report: &mut CycleReport) -> Result<()> {
        let table = self.config.source.label();
        let batch_size = self.config.batch_size;

        let total = self
            .source
            .get_count(table, &self.source_schema)
            .await
            .map_err(|e| extraction(table, e))?;
        debug!("Total rows count: {}", total);

        let mut offset: u64 = 0;
        while offset < total {
            debug!("Processing offset: {}", offset);
            let batch = self
                .source
                .get_batch(table, offset, batch_size, &self.source_schema)
                .await
                .map_err(|e| extraction(table, e))?;

            let fetched = batch.len();
            if fetched == 0 {
                break;
            }
            report.rows_extracted += fetched as u64;

            self.processor.process(batch);
            // The final batch may be short; drain only what it produced.
            let processed = self.processor.drain(batch_size.min(fetched));
            self.insert(temp_table, &processed, report).await?;

            offset += fetched as u64;
            info!("Progress: {}/{} records processed", offset.min(total), total);

            if fetched < batch_size {
                break;
            }
        }

        loop {
            let rest = self.processor.drain(batch_size);
            if rest.is_empty() {
                break;
            }
            self.insert(temp_table, &rest, report).await?;
        }

        Ok(())
    }

    async fn insert(&self, temp_table: &str, records: &[Record], report: &mut CycleReport) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        debug!("Processed batch size: {}", records.len());
        let inserted = self
            .target
            .insert_batch(temp_table, records, self.processor.target_columns())
            .await
            .map_err(|e| match e {
                e @ SyncError::Insertion { .. } => e,
                e => SyncError::insertion(temp_table, e),
            })?;
        report.rows_inserted += inserted;
        report.batches += 1;
        Ok(())
    }
}

fn extraction(table: &str, err: SyncError) -> SyncError {
    match err {
        e @ SyncError::Extraction { .. } => e,
        e => SyncError::extraction(table, e),
    }
}

impl std::fmt::Debug for SyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJob")
            .field("name", &self.config.name)
            .field("source", &self.source.name())
            .field("target", &self.target.name())
            .field("interval", &self.config.sync_interval)
            .finish()
    }
}
