//! Configuration validation.

use std::collections::HashSet;
use std::time::Duration;

use super::{Config, DbType, EndpointConfig, JobConfig, LogTarget, SyncGroupConfig};
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if !config.oracle.is_empty() {
        return Err(SyncError::Config(
            "oracle databases are not supported; move them to mariadb or postgres".into(),
        ));
    }

    if config.logger.target == LogTarget::File
        && config
            .logger
            .filename
            .as_deref()
            .map_or(true, |f| f.trim().is_empty())
    {
        return Err(SyncError::Config(
            "logger.filename is required when logger.target is file".into(),
        ));
    }

    let mut names = HashSet::new();
    for (db_type, db) in config.databases() {
        let section = db_type.as_str();
        if db.name.trim().is_empty() {
            return Err(SyncError::Config(format!("{}: name is required", section)));
        }
        if !names.insert(db.name.as_str()) {
            return Err(SyncError::Config(format!(
                "database name '{}' is declared more than once",
                db.name
            )));
        }
        if db.host.is_empty() {
            return Err(SyncError::Config(format!(
                "{}.{}: host is required",
                section, db.name
            )));
        }
        if db.dbname.is_empty() {
            return Err(SyncError::Config(format!(
                "{}.{}: dbname is required",
                section, db.name
            )));
        }
        if db.user.is_empty() {
            return Err(SyncError::Config(format!(
                "{}.{}: user is required",
                section, db.name
            )));
        }
        if db.max_connections == 0 {
            return Err(SyncError::Config(format!(
                "{}.{}: max_connections must be at least 1",
                section, db.name
            )));
        }
    }

    for (i, group) in config.sync.iter().enumerate() {
        validate_group(config, group)
            .map_err(|e| prefix(e, &format!("sync[{}]", i)))?;
    }

    Ok(())
}

fn validate_group(config: &Config, group: &SyncGroupConfig) -> Result<()> {
    check_database_ref(config, "source", &group.source_db, group.source_type.as_deref())?;
    check_database_ref(config, "target", &group.target_db, group.target_type.as_deref())?;

    let jobs = group.jobs();
    if jobs.is_empty() {
        return Err(SyncError::Config(
            "no tables configured (set tables or source/target)".into(),
        ));
    }

    for job in &jobs {
        validate_job(job).map_err(|e| prefix(e, &job.name))?;
    }

    Ok(())
}

fn check_database_ref(
    config: &Config,
    side: &str,
    name: &str,
    declared_type: Option<&str>,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SyncError::Config(format!("{}_db cannot be empty", side)));
    }

    let Some((actual, _)) = config.find_database(name) else {
        return Err(SyncError::Config(format!(
            "{}_db '{}' is not declared in any database section",
            side, name
        )));
    };

    if let Some(declared) = declared_type {
        let declared: DbType = declared.parse()?;
        if declared != actual {
            return Err(SyncError::Config(format!(
                "{}_type is '{}' but database '{}' is declared under {}",
                side, declared, name, actual
            )));
        }
    }

    Ok(())
}

fn validate_job(job: &JobConfig) -> Result<()> {
    validate_source(&job.source)?;
    validate_target(&job.target)?;

    if job.batch_size == 0 {
        return Err(SyncError::Config("batch_size must be at least 1".into()));
    }
    if job.buffer_size == 0 {
        return Err(SyncError::Config("buffer_size must be at least 1".into()));
    }
    if job.sync_interval == Duration::ZERO {
        return Err(SyncError::Config("sync_interval must be positive".into()));
    }
    if job.temp_table_suffix.is_empty() {
        return Err(SyncError::Config(
            "temp_table_suffix cannot be empty".into(),
        ));
    }
    for proc in &job.post_procedures {
        if proc.procedure_name.trim().is_empty() {
            return Err(SyncError::Config(
                "post_procedure_list entries need a procedure_name".into(),
            ));
        }
    }

    Ok(())
}

fn validate_source(source: &EndpointConfig) -> Result<()> {
    match (non_empty(&source.table), non_empty(&source.query)) {
        (false, false) => Err(SyncError::Config(
            "source must have either table or query".into(),
        )),
        (true, true) => Err(SyncError::Config(
            "source cannot have both table and query".into(),
        )),
        _ => Ok(()),
    }
}

fn validate_target(target: &EndpointConfig) -> Result<()> {
    if !non_empty(&target.table) {
        return Err(SyncError::Config(
            "target.table is required (a target query only describes the column shape)".into(),
        ));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn prefix(err: SyncError, context: &str) -> SyncError {
    match err {
        SyncError::Config(msg) => SyncError::Config(format!("{}: {}", context, msg)),
        other => other,
    }
}
