//! db-swapper CLI - scheduled MariaDB/PostgreSQL table replication.

mod transforms;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use db_swapper::config::{LogTarget, LoggerConfig};
use db_swapper::{bootstrap_jobs, Config, ConnectionRegistry, Supervisor, SyncError};
use serde_json::json;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "db-swapper")]
#[command(about = "Scheduled table replication with atomic table swaps")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Output results as JSON to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json [default: logger.format, then text]
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Log verbosity: debug, info, warn, error [default: logger.level, then info]
    #[arg(long, global = true)]
    verbosity: Option<String>,

    /// Seconds to wait for in-flight cycles on shutdown (overrides shutdown_timeout)
    #[arg(long, global = true)]
    shutdown_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured sync job until SIGINT/SIGTERM
    Run,

    /// Connect to every configured database and report its status
    HealthCheck,

    /// Parse and validate the configuration without connecting
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(secs) = cli.shutdown_timeout {
        config.shutdown_timeout = Duration::from_secs(secs);
    }

    let level = cli
        .verbosity
        .clone()
        .or_else(|| config.logger.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let format = cli
        .log_format
        .clone()
        .or_else(|| config.logger.format.clone())
        .unwrap_or_else(|| "text".to_string());
    // Flushes buffered log lines when dropped at the end of `run`.
    let _log_guard = setup_logging(&level, &format, &config.logger)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::CheckConfig => check_config(&config, cli.output_json),
        Commands::HealthCheck => health_check(&config, cli.output_json).await,
        Commands::Run => run_jobs(config, cli.output_json).await,
    }
}

fn check_config(config: &Config, output_json: bool) -> Result<(), SyncError> {
    let jobs = config.jobs();

    if output_json {
        let summary: Vec<_> = jobs
            .iter()
            .map(|job| {
                json!({
                    "name": job.name,
                    "source_db": job.source_db,
                    "target_db": job.target_db,
                    "target_table": job.target_table(),
                    "batch_size": job.batch_size,
                    "buffer_size": job.buffer_size,
                    "sync_interval_secs": job.sync_interval.as_secs(),
                    "transform_function": job.transform_function,
                    "post_procedures": job.post_procedures.len(),
                })
            })
            .collect();
        println!("{}", to_json(&json!({ "valid": true, "jobs": summary }))?);
        return Ok(());
    }

    println!("Configuration is valid");
    println!("  Databases: {}", config.databases().count());
    println!("  Jobs: {}", jobs.len());
    for job in &jobs {
        println!(
            "    {} (every {}, batch {}{})",
            job.name,
            format_interval(job.sync_interval),
            job.batch_size,
            job.transform_function
                .as_deref()
                .map(|t| format!(", transform {}", t))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn health_check(config: &Config, output_json: bool) -> Result<(), SyncError> {
    let registry = ConnectionRegistry::connect_all(&Config {
        strict_startup: false,
        ..config.clone()
    })
    .await?;
    let statuses = registry.health_check().await;
    registry.disconnect_all().await;

    let healthy = statuses.iter().all(|s| s.connected);

    if output_json {
        println!(
            "{}",
            to_json(&json!({ "healthy": healthy, "databases": statuses }))?
        );
    } else {
        println!("Health Check Results:");
        for status in &statuses {
            println!(
                "  {} ({}): {} ({}ms)",
                status.name,
                status.db_type,
                if status.connected { "OK" } else { "FAILED" },
                status.latency_ms
            );
            if let Some(ref err) = status.error {
                println!("    Error: {}", err);
            }
        }
        println!(
            "\n  Overall: {}",
            if healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    if !healthy {
        let failed: Vec<&str> = statuses
            .iter()
            .filter(|s| !s.connected)
            .map(|s| s.name.as_str())
            .collect();
        return Err(SyncError::connection(failed.join(", "), "health check failed"));
    }
    Ok(())
}

async fn run_jobs(config: Config, output_json: bool) -> Result<(), SyncError> {
    let registry = ConnectionRegistry::connect_all(&config).await?;

    let jobs = match bootstrap_jobs(&config, &registry, &transforms::builtin()).await {
        Ok(jobs) => jobs,
        Err(e) => {
            registry.disconnect_all().await;
            return Err(e);
        }
    };

    let mut supervisor = Supervisor::new(config.shutdown_timeout);
    for job in jobs {
        supervisor.spawn(job);
    }
    info!("Supervising {} job(s)", supervisor.len());

    let report = supervisor
        .run_until(shutdown_signal(config.shutdown_timeout))
        .await;
    registry.disconnect_all().await;

    if output_json {
        println!(
            "{}",
            to_json(&json!({ "completed": report.completed, "aborted": report.aborted }))?
        );
    }
    Ok(())
}

fn to_json(value: &serde_json::Value) -> Result<String, SyncError> {
    serde_json::to_string_pretty(value).map_err(|e| SyncError::Config(e.to_string()))
}

fn format_interval(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        s if s > 0 && s % 3600 == 0 => format!("{}h", s / 3600),
        s if s > 0 && s % 60 == 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

fn setup_logging(
    verbosity: &str,
    format: &str,
    logger: &LoggerConfig,
) -> Result<WorkerGuard, SyncError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        other => {
            return Err(SyncError::Config(format!(
                "Invalid verbosity '{}'. Valid values: debug, info, warn, error",
                other
            )))
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, guard) = match logger.target {
        LogTarget::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogTarget::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogTarget::File => {
            let path = logger.filename.as_deref().unwrap_or_default();
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| SyncError::Config(format!("Cannot open log file '{}': {}", path, e)))?;
            tracing_appender::non_blocking(file)
        }
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(logger.target != LogTarget::File)
        .with_writer(writer);

    match format.to_lowercase().as_str() {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => {
            return Err(SyncError::Config(format!(
                "Invalid log format '{}'. Valid values: text, json",
                other
            )))
        }
    }
    Ok(guard)
}

/// Resolves on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal(grace: Duration) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            None
        }
    };
    let term = async {
        match sigterm.as_mut() {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    let name = tokio::select! {
        _ = ctrl_c() => "SIGINT",
        _ = term => "SIGTERM",
    };
    eprintln!(
        "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
        name,
        grace.as_secs()
    );
}

/// Resolves on Ctrl-C.
#[cfg(not(unix))]
async fn shutdown_signal(grace: Duration) {
    ctrl_c().await;
    eprintln!(
        "\nReceived Ctrl-C. Shutting down gracefully (timeout: {}s)...",
        grace.as_secs()
    );
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
