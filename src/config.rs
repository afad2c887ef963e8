use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

use crate::services::queue::QueueConfig;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Number of concurrent derivation consumers.
    pub workers: usize,
    pub job_max_attempts: u32,
    pub job_lease_secs: u64,
    pub job_poll_ms: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File catalog with asynchronous thumbnail derivation")]
pub struct Args {
    /// Host to bind to (overrides FILES_MANAGER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILES_MANAGER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where file content is stored (overrides FILES_MANAGER_FOLDER_PATH)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILES_MANAGER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Derivation worker count (overrides FILES_MANAGER_WORKERS)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Deliveries before a failing job is dead-lettered (overrides FILES_MANAGER_JOB_MAX_ATTEMPTS)
    #[arg(long)]
    pub job_max_attempts: Option<u32>,

    /// Seconds a leased job stays invisible (overrides FILES_MANAGER_JOB_LEASE_SECS)
    #[arg(long)]
    pub job_lease_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Serve HTTP without starting derivation workers
    #[arg(long)]
    pub no_worker: bool,
}

/// Startup mode flags that are not part of the runtime configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunFlags {
    pub migrate: bool,
    pub no_worker: bool,
}

/// Read `name` from the environment, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run flags.
    pub fn from_env_and_args() -> Result<(Self, RunFlags)> {
        Self::from_args(Args::parse())
    }

    /// Merge already parsed CLI args over the environment.
    pub fn from_args(args: Args) -> Result<(Self, RunFlags)> {
        // --- Environment fallback ---
        let env_host = env_or("FILES_MANAGER_HOST", "0.0.0.0".to_string())?;
        let env_port = env_or("FILES_MANAGER_PORT", 5000u16)?;
        let env_storage = env_or("FILES_MANAGER_FOLDER_PATH", "/tmp/files_manager".to_string())?;
        let env_db = env_or(
            "FILES_MANAGER_DATABASE_URL",
            "sqlite://./data/files_manager.db".to_string(),
        )?;
        let env_workers = env_or("FILES_MANAGER_WORKERS", 1usize)?;
        let env_attempts = env_or("FILES_MANAGER_JOB_MAX_ATTEMPTS", 5u32)?;
        let env_lease = env_or("FILES_MANAGER_JOB_LEASE_SECS", 300u64)?;
        let env_poll = env_or("FILES_MANAGER_JOB_POLL_MS", 1000u64)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            workers: args.workers.unwrap_or(env_workers).max(1),
            job_max_attempts: args.job_max_attempts.unwrap_or(env_attempts).max(1),
            job_lease_secs: args.job_lease_secs.unwrap_or(env_lease),
            job_poll_ms: env_poll,
        };

        let flags = RunFlags {
            migrate: args.migrate,
            no_worker: args.no_worker,
        };

        Ok((cfg, flags))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            lease: Duration::from_secs(self.job_lease_secs),
            poll_interval: Duration::from_millis(self.job_poll_ms),
            max_attempts: self.job_max_attempts,
            ..QueueConfig::default()
        }
    }
}
