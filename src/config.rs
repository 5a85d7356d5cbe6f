//! Server settings, read from the environment.
//!
//! | Variable                           | Default                 |
//! |------------------------------------|-------------------------|
//! | `TIMETABLE_BIND`                   | `127.0.0.1:8080`        |
//! | `TIMETABLE_MAX_CONCURRENT_SOLVES`  | rayon worker count      |
//! | `TIMETABLE_JOB_RETENTION_SECS`     | `600`                   |
//! | `TIMETABLE_MAX_RETAINED_JOBS`      | `256`                   |
//!
//! Log filtering is left to `RUST_LOG`, read by `env_logger` in `main`.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const BIND_VAR: &str = "TIMETABLE_BIND";
pub const MAX_SOLVES_VAR: &str = "TIMETABLE_MAX_CONCURRENT_SOLVES";
pub const JOB_RETENTION_VAR: &str = "TIMETABLE_JOB_RETENTION_SECS";
pub const MAX_RETAINED_JOBS_VAR: &str = "TIMETABLE_MAX_RETAINED_JOBS";
const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Solves allowed to run at once, counted separately for `/solve` and jobs.
    pub max_concurrent_solves: usize,
    /// How long a finished job stays readable.
    pub job_retention: Duration,
    pub max_retained_jobs: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_concurrent_solves: rayon::current_num_threads().max(1),
            job_retention: Duration::from_secs(600),
            max_retained_jobs: 256,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Self::default();
        let bind = parse(&lookup, BIND_VAR)?.unwrap_or(defaults.bind);
        let max_concurrent_solves =
            positive(&lookup, MAX_SOLVES_VAR)?.unwrap_or(defaults.max_concurrent_solves);
        let job_retention = parse::<u64, _>(&lookup, JOB_RETENTION_VAR)?
            .map(Duration::from_secs)
            .unwrap_or(defaults.job_retention);
        let max_retained_jobs =
            positive(&lookup, MAX_RETAINED_JOBS_VAR)?.unwrap_or(defaults.max_retained_jobs);
        Ok(Self {
            bind,
            max_concurrent_solves,
            job_retention,
            max_retained_jobs,
        })
    }
}

fn positive<F>(lookup: &F, key: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match parse::<usize, _>(lookup, key)? {
        Some(0) => Err(ConfigError::InvalidSetting {
            key,
            value: "0".to_string(),
        }),
        other => Ok(other),
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidSetting { key, value: raw }),
    }
}
