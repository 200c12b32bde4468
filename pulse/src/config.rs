use anyhow::{anyhow, Context, Result};
use probe::ProbeOptions;
use pulse_core::limits::{clamp_rounds, clamp_timeout_secs, DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT_SECS};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tree_store::Backend;

use crate::logging::LogFormat;

const DEFAULT_CONFIG: &str = "pulse.yaml";
const DEFAULT_SQLITE_FILE: &str = "data.sqlite3";
const DEFAULT_JSON_FILE: &str = "data.json";
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Default, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: Option<String>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ProbeConfig {
    pub timeout_seconds: Option<i64>,
    pub runs: Option<i64>,
    pub max_in_flight: Option<usize>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct LogConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    pub store: Option<StoreConfig>,
    pub probe: Option<ProbeConfig>,
    pub log: Option<LogConfig>,
}

/// Read `path`, or `./pulse.yaml` when no path is given and it exists.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(Some(cfg))
}

/// Values given on the command line; they beat everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub db: Option<PathBuf>,
    pub backend: Option<String>,
    pub timeout: Option<i64>,
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub backend: Backend,
    pub store_path: PathBuf,
    pub timeout_secs: u64,
    pub runs: u32,
    pub max_in_flight: usize,
    pub user_agent: Option<String>,
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Settings {
    /// Merge CLI > environment > file > defaults. `env` looks up a variable.
    pub fn resolve(cli: &Overrides, file: Option<&Config>, env: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let store = file.and_then(|c| c.store.clone()).unwrap_or_default();
        let probe = file.and_then(|c| c.probe.clone()).unwrap_or_default();
        let log = file.and_then(|c| c.log.clone()).unwrap_or_default();

        let backend = match cli.backend.as_deref().or(store.backend.as_deref()) {
            Some(name) => Backend::parse(name)?,
            None => Backend::Sqlite,
        };

        let store_path = if let Some(p) = &cli.db {
            p.clone()
        } else if let Some(p) = env("DB_FILE") {
            PathBuf::from(p)
        } else if let Some(p) = env("DATA_FILE") {
            PathBuf::from(p).with_extension("sqlite3")
        } else if let Some(p) = store.path {
            p
        } else {
            PathBuf::from(match backend {
                Backend::Sqlite => DEFAULT_SQLITE_FILE,
                Backend::Json => DEFAULT_JSON_FILE,
            })
        };

        let env_timeout = match env("PULSE_TIMEOUT") {
            Some(v) => Some(v.trim().parse::<i64>().map_err(|_| anyhow!("PULSE_TIMEOUT must be a whole number of seconds, got {:?}", v))?),
            None => None,
        };
        let timeout = cli.timeout.or(env_timeout).or(probe.timeout_seconds).unwrap_or(DEFAULT_TIMEOUT_SECS as i64);

        let log_format = match (cli.log_format, log.format.as_deref()) {
            (Some(f), _) => f,
            (None, Some(name)) => LogFormat::parse(name)?,
            (None, None) => LogFormat::Text,
        };

        Ok(Settings {
            backend,
            store_path,
            timeout_secs: clamp_timeout_secs(timeout),
            runs: clamp_rounds(probe.runs.unwrap_or(1)),
            max_in_flight: probe.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT).max(1),
            user_agent: probe.user_agent,
            log_filter: env("PULSE_LOG").or(log.level).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format,
        })
    }

    pub fn probe_options(&self) -> ProbeOptions {
        let mut opts = ProbeOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            max_in_flight: self.max_in_flight,
            ..Default::default()
        };
        if let Some(ua) = &self.user_agent {
            opts.user_agent = ua.clone();
        }
        opts
    }
}
