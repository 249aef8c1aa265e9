//! Configuration management for HomeLedger

use crate::error::LedgerError;
use crate::ledger::{DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "homeledger.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Json,
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_ledger_path")]
    pub path: String,
    /// Optional ceiling on nonces tried per block. Unbounded when absent.
    #[serde(default)]
    pub max_mining_iterations: Option<u64>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            backend: default_backend(),
            path: default_ledger_path(),
            max_mining_iterations: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often the host loop calls `Scheduler::tick`, e.g. "30s".
    #[serde(default = "default_tick_interval")]
    pub tick_interval: String,
    /// How often the daemon re-verifies the chain in the background.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: String,
    #[serde(default = "default_routines")]
    pub routines: Vec<RoutineConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            health_check_interval: default_health_check_interval(),
            routines: default_routines(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Result<Duration, LedgerError> {
        parse_duration("scheduler.tick_interval", &self.tick_interval)
    }

    pub fn health_check_interval(&self) -> Result<Duration, LedgerError> {
        parse_duration("scheduler.health_check_interval", &self.health_check_interval)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutineConfig {
    pub name: String,
    /// Daily trigger time, "HH:MM" local time.
    pub at: String,
}

fn default_difficulty() -> usize {
    DEFAULT_DIFFICULTY
}

fn default_backend() -> StorageBackend {
    StorageBackend::Json
}

fn default_ledger_path() -> String {
    "./data/audit_chain.json".to_string()
}

fn default_tick_interval() -> String {
    "30s".to_string()
}

fn default_health_check_interval() -> String {
    "15m".to_string()
}

fn default_routines() -> Vec<RoutineConfig> {
    vec![RoutineConfig {
        name: "morning_routine".to_string(),
        at: "07:00".to_string(),
    }]
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, LedgerError> {
    let duration = humantime::parse_duration(value)
        .map_err(|e| LedgerError::Config(format!("{} = {:?} is not a duration: {}", field, value, e)))?;
    if duration.is_zero() {
        return Err(LedgerError::Config(format!("{} must be greater than zero", field)));
    }
    Ok(duration)
}

/// Read `path` (or `homeledger.toml`), falling back to defaults when the file
/// is absent or empty, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<Config, LedgerError> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let config_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            return Err(LedgerError::Config(format!("Failed to read {}: {}", path.display(), e)));
        }
    };

    let config: Config = if config_str.trim().is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str)
            .map_err(|e| LedgerError::Config(format!("Failed to parse {}: {}", path.display(), e)))?
    };

    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.ledger.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidDifficulty(self.ledger.difficulty));
        }

        if self.ledger.backend != StorageBackend::Memory && self.ledger.path.trim().is_empty() {
            return Err(LedgerError::Config("ledger.path must be set for file backends".to_string()));
        }

        if self.ledger.max_mining_iterations == Some(0) && self.ledger.difficulty > 0 {
            return Err(LedgerError::Config(
                "ledger.max_mining_iterations must be positive".to_string(),
            ));
        }

        self.scheduler.tick_interval()?;
        self.scheduler.health_check_interval()?;
        for routine in &self.scheduler.routines {
            if routine.name.trim().is_empty() {
                return Err(LedgerError::Config("scheduler routine names must not be empty".to_string()));
            }
            crate::scheduler::parse_trigger_time(&routine.at)?;
        }
        Ok(())
    }
}
