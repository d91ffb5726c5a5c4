//! Settings of the service, read from an optional `settings.toml` and from
//! `QUEST_SHOP__*` environment variables (`QUEST_SHOP__APP__LEVEL=debug`).
//!
//! See `settings.example.toml` for every key.
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Memory,
    Sqlite(String),
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Engine {
    pub idempotency_ttl_secs: u64,
    pub pending_timeout_secs: u64,
    pub operation_timeout_secs: u64,
}

impl Engine {
    pub fn config(&self) -> engine::EngineConfig {
        engine::EngineConfig {
            idempotency_ttl: Duration::from_secs(self.idempotency_ttl_secs),
            pending_timeout: Duration::from_secs(self.pending_timeout_secs),
            operation_timeout: Duration::from_secs(self.operation_timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Maintenance {
    /// Seconds between two sweeps of expired idempotency keys.
    pub purge_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    #[serde(default)]
    pub database: Database,
    pub engine: Engine,
    pub maintenance: Maintenance,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let defaults = engine::EngineConfig::default();
        Config::builder()
            .set_default("app.level", "info")?
            .set_default(
                "engine.idempotency_ttl_secs",
                defaults.idempotency_ttl.as_secs(),
            )?
            .set_default(
                "engine.pending_timeout_secs",
                defaults.pending_timeout.as_secs(),
            )?
            .set_default(
                "engine.operation_timeout_secs",
                defaults.operation_timeout.as_secs(),
            )?
            .set_default("maintenance.purge_interval_secs", 3600_u64)?
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("QUEST_SHOP").separator("__"))
            .build()?
            .try_deserialize()
    }
}
