//! Handles settings for the application.
//!
//! Values come from an optional TOML file (`config/splitledger.toml` unless
//! `--config` says otherwise) and are overridden by `SPLITLEDGER__*`
//! environment variables, e.g. `SPLITLEDGER__APP__LEVEL=debug`.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/splitledger.toml";

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => migration::sqlite_url(path),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub database: Database,
}

impl Settings {
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .set_default("database.sqlite", migration::DEFAULT_SQLITE_PATH)?
            .add_source(
                File::with_name(config_path.unwrap_or(DEFAULT_CONFIG_PATH))
                    .required(config_path.is_some()),
            )
            .add_source(
                Environment::with_prefix("SPLITLEDGER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}
