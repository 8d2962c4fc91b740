//! Console settings loaded from `config/console.toml` and `CONSOLE__*` env vars
use crate::authz::PermissionTable;
use crate::finance::DEFAULT_PAYMENT_TERM_DAYS;
use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/console.toml";

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub invoices: InvoiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// role -> action tokens; the built-in table applies when empty
    #[serde(default)]
    pub permissions: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct InvoiceConfig {
    #[serde(default = "default_payment_term_days")]
    pub default_payment_term_days: u32,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("data/console.sled")
}

fn default_payment_term_days() -> u32 {
    DEFAULT_PAYMENT_TERM_DAYS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for InvoiceConfig {
    fn default() -> Self {
        Self {
            default_payment_term_days: default_payment_term_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ConsoleConfig {
    /// Load from the default path, falling back to env vars and defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("CONSOLE").separator("__"))
            .build()?;

        let config: ConsoleConfig = settings.try_deserialize().map_err(|e| {
            ConfigError::Message(format!("console configuration is invalid: {e}"))
        })?;
        if config.invoices.default_payment_term_days == 0 {
            return Err(ConfigError::Message(
                "invoices.default_payment_term_days must be at least 1".into(),
            ));
        }

        Ok(config)
    }

    /// The single permission source for the process.
    pub fn permission_table(&self) -> PermissionTable {
        if self.permissions.is_empty() {
            PermissionTable::builtin()
        } else {
            PermissionTable::from_map(&self.permissions)
        }
    }
}
