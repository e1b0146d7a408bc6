//! Configuration for cabridge: database session defaults and optional
//! migration mappings, loaded from TOML.

use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path};
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

///
/// Config
///

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub migration: Option<MigrationConfig>,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;

        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        if let Some(migration) = &self.migration {
            migration.validate()?;
        }

        Ok(())
    }
}

///
/// DatabaseConfig
/// Connection and session defaults. Credentials here are used when the
/// caller does not pass them explicitly.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub service: String,
    /// IANA time zone used for date conversion.
    pub timezone: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            host: "localhost".to_string(),
            port: 8080,
            service: "catissuecore".to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("database.host is required".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("database.port must be non-zero".into()));
        }
        if self.service.is_empty() {
            return Err(ConfigError::Invalid("database.service is required".into()));
        }

        Ok(())
    }
}

///
/// MigrationConfig
/// Maps input columns onto `Entity.attribute` paths.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    /// Entity type each row migrates into.
    pub target: String,

    /// column → `Entity.attribute`
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,

    /// `Entity.attribute` → default text
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl MigrationConfig {
    /// Split an `Entity.attribute` path.
    #[must_use]
    pub fn split_path(path: &str) -> Option<(&str, &str)> {
        let (entity, attribute) = path.split_once('.')?;
        (!entity.is_empty() && !attribute.is_empty()).then_some((entity, attribute))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.target.is_empty() {
            return Err(ConfigError::Invalid("migration.target is required".into()));
        }
        for path in self.mapping.values() {
            if Self::split_path(path).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "migration mapping '{path}' must have the form Entity.attribute"
                )));
            }
        }
        for path in self.defaults.keys() {
            if Self::split_path(path).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "migration default '{path}' must have the form Entity.attribute"
                )));
            }
        }

        Ok(())
    }
}
