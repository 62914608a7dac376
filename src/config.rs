use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use crate::mediator::{ReadPolicies, ReadPolicy, ResourceType};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration key {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub storage_root: PathBuf,
    pub storage_public_url: String,
    pub session_hours: i64,
    pub purge_expired_notes: bool,
    pub read_policies: ReadPolicies,
}

fn optional(key: &str) -> Option<String> {
    dotenvy::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    optional(key).ok_or(ConfigError::Missing(key))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

impl AppConfig {
    /// Reads the process environment. Missing required keys are fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let storage_public_url = required("STORAGE_PUBLIC_URL")?;

        let storage_root = optional("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("storage"));

        let session_hours = match optional("SESSION_HOURS") {
            Some(value) => value
                .parse::<i64>()
                .ok()
                .filter(|hours| *hours > 0)
                .ok_or(ConfigError::Invalid {
                    key: "SESSION_HOURS",
                    value,
                })?,
            None => 24,
        };

        let purge_expired_notes = match optional("PURGE_EXPIRED_NOTES") {
            Some(value) => parse_bool("PURGE_EXPIRED_NOTES", &value)?,
            None => false,
        };

        let mut read_policies = ReadPolicies::default();
        for resource in ResourceType::ALL {
            if let Some(value) = optional(resource.env_key()) {
                let policy = ReadPolicy::from_str(&value).map_err(|_| ConfigError::Invalid {
                    key: resource.env_key(),
                    value,
                })?;
                read_policies = read_policies.with(resource, policy);
            }
        }

        info!(
            storage_root = %storage_root.display(),
            session_hours,
            purge_expired_notes,
            "Loaded configuration"
        );

        Ok(Self {
            database_url,
            storage_root,
            storage_public_url,
            session_hours,
            purge_expired_notes,
            read_policies,
        })
    }

    pub fn policy(&self, resource: ResourceType) -> ReadPolicy {
        self.read_policies.get(resource)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            storage_root: PathBuf::from("target/test-storage"),
            storage_public_url: "/storage".to_string(),
            session_hours: 24,
            purge_expired_notes: false,
            read_policies: ReadPolicies::default(),
        }
    }
}
