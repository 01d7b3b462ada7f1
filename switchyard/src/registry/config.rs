//! Registry configuration

use crate::claw::MetaDuplicatePolicy;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration for kind {kind}: {reason}")]
    InvalidKind { kind: String, reason: String },
}

/// Registry settings, usually read from `switchyard.yml`
///
/// ```yaml
/// meta_duplicates: reject
/// name_counter_start: 1
/// kinds:
///   echo:
///     greeting: hello
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Configuration tree handed to every component of a kind
    pub kinds: BTreeMap<String, serde_json::Value>,

    /// Whether a writer may feed two instances of one meta follower
    pub meta_duplicates: MetaDuplicatePolicy,

    /// First counter tried for generated names
    pub name_counter_start: u64,
}

impl RegistryConfig {
    /// Load from a YAML (`.yml`/`.yaml`) or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml") | Some("yaml") => Self::from_yaml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RegistryConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: RegistryConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (kind, value) in &self.kinds {
            if !(value.is_object() || value.is_null()) {
                return Err(ConfigError::InvalidKind {
                    kind: kind.clone(),
                    reason: "expected a mapping".to_string(),
                });
            }
            Tree::try_from(value.clone()).map_err(|e| ConfigError::InvalidKind {
                kind: kind.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Configuration tree for `kind`, empty when none is set
    pub fn kind_config(&self, kind: &str) -> Tree {
        self.kinds
            .get(kind)
            .and_then(|value| Tree::try_from(value.clone()).ok())
            .unwrap_or_default()
    }
}
