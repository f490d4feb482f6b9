//! Global harbor configuration.
//!
//! Loaded from `<root>/config.yaml`. Created with defaults if missing.
//! Records which environment is current and, optionally, the cloud
//! credentials modules may reference from their templates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::{Storage, StorageError};

pub const CONFIG_VERSION: &str = "v1";
pub const CONFIG_KIND: &str = "Config";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("environment not found: {0}")]
    EnvironmentNotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The global configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalConfig {
    pub version: String,
    pub kind: String,
    /// The selected environment, or the nil UUID when none is selected.
    #[serde(default)]
    pub current_environment: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_config: Option<AzureConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureConfig {
    pub credentials: Credentials,
}

/// Service principal credentials, stored verbatim as provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "appID")]
    pub app_id: String,
    pub password: String,
    pub tenant: String,
    #[serde(rename = "subscriptionID")]
    pub subscription_id: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            current_environment: Uuid::nil(),
            azure_config: None,
        }
    }
}

impl GlobalConfig {
    /// Load the config at `path`, writing the defaults first if it is missing.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            tracing::debug!(path = %path.display(), "created default config");
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the config atomically: temp file alongside, then rename.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml)
            .and_then(|()| fs::rename(&tmp, path))
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }

    /// The selected environment, if any.
    pub fn current(&self) -> Option<Uuid> {
        (!self.current_environment.is_nil()).then_some(self.current_environment)
    }

    /// Select `id` as the current environment and persist the change.
    ///
    /// Fails if the environment does not exist.
    pub fn select_environment(
        &mut self,
        storage: &Storage,
        id: Uuid,
        path: &Path,
    ) -> Result<(), ConfigError> {
        match storage.get(id) {
            Ok(_) => {}
            Err(StorageError::NotFound(id)) => return Err(ConfigError::EnvironmentNotFound(id)),
            Err(e) => return Err(e.into()),
        }
        self.current_environment = id;
        self.save(path)
    }

    /// Store a provisioned credentials record and persist the change.
    pub fn set_credentials(
        &mut self,
        credentials: Credentials,
        path: &Path,
    ) -> Result<(), ConfigError> {
        self.azure_config = Some(AzureConfig { credentials });
        self.save(path)
    }

    /// Flat lookup of the fields module templates may reference.
    pub fn template_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        values.insert("Version".to_string(), self.version.clone());
        values.insert("Kind".to_string(), self.kind.clone());
        values.insert(
            "CurrentEnvironment".to_string(),
            self.current_environment.to_string(),
        );
        if let Some(azure) = &self.azure_config {
            let c = &azure.credentials;
            for (key, value) in [
                ("AppID", &c.app_id),
                ("Password", &c.password),
                ("Tenant", &c.tenant),
                ("SubscriptionID", &c.subscription_id),
            ] {
                values.insert(format!("AzureConfig.Credentials.{key}"), value.clone());
            }
        }
        values
    }
}
