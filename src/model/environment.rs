//! Environment types: the manifest stored at `<envs>/<uuid>/config.yaml`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named workspace holding installed module versions.
///
/// The name is for display only; `uuid` is the identity and equals the
/// name of the environment's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Environment {
    pub name: String,
    pub uuid: Uuid,
    #[serde(default)]
    pub installed: Vec<InstalledModule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_config: Option<SshConfig>,
}

impl Environment {
    /// A fresh, empty environment with a newly allocated identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
            installed: Vec::new(),
            ssh_config: None,
        }
    }

    /// The first installed module with the given name.
    pub fn module(&self, name: &str) -> Option<&InstalledModule> {
        self.installed.iter().find(|m| m.name == name)
    }

    /// Whether `(name, version)` is already installed.
    pub fn has_installed(&self, name: &str, version: &str) -> bool {
        self.installed
            .iter()
            .any(|m| m.name == name && m.version == version)
    }

    /// Records an SSH keypair handle. Persisted on the next save.
    pub fn set_keypair(&mut self, keypair: KeypairHandle) {
        self.ssh_config = Some(SshConfig {
            rsa_keypair: keypair,
        });
    }

    /// Flat lookup of the fields module templates may reference.
    pub fn template_values(&self) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();
        values.insert("Name".to_string(), self.name.clone());
        values.insert("UUID".to_string(), self.uuid.to_string());
        if let Some(ssh) = &self.ssh_config {
            values.insert(
                "SSHConfig.RSAKeyPair.Name".to_string(),
                ssh.rsa_keypair.name.clone(),
            );
        }
        values
    }
}

/// A snapshot of one catalog module version, owned by its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledModule {
    /// Back-pointer to the owning environment. Kept for the on-disk schema;
    /// paths are always derived from the containing environment.
    pub environment_ref: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    pub version: String,
    pub image: String,
    #[serde(default)]
    pub workdir: String,
    #[serde(default)]
    pub mounts: Vec<String>,
    /// Container path bound to the environment's shared directory.
    /// Empty when the module does not use it.
    #[serde(default)]
    pub shared: String,
    #[serde(default)]
    pub commands: Vec<InstalledCommand>,
}

impl InstalledModule {
    pub fn command(&self, name: &str) -> Option<&InstalledCommand> {
        self.commands.iter().find(|c| c.name == name)
    }
}

/// A named command of a module, with templated arguments and environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledCommand {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub envs: BTreeMap<String, String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// How a module is run: the catalog's `type` string, kept as written.
///
/// Only `container` and the legacy `docker` can be run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleKind(String);

impl ModuleKind {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_container(&self) -> bool {
        matches!(self.0.as_str(), "container" | "docker")
    }
}

impl From<&str> for ModuleKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SshConfig {
    pub rsa_keypair: KeypairHandle,
}

/// Handle to a keypair stored in the environment's shared directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeypairHandle {
    pub name: String,
}
