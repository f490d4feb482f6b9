//! Catalog types: repositories of versioned, containerized modules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{InstalledCommand, InstalledModule, ModuleKind};

/// Expected `kind` of a catalog repository document.
pub const REPOSITORY_KIND: &str = "Repository";

/// A catalog file: one repository and the modules it publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRepository {
    #[serde(default)]
    pub version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub components: Vec<Component>,
}

/// A module and its published versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    #[serde(default)]
    pub versions: Vec<ComponentVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentVersion {
    pub version: String,
    #[serde(default)]
    pub latest: bool,
    pub image: String,
    #[serde(default)]
    pub workdir: String,
    #[serde(default)]
    pub mounts: Vec<String>,
    #[serde(default)]
    pub shared: String,
    #[serde(default)]
    pub commands: Vec<InstalledCommand>,
}

/// A module version resolved from the catalog, with the names it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub repository: String,
    pub name: String,
    pub kind: ModuleKind,
    pub version: ComponentVersion,
}

impl ResolvedModule {
    /// Snapshot this version into a record owned by `environment`.
    pub fn to_installed(&self, environment: Uuid) -> InstalledModule {
        InstalledModule {
            environment_ref: environment,
            name: self.name.clone(),
            kind: self.kind.clone(),
            version: self.version.version.clone(),
            image: self.version.image.clone(),
            workdir: self.version.workdir.clone(),
            mounts: self.version.mounts.clone(),
            shared: self.version.shared.clone(),
            commands: self.version.commands.clone(),
        }
    }
}
