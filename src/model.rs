//! Core data model for harbor.
//!
//! Environments and the modules installed into them, and the catalog
//! repositories modules are installed from.

mod catalog;
mod environment;

pub use catalog::{CatalogRepository, REPOSITORY_KIND, ResolvedModule};
pub use environment::{Environment, InstalledCommand, InstalledModule, KeypairHandle, ModuleKind};
