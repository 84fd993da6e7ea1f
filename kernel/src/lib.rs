// Boxvault Kernel
//
// Versioned catalog of box artifacts: data model, version ordering,
// archive codec, pluggable storage backends and the manager that ties
// them together.

pub mod artifact;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod manager;
pub mod version;

pub use artifact::{derive_artifact_info, ArtifactError, ArtifactInfo, DigestAlgorithm};
pub use backend::{ArtifactLocation, Backend, BackendError, BackendRegistry, LocalFileBackend};
pub use catalog::{
    BoxArtifact, Catalog, CatalogQuery, FuzzyEqualsParams, Provider, QueryError, Version,
};
pub use config::ToolConfig;
pub use manager::{BackendManager, DeleteReport, ManagerError};
pub use version::{BoxVersion, VersionError, VersionQuery};
