// Catalog Storage Backends
//
// Defines the capability contract every storage system must satisfy to
// hold a catalog document and its box files. Backends are selected by
// URI scheme through the registry.
//
// Backends provide no locking. A catalog is read, mutated and written
// back whole, so two writers racing on the same URI lose updates.

use std::fmt;
use std::io;
use std::path::Path;

use crate::catalog::Catalog;

pub mod local;
pub mod registry;

pub use local::LocalFileBackend;
pub use registry::{BackendConstructor, BackendRegistry};

/// Errors produced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No catalog document exists yet. Not an error for the manager.
    #[error("no catalog found at {uri}")]
    CatalogNotFound { uri: String },

    #[error("invalid catalog URI `{0}`: expected <scheme>://<path>")]
    InvalidUri(String),

    #[error("no backend registered for URI scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },

    /// A box name, version or provider that cannot be used as a path
    /// component.
    #[error("invalid artifact location {location}: {reason}")]
    InvalidLocation {
        location: String,
        reason: &'static str,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed catalog at {uri}: {source}")]
    MalformedCatalog {
        uri: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CatalogNotFound { .. })
    }
}

/// A catalog URI split into scheme and scheme-specific path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogUri {
    pub scheme: String,
    pub path: String,
}

impl CatalogUri {
    pub fn parse(uri: &str) -> Result<Self, BackendError> {
        let (scheme, path) = uri
            .split_once("://")
            .ok_or_else(|| BackendError::InvalidUri(uri.to_string()))?;

        let scheme_ok = !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric());
        if !scheme_ok || path.is_empty() {
            return Err(BackendError::InvalidUri(uri.to_string()));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            path: path.to_string(),
        })
    }
}

impl fmt::Display for CatalogUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path)
    }
}

/// Where a box file lives, independent of any storage system.
///
/// Backends derive their physical location from these three values
/// alone, so re-adding a version/provider pair overwrites in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactLocation {
    pub box_name: String,
    pub version: String,
    pub provider: String,
}

impl ArtifactLocation {
    pub fn new(
        box_name: impl Into<String>,
        version: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            box_name: box_name.into(),
            version: version.into(),
            provider: provider.into(),
        }
    }

    /// `<box>_<version>_<provider>.box`
    pub fn file_name(&self) -> String {
        format!("{}_{}_{}.box", self.box_name, self.version, self.provider)
    }

    /// Every component must stay a single, non-empty path segment. The
    /// provider comes from archive metadata and is not trusted.
    pub fn validate(&self) -> Result<(), BackendError> {
        for component in [&self.box_name, &self.version, &self.provider] {
            if let Some(reason) = invalid_segment(component) {
                return Err(BackendError::InvalidLocation {
                    location: self.to_string(),
                    reason,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.box_name, self.version, self.provider)
    }
}

fn invalid_segment(component: &str) -> Option<&'static str> {
    if component.is_empty() {
        Some("empty component")
    } else if component == "." || component == ".." {
        Some("relative path component")
    } else if component.contains(['/', '\\', '\0']) {
        Some("component contains a path separator")
    } else if component.contains("..") {
        Some("component contains `..`")
    } else {
        None
    }
}

/// Storage system holding one catalog document and its box files.
///
/// Implementations must:
/// - report a missing catalog as [`BackendError::CatalogNotFound`]
/// - overwrite the whole document on write
/// - treat deleting a missing artifact as success
pub trait Backend: Send + Sync {
    /// URI scheme this backend serves.
    fn scheme(&self) -> &'static str;

    /// The catalog URI this backend was built for.
    fn catalog_uri(&self) -> &str;

    fn read_catalog(&self) -> Result<Catalog, BackendError>;

    fn write_catalog(&mut self, catalog: &Catalog) -> Result<(), BackendError>;

    /// URL recorded in the catalog for an artifact at `location`.
    fn artifact_url(&self, location: &ArtifactLocation) -> String;

    fn copy_artifact(
        &mut self,
        local_path: &Path,
        location: &ArtifactLocation,
    ) -> Result<(), BackendError>;

    fn delete_artifact(&mut self, location: &ArtifactLocation) -> Result<(), BackendError>;

    fn exists(&self, location: &ArtifactLocation) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_and_path() {
        let uri = CatalogUri::parse("file:///srv/boxes/example.json").unwrap();
        assert_eq!(uri.scheme, "file");
        assert_eq!(uri.path, "/srv/boxes/example.json");
        assert_eq!(uri.to_string(), "file:///srv/boxes/example.json");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let uri = CatalogUri::parse("FILE:///x.json").unwrap();
        assert_eq!(uri.scheme, "file");
    }

    #[test]
    fn rejects_malformed_uris() {
        for bad in ["/srv/boxes/example.json", "://x", "file://", "s-3://bucket/x.json"] {
            assert!(
                matches!(CatalogUri::parse(bad), Err(BackendError::InvalidUri(_))),
                "expected {bad} to be rejected"
            );
        }
    }

    #[test]
    fn location_file_name_joins_identity() {
        let location = ArtifactLocation::new("TestBox", "0.3.5-BETA", "StrongSapling");
        assert_eq!(location.file_name(), "TestBox_0.3.5-BETA_StrongSapling.box");
    }

    #[test]
    fn location_rejects_path_escapes() {
        for provider in ["x/../../../victim.txt#", "/../../../victim", "..", "a\\b", ""] {
            let location = ArtifactLocation::new("TestBox", "1.0.0", provider);
            assert!(
                matches!(location.validate(), Err(BackendError::InvalidLocation { .. })),
                "expected provider {provider:?} to be rejected"
            );
        }
        assert!(ArtifactLocation::new("..", "1.0.0", "virtualbox").validate().is_err());
        assert!(ArtifactLocation::new("TestBox", "0.3.5-BETA", "virtualbox")
            .validate()
            .is_ok());
    }
}
