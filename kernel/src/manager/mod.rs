// Backend Manager
//
// Runs the read-modify-write cycle for add, query and delete against a
// single catalog. Every call re-reads the catalog; nothing is cached
// between calls.
//
// Ordering:
// - add writes the catalog before copying the box file. A failed copy
//   leaves an entry pointing at a missing file. Re-running the add
//   overwrites the same entry and location.
// - add rejects a version that does not parse, and a box name, version or
//   provider that is not a single path segment, before anything is
//   written.
// - delete writes the reduced catalog first and deletes box files after,
//   the reverse of deleting files then rewriting the catalog. A catalog
//   entry never points at a deleted file. A failed file delete leaves an
//   orphaned file; it is reported in the `DeleteReport` and the catalog
//   write is not undone.
//
// There is no lock between read and write. Two writers on the same
// catalog URI race and one update is lost.

use std::fmt;
use std::path::Path;

use crate::artifact::{ArtifactError, DigestAlgorithm};
use crate::backend::{ArtifactLocation, Backend, BackendError, BackendRegistry};
use crate::catalog::{query_catalog, BoxArtifact, Catalog, CatalogQuery, QueryError};
use crate::version::{BoxVersion, VersionError};

/// Errors surfaced by manager operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("cannot add box version: {0}")]
    Version(#[from] VersionError),
}

/// A box file whose deletion failed after the catalog was rewritten.
#[derive(Debug)]
pub struct FailedDeletion {
    pub location: ArtifactLocation,
    pub error: BackendError,
}

/// Outcome of `delete_boxes`.
#[derive(Debug)]
pub struct DeleteReport {
    /// Entries removed from the catalog, in catalog order.
    pub removed: Catalog,
    /// Box files that could not be deleted.
    pub failed: Vec<FailedDeletion>,
}

impl DeleteReport {
    pub fn removed_count(&self) -> usize {
        self.removed.entries().count()
    }

    /// True when every removed entry's file is gone too.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "removed {} entries", self.removed_count())?;
        for (version, provider) in self.removed.entries() {
            writeln!(f, "  {} {}", version.version, provider.name)?;
        }
        for failure in &self.failed {
            writeln!(f, "failed to delete {}: {}", failure.location, failure.error)?;
        }
        Ok(())
    }
}

/// Owns the backend for one catalog URI and box name.
pub struct BackendManager {
    catalog_uri: String,
    box_name: String,
    backend: Box<dyn Backend>,
}

impl BackendManager {
    pub fn new(
        catalog_uri: impl Into<String>,
        box_name: impl Into<String>,
        backend: Box<dyn Backend>,
    ) -> Self {
        Self {
            catalog_uri: catalog_uri.into(),
            box_name: box_name.into(),
            backend,
        }
    }

    /// Resolve the backend for `catalog_uri` through `registry`.
    pub fn from_uri(
        catalog_uri: &str,
        box_name: impl Into<String>,
        registry: &BackendRegistry,
    ) -> Result<Self, ManagerError> {
        let backend = registry.resolve(catalog_uri)?;
        Ok(Self::new(catalog_uri, box_name, backend))
    }

    pub fn catalog_uri(&self) -> &str {
        &self.catalog_uri
    }

    pub fn box_name(&self) -> &str {
        &self.box_name
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Current catalog. A missing document reads as an empty catalog
    /// named after this manager's box.
    pub fn get_catalog(&self) -> Result<Catalog, ManagerError> {
        self.read_catalog_or(|| Catalog::empty(&self.box_name))
    }

    fn read_catalog_or(&self, empty: impl FnOnce() -> Catalog) -> Result<Catalog, ManagerError> {
        match self.backend.read_catalog() {
            Ok(catalog) => Ok(catalog),
            Err(err) if err.is_not_found() => {
                tracing::debug!(uri = %self.catalog_uri, "no catalog yet; starting empty");
                Ok(empty())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Register a box file whose provider and checksum are already known.
    #[allow(clippy::too_many_arguments)]
    pub fn add_box(
        &mut self,
        local_path: &Path,
        name: &str,
        description: &str,
        version: &str,
        provider: &str,
        checksum_type: &str,
        checksum: &str,
    ) -> Result<(), ManagerError> {
        let artifact = BoxArtifact {
            path: local_path.to_path_buf(),
            name: name.to_string(),
            description: description.to_string(),
            version: version.to_string(),
            provider: provider.to_string(),
            catalog_uri: self.catalog_uri.clone(),
            checksum_type: checksum_type.to_string(),
            checksum: checksum.to_string(),
        };
        self.add_artifact(&artifact)
    }

    /// Register a box file, deriving provider and checksum from the archive.
    pub fn add_box_file(
        &mut self,
        local_path: &Path,
        version: &str,
        description: &str,
        algorithm: DigestAlgorithm,
    ) -> Result<BoxArtifact, ManagerError> {
        let artifact = BoxArtifact::from_box_file(
            local_path,
            self.box_name.clone(),
            description,
            version,
            self.catalog_uri.clone(),
            algorithm,
        )?;
        self.add_artifact(&artifact)?;
        Ok(artifact)
    }

    /// Insert or replace the artifact's provider entry, write the catalog,
    /// then copy the box file into the backend.
    pub fn add_artifact(&mut self, artifact: &BoxArtifact) -> Result<(), ManagerError> {
        artifact.version.parse::<BoxVersion>()?;

        let mut catalog = self.read_catalog_or(|| Catalog {
            name: artifact.name.clone(),
            description: artifact.description.clone(),
            versions: Vec::new(),
        })?;
        if catalog.name.is_empty() {
            catalog.name = artifact.name.clone();
        }
        if catalog.description.is_empty() {
            catalog.description = artifact.description.clone();
        }
        if catalog.name != artifact.name {
            tracing::warn!(
                catalog = %catalog.name,
                artifact = %artifact.name,
                "artifact box name differs from catalog; storing under catalog name"
            );
        }

        let location = ArtifactLocation::new(&catalog.name, &artifact.version, &artifact.provider);
        location.validate()?;
        let entry = artifact.to_provider(self.backend.artifact_url(&location));
        if let Some(previous) = catalog.upsert_provider(&artifact.version, entry) {
            tracing::info!(
                version = %artifact.version,
                provider = %artifact.provider,
                previous_checksum = %previous.checksum,
                "replacing existing catalog entry"
            );
        }

        self.backend.write_catalog(&catalog)?;
        self.backend.copy_artifact(&artifact.path, &location)?;

        tracing::info!(
            uri = %self.catalog_uri,
            version = %artifact.version,
            provider = %artifact.provider,
            "added box"
        );
        Ok(())
    }

    /// Entries of the current catalog matching `query`.
    pub fn query_catalog(&self, query: &CatalogQuery) -> Result<Catalog, ManagerError> {
        let catalog = self.get_catalog()?;
        Ok(query_catalog(&catalog, query)?)
    }

    /// [`Self::query_catalog`] with the query given as strings.
    pub fn query(&self, version_query: &str, provider_query: &str) -> Result<Catalog, ManagerError> {
        self.query_catalog(&CatalogQuery::new(version_query, provider_query)?)
    }

    /// Remove every entry matching `query` from the catalog and delete
    /// the corresponding box files.
    pub fn delete_boxes(&mut self, query: &CatalogQuery) -> Result<DeleteReport, ManagerError> {
        let mut catalog = self.get_catalog()?;
        let matched = query_catalog(&catalog, query)?;
        if matched.is_empty() {
            tracing::info!(uri = %self.catalog_uri, "nothing matched; catalog unchanged");
            return Ok(DeleteReport {
                removed: matched,
                failed: Vec::new(),
            });
        }

        let locations: Vec<ArtifactLocation> = matched
            .entries()
            .map(|(version, provider)| {
                ArtifactLocation::new(&catalog.name, &version.version, &provider.name)
            })
            .collect();
        for location in &locations {
            catalog.remove_provider(&location.version, &location.provider);
        }

        self.backend.write_catalog(&catalog)?;

        let mut failed = Vec::new();
        for location in locations {
            if let Err(error) = self.backend.delete_artifact(&location) {
                tracing::warn!(%location, %error, "failed to delete box file");
                failed.push(FailedDeletion { location, error });
            }
        }

        let report = DeleteReport {
            removed: matched,
            failed,
        };
        tracing::info!(
            uri = %self.catalog_uri,
            removed = report.removed_count(),
            failed = report.failed.len(),
            "deleted boxes"
        );
        Ok(report)
    }

    /// [`Self::delete_boxes`] with the query given as strings.
    pub fn delete(
        &mut self,
        version_query: &str,
        provider_query: &str,
    ) -> Result<DeleteReport, ManagerError> {
        self.delete_boxes(&CatalogQuery::new(version_query, provider_query)?)
    }
}
