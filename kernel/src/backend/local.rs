// Local Filesystem Backend
//
// Serves `file://` catalog URIs. For a catalog at `/dir/name.json`, box
// files live at `/dir/<box>/<box>_<version>_<provider>.box`. Locations
// are validated before any file is created or removed; a box file never
// lands outside its box folder.
//
// A rewritten catalog keeps the permissions of the document it replaces;
// a new one is created with mode 0644.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::{ArtifactLocation, Backend, BackendError, CatalogUri};
use crate::catalog::Catalog;

pub const SCHEME: &str = "file";

#[cfg(unix)]
const NEW_CATALOG_MODE: u32 = 0o644;

#[derive(Debug, Clone)]
pub struct LocalFileBackend {
    catalog_uri: String,
    catalog_path: PathBuf,
}

impl LocalFileBackend {
    pub fn new(catalog_path: impl Into<PathBuf>) -> Self {
        let catalog_path = catalog_path.into();
        Self {
            catalog_uri: format!("{SCHEME}://{}", catalog_path.display()),
            catalog_path,
        }
    }

    pub fn from_uri(uri: &CatalogUri) -> Result<Self, BackendError> {
        if uri.scheme != SCHEME {
            return Err(BackendError::UnsupportedScheme {
                scheme: uri.scheme.clone(),
            });
        }
        Ok(Self {
            catalog_uri: uri.to_string(),
            catalog_path: PathBuf::from(&uri.path),
        })
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// Directory holding the catalog document and the per-box folders.
    pub fn root_dir(&self) -> &Path {
        match self.catalog_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    pub fn artifact_path(&self, location: &ArtifactLocation) -> PathBuf {
        self.root_dir()
            .join(&location.box_name)
            .join(location.file_name())
    }

    /// Permissions the staged catalog takes before it replaces the old one.
    fn catalog_permissions(&self) -> Option<fs::Permissions> {
        match fs::metadata(&self.catalog_path) {
            Ok(meta) => Some(meta.permissions()),
            Err(_) => new_catalog_permissions(),
        }
    }
}

#[cfg(unix)]
fn new_catalog_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(NEW_CATALOG_MODE))
}

#[cfg(not(unix))]
fn new_catalog_permissions() -> Option<fs::Permissions> {
    None
}

impl Backend for LocalFileBackend {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn catalog_uri(&self) -> &str {
        &self.catalog_uri
    }

    fn read_catalog(&self) -> Result<Catalog, BackendError> {
        let json = match fs::read_to_string(&self.catalog_path) {
            Ok(json) => json,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::CatalogNotFound {
                    uri: self.catalog_uri.clone(),
                })
            }
            Err(err) => return Err(BackendError::io(&self.catalog_path, err)),
        };

        tracing::debug!(path = %self.catalog_path.display(), bytes = json.len(), "read catalog");
        Catalog::from_json(&json).map_err(|source| BackendError::MalformedCatalog {
            uri: self.catalog_uri.clone(),
            source,
        })
    }

    /// Write through a temporary file renamed over the old document, so
    /// readers see either the previous or the new catalog.
    fn write_catalog(&mut self, catalog: &Catalog) -> Result<(), BackendError> {
        let dir = self.root_dir().to_path_buf();
        fs::create_dir_all(&dir).map_err(|err| BackendError::io(&dir, err))?;

        let json = catalog
            .to_json_pretty()
            .map_err(|source| BackendError::MalformedCatalog {
                uri: self.catalog_uri.clone(),
                source,
            })?;

        let mut staged = NamedTempFile::new_in(&dir).map_err(|err| BackendError::io(&dir, err))?;
        if let Err(err) = writeln!(staged, "{json}") {
            return Err(BackendError::io(staged.path(), err));
        }
        if let Some(permissions) = self.catalog_permissions() {
            if let Err(err) = staged.as_file().set_permissions(permissions) {
                return Err(BackendError::io(staged.path(), err));
            }
        }
        staged
            .persist(&self.catalog_path)
            .map_err(|err| BackendError::io(&self.catalog_path, err.error))?;

        tracing::info!(
            path = %self.catalog_path.display(),
            versions = catalog.versions.len(),
            "wrote catalog"
        );
        Ok(())
    }

    fn artifact_url(&self, location: &ArtifactLocation) -> String {
        format!("{SCHEME}://{}", self.artifact_path(location).display())
    }

    fn copy_artifact(
        &mut self,
        local_path: &Path,
        location: &ArtifactLocation,
    ) -> Result<(), BackendError> {
        location.validate()?;
        let destination = self.artifact_path(location);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| BackendError::io(parent, err))?;
        }

        if local_path == destination {
            tracing::debug!(path = %destination.display(), "box file already in place");
            return Ok(());
        }

        let bytes = fs::copy(local_path, &destination)
            .map_err(|err| BackendError::io(local_path, err))?;
        tracing::info!(
            from = %local_path.display(),
            to = %destination.display(),
            bytes,
            "copied box file"
        );
        Ok(())
    }

    fn delete_artifact(&mut self, location: &ArtifactLocation) -> Result<(), BackendError> {
        location.validate()?;
        let path = self.artifact_path(location);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "deleted box file");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "box file already absent");
                Ok(())
            }
            Err(err) => Err(BackendError::io(&path, err)),
        }
    }

    fn exists(&self, location: &ArtifactLocation) -> bool {
        self.artifact_path(location).is_file()
    }
}
