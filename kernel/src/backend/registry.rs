// Backend Registry
//
// Maps URI schemes to backend constructors. A manager resolves its
// backend once, at creation time.

use std::collections::BTreeMap;

use super::{local, Backend, BackendError, CatalogUri, LocalFileBackend};

/// Builds a backend for a parsed catalog URI.
pub type BackendConstructor = fn(&CatalogUri) -> Result<Box<dyn Backend>, BackendError>;

pub struct BackendRegistry {
    constructors: BTreeMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// Registry with no schemes at all.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry serving the built-in `file://` backend.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(local::SCHEME, |uri| {
            Ok(Box::new(LocalFileBackend::from_uri(uri)?))
        });
        registry
    }

    /// Register (or replace) the constructor for `scheme`.
    pub fn register(&mut self, scheme: &str, constructor: BackendConstructor) {
        self.constructors
            .insert(scheme.to_ascii_lowercase(), constructor);
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Build the backend serving `uri`.
    pub fn resolve(&self, uri: &str) -> Result<Box<dyn Backend>, BackendError> {
        let parsed = CatalogUri::parse(uri)?;
        let constructor = self.constructors.get(&parsed.scheme).ok_or_else(|| {
            BackendError::UnsupportedScheme {
                scheme: parsed.scheme.clone(),
            }
        })?;

        tracing::debug!(%uri, scheme = %parsed.scheme, "resolved catalog backend");
        constructor(&parsed)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ArtifactLocation;

    #[test]
    fn resolves_file_scheme() {
        let registry = BackendRegistry::with_defaults();
        let backend = registry.resolve("file:///tmp/boxes/TestBox.json").unwrap();

        assert_eq!(backend.scheme(), "file");
        assert_eq!(backend.catalog_uri(), "file:///tmp/boxes/TestBox.json");
        assert_eq!(
            backend.artifact_url(&ArtifactLocation::new("TestBox", "1.0.0", "vb")),
            "file:///tmp/boxes/TestBox/TestBox_1.0.0_vb.box"
        );
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let registry = BackendRegistry::with_defaults();
        let err = registry.resolve("s3://bucket/TestBox.json").err().unwrap();
        assert!(matches!(err, BackendError::UnsupportedScheme { ref scheme } if scheme == "s3"));
    }

    #[test]
    fn empty_registry_serves_nothing() {
        let registry = BackendRegistry::new();
        assert_eq!(registry.schemes().count(), 0);
        assert!(registry.resolve("file:///tmp/x.json").is_err());
    }

    #[test]
    fn custom_schemes_can_be_registered() {
        let mut registry = BackendRegistry::with_defaults();
        registry.register("LOCAL", |uri| {
            Ok(Box::new(LocalFileBackend::new(uri.path.clone())))
        });

        let schemes: Vec<_> = registry.schemes().collect();
        assert_eq!(schemes, ["file", "local"]);

        let backend = registry.resolve("local:///tmp/x.json").unwrap();
        assert_eq!(backend.catalog_uri(), "file:///tmp/x.json");
    }
}
