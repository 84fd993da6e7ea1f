// Box Catalog Model
//
// The JSON document enumerating every version and provider of one box,
// plus the transient artifact description used while registering a
// new provider. Catalogs are always read and written whole.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::artifact::{derive_artifact_info, ArtifactError, DigestAlgorithm};

pub mod query;

pub use query::{query_catalog, CatalogQuery, QueryError};

/// One platform-specific variant of a box version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Provider {
    pub name: String,
    pub url: String,
    pub checksum_type: String,
    pub checksum: String,
}

/// Controls how strictly catalogs are compared by `fuzzy_eq`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuzzyEqualsParams {
    /// Ignore provider URLs, which backends generate from absolute paths.
    pub skip_provider_url: bool,
    /// Emit a warning describing the first difference found.
    pub log_mismatch: bool,
}

impl Provider {
    pub fn fuzzy_eq(&self, other: &Provider, params: FuzzyEqualsParams) -> bool {
        self.mismatch(other, params).is_none()
    }

    fn mismatch(&self, other: &Provider, params: FuzzyEqualsParams) -> Option<String> {
        let fields = [
            ("name", &self.name, &other.name, true),
            ("url", &self.url, &other.url, !params.skip_provider_url),
            ("checksum_type", &self.checksum_type, &other.checksum_type, true),
            ("checksum", &self.checksum, &other.checksum, true),
        ];
        fields
            .iter()
            .find(|(_, a, b, compared)| *compared && a != b)
            .map(|(field, a, b, _)| format!("provider {field} `{a}` != `{b}`"))
    }
}

/// One release of a box. Provider names are unique within a version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Version {
    pub version: String,
    pub providers: Vec<Provider>,
}

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            providers: Vec::new(),
        }
    }

    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Insert a provider, replacing an existing one of the same name in place.
    ///
    /// Returns the replaced provider, if any.
    pub fn upsert_provider(&mut self, provider: Provider) -> Option<Provider> {
        match self.providers.iter_mut().find(|p| p.name == provider.name) {
            Some(existing) => Some(std::mem::replace(existing, provider)),
            None => {
                self.providers.push(provider);
                None
            }
        }
    }

    pub fn remove_provider(&mut self, name: &str) -> Option<Provider> {
        let idx = self.providers.iter().position(|p| p.name == name)?;
        Some(self.providers.remove(idx))
    }

    pub fn fuzzy_eq(&self, other: &Version, params: FuzzyEqualsParams) -> bool {
        self.mismatch(other, params).is_none()
    }

    fn mismatch(&self, other: &Version, params: FuzzyEqualsParams) -> Option<String> {
        if self.version != other.version {
            return Some(format!("version `{}` != `{}`", self.version, other.version));
        }
        if self.providers.len() != other.providers.len() {
            return Some(format!(
                "version {} has {} providers, other has {}",
                self.version,
                self.providers.len(),
                other.providers.len()
            ));
        }
        self.providers
            .iter()
            .zip(&other.providers)
            .find_map(|(a, b)| a.mismatch(b, params))
            .map(|reason| format!("version {}: {reason}", self.version))
    }
}

/// Root document for one box name.
///
/// `versions` keeps registration order; nothing here sorts it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub name: String,
    pub description: String,
    pub versions: Vec<Version>,
}

impl Catalog {
    /// The catalog used when no document exists yet.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn version(&self, version: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Every (version, provider) pair in catalog order.
    pub fn entries(&self) -> impl Iterator<Item = (&Version, &Provider)> {
        self.versions
            .iter()
            .flat_map(|v| v.providers.iter().map(move |p| (v, p)))
    }

    /// Register `provider` under `version`, creating the version if new
    /// and replacing a same-named provider in place otherwise.
    pub fn upsert_provider(&mut self, version: &str, provider: Provider) -> Option<Provider> {
        let idx = match self.versions.iter().position(|v| v.version == version) {
            Some(idx) => idx,
            None => {
                self.versions.push(Version::new(version));
                self.versions.len() - 1
            }
        };
        self.versions[idx].upsert_provider(provider)
    }

    /// Remove one provider, dropping its version if that leaves it empty.
    /// Remaining entries keep their order.
    pub fn remove_provider(&mut self, version: &str, provider: &str) -> Option<Provider> {
        let idx = self.versions.iter().position(|v| v.version == version)?;
        let removed = self.versions[idx].remove_provider(provider)?;
        if self.versions[idx].providers.is_empty() {
            self.versions.remove(idx);
        }
        Some(removed)
    }

    pub fn fuzzy_eq(&self, other: &Catalog, params: FuzzyEqualsParams) -> bool {
        match self.mismatch(other, params) {
            None => true,
            Some(reason) => {
                if params.log_mismatch {
                    tracing::warn!(catalog = %self.name, "catalogs differ: {reason}");
                }
                false
            }
        }
    }

    fn mismatch(&self, other: &Catalog, params: FuzzyEqualsParams) -> Option<String> {
        if self.name != other.name {
            return Some(format!("name `{}` != `{}`", self.name, other.name));
        }
        if self.description != other.description {
            return Some(format!(
                "description `{}` != `{}`",
                self.description, other.description
            ));
        }
        if self.versions.len() != other.versions.len() {
            return Some(format!(
                "{} versions != {} versions",
                self.versions.len(),
                other.versions.len()
            ));
        }
        self.versions
            .iter()
            .zip(&other.versions)
            .find_map(|(a, b)| a.mismatch(b, params))
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.is_empty() {
            writeln!(f, "{}", self.name)?;
        } else {
            writeln!(f, "{}: {}", self.name, self.description)?;
        }
        for version in &self.versions {
            writeln!(f, "  {}", version.version)?;
            for provider in &version.providers {
                writeln!(
                    f,
                    "    {} {}:{} {}",
                    provider.name, provider.checksum_type, provider.checksum, provider.url
                )?;
            }
        }
        Ok(())
    }
}

/// Everything needed to register one box file.
///
/// Exists only for the duration of an add; it is projected into a
/// [`Provider`] inside the catalog and never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxArtifact {
    pub path: PathBuf,
    pub name: String,
    pub description: String,
    pub version: String,
    pub provider: String,
    pub catalog_uri: String,
    pub checksum_type: String,
    pub checksum: String,
}

impl BoxArtifact {
    /// Describe a box file, deriving provider and checksum from its contents.
    pub fn from_box_file(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
        catalog_uri: impl Into<String>,
        algorithm: DigestAlgorithm,
    ) -> Result<Self, ArtifactError> {
        let path = path.into();
        let info = derive_artifact_info(&path, algorithm)?;
        Ok(Self {
            path,
            name: name.into(),
            description: description.into(),
            version: version.into(),
            provider: info.provider,
            catalog_uri: catalog_uri.into(),
            checksum_type: info.checksum_type,
            checksum: info.checksum,
        })
    }

    /// Catalog entry for this artifact once stored at `url`.
    pub fn to_provider(&self, url: impl Into<String>) -> Provider {
        Provider {
            name: self.provider.clone(),
            url: url.into(),
            checksum_type: self.checksum_type.clone(),
            checksum: self.checksum.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn provider(name: &str, url: &str) -> Provider {
        Provider {
            name: name.into(),
            url: url.into(),
            checksum_type: "sha256".into(),
            checksum: "0xDECAFBAD".into(),
        }
    }

    fn sample() -> Catalog {
        Catalog {
            name: "examplebox".into(),
            description: "this is an example box".into(),
            versions: vec![
                Version {
                    version: "1.5.3".into(),
                    providers: vec![
                        provider("virtualbox", "file:///a/vb.box"),
                        provider("hyperv", "file:///a/hv.box"),
                    ],
                },
                Version {
                    version: "0.9.0".into(),
                    providers: vec![provider("virtualbox", "file:///a/old.box")],
                },
            ],
        }
    }

    #[test]
    fn decode_provider_json() {
        let json = r#"{"name":"testname","url":"http://example.com/whatever","checksum_type":"dummy","checksum":"dummy"}"#;
        let prov: Provider = serde_json::from_str(json).unwrap();

        assert_eq!(prov.name, "testname");
        assert_eq!(prov.checksum_type, "dummy");
    }

    #[test]
    fn decode_catalog_json() {
        let json = r#"{"name":"examplebox","description":"this is an example box","versions":[{"version":"12.34.56","providers":[{"name":"testname","url":"http://example.com/whatever","checksum_type":"dummy","checksum":"dummy"}]}]}"#;
        let catalog = Catalog::from_json(json).unwrap();

        assert_eq!(catalog.name, "examplebox");
        assert_eq!(catalog.versions.len(), 1);
        assert_eq!(catalog.versions[0].version, "12.34.56");
        assert_eq!(catalog.versions[0].providers[0].name, "testname");
    }

    #[test]
    fn decode_empty_catalog() {
        let catalog = Catalog::from_json("{}").unwrap();
        assert_eq!(catalog, Catalog::default());
        assert!(catalog.is_empty());
    }

    #[test]
    fn json_round_trip_preserves_catalog() {
        let catalog = sample();
        let json = catalog.to_json_pretty().unwrap();

        assert!(json.contains("\"checksum_type\""));
        assert_eq!(Catalog::from_json(&json).unwrap(), catalog);
    }

    #[test]
    fn structural_equality_covers_every_field() {
        let base = sample();
        assert_eq!(base, sample());

        let mut changed = sample();
        changed.description.push('!');
        assert_ne!(base, changed);

        let mut changed = sample();
        changed.versions[1].providers[0].checksum = "0xB00B1E5".into();
        assert_ne!(base, changed);

        let mut reordered = sample();
        reordered.versions.swap(0, 1);
        assert_ne!(base, reordered);
    }

    #[test]
    fn fuzzy_equality_can_skip_urls() {
        let base = sample();
        let mut other = sample();
        for version in &mut other.versions {
            for provider in &mut version.providers {
                provider.url = "FAKEURI".into();
            }
        }

        let skip = FuzzyEqualsParams {
            skip_provider_url: true,
            log_mismatch: true,
        };
        assert!(base.fuzzy_eq(&other, skip));
        assert!(!base.fuzzy_eq(&other, FuzzyEqualsParams::default()));

        other.versions[0].providers[0].checksum = "other".into();
        assert!(!base.fuzzy_eq(&other, skip));
    }

    #[test]
    fn upsert_replaces_existing_provider_in_place() {
        let mut catalog = sample();
        let mut replacement = provider("virtualbox", "file:///a/new.box");
        replacement.checksum = "0x1234".into();

        let replaced = catalog.upsert_provider("1.5.3", replacement.clone());

        assert_eq!(replaced.unwrap().url, "file:///a/vb.box");
        let version = catalog.version("1.5.3").unwrap();
        assert_eq!(version.providers.len(), 2);
        assert_eq!(version.providers[0], replacement);
    }

    #[test]
    fn upsert_appends_new_version_last() {
        let mut catalog = sample();
        assert!(catalog
            .upsert_provider("0.1.0", provider("libvirt", "file:///a/lv.box"))
            .is_none());

        let order: Vec<_> = catalog.versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(order, ["1.5.3", "0.9.0", "0.1.0"]);
    }

    #[test]
    fn removing_last_provider_drops_version() {
        let mut catalog = sample();

        assert!(catalog.remove_provider("1.5.3", "hyperv").is_some());
        assert_eq!(catalog.versions.len(), 2);

        assert!(catalog.remove_provider("1.5.3", "virtualbox").is_some());
        assert_eq!(catalog.versions.len(), 1);
        assert_eq!(catalog.versions[0].version, "0.9.0");

        assert!(catalog.remove_provider("1.5.3", "virtualbox").is_none());
    }

    #[test]
    fn entries_follow_catalog_order() {
        let catalog = sample();
        let entries: Vec<_> = catalog
            .entries()
            .map(|(v, p)| (v.version.as_str(), p.name.as_str()))
            .collect();

        assert_eq!(
            entries,
            [
                ("1.5.3", "virtualbox"),
                ("1.5.3", "hyperv"),
                ("0.9.0", "virtualbox")
            ]
        );
    }

    #[test]
    fn display_lists_versions_and_providers() {
        let text = sample().to_string();
        assert!(text.starts_with("examplebox: this is an example box\n"));
        assert!(text.contains("  1.5.3\n    virtualbox sha256:0xDECAFBAD file:///a/vb.box\n"));
    }

    #[test]
    fn box_artifact_equality_and_projection() {
        let artifact = BoxArtifact {
            path: PathBuf::from("/tmp/example.box"),
            name: "ExampleBox".into(),
            description: "ExampleBox description".into(),
            version: "1.2.3".into(),
            provider: "ExampleProvider".into(),
            catalog_uri: "file:///tmp/ExampleBox.json".into(),
            checksum_type: "sha1".into(),
            checksum: "0xDECAFBAD".into(),
        };
        let mut different = artifact.clone();
        different.version = "1.2.4".into();

        assert_eq!(artifact, artifact.clone());
        assert_ne!(artifact, different);

        let entry = artifact.to_provider("file:///store/ExampleBox.box");
        assert_eq!(entry.name, "ExampleProvider");
        assert_eq!(entry.checksum_type, "sha1");
        assert_eq!(entry.url, "file:///store/ExampleBox.box");
    }
}
