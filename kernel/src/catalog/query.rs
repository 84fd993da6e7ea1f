// Catalog Query Engine
//
// Filters a catalog by version range and provider pattern. Produces a
// new catalog; input order is preserved and nothing is deduplicated.

use regex::Regex;

use super::{Catalog, Version};
use crate::version::{VersionError, VersionQuery};

/// Errors produced while building or running a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid version query: {0}")]
    Version(#[from] VersionError),

    #[error("invalid provider pattern `{pattern}`: {source}")]
    ProviderPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Version range plus provider pattern. Empty strings match everything.
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    version: VersionQuery,
    provider: Option<Regex>,
}

impl CatalogQuery {
    pub fn new(version_query: &str, provider_pattern: &str) -> Result<Self, QueryError> {
        let version = version_query.parse()?;
        let provider = if provider_pattern.is_empty() {
            None
        } else {
            let regex = Regex::new(provider_pattern).map_err(|source| {
                QueryError::ProviderPattern {
                    pattern: provider_pattern.to_string(),
                    source,
                }
            })?;
            Some(regex)
        };
        Ok(Self { version, provider })
    }

    /// Unanchored search: `rongSap` matches `StrongSapling`.
    pub fn matches_provider(&self, name: &str) -> bool {
        self.provider.as_ref().map_or(true, |re| re.is_match(name))
    }

    pub fn matches_version(&self, version: &str) -> Result<bool, QueryError> {
        Ok(self.version.matches_str(version)?)
    }
}

/// Run `query` against `catalog`.
///
/// Versions that keep no provider are dropped from the result.
pub fn query_catalog(catalog: &Catalog, query: &CatalogQuery) -> Result<Catalog, QueryError> {
    let mut versions = Vec::new();
    for version in &catalog.versions {
        if !query.matches_version(&version.version)? {
            continue;
        }

        let providers: Vec<_> = version
            .providers
            .iter()
            .filter(|p| query.matches_provider(&p.name))
            .cloned()
            .collect();
        if providers.is_empty() {
            continue;
        }

        versions.push(Version {
            version: version.version.clone(),
            providers,
        });
    }

    Ok(Catalog {
        name: catalog.name.clone(),
        description: catalog.description.clone(),
        versions,
    })
}

impl Catalog {
    /// Convenience wrapper around [`query_catalog`].
    pub fn query(&self, version_query: &str, provider_pattern: &str) -> Result<Catalog, QueryError> {
        query_catalog(self, &CatalogQuery::new(version_query, provider_pattern)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Provider;
    use pretty_assertions::assert_eq;

    const STRONG: &str = "StrongSapling";
    const FEEBLE: &str = "FeebleFungus";

    fn scenario() -> Catalog {
        let mut catalog = Catalog {
            name: "TestQueryBox".into(),
            description: "a test box".into(),
            versions: Vec::new(),
        };
        let strong = ["0.3.5", "0.3.5-BETA", "1.0.0", "1.0.0-PRE", "1.4.5", "1.2.3", "1.2.4"];
        let feeble = ["0.3.4", "0.3.5-BETA", "1.0.1", "2.0.0", "2.10.0", "2.11.1", "1.2.3"];
        for (provider, versions) in [(STRONG, &strong), (FEEBLE, &feeble)] {
            for version in versions.iter() {
                catalog.upsert_provider(
                    version,
                    Provider {
                        name: provider.into(),
                        url: format!("file:///boxes/{version}/{provider}.box"),
                        checksum_type: "sha256".into(),
                        checksum: "0xB00B1E5".into(),
                    },
                );
            }
        }
        catalog
    }

    /// `(version, "ProviderA,ProviderB")` pairs in catalog order.
    fn summary(catalog: &Catalog) -> Vec<(String, String)> {
        catalog
            .versions
            .iter()
            .map(|v| {
                let names: Vec<_> = v.providers.iter().map(|p| p.name.as_str()).collect();
                (v.version.clone(), names.join(","))
            })
            .collect()
    }

    fn expect(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(v, ps)| (v.to_string(), ps.to_string()))
            .collect()
    }

    #[test]
    fn empty_query_returns_whole_catalog() {
        let catalog = scenario();
        assert_eq!(catalog.query("", "").unwrap(), catalog);
    }

    #[test]
    fn provider_pattern_is_unanchored() {
        let result = scenario().query("", "rongSap").unwrap();

        assert_eq!(
            summary(&result),
            expect(&[
                ("0.3.5", STRONG),
                ("0.3.5-BETA", STRONG),
                ("1.0.0", STRONG),
                ("1.0.0-PRE", STRONG),
                ("1.4.5", STRONG),
                ("1.2.3", STRONG),
                ("1.2.4", STRONG),
            ])
        );
    }

    #[test]
    fn version_range_keeps_catalog_order() {
        let result = scenario().query("<1", "").unwrap();

        assert_eq!(
            summary(&result),
            expect(&[
                ("0.3.5", STRONG),
                ("0.3.5-BETA", "StrongSapling,FeebleFungus"),
                ("0.3.4", FEEBLE),
            ])
        );
    }

    #[test]
    fn version_and_provider_filters_combine() {
        let catalog = scenario();
        let result = catalog.query("<1", ".*rongSap.*").unwrap();

        assert_eq!(result.name, catalog.name);
        assert_eq!(result.description, catalog.description);
        assert_eq!(
            summary(&result),
            expect(&[("0.3.5", STRONG), ("0.3.5-BETA", STRONG)])
        );
    }

    #[test]
    fn numeric_ordering_applies_to_ranges() {
        let result = scenario().query(">=2.2", FEEBLE).unwrap();
        assert_eq!(
            summary(&result),
            expect(&[("2.10.0", FEEBLE), ("2.11.1", FEEBLE)])
        );
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = CatalogQuery::new("", "*-iso").unwrap_err();
        assert!(matches!(err, QueryError::ProviderPattern { ref pattern, .. } if pattern == "*-iso"));
    }

    #[test]
    fn invalid_version_query_is_reported() {
        let err = CatalogQuery::new("=>1", "").unwrap_err();
        assert!(matches!(err, QueryError::Version(_)));
    }

    #[test]
    fn malformed_catalog_version_is_reported() {
        let mut catalog = scenario();
        catalog.versions[0].version = "latest".into();

        assert!(matches!(catalog.query("<1", ""), Err(QueryError::Version(_))));
        // The empty query never parses versions.
        assert!(catalog.query("", "").is_ok());
    }
}
