// Tool Configuration
//
// Optional JSON settings shared by every command. Absent settings fall
// back to `ToolConfig::default_config()`.

use serde::{Deserialize, Serialize};

use crate::artifact::DigestAlgorithm;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Digest used when deriving box checksums.
    #[serde(default)]
    pub checksum_type: DigestAlgorithm,

    /// Default log filter, e.g. `info` or `boxvault_kernel=debug`.
    #[serde(default)]
    pub log_level: Option<String>,
}

impl ToolConfig {
    /// Built-in configuration used when no config file is given.
    pub fn default_config() -> Self {
        Self {
            checksum_type: DigestAlgorithm::Sha256,
            log_level: None,
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        assert_eq!(ToolConfig::from_json("{}").unwrap(), ToolConfig::default_config());
    }

    #[test]
    fn parses_all_fields() {
        let config =
            ToolConfig::from_json(r#"{"checksum_type":"sha512","log_level":"debug"}"#).unwrap();
        assert_eq!(config.checksum_type, DigestAlgorithm::Sha512);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(ToolConfig::from_json(r#"{"checksum":"sha256"}"#).is_err());
        assert!(ToolConfig::from_json(r#"{"checksum_type":"md5"}"#).is_err());
    }
}
