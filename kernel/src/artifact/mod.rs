// Box Artifact Codec
//
// Derives the identity of a box archive: the provider named in its
// embedded `metadata.json` and a digest of the whole file. Archives may
// be gzip-compressed or plain tar. Nothing here knows about backends.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

pub mod fixture;

pub use fixture::{build_test_box, create_test_box_file};

/// Name of the metadata record at the archive root.
pub const METADATA_FILE: &str = "metadata.json";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Label used in errors for archives that did not come from a file.
const IN_MEMORY: &str = "<memory>";

/// Digest algorithm used for box checksums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Name recorded as `checksum_type` in the catalog.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Stream `reader` through the digest and return it hex-encoded.
    pub fn digest_reader<R: Read>(self, reader: R) -> io::Result<String> {
        match self {
            Self::Sha256 => hash_stream::<Sha256, R>(reader),
            Self::Sha512 => hash_stream::<Sha512, R>(reader),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = ArtifactError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            _ => Err(ArtifactError::UnknownDigest(s.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors produced while reading a box archive.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to read box file {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("{location} is not a readable box archive: {source}")]
    InvalidArchive {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("{location} is not a box archive: no metadata.json at its root")]
    MissingMetadata { location: String },

    #[error("malformed metadata.json in {location}: {source}")]
    MalformedMetadata {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("metadata.json in {location} does not name a provider")]
    MissingProvider { location: String },

    #[error("unknown digest algorithm `{0}`")]
    UnknownDigest(String),
}

/// Identity of a box archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub provider: String,
    pub checksum_type: String,
    pub checksum: String,
}

/// Subset of the box metadata we care about.
#[derive(Debug, Deserialize)]
struct BoxMetadata {
    provider: Option<String>,
}

/// Read a box file from disk and derive its provider and checksum.
///
/// The archive is read twice: once to find the metadata, once to digest.
pub fn derive_artifact_info(
    path: &Path,
    algorithm: DigestAlgorithm,
) -> Result<ArtifactInfo, ArtifactError> {
    let location = path.display().to_string();

    let provider = read_provider(open(path)?, &location)?;
    let checksum = algorithm
        .digest_reader(open(path)?)
        .map_err(|source| ArtifactError::Io {
            location: location.clone(),
            source,
        })?;

    tracing::debug!(path = %location, %provider, checksum_type = algorithm.name(), "derived artifact info");

    Ok(ArtifactInfo {
        provider,
        checksum_type: algorithm.name().to_string(),
        checksum,
    })
}

/// Derive provider and checksum from an archive held in memory.
pub fn artifact_info_from_bytes(
    bytes: &[u8],
    algorithm: DigestAlgorithm,
) -> Result<ArtifactInfo, ArtifactError> {
    let provider = read_provider(bytes, IN_MEMORY)?;
    let checksum = algorithm
        .digest_reader(bytes)
        .map_err(|source| ArtifactError::Io {
            location: IN_MEMORY.to_string(),
            source,
        })?;

    Ok(ArtifactInfo {
        provider,
        checksum_type: algorithm.name().to_string(),
        checksum,
    })
}

fn open(path: &Path) -> Result<BufReader<File>, ArtifactError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ArtifactError::Io {
            location: path.display().to_string(),
            source,
        })
}

/// Locate `metadata.json` inside the archive and return its provider.
fn read_provider<R: BufRead>(mut reader: R, location: &str) -> Result<String, ArtifactError> {
    let compressed = reader
        .fill_buf()
        .map_err(|source| invalid_archive(location, source))?
        .starts_with(&GZIP_MAGIC);

    if compressed {
        scan_for_provider(flate2::read::GzDecoder::new(reader), location)
    } else {
        scan_for_provider(reader, location)
    }
}

fn scan_for_provider<R: Read>(stream: R, location: &str) -> Result<String, ArtifactError> {
    let invalid = |source: io::Error| invalid_archive(location, source);

    let mut archive = tar::Archive::new(stream);
    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        if !is_metadata_path(&entry.path().map_err(invalid)?) {
            continue;
        }

        let mut json = String::new();
        entry.read_to_string(&mut json).map_err(invalid)?;
        let metadata: BoxMetadata =
            serde_json::from_str(&json).map_err(|source| ArtifactError::MalformedMetadata {
                location: location.to_string(),
                source,
            })?;

        return match metadata.provider {
            Some(provider) if !provider.is_empty() => Ok(provider),
            _ => Err(ArtifactError::MissingProvider {
                location: location.to_string(),
            }),
        };
    }

    Err(ArtifactError::MissingMetadata {
        location: location.to_string(),
    })
}

fn invalid_archive(location: &str, source: io::Error) -> ArtifactError {
    ArtifactError::InvalidArchive {
        location: location.to_string(),
        source,
    }
}

/// `metadata.json` or `./metadata.json`, never a nested file.
fn is_metadata_path(path: &Path) -> bool {
    let normalized: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    normalized == Path::new(METADATA_FILE)
}

fn hash_stream<D: Digest, R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
