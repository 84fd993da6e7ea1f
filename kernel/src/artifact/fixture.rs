// Test Box Fixtures
//
// Builds small but well-formed box archives carrying a caller-chosen
// provider. Used by the test suites and the `create-test-box` command.

use std::io;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use super::{ArtifactError, METADATA_FILE};

const VAGRANTFILE: &str = "# Generated test box; not bootable.\n";

/// Build a box archive in memory.
pub fn build_test_box(provider: &str, compress: bool) -> io::Result<Vec<u8>> {
    let metadata = serde_json::json!({ "provider": provider }).to_string();
    let files = [(METADATA_FILE, metadata.as_str()), ("Vagrantfile", VAGRANTFILE)];

    if compress {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let encoder = append_files(tar::Builder::new(encoder), &files)?;
        encoder.finish()
    } else {
        append_files(tar::Builder::new(Vec::new()), &files)
    }
}

/// Write a test box archive to `path`, creating parent directories.
pub fn create_test_box_file(
    path: &Path,
    provider: &str,
    compress: bool,
) -> Result<(), ArtifactError> {
    let io_error = |source| ArtifactError::Io {
        location: path.display().to_string(),
        source,
    };

    let bytes = build_test_box(provider, compress).map_err(io_error)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, bytes).map_err(io_error)?;

    tracing::info!(path = %path.display(), provider, "created test box");
    Ok(())
}

fn append_files<W: io::Write>(mut builder: tar::Builder<W>, files: &[(&str, &str)]) -> io::Result<W> {
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, name, contents.as_bytes())?;
    }
    builder.into_inner()
}
