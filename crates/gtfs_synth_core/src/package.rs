use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PackageError;

/// Packs the named files from `dir` into a deflate-compressed archive, in the
/// order given. Every file must exist.
pub fn package_feed(
    dir: &Path,
    archive_path: &Path,
    files: &[&str],
) -> Result<PathBuf, PackageError> {
    let archive = File::create(archive_path).map_err(|source| PackageError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(archive));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for name in files {
        let path = dir.join(name);
        let file = File::open(&path).map_err(|source| PackageError::Io {
            path: path.clone(),
            source,
        })?;
        zip.start_file(*name, options)
            .map_err(|source| PackageError::Zip {
                file: name.to_string(),
                source,
            })?;
        io::copy(&mut BufReader::new(file), &mut zip)
            .map_err(|source| PackageError::Io { path, source })?;
    }

    let mut writer = zip.finish().map_err(|source| PackageError::Zip {
        file: archive_path.display().to_string(),
        source,
    })?;
    writer.flush().map_err(|source| PackageError::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    info!(archive = %archive_path.display(), files = files.len(), "feed packaged");
    Ok(archive_path.to_path_buf())
}
