//! Packaging a finished Repo into a downloadable archive

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::Repo;

/// Archive name written into the session's output directory
pub const ARCHIVE_NAME: &str = "kata_repo.zip";

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Packaging failed: I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Packaging failed: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Serializes a Repo to a single artifact
pub trait Packager: Send + Sync {
    /// Write `repo` under `output_dir` and return the artifact's path
    fn package(&self, repo: &Repo, output_dir: &Path) -> Result<PathBuf, PackageError>;
}

/// Deflate-compressed zip, entries in Repo order
#[derive(Debug, Clone)]
pub struct ZipPackager {
    archive_name: String,
}

impl ZipPackager {
    pub fn new() -> Self {
        Self {
            archive_name: ARCHIVE_NAME.to_string(),
        }
    }

    pub fn with_archive_name(archive_name: impl Into<String>) -> Self {
        Self {
            archive_name: archive_name.into(),
        }
    }
}

impl Default for ZipPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl Packager for ZipPackager {
    fn package(&self, repo: &Repo, output_dir: &Path) -> Result<PathBuf, PackageError> {
        debug!(files = repo.len(), dir = %output_dir.display(), "ZipPackager::package: called");
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| PackageError::Io { path, source }
        };

        fs::create_dir_all(output_dir).map_err(io_err(output_dir))?;

        let final_path = output_dir.join(&self.archive_name);
        let tmp_path = output_dir.join(format!(".{}.tmp", self.archive_name));

        let file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let written = (|| -> Result<File, PackageError> {
            for (path, content) in repo.iter() {
                zip.start_file(path, options)?;
                zip.write_all(content.as_bytes()).map_err(io_err(&tmp_path))?;
            }
            Ok(zip.finish()?)
        })();

        let file = match written {
            Ok(file) => file,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                return Err(e);
            }
        };
        file.sync_all().map_err(io_err(&tmp_path))?;
        drop(file);

        fs::rename(&tmp_path, &final_path).map_err(io_err(&final_path))?;
        info!(path = %final_path.display(), files = repo.len(), "Packaged repo");
        Ok(final_path)
    }
}
