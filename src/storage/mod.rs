//! Upload staging
//!
//! Uploaded database files are written to a uniquely named temporary file so
//! the SQLite driver can open them by path. A [`StagedFile`] owns that path:
//! it and any SQLite sidecar files are removed by [`StagedFile::cleanup`] or,
//! failing that, when the handle is dropped.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempPath};
use tracing::{debug, info, warn};

use crate::config::StagingConfig;
use crate::types::{AppError, AppResult};

const STAGED_PREFIX: &str = "upload-";
const STAGED_SUFFIX: &str = ".db";
// SQLite may leave these next to a database it has opened.
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Writes uploads into the staging directory
#[derive(Debug, Clone)]
pub struct FileStager {
    dir: Option<PathBuf>,
    allowed_extensions: Vec<String>,
}

/// An uploaded file persisted for the duration of one request
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    // None once removed
    temp: Option<TempPath>,
    original_name: String,
    size: usize,
}

impl FileStager {
    pub fn new(config: &StagingConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            allowed_extensions: config.allowed_extensions.clone(),
        }
    }

    /// Check the upload's extension against the accepted list
    pub fn check_extension(&self, filename: &str) -> AppResult<()> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match extension {
            Some(ext) if self.allowed_extensions.iter().any(|a| *a == ext) => Ok(()),
            _ => Err(AppError::UnsupportedFile(format!(
                "'{}' is not a database file (expected one of: {})",
                filename,
                self.allowed_extensions
                    .iter()
                    .map(|e| format!(".{}", e))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Persist the uploaded bytes to a fresh temporary file.
    ///
    /// The write handle is closed before returning; only the path is kept.
    pub fn stage(&self, filename: &str, bytes: &[u8]) -> AppResult<StagedFile> {
        self.check_extension(filename)?;

        let mut builder = Builder::new();
        builder.prefix(STAGED_PREFIX).suffix(STAGED_SUFFIX);
        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(bytes)?;
        file.as_file().sync_all()?;
        let temp = file.into_temp_path();
        let path = temp.to_path_buf();

        info!(
            original = %filename,
            path = %path.display(),
            size = bytes.len(),
            "Staged uploaded file"
        );

        Ok(StagedFile {
            path,
            temp: Some(temp),
            original_name: filename.to_string(),
            size: bytes.len(),
        })
    }
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Remove the staged file. Consumes the handle so removal happens once.
    pub fn cleanup(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };

        match temp.close() {
            Ok(()) => debug!(path = %self.path.display(), "Removed staged file"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove staged file"),
        }

        for sidecar in sidecar_paths(&self.path).iter().filter(|p| p.exists()) {
            if let Err(e) = std::fs::remove_file(sidecar) {
                warn!(path = %sidecar.display(), error = %e, "Failed to remove SQLite sidecar file");
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.remove();
    }
}

fn sidecar_paths(path: &Path) -> Vec<PathBuf> {
    SIDECAR_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut name = path.as_os_str().to_owned();
            name.push(suffix);
            PathBuf::from(name)
        })
        .collect()
}
