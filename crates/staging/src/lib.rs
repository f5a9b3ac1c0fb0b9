//! On-disk staging store for in-flight transfers.
//!
//! Each transfer gets its own directory under the base path. Chunks are
//! appended to `<base>/<transfer_id>/<filename>.part`; on completion the
//! `.part` file is renamed to `<base>/<transfer_id>/<filename>`. A failed
//! or abandoned transfer's directory is removed recursively.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Errors from the staging store.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),
}

/// Reduces a sender-supplied filename to a safe last path component.
///
/// Both separator styles are stripped; names that are empty, `.` or `..`
/// after reduction are rejected.
pub fn sanitize_filename(name: &str) -> Result<String, StagingError> {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." {
        return Err(StagingError::InvalidFilename(name.to_string()));
    }
    Ok(last.to_string())
}

/// Staging store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Creates the base directory if it does not exist yet.
    pub async fn init(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.base).await?;
        Ok(())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// `<base>/<transfer_id>/<filename>.part`
    pub fn temp_path(&self, transfer_id: u64, filename: &str) -> PathBuf {
        self.base
            .join(transfer_id.to_string())
            .join(format!("{filename}.part"))
    }

    /// `<base>/<transfer_id>/<filename>`
    pub fn final_path(&self, transfer_id: u64, filename: &str) -> PathBuf {
        self.base.join(transfer_id.to_string()).join(filename)
    }

    /// Creates the transfer directory and opens the `.part` file in
    /// truncate-write mode.
    ///
    /// `filename` must already be sanitized (see [`sanitize_filename`]).
    pub async fn open_for_write(
        &self,
        transfer_id: u64,
        filename: &str,
    ) -> Result<StagedFile, StagingError> {
        let dir = self.base.join(transfer_id.to_string());
        fs::create_dir_all(&dir).await?;

        let temp_path = self.temp_path(transfer_id, filename);
        let file = fs::File::create(&temp_path).await?;
        tracing::debug!(path = %temp_path.display(), "opened staging file");

        Ok(StagedFile {
            file,
            temp_path,
            final_path: self.final_path(transfer_id, filename),
        })
    }

    /// Recursively removes the transfer's directory.
    pub async fn cleanup(&self, transfer_id: u64) -> Result<(), StagingError> {
        let dir = self.base.join(transfer_id.to_string());
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// An open `.part` file for one transfer.
#[derive(Debug)]
pub struct StagedFile {
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl StagedFile {
    /// Appends the chunk and flushes, so the bytes are visible to
    /// same-process readers immediately. Returns the number of bytes written.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<usize, StagingError> {
        self.file.write_all(data).await?;
        self.file.flush().await?;
        Ok(data.len())
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Closes the file and renames the `.part` to its final name.
    ///
    /// Returns the final path. Failure of either step fails the finalize.
    pub async fn finalize(mut self) -> Result<PathBuf, StagingError> {
        self.file.flush().await?;
        drop(self.file);
        fs::rename(&self.temp_path, &self.final_path).await?;
        Ok(self.final_path)
    }
}
