//! Serving Directory Access
//!
//! `FileStore` is the only part of the server that touches the filesystem.
//! It is rooted at the serving directory and resolves bare filenames
//! against it. Filenames are validated by the command layer before they get
//! here; the store itself does no access control.
//!
//! All operations go through `tokio::fs`, so a slow disk blocks only the
//! connection that asked for the file.

use bytes::Bytes;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{trace, warn};

/// Errors returned by [`FileStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The path does not exist
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Any other filesystem failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound(path.to_path_buf())
        } else {
            StoreError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Returns true if the error means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Read-only access to the files under one serving directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store serving files from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The serving directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a filename against the serving directory.
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Lists the names of all entries in the serving directory, sorted.
    ///
    /// Names that are not valid UTF-8 are skipped.
    pub async fn list_entries(&self) -> StoreResult<Vec<String>> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|e| StoreError::from_io(&self.root, e))?;

        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io(&self.root, e))?
        {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!(name = ?raw, "Skipping entry with non UTF-8 name"),
            }
        }

        names.sort_unstable();
        trace!(root = %self.root.display(), entries = names.len(), "Listed directory");
        Ok(names)
    }

    /// Returns true if `name` exists under the serving directory.
    pub async fn exists(&self, name: &str) -> StoreResult<bool> {
        let path = self.resolve(name);
        fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::from_io(&path, e))
    }

    /// Returns the size in bytes of `name`.
    pub async fn size(&self, name: &str) -> StoreResult<u64> {
        let path = self.resolve(name);
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| StoreError::from_io(&path, e))?;
        Ok(metadata.len())
    }

    /// Reads exactly `len` bytes of `name` starting at `offset`.
    ///
    /// Fails if `name` is not a regular file, or if it is shorter than
    /// `offset + len`, which can happen if it shrank after its size was
    /// checked.
    pub async fn read_slice(&self, name: &str, offset: u64, len: usize) -> StoreResult<Bytes> {
        let path = self.resolve(name);
        let io_err = |e: io::Error| StoreError::from_io(&path, e);

        let mut file = File::open(&path).await.map_err(io_err)?;
        if !file.metadata().await.map_err(io_err)?.is_file() {
            return Err(io_err(io::Error::other("not a regular file")));
        }
        file.seek(SeekFrom::Start(offset)).await.map_err(io_err)?;

        let mut data = vec![0u8; len];
        file.read_exact(&mut data).await.map_err(io_err)?;

        trace!(path = %path.display(), offset, len, "Read slice");
        Ok(Bytes::from(data))
    }
}
