//! File system adapter
//!
//! The download manager and the facade only touch the disk through
//! [`FileSystem`], so hosts with sandboxed storage can swap in their own
//! implementation. [`LocalFileSystem`] is the tokio-backed default.

use crate::error::BridgeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fsbridge_types::{DirEntry, FileKind, FileStat};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Writable byte stream returned by [`FileSystem::open_write`]
pub type FileWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Create or truncate `path` for writing
    async fn open_write(&self, path: &Path) -> Result<FileWriter>;

    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn stat(&self, path: &Path) -> Result<FileStat>;

    /// List a directory, sorted by name
    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file, or a directory and everything below it
    async fn remove(&self, path: &Path) -> Result<()>;

    async fn create_dir_all(&self, path: &Path) -> Result<()>;
}

/// Tokio-based file system implementation
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn not_found(path: &Path, e: std::io::Error) -> BridgeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            BridgeError::NotFound(path.to_path_buf())
        } else {
            BridgeError::Io(e)
        }
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn open_write(&self, path: &Path) -> Result<FileWriter> {
        let file = fs::File::create(path).await?;
        Ok(Box::new(file))
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn stat(&self, path: &Path) -> Result<FileStat> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        Ok(file_stat(path.to_path_buf(), &metadata))
    }

    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = fs::read_dir(path)
            .await
            .map_err(|e| Self::not_found(path, e))?;

        let mut listing = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            listing.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                size: metadata.len(),
                kind: kind_of(&metadata),
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(listing)
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(|e| Self::not_found(path, e))
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).await?;
        Ok(())
    }

    async fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        let metadata = fs::metadata(from)
            .await
            .map_err(|e| Self::not_found(from, e))?;

        match fs::rename(from, to).await {
            Ok(()) => Ok(()),
            // rename can't cross devices; regular files are copied instead
            Err(rename_err) if metadata.is_file() => {
                debug!(
                    "rename {} -> {} failed ({}), copying",
                    from.display(),
                    to.display(),
                    rename_err
                );
                if let Err(copy_err) = fs::copy(from, to).await {
                    warn!("copy fallback failed: {}", copy_err);
                    return Err(BridgeError::Io(rename_err));
                }
                fs::remove_file(from).await?;
                Ok(())
            }
            Err(e) => Err(BridgeError::Io(e)),
        }
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let metadata = fs::symlink_metadata(path)
            .await
            .map_err(|e| Self::not_found(path, e))?;

        if metadata.is_dir() {
            fs::remove_dir_all(path).await?;
        } else {
            fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        Ok(())
    }
}

pub(crate) fn kind_of(metadata: &std::fs::Metadata) -> FileKind {
    if metadata.is_dir() {
        FileKind::Directory
    } else {
        FileKind::File
    }
}

pub(crate) fn file_stat(path: PathBuf, metadata: &std::fs::Metadata) -> FileStat {
    let mtime = metadata.modified().map(to_utc).unwrap_or_else(|_| Utc::now());
    // Creation time isn't tracked on every platform
    let ctime = metadata.created().map(to_utc).unwrap_or(mtime);

    FileStat {
        path,
        size: metadata.len(),
        kind: kind_of(metadata),
        ctime,
        mtime,
        mode: unix_mode(metadata),
        readonly: metadata.permissions().readonly(),
    }
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(unix)]
fn unix_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}
