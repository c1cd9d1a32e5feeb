//! Read-only access to assets bundled with the application

use crate::error::BridgeError;
use crate::fs::{file_stat, kind_of, Result};
use async_trait::async_trait;
use fsbridge_types::{DirEntry, FileStat};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncRead;

/// Readable byte stream returned by [`AssetSource::open`]
pub type AssetReader = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait AssetSource: Send + Sync {
    /// List an asset directory; `""` is the bundle root
    async fn list(&self, dir: &str) -> Result<Vec<DirEntry>>;

    async fn stat(&self, path: &str) -> Result<FileStat>;

    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    async fn open(&self, path: &str) -> Result<AssetReader>;
}

/// Assets served from a directory shipped next to the application
#[derive(Debug, Clone)]
pub struct BundleAssets {
    root: PathBuf,
}

impl BundleAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a relative asset path onto the bundle, refusing anything that escapes it
    fn resolve(&self, asset: &str) -> Result<PathBuf> {
        let relative = Path::new(asset);
        let mut resolved = self.root.clone();

        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(BridgeError::InvalidAssetPath(asset.to_string())),
            }
        }

        Ok(resolved)
    }

    /// Resolve an asset that must be a regular file
    async fn resolve_file(&self, asset: &str) -> Result<PathBuf> {
        let resolved = self.resolve(asset)?;
        let metadata = fs::metadata(&resolved)
            .await
            .map_err(|e| Self::missing(asset, e))?;
        if metadata.is_dir() {
            return Err(BridgeError::AssetNotFound(asset.to_string()));
        }
        Ok(resolved)
    }

    fn missing(asset: &str, e: std::io::Error) -> BridgeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            BridgeError::AssetNotFound(asset.to_string())
        } else {
            BridgeError::Io(e)
        }
    }
}

#[async_trait]
impl AssetSource for BundleAssets {
    async fn list(&self, dir: &str) -> Result<Vec<DirEntry>> {
        let path = self.resolve(dir)?;
        let mut entries = fs::read_dir(&path)
            .await
            .map_err(|e| Self::missing(dir, e))?;

        let prefix = dir.trim_matches('/');
        let mut listing = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = entry.metadata().await?;
            // Entry paths stay relative to the bundle, without a leading slash
            let relative = if prefix.is_empty() {
                PathBuf::from(&name)
            } else {
                Path::new(prefix).join(&name)
            };
            listing.push(DirEntry {
                name,
                path: relative,
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                kind: kind_of(&metadata),
            });
        }
        listing.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(listing)
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let resolved = self.resolve(path)?;
        let metadata = fs::metadata(&resolved)
            .await
            .map_err(|e| Self::missing(path, e))?;
        Ok(file_stat(PathBuf::from(path), &metadata))
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve_file(path).await?;
        fs::read(&resolved).await.map_err(|e| Self::missing(path, e))
    }

    async fn open(&self, path: &str) -> Result<AssetReader> {
        let resolved = self.resolve_file(path).await?;
        let file = fs::File::open(&resolved)
            .await
            .map_err(|e| Self::missing(path, e))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn bundle() -> (tempfile::TempDir, BundleAssets) {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("fonts")).await.unwrap();
        tokio::fs::write(dir.path().join("fonts/a.ttf"), b"font-a").await.unwrap();
        tokio::fs::write(dir.path().join("index.html"), b"<html></html>").await.unwrap();
        let assets = BundleAssets::new(dir.path());
        (dir, assets)
    }

    #[tokio::test]
    async fn test_list_root_and_subdir() {
        let (_dir, assets) = bundle().await;

        let root = assets.list("").await.unwrap();
        let names: Vec<_> = root.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["fonts", "index.html"]);
        assert!(root[0].is_directory());
        assert_eq!(root[1].path, PathBuf::from("index.html"));

        let fonts = assets.list("fonts").await.unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].path, PathBuf::from("fonts/a.ttf"));
        assert_eq!(fonts[0].size, 6);
    }

    #[tokio::test]
    async fn test_read_and_open() {
        let (_dir, assets) = bundle().await;

        assert_eq!(assets.read("fonts/a.ttf").await.unwrap(), b"font-a");

        let mut reader = assets.open("./index.html").await.unwrap();
        let mut contents = String::new();
        reader.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "<html></html>");
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (_dir, assets) = bundle().await;

        assert!(matches!(
            assets.read("../secret").await,
            Err(BridgeError::InvalidAssetPath(_))
        ));
        assert!(matches!(
            assets.read("/etc/passwd").await,
            Err(BridgeError::InvalidAssetPath(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_asset_message() {
        let (_dir, assets) = bundle().await;

        let err = assets.open("nope.png").await.err().unwrap();
        assert_eq!(err.to_string(), "Asset 'nope.png' could not be opened");
        assert!(matches!(assets.read("fonts").await, Err(BridgeError::AssetNotFound(_))));
    }

    #[tokio::test]
    async fn test_stat_asset() {
        let (_dir, assets) = bundle().await;
        let stat = assets.stat("index.html").await.unwrap();
        assert_eq!(stat.size, 13);
        assert!(stat.is_file());
    }
}
