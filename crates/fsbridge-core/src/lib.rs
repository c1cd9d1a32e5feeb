//! fsbridge core - filesystem access and background downloads
//!
//! [`FsBridge`] is what a host binds against: plain file operations through
//! a [`FileSystem`], read-only bundled assets through an [`AssetSource`],
//! and downloads run by the [`DownloadManager`] whose events are broadcast
//! to every subscriber.

pub mod assets;
pub mod config;
mod engine;
mod error;
pub mod fs;
pub mod sink;

pub use assets::{AssetReader, AssetSource, BundleAssets};
pub use engine::*;
pub use error::*;
pub use fs::{FileSystem, FileWriter, LocalFileSystem};
pub use fsbridge_types::*;
pub use sink::EventSink;

use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

/// Assets directory used when the config does not name one
pub const DEFAULT_ASSETS_DIR: &str = "assets";

/// The main fsbridge instance
#[derive(Clone)]
pub struct FsBridge {
    fs: Arc<dyn FileSystem>,
    assets: Arc<dyn AssetSource>,
    downloads: Arc<DownloadManager>,
    /// Event broadcaster
    event_tx: broadcast::Sender<DownloadEvent>,
}

impl FsBridge {
    /// Create an instance backed by the local disk
    pub fn new(config: DownloaderConfig) -> Result<Self, BridgeError> {
        let assets_dir = config
            .assets_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));
        Self::with_adapters(
            config,
            Arc::new(LocalFileSystem::new()),
            Arc::new(BundleAssets::new(assets_dir)),
        )
    }

    pub fn with_adapters(
        config: DownloaderConfig,
        fs: Arc<dyn FileSystem>,
        assets: Arc<dyn AssetSource>,
    ) -> Result<Self, BridgeError> {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let downloads = DownloadManager::new(config, fs.clone(), Arc::new(event_tx.clone()))?;

        Ok(Self {
            fs,
            assets,
            downloads: Arc::new(downloads),
            event_tx,
        })
    }

    /// Subscribe to the events of every download
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.event_tx.subscribe()
    }

    /// Events of one job, in order
    ///
    /// Subscribe before submitting the job or early events are missed. Events
    /// dropped because the subscriber lagged are skipped.
    pub fn subscribe_job(&self, job_id: JobId) -> impl Stream<Item = DownloadEvent> + Send {
        BroadcastStream::new(self.event_tx.subscribe()).filter_map(move |event| async move {
            match event {
                Ok(event) if event.job_id() == job_id => Some(event),
                Ok(_) => None,
                Err(lagged) => {
                    warn!(job_id, "Event subscriber lagged: {}", lagged);
                    None
                }
            }
        })
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    // ========================================================================
    // File Operations
    // ========================================================================

    pub async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, BridgeError> {
        self.fs.read_dir(path).await
    }

    pub async fn stat(&self, path: &Path) -> Result<FileStat, BridgeError> {
        self.fs.stat(path).await
    }

    pub async fn exists(&self, path: &Path) -> Result<bool, BridgeError> {
        self.fs.exists(path).await
    }

    pub async fn read_file(&self, path: &Path) -> Result<Vec<u8>, BridgeError> {
        self.fs.read_file(path).await
    }

    pub async fn write_file(&self, path: &Path, contents: &[u8]) -> Result<(), BridgeError> {
        self.fs.write_file(path, contents).await
    }

    pub async fn move_file(&self, from: &Path, to: &Path) -> Result<(), BridgeError> {
        self.fs.move_file(from, to).await
    }

    /// Delete a file or a whole directory tree
    pub async fn unlink(&self, path: &Path) -> Result<(), BridgeError> {
        self.fs.remove(path).await
    }

    pub async fn mkdir(&self, path: &Path) -> Result<(), BridgeError> {
        self.fs.create_dir_all(path).await
    }

    // ========================================================================
    // Bundled Assets
    // ========================================================================

    pub async fn read_dir_assets(&self, dir: &str) -> Result<Vec<DirEntry>, BridgeError> {
        self.assets.list(dir).await
    }

    pub async fn read_file_assets(&self, path: &str) -> Result<Vec<u8>, BridgeError> {
        self.assets.read(path).await
    }

    pub async fn stat_assets(&self, path: &str) -> Result<FileStat, BridgeError> {
        self.assets.stat(path).await
    }

    /// Copy a bundled asset to `dest`, returning the number of bytes written
    pub async fn copy_file_assets(&self, asset: &str, dest: &Path) -> Result<u64, BridgeError> {
        let mut reader = self.assets.open(asset).await?;
        let mut writer = self.fs.open_write(dest).await?;

        let copied = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.shutdown().await?;

        info!(asset, dest = %dest.display(), bytes = copied, "Asset copied");
        Ok(copied)
    }

    // ========================================================================
    // Download Operations
    // ========================================================================

    /// Start a download; see [`DownloadManager::submit`]
    pub async fn download_file(&self, request: DownloadRequest) -> Result<JobId, BridgeError> {
        self.downloads.submit(request).await
    }

    pub async fn stop_download(&self, job_id: JobId) {
        self.downloads.stop(job_id).await
    }

    /// Stop every running download
    pub async fn shutdown(&self) {
        self.downloads.stop_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bridge() -> (tempfile::TempDir, FsBridge) {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("bundle");
        tokio::fs::create_dir_all(assets.join("img")).await.unwrap();
        tokio::fs::write(assets.join("img/logo.svg"), b"<svg/>").await.unwrap();

        let config = DownloaderConfig {
            assets_dir: Some(assets),
            ..Default::default()
        };
        let bridge = FsBridge::new(config).unwrap();
        (dir, bridge)
    }

    #[tokio::test]
    async fn test_file_operations() {
        let (dir, bridge) = bridge().await;
        let nested = dir.path().join("a/b");
        bridge.mkdir(&nested).await.unwrap();

        let file = nested.join("note.txt");
        bridge.write_file(&file, b"hello").await.unwrap();
        assert!(bridge.exists(&file).await.unwrap());
        assert_eq!(bridge.stat(&file).await.unwrap().size, 5);

        let moved = dir.path().join("note.txt");
        bridge.move_file(&file, &moved).await.unwrap();
        assert_eq!(bridge.read_file(&moved).await.unwrap(), b"hello");
        assert!(!bridge.exists(&file).await.unwrap());

        bridge.unlink(&dir.path().join("a")).await.unwrap();
        assert!(!bridge.exists(&nested).await.unwrap());
    }

    #[tokio::test]
    async fn test_copy_asset_to_disk() {
        let (dir, bridge) = bridge().await;

        let listing = bridge.read_dir_assets("img").await.unwrap();
        assert_eq!(listing[0].path, PathBuf::from("img/logo.svg"));

        let stat = bridge.stat_assets("img/logo.svg").await.unwrap();
        assert_eq!(stat.path, PathBuf::from("img/logo.svg"));
        assert_eq!(stat.size, 6);

        let dest = dir.path().join("logo.svg");
        let copied = bridge.copy_file_assets("img/logo.svg", &dest).await.unwrap();
        assert_eq!(copied, 6);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"<svg/>");

        let err = bridge.copy_file_assets("img/missing.svg", &dest).await.unwrap_err();
        assert!(matches!(err, BridgeError::AssetNotFound(_)));
    }
}
