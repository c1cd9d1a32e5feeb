//! Download Manager - owns every in-flight download job
//!
//! `submit` validates a request, registers the job and spawns its task.
//! `stop` evicts the job, silences it and waits for the task to release
//! its connection and file before returning.

use crate::config::build_client;
use crate::engine::download_task::{DownloadTask, JobContext};
use crate::engine::registry::{EmissionGate, JobHandle, JobProgress, JobRegistry};
use crate::error::BridgeError;
use crate::fs::FileSystem;
use crate::sink::EventSink;
use fsbridge_types::{DownloadRequest, DownloaderConfig, JobId, JobSnapshot};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Client;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Download manager that coordinates all jobs
pub struct DownloadManager {
    registry: JobRegistry,
    /// Shared HTTP client
    client: Client,
    fs: Arc<dyn FileSystem>,
    sink: Arc<dyn EventSink>,
    config: Arc<DownloaderConfig>,
    next_job_id: AtomicU32,
}

impl DownloadManager {
    /// Create a manager whose HTTP client is built from `config`
    pub fn new(
        config: DownloaderConfig,
        fs: Arc<dyn FileSystem>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, BridgeError> {
        let client = build_client(&config)?;
        Ok(Self::with_client(client, config, fs, sink))
    }

    pub fn with_client(
        client: Client,
        config: DownloaderConfig,
        fs: Arc<dyn FileSystem>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry: JobRegistry::new(),
            client,
            fs,
            sink,
            config: Arc::new(config),
            next_job_id: AtomicU32::new(1),
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Allocate a job id no earlier call has returned
    pub fn next_job_id(&self) -> JobId {
        self.next_job_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Validate `request` and start it in the background
    ///
    /// Errors returned here mean no job was created and no event will ever
    /// be emitted for it. Once this returns `Ok`, the job reports through
    /// the sink: `Begin` when the server answers, `Progress` while the body
    /// is written, then exactly one `Result` unless it is stopped first.
    pub async fn submit(&self, request: DownloadRequest) -> Result<JobId, BridgeError> {
        let url = parse_url(&request.from_url)?;
        validate_headers(&request)?;
        self.validate_destination(&request.to_file).await?;

        let job_id = request.job_id;
        let to_file = request.to_file.clone();

        self.registry.insert_with(job_id, |generation| {
            let cancel = CancellationToken::new();
            let gate = EmissionGate::new();
            let progress = Arc::new(JobProgress::new());

            let task = DownloadTask {
                ctx: JobContext {
                    request,
                    sink: self.sink.clone(),
                    gate: gate.clone(),
                    cancel: cancel.clone(),
                    progress: progress.clone(),
                },
                url,
                client: self.client.clone(),
                fs: self.fs.clone(),
                config: self.config.clone(),
                registry: self.registry.clone(),
                generation,
            };

            JobHandle {
                generation,
                cancel,
                gate,
                progress,
                task: tokio::spawn(task.run()),
            }
        })?;

        info!(job_id, to = %to_file.display(), "Download submitted");
        Ok(job_id)
    }

    /// Stop a job; unknown or finished ids are a no-op
    ///
    /// No event for `job_id` is emitted once this returns, and the partial
    /// destination file has been closed.
    pub async fn stop(&self, job_id: JobId) {
        let Some(handle) = self.registry.remove(job_id) else {
            debug!(job_id, "Stop requested for inactive job");
            return;
        };

        handle.gate.close();
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!(job_id, "Download task ended abnormally: {}", e);
        }
        info!(job_id, "Download stopped by request");
    }

    /// Stop every active job
    pub async fn stop_all(&self) {
        let handles = self.registry.drain();
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "Stopping all downloads");
        let tasks: Vec<_> = handles
            .into_iter()
            .map(|(job_id, handle)| {
                handle.gate.close();
                handle.cancel.cancel();
                async move {
                    if let Err(e) = handle.task.await {
                        warn!(job_id, "Download task ended abnormally: {}", e);
                    }
                }
            })
            .collect();
        futures::future::join_all(tasks).await;
    }

    pub fn is_active(&self, job_id: JobId) -> bool {
        self.registry.contains(job_id)
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    /// Ids of all active jobs, ascending
    pub fn active_jobs(&self) -> Vec<JobId> {
        self.registry.ids()
    }

    pub fn snapshot(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.registry.snapshot(job_id)
    }

    async fn validate_destination(&self, to_file: &Path) -> Result<(), BridgeError> {
        let not_writable = |reason: &str| BridgeError::DestinationNotWritable {
            path: to_file.to_path_buf(),
            reason: reason.to_string(),
        };

        if to_file.file_name().is_none() {
            return Err(not_writable("path has no file name"));
        }

        let parent = match to_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        match self.fs.stat(parent).await {
            Ok(stat) if !stat.is_directory() => {
                return Err(not_writable("parent is not a directory"))
            }
            Ok(stat) if stat.readonly => return Err(not_writable("parent directory is read-only")),
            Ok(_) => {}
            Err(BridgeError::NotFound(_)) => {
                return Err(not_writable("parent directory does not exist"))
            }
            Err(e) => return Err(e),
        }

        match self.fs.stat(to_file).await {
            Ok(stat) if stat.is_directory() => Err(not_writable("destination is a directory")),
            Ok(stat) if stat.readonly => Err(not_writable("destination is read-only")),
            Ok(_) | Err(BridgeError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        // Tasks can't be awaited here; silence and cancel them instead
        for (job_id, handle) in self.registry.drain() {
            handle.gate.close();
            handle.cancel.cancel();
            debug!(job_id, "Cancelled on manager drop");
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, BridgeError> {
    let url = Url::parse(raw).map_err(|e| BridgeError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BridgeError::UnsupportedScheme(other.to_string())),
    }
}

fn validate_headers(request: &DownloadRequest) -> Result<(), BridgeError> {
    for (name, value) in &request.headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| BridgeError::InvalidHeader(name.clone()))?;
        HeaderValue::from_str(value).map_err(|_| BridgeError::InvalidHeader(name.clone()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileSystem;
    use fsbridge_types::DownloadEvent;
    use tokio::sync::mpsc;
    use tokio_test::assert_err;

    fn manager() -> (DownloadManager, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = DownloadManager::new(
            DownloaderConfig::default(),
            Arc::new(LocalFileSystem::new()),
            Arc::new(tx),
        )
        .unwrap();
        (manager, rx)
    }

    #[test]
    fn test_parse_url() {
        assert!(parse_url("https://example.com/a.bin").is_ok());
        assert!(matches!(parse_url("not a url"), Err(BridgeError::InvalidUrl(_))));
        assert!(matches!(
            parse_url("ftp://example.com/a.bin"),
            Err(BridgeError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[test]
    fn test_validate_headers() {
        let ok = DownloadRequest::new(1, "http://x", "/tmp/x").with_header("X-Token", "abc");
        assert!(validate_headers(&ok).is_ok());

        let bad_name = DownloadRequest::new(1, "http://x", "/tmp/x").with_header("bad name", "v");
        assert!(matches!(validate_headers(&bad_name), Err(BridgeError::InvalidHeader(_))));

        let bad_value = DownloadRequest::new(1, "http://x", "/tmp/x").with_header("X-A", "a\nb");
        assert_err!(validate_headers(&bad_value));
    }

    #[tokio::test]
    async fn test_job_ids_start_at_one() {
        let (manager, _rx) = manager();
        assert_eq!(manager.next_job_id(), 1);
        assert_eq!(manager.next_job_id(), 2);
    }

    #[tokio::test]
    async fn test_rejected_submit_creates_no_job() {
        let dir = tempfile::tempdir().unwrap();
        let (manager, mut rx) = manager();

        let missing_parent = dir.path().join("nope/out.bin");
        let err = manager
            .submit(DownloadRequest::new(1, "http://127.0.0.1:1/a", missing_parent))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = manager
            .submit(DownloadRequest::new(2, "http://127.0.0.1:1/a", dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::DestinationNotWritable { .. }));

        assert_eq!(manager.active_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_unknown_job_is_noop() {
        let (manager, mut rx) = manager();
        manager.stop(42).await;
        manager.stop_all().await;
        assert!(rx.try_recv().is_err());
    }
}
