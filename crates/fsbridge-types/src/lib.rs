//! Shared types for fsbridge
//!
//! This crate contains the data structures exchanged between the core,
//! the hosts that embed it, and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Caller-assigned identifier of a download job
pub type JobId = u32;

/// Sentinel used for `content_length` when the server did not declare one
pub const UNKNOWN_LENGTH: i64 = -1;

// ============================================================================
// Download Types
// ============================================================================

/// A request to download `from_url` into `to_file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub job_id: JobId,
    pub from_url: String,
    pub to_file: PathBuf,
    /// Extra request headers sent with the GET
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Overrides the configured progress throttle for this job (0 = every chunk)
    #[serde(default)]
    pub progress_interval_ms: Option<u64>,
}

impl DownloadRequest {
    pub fn new(job_id: JobId, from_url: impl Into<String>, to_file: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            from_url: from_url.into(),
            to_file: to_file.into(),
            headers: BTreeMap::new(),
            progress_interval_ms: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_progress_interval(mut self, interval_ms: u64) -> Self {
        self.progress_interval_ms = Some(interval_ms);
        self
    }
}

/// Where an active job is in its lifecycle
///
/// Jobs leave the registry as they finish, so how a job ended is only
/// reported by its `DownloadResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Submitted,
    Connecting,
    Transferring,
}

/// Point-in-time view of an active job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub state: JobState,
    pub content_length: i64,
    pub bytes_written: u64,
}

// ============================================================================
// Event Types
// ============================================================================

/// Sent once per job when the response headers arrive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBegin {
    pub job_id: JobId,
    pub status_code: u16,
    pub content_length: i64,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub job_id: JobId,
    pub content_length: i64,
    pub bytes_written: u64,
}

/// Broad classification of a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// DNS, TLS or connection setup failed
    Connection,
    /// Reading the body or writing the destination failed mid-stream
    Transfer,
    /// The server answered with a status the job was configured to reject
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DownloadOutcome {
    Success,
    Failure { kind: FailureKind, message: String },
}

/// Terminal notification of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub job_id: JobId,
    /// `None` when no response was received
    pub status_code: Option<u16>,
    pub bytes_written: u64,
    pub outcome: DownloadOutcome,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Success)
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            DownloadOutcome::Success => None,
            DownloadOutcome::Failure { message, .. } => Some(message),
        }
    }
}

/// Events emitted by the download manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DownloadEvent {
    Begin(DownloadBegin),
    Progress(DownloadProgress),
    Result(DownloadResult),
}

impl DownloadEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            DownloadEvent::Begin(e) => e.job_id,
            DownloadEvent::Progress(e) => e.job_id,
            DownloadEvent::Result(e) => e.job_id,
        }
    }

    /// Per-job event name a host can subscribe to, e.g. `DownloadProgress-7`
    pub fn event_name(&self) -> String {
        let prefix = match self {
            DownloadEvent::Begin(_) => "DownloadBegin",
            DownloadEvent::Progress(_) => "DownloadProgress",
            DownloadEvent::Result(_) => "DownloadResult",
        };
        format!("{}-{}", prefix, self.job_id())
    }
}

// ============================================================================
// File System Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// Result of a `stat` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub path: PathBuf,
    pub size: u64,
    pub kind: FileKind,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    /// Unix permission bits, where the platform has them
    pub mode: Option<u32>,
    pub readonly: bool,
}

impl FileStat {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub kind: FileKind,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

// ============================================================================
// Settings Types
// ============================================================================

/// Download engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// Fail a job when no body bytes arrive for this long
    pub read_timeout_secs: Option<u64>,
    /// Size of the read buffer used per chunk
    pub chunk_size: usize,
    /// Minimum time between progress events (0 = every chunk)
    pub progress_interval_ms: u64,
    /// Treat non-2xx responses as failures instead of saving the body
    pub fail_on_http_error: bool,
    /// Capacity of the broadcast channel carrying download events
    pub event_capacity: usize,
    /// Directory holding the application's bundled assets
    pub assets_dir: Option<PathBuf>,
    pub proxy: ProxySettings,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("fsbridge/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 30,
            read_timeout_secs: Some(60),
            chunk_size: 64 * 1024,
            progress_interval_ms: 250,
            fail_on_http_error: false,
            event_capacity: 1000,
            assets_dir: None,
            proxy: ProxySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    None,
    #[default]
    System,
    Manual,
}

/// Proxy configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    #[serde(default)]
    pub mode: ProxyMode,
    /// HTTP proxy URL (for manual mode)
    pub http_proxy: Option<String>,
    /// HTTPS proxy URL (for manual mode)
    pub https_proxy: Option<String>,
    /// Bypass proxy for these hosts (comma-separated)
    pub no_proxy: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}
