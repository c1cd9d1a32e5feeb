//! Download task - the background half of a job
//!
//! Connects, streams the body into the destination in fixed-size reads and
//! reports through the job's emission gate. The task owns the response
//! stream and the file writer, so both are released exactly once, when it
//! returns, whichever way the job ends.

use crate::engine::registry::{EmissionGate, JobProgress, JobRegistry};
use crate::error::BridgeError;
use crate::fs::FileSystem;
use crate::sink::EventSink;
use fsbridge_types::{
    DownloadBegin, DownloadEvent, DownloadOutcome, DownloadProgress, DownloadRequest,
    DownloadResult, DownloaderConfig, FailureKind, JobId, JobState, UNKNOWN_LENGTH,
};
use futures::TryStreamExt;
use reqwest::header::{HeaderMap, CONTENT_LENGTH};
use reqwest::{Client, RequestBuilder, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Everything a job's task needs to report about itself
pub(crate) struct JobContext {
    pub(crate) request: DownloadRequest,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) gate: EmissionGate,
    pub(crate) cancel: CancellationToken,
    pub(crate) progress: Arc<JobProgress>,
}

impl JobContext {
    fn job_id(&self) -> JobId {
        self.request.job_id
    }

    fn emit(&self, event: DownloadEvent) -> bool {
        self.gate.emit(self.sink.as_ref(), event)
    }
}

/// How a transfer ended, short of failing
enum Finish {
    Completed { status_code: u16, bytes_written: u64 },
    Stopped { bytes_written: u64 },
}

struct Failure {
    status_code: Option<u16>,
    bytes_written: u64,
    kind: FailureKind,
    error: BridgeError,
}

impl Failure {
    fn connection(error: BridgeError) -> Self {
        Self {
            status_code: None,
            bytes_written: 0,
            kind: FailureKind::Connection,
            error,
        }
    }

    fn during_transfer(status_code: u16, bytes_written: u64, error: BridgeError) -> Self {
        Self {
            status_code: Some(status_code),
            bytes_written,
            kind: error.failure_kind(),
            error,
        }
    }
}

/// Decides which chunk writes get a progress event
struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
    last_reported: Option<u64>,
}

impl ProgressThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            last_reported: None,
        }
    }

    fn is_due(&self) -> bool {
        match self.last_emit {
            Some(at) => at.elapsed() >= self.interval,
            None => true,
        }
    }

    fn mark(&mut self, bytes_written: u64) {
        self.last_emit = Some(Instant::now());
        self.last_reported = Some(bytes_written);
    }

    fn needs_final(&self, bytes_written: u64) -> bool {
        self.last_reported != Some(bytes_written)
    }
}

pub(crate) struct DownloadTask {
    pub(crate) ctx: JobContext,
    pub(crate) url: Url,
    pub(crate) client: Client,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) config: Arc<DownloaderConfig>,
    pub(crate) registry: JobRegistry,
    pub(crate) generation: u64,
}

impl DownloadTask {
    /// Run the job to a terminal state
    pub(crate) async fn run(self) {
        let job_id = self.ctx.job_id();
        let result = self.transfer().await;

        // A job is no longer active by the time its Result is observed
        self.registry.remove_if(job_id, self.generation);

        match result {
            Ok(Finish::Completed {
                status_code,
                bytes_written,
            }) => {
                info!(job_id, status_code, bytes_written, "Download completed");
                self.ctx.emit(DownloadEvent::Result(DownloadResult {
                    job_id,
                    status_code: Some(status_code),
                    bytes_written,
                    outcome: DownloadOutcome::Success,
                }));
            }
            Ok(Finish::Stopped { bytes_written }) => {
                info!(job_id, bytes_written, "Download stopped");
            }
            Err(failure) => {
                warn!(job_id, kind = ?failure.kind, "Download failed: {}", failure.error);
                self.ctx.emit(DownloadEvent::Result(DownloadResult {
                    job_id,
                    status_code: failure.status_code,
                    bytes_written: failure.bytes_written,
                    outcome: DownloadOutcome::Failure {
                        kind: failure.kind,
                        message: failure.error.to_string(),
                    },
                }));
            }
        }
    }

    async fn transfer(&self) -> Result<Finish, Failure> {
        let ctx = &self.ctx;
        let job_id = ctx.job_id();

        ctx.progress.set_state(JobState::Connecting);
        debug!(job_id, url = %self.url, "Connecting");

        let mut request = self.client.get(self.url.clone());
        for (name, value) in &ctx.request.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let read_timeout = self.config.read_timeout_secs.map(Duration::from_secs);

        let response = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Ok(Finish::Stopped { bytes_written: 0 }),
            response = await_headers(request, read_timeout) => response.map_err(Failure::connection)?,
        };

        let status = response.status();
        let status_code = status.as_u16();
        let content_length = declared_length(response.headers());
        ctx.progress.set_content_length(content_length);

        ctx.emit(DownloadEvent::Begin(DownloadBegin {
            job_id,
            status_code,
            content_length,
            headers: header_map(response.headers()),
        }));

        if self.config.fail_on_http_error && !status.is_success() {
            return Err(Failure::during_transfer(
                status_code,
                0,
                BridgeError::Http {
                    status: status_code,
                },
            ));
        }

        let mut writer = self
            .fs
            .open_write(&ctx.request.to_file)
            .await
            .map_err(|e| Failure::during_transfer(status_code, 0, e))?;

        ctx.progress.set_state(JobState::Transferring);
        info!(job_id, status_code, content_length, "Transfer started");

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = StreamReader::new(Box::pin(stream));
        let mut buf = vec![0u8; self.config.chunk_size.max(1)];
        let interval = ctx
            .request
            .progress_interval_ms
            .unwrap_or(self.config.progress_interval_ms);
        let mut throttle = ProgressThrottle::new(Duration::from_millis(interval));
        let mut bytes_written: u64 = 0;

        // Ok(true) = stream exhausted, Ok(false) = stopped
        let ended: Result<bool, BridgeError> = loop {
            if ctx.cancel.is_cancelled() {
                break Ok(false);
            }

            let read = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break Ok(false),
                read = read_chunk(&mut reader, &mut buf, read_timeout) => read,
            };

            let n = match read {
                Ok(0) => break Ok(true),
                Ok(n) => n,
                Err(e) => break Err(e),
            };

            if let Err(e) = writer.write_all(&buf[..n]).await {
                break Err(e.into());
            }
            bytes_written += n as u64;
            ctx.progress.set_bytes_written(bytes_written);

            if throttle.is_due() {
                ctx.emit(progress_event(job_id, content_length, bytes_written));
                throttle.mark(bytes_written);
            }
        };

        // Whatever ended the loop, what was written stays on disk
        let closed = writer.shutdown().await;
        drop(writer);
        drop(reader);

        match ended {
            Ok(true) => {
                closed.map_err(|e| Failure::during_transfer(status_code, bytes_written, e.into()))?;
                if throttle.needs_final(bytes_written) {
                    ctx.emit(progress_event(job_id, content_length, bytes_written));
                }
                Ok(Finish::Completed {
                    status_code,
                    bytes_written,
                })
            }
            Ok(false) => {
                if let Err(e) = closed {
                    warn!(job_id, "Failed to close destination after stop: {}", e);
                }
                Ok(Finish::Stopped { bytes_written })
            }
            Err(e) => Err(Failure::during_transfer(status_code, bytes_written, e)),
        }
    }
}

/// Send the request and wait for the response headers
///
/// `limit` bounds the wait after the connection is up; a server that accepts
/// and never answers fails the job instead of holding it in Connecting.
async fn await_headers(
    request: RequestBuilder,
    limit: Option<Duration>,
) -> Result<Response, BridgeError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, request.send())
            .await
            .map_err(|_| BridgeError::ReadTimeout(limit.as_secs()))?
            .map_err(BridgeError::from),
        None => Ok(request.send().await?),
    }
}

async fn read_chunk<R>(
    reader: &mut R,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<usize, BridgeError>
where
    R: AsyncRead + Unpin,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(buf))
            .await
            .map_err(|_| BridgeError::ReadTimeout(limit.as_secs()))?
            .map_err(BridgeError::from),
        None => Ok(reader.read(buf).await?),
    }
}

fn progress_event(job_id: JobId, content_length: i64, bytes_written: u64) -> DownloadEvent {
    DownloadEvent::Progress(DownloadProgress {
        job_id,
        content_length,
        bytes_written,
    })
}

/// `Content-Length` as declared by the server, or -1
pub(crate) fn declared_length(headers: &HeaderMap) -> i64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|len| *len >= 0)
        .unwrap_or(UNKNOWN_LENGTH)
}

/// Flatten response headers; repeated headers are joined with ", "
pub(crate) fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, SET_COOKIE};

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), UNKNOWN_LENGTH);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("10000"));
        assert_eq!(declared_length(&headers), 10000);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("bogus"));
        assert_eq!(declared_length(&headers), UNKNOWN_LENGTH);
    }

    #[test]
    fn test_header_map_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(SET_COOKIE, HeaderValue::from_static("b=2"));
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));

        let map = header_map(&headers);
        assert_eq!(map.get("set-cookie").map(String::as_str), Some("a=1, b=2"));
        assert_eq!(map.get("content-length").map(String::as_str), Some("5"));
    }

    #[tokio::test]
    async fn test_throttle_interval() {
        let mut throttle = ProgressThrottle::new(Duration::from_millis(20));
        assert!(throttle.is_due());
        throttle.mark(10);
        assert!(!throttle.is_due());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(throttle.is_due());

        assert!(!throttle.needs_final(10));
        assert!(throttle.needs_final(20));
    }

    #[test]
    fn test_zero_interval_always_due() {
        let mut throttle = ProgressThrottle::new(Duration::ZERO);
        throttle.mark(1);
        assert!(throttle.is_due());
    }
}
