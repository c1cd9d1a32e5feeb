//! Registry of in-flight download jobs
//!
//! Every structural change goes through one mutex. Entries carry a
//! generation so a finishing task can only ever remove its own entry,
//! even if `stop` already evicted it and a new job reused the id.

use crate::error::BridgeError;
use fsbridge_types::{DownloadEvent, JobId, JobSnapshot, JobState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::sink::EventSink;

/// Serializes a job's emissions against `stop`
///
/// Events are emitted while holding the lock and only while the gate is
/// open. Closing it therefore waits out an emission in progress, and nothing
/// gets through afterwards.
#[derive(Debug, Clone)]
pub(crate) struct EmissionGate(Arc<Mutex<bool>>);

impl EmissionGate {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }

    /// Returns false if the gate was already closed
    pub(crate) fn emit(&self, sink: &dyn EventSink, event: DownloadEvent) -> bool {
        let open = self.0.lock();
        if *open {
            sink.emit(event);
        }
        *open
    }

    pub(crate) fn close(&self) {
        *self.0.lock() = false;
    }
}

/// Live counters of a job, shared between its task and the registry
#[derive(Debug)]
pub(crate) struct JobProgress {
    state: Mutex<JobState>,
    content_length: AtomicI64,
    bytes_written: AtomicU64,
}

impl JobProgress {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(JobState::Submitted),
            content_length: AtomicI64::new(fsbridge_types::UNKNOWN_LENGTH),
            bytes_written: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_state(&self, state: JobState) {
        *self.state.lock() = state;
    }

    pub(crate) fn state(&self) -> JobState {
        *self.state.lock()
    }

    pub(crate) fn set_content_length(&self, length: i64) {
        self.content_length.store(length, Ordering::Release);
    }

    pub(crate) fn set_bytes_written(&self, bytes: u64) {
        self.bytes_written.store(bytes, Ordering::Release);
    }

    fn snapshot(&self, job_id: JobId) -> JobSnapshot {
        JobSnapshot {
            job_id,
            state: self.state(),
            content_length: self.content_length.load(Ordering::Acquire),
            bytes_written: self.bytes_written.load(Ordering::Acquire),
        }
    }
}

/// Registry entry for one in-flight job
pub(crate) struct JobHandle {
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) gate: EmissionGate,
    pub(crate) progress: Arc<JobProgress>,
    pub(crate) task: JoinHandle<()>,
}

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<JobId, JobHandle>,
    next_generation: u64,
}

#[derive(Clone, Default)]
pub(crate) struct JobRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl JobRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert the handle produced by `build`, which runs under the registry lock
    ///
    /// `build` receives the entry's generation. Because the task it spawns
    /// has to take the same lock to deregister, the entry is always in place
    /// before the task can try to remove it.
    pub(crate) fn insert_with<F>(&self, job_id: JobId, build: F) -> Result<(), BridgeError>
    where
        F: FnOnce(u64) -> JobHandle,
    {
        let mut inner = self.inner.lock();
        if inner.jobs.contains_key(&job_id) {
            return Err(BridgeError::JobAlreadyActive(job_id));
        }

        inner.next_generation += 1;
        let generation = inner.next_generation;
        let handle = build(generation);
        inner.jobs.insert(job_id, handle);
        Ok(())
    }

    /// Remove whatever entry `job_id` has; idempotent
    pub(crate) fn remove(&self, job_id: JobId) -> Option<JobHandle> {
        self.inner.lock().jobs.remove(&job_id)
    }

    /// Remove the entry only if it is still the one created at `generation`
    pub(crate) fn remove_if(&self, job_id: JobId, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        match inner.jobs.get(&job_id) {
            Some(handle) if handle.generation == generation => {
                inner.jobs.remove(&job_id);
                true
            }
            _ => false,
        }
    }

    /// Remove every entry, e.g. on shutdown
    pub(crate) fn drain(&self) -> Vec<(JobId, JobHandle)> {
        self.inner.lock().jobs.drain().collect()
    }

    pub(crate) fn contains(&self, job_id: JobId) -> bool {
        self.inner.lock().jobs.contains_key(&job_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub(crate) fn ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.inner.lock().jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn snapshot(&self, job_id: JobId) -> Option<JobSnapshot> {
        self.inner
            .lock()
            .jobs
            .get(&job_id)
            .map(|handle| handle.progress.snapshot(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsbridge_types::DownloadProgress;
    use tokio::sync::mpsc;

    fn idle_handle(generation: u64) -> JobHandle {
        JobHandle {
            generation,
            cancel: CancellationToken::new(),
            gate: EmissionGate::new(),
            progress: Arc::new(JobProgress::new()),
            task: tokio::spawn(async {}),
        }
    }

    #[tokio::test]
    async fn test_one_handle_per_job() {
        let registry = JobRegistry::new();
        registry.insert_with(1, idle_handle).unwrap();

        let err = registry.insert_with(1, idle_handle).unwrap_err();
        assert!(matches!(err, BridgeError::JobAlreadyActive(1)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = JobRegistry::new();
        registry.insert_with(5, idle_handle).unwrap();

        assert!(registry.remove(5).is_some());
        assert!(registry.remove(5).is_none());
        assert!(!registry.contains(5));
    }

    #[tokio::test]
    async fn test_stale_generation_does_not_evict_new_job() {
        let registry = JobRegistry::new();
        registry.insert_with(9, idle_handle).unwrap();
        let first = registry.remove(9).unwrap().generation;

        registry.insert_with(9, idle_handle).unwrap();
        assert!(!registry.remove_if(9, first));
        assert!(registry.contains(9));

        assert!(registry.remove_if(9, first + 1));
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_ids_sorted_and_snapshot() {
        let registry = JobRegistry::new();
        for id in [3, 1, 2] {
            registry.insert_with(id, idle_handle).unwrap();
        }
        assert_eq!(registry.ids(), vec![1, 2, 3]);

        let snapshot = registry.snapshot(2).unwrap();
        assert_eq!(snapshot.state, JobState::Submitted);
        assert_eq!(snapshot.content_length, fsbridge_types::UNKNOWN_LENGTH);
        assert!(registry.snapshot(4).is_none());
    }

    #[test]
    fn test_closed_gate_drops_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gate = EmissionGate::new();
        let event = DownloadEvent::Progress(DownloadProgress {
            job_id: 1,
            content_length: 10,
            bytes_written: 1,
        });

        assert!(gate.emit(&tx, event.clone()));
        gate.clone().close();
        assert!(!gate.emit(&tx, event.clone()));

        assert_eq!(rx.try_recv().unwrap(), event);
        assert!(rx.try_recv().is_err());
    }
}
