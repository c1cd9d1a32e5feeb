//! Destinations for download events

use fsbridge_types::DownloadEvent;
use tokio::sync::{broadcast, mpsc};

/// Receives the events of every job a manager runs
///
/// `emit` is called from the job's task while its emission gate is held, so
/// implementations must not block.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: DownloadEvent);
}

impl EventSink for broadcast::Sender<DownloadEvent> {
    fn emit(&self, event: DownloadEvent) {
        // No subscribers is fine
        let _ = self.send(event);
    }
}

impl EventSink for mpsc::UnboundedSender<DownloadEvent> {
    fn emit(&self, event: DownloadEvent) {
        let _ = self.send(event);
    }
}
