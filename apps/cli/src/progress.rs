//! Progress bars driven by download events

use console::style;
use fsbridge_types::{DownloadEvent, DownloadOutcome, JobId, UNKNOWN_LENGTH};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec}) {msg}";

/// Manages progress bars for running downloads
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: HashMap<JobId, ProgressBar>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    /// Show a placeholder while the job connects
    pub fn add_job(&mut self, job_id: JobId, label: &str) {
        let pb = self.multi.add(ProgressBar::new_spinner());
        if let Ok(spinner) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
            pb.set_style(spinner);
        }
        pb.set_message(format!("{} connecting", label));
        self.bars.insert(job_id, pb);
    }

    /// Update a bar from an event; returns true once the job has finished
    pub fn handle_event(&mut self, event: &DownloadEvent) -> bool {
        let Some(pb) = self.bars.get(&event.job_id()) else {
            return false;
        };

        match event {
            DownloadEvent::Begin(begin) => {
                if begin.content_length != UNKNOWN_LENGTH {
                    pb.set_length(begin.content_length as u64);
                    if let Ok(bar) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                        pb.set_style(bar.progress_chars("█▓▒░  "));
                    }
                }
                pb.set_message(format!("HTTP {}", begin.status_code));
                false
            }

            DownloadEvent::Progress(progress) => {
                pb.set_position(progress.bytes_written);
                false
            }

            DownloadEvent::Result(result) => {
                match &result.outcome {
                    DownloadOutcome::Success => {
                        pb.finish_with_message(format!(
                            "{} Download complete",
                            style("✓").green().bold()
                        ));
                    }
                    DownloadOutcome::Failure { message, .. } => {
                        pb.abandon_with_message(format!(
                            "{} Failed: {}",
                            style("✗").red().bold(),
                            message
                        ));
                    }
                }
                self.bars.remove(&result.job_id);
                true
            }
        }
    }

    /// Mark a job as stopped by the user
    pub fn stopped(&mut self, job_id: JobId) {
        if let Some(pb) = self.bars.remove(&job_id) {
            pb.abandon_with_message(format!("{} Stopped", style("○").dim()));
        }
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsbridge_types::{DownloadBegin, DownloadProgress as Progress, DownloadResult};
    use indicatif::ProgressDrawTarget;

    #[test]
    fn test_bar_follows_job_events() {
        let mut progress = DownloadProgress::new();
        progress.multi.set_draw_target(ProgressDrawTarget::hidden());
        progress.add_job(1, "file.bin");

        let begin = DownloadEvent::Begin(DownloadBegin {
            job_id: 1,
            status_code: 200,
            content_length: 100,
            headers: Default::default(),
        });
        assert!(!progress.handle_event(&begin));
        assert_eq!(progress.bars[&1].length(), Some(100));

        let step = DownloadEvent::Progress(Progress {
            job_id: 1,
            content_length: 100,
            bytes_written: 40,
        });
        progress.handle_event(&step);
        assert_eq!(progress.bars[&1].position(), 40);

        let done = DownloadEvent::Result(DownloadResult {
            job_id: 1,
            status_code: Some(200),
            bytes_written: 100,
            outcome: DownloadOutcome::Success,
        });
        assert!(progress.handle_event(&done));
        assert!(progress.bars.is_empty());
    }

    #[test]
    fn test_events_of_other_jobs_ignored() {
        let mut progress = DownloadProgress::new();
        progress.multi.set_draw_target(ProgressDrawTarget::hidden());

        let done = DownloadEvent::Result(DownloadResult {
            job_id: 9,
            status_code: None,
            bytes_written: 0,
            outcome: DownloadOutcome::Success,
        });
        assert!(!progress.handle_event(&done));
    }
}
