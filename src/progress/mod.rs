#[cfg(test)]
mod tests;

use std::sync::Mutex;

use async_channel::{Receiver, Sender};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Idle,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file_name: String,
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadProgress {
    pub total_files: usize,
    pub processed_files: usize,
    pub current_batch: usize,
    pub total_batches: usize,
    pub status: UploadStatus,
    pub current_message: String,
    pub errors: Vec<FileError>,
    pub start_time: Option<DateTime<Utc>>,
    pub estimated_time_remaining_ms: Option<u64>,
}

impl UploadProgress {
    pub fn new() -> Self {
        UploadProgress {
            total_files: 0,
            processed_files: 0,
            current_batch: 0,
            total_batches: 0,
            status: UploadStatus::Idle,
            current_message: String::new(),
            errors: vec![],
            start_time: None,
            estimated_time_remaining_ms: None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        if self.total_files == 0 {
            if self.status == UploadStatus::Completed {
                100.0
            } else {
                0.0
            }
        } else {
            self.processed_files as f64 * 100.0 / self.total_files as f64
        }
    }
}

impl Default for UploadProgress {
    fn default() -> Self {
        UploadProgress::new()
    }
}

pub type ProgressSender = Sender<UploadProgress>;
pub type ProgressReceiver = Receiver<UploadProgress>;

/// Creates the stream a caller reads progress snapshots from.
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    async_channel::unbounded()
}

#[derive(Debug)]
struct TrackerState {
    progress: UploadProgress,
    started: Option<Instant>,
}

/// Owns the progress of one run. Every change publishes a full snapshot.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
    sender: Option<ProgressSender>,
}

impl ProgressTracker {
    pub fn new(sender: Option<ProgressSender>) -> Self {
        let state = TrackerState {
            progress: UploadProgress::new(),
            started: None,
        };

        ProgressTracker {
            state: Mutex::new(state),
            sender,
        }
    }

    pub fn snapshot(&self) -> UploadProgress {
        self.state.lock().unwrap().progress.clone()
    }

    /// Moves from idle to processing. Returns false in any other state.
    pub fn start<S: Into<String>>(&self, total_files: usize, total_batches: usize, message: S) -> bool {
        self.update(|state| {
            if state.progress.status != UploadStatus::Idle {
                return false;
            }

            state.started = Some(Instant::now());
            let progress = &mut state.progress;
            progress.status = UploadStatus::Processing;
            progress.total_files = total_files;
            progress.total_batches = total_batches;
            progress.start_time = Some(Utc::now());
            progress.current_message = message.into();
            true
        })
    }

    pub fn begin_batch<S: Into<String>>(&self, batch: usize, message: S) {
        self.update(|state| {
            state.progress.current_batch = batch;
            state.progress.current_message = message.into();
        });
    }

    /// Counts one finished file, successful or not.
    pub fn file_finished<S: Into<String>>(&self, error: Option<FileError>, message: S) {
        self.update(|state| {
            let progress = &mut state.progress;
            progress.processed_files = (progress.processed_files + 1).min(progress.total_files);
            progress.errors.extend(error);
            progress.current_message = message.into();

            let (processed, total) = (progress.processed_files, progress.total_files);
            progress.estimated_time_remaining_ms = state
                .started
                .and_then(|started| estimate_remaining_ms(started, processed, total));
        });
    }

    pub fn record_error(&self, error: FileError) {
        self.update(|state| state.progress.errors.push(error));
    }

    /// Moves from processing to completed. Returns false in any other state.
    pub fn complete<S: Into<String>>(&self, message: S) -> bool {
        self.finish(UploadStatus::Completed, message.into())
    }

    /// Moves from processing to error. Returns false in any other state.
    pub fn fail<S: Into<String>>(&self, message: S) -> bool {
        self.finish(UploadStatus::Error, message.into())
    }

    fn finish(&self, status: UploadStatus, message: String) -> bool {
        self.update(|state| {
            if state.progress.status != UploadStatus::Processing {
                return false;
            }

            state.progress.status = status;
            state.progress.current_message = message;
            state.progress.estimated_time_remaining_ms = None;
            true
        })
    }

    fn update<T, F: FnOnce(&mut TrackerState) -> T>(&self, f: F) -> T {
        let (value, snapshot) = {
            let mut state = self.state.lock().unwrap();
            let value = f(&mut state);
            (value, state.progress.clone())
        };

        if let Some(sender) = &self.sender {
            // receiver may be gone
            let _ = sender.try_send(snapshot);
        }

        value
    }
}

fn estimate_remaining_ms(started: Instant, processed: usize, total: usize) -> Option<u64> {
    if processed == 0 {
        return None;
    }

    let elapsed = started.elapsed().as_millis();
    let remaining = (total - processed) as u128;
    let estimate = elapsed * remaining / processed as u128;
    Some(u64::try_from(estimate).unwrap_or(u64::MAX))
}
