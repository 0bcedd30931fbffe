#[cfg(test)]
mod tests;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use clap::builder::styling::AnsiColor;
use itertools::Itertools;
use log::{debug, info, warn};
use tokio::time::sleep;

use crate::{
    commit::ProcessedEntry,
    content::{read_payload, PendingEntry, DEFAULT_MAX_FILE_SIZE},
    error::{Error, Result},
    format::format_size,
    path,
    progress::{FileError, ProgressSender, ProgressTracker, UploadProgress},
    retry::{classify_remote, RetryPolicy},
    store::{BoxedStore, RepositoryRef, FILE_MODE},
    task::BoundedJoinSet,
};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(1000);

const RUN_ERROR_NAME: &str = "batch processing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub max_file_size: u64,
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Shared flag for stopping a run between batches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct BatchReport {
    /// Every entry whose content object was created, in no particular order
    pub processed: Vec<ProcessedEntry>,
    /// Final progress, including per-file errors
    pub progress: UploadProgress,
}

#[derive(Debug)]
enum FileOutcome {
    Processed(ProcessedEntry),
    Skipped(String),
    Failed(FileError),
}

#[derive(Debug)]
struct BatchState {
    store: BoxedStore,
    repo: RepositoryRef,
    config: BatchConfig,
}

/// Creates remote content objects for pending entries, a fixed number at a
/// time. Batches run one after another; the files of a batch run
/// concurrently.
pub struct BatchProcessor {
    state: Arc<BatchState>,
    cancel: CancelFlag,
    progress: Option<ProgressSender>,
}

impl BatchProcessor {
    pub fn new(store: BoxedStore, repo: RepositoryRef, config: BatchConfig) -> Self {
        let state = BatchState {
            store,
            repo,
            config,
        };

        BatchProcessor {
            state: Arc::new(state),
            cancel: CancelFlag::new(),
            progress: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub async fn run(&self, entries: Vec<PendingEntry>) -> Result<BatchReport> {
        let tracker = ProgressTracker::new(self.progress.clone());
        let total_files = entries.len();
        let batches = partition(entries, self.state.config.batch_size);
        let total_batches = batches.len();

        tracker.start(
            total_files,
            total_batches,
            format!("uploading {total_files} file(s) in {total_batches} batch(es)"),
        );

        let mut processed = Vec::with_capacity(total_files);
        for (index, batch) in batches.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("upload cancelled before batch {}/{total_batches}", index + 1);
                tracker.fail(Error::Cancelled.to_string());
                return Err(Error::Cancelled);
            }

            let number = index + 1;
            let message = format!("processing batch {number}/{total_batches}");
            info!("{message} ({} file(s))", batch.len());
            tracker.begin_batch(number, message);

            if let Err(err) = self.run_batch(&tracker, batch, &mut processed).await {
                tracker.record_error(FileError {
                    file_name: RUN_ERROR_NAME.to_owned(),
                    path: String::new(),
                    error: err.to_string(),
                });
                tracker.fail(format!("upload failed: {err}"));
                return Err(Error::RunAborted(err.to_string()));
            }

            if number < total_batches {
                sleep(self.state.config.inter_batch_delay).await;
            }
        }

        let progress = tracker.snapshot();
        let message = format!(
            "uploaded {} of {total_files} file(s), {} error(s)",
            processed.len(),
            progress.errors.len()
        );
        tracker.complete(message);

        Ok(BatchReport {
            processed,
            progress: tracker.snapshot(),
        })
    }

    async fn run_batch(
        &self,
        tracker: &ProgressTracker,
        batch: Vec<PendingEntry>,
        processed: &mut Vec<ProcessedEntry>,
    ) -> Result<()> {
        let mut tasks = BoundedJoinSet::new(self.state.config.batch_size);
        for (position, entry) in batch.into_iter().enumerate() {
            let state = self.state.clone();
            tasks
                .spawn(async move { (position, process_entry(state, entry).await) })
                .await?;
        }

        // processed entries stay in input order
        let mut finished = vec![];
        while let Some(result) = tasks.join_next().await {
            let (position, outcome) = result?;
            match outcome {
                FileOutcome::Processed(entry) => {
                    let message = format!("uploaded {}", entry.target_path);
                    finished.push((position, entry));
                    tracker.file_finished(None, message);
                }
                FileOutcome::Skipped(source_path) => {
                    tracker.file_finished(None, format!("skipped {source_path}"));
                }
                FileOutcome::Failed(error) => {
                    let message = format!("failed {}", error.path);
                    tracker.file_finished(Some(error), message);
                }
            }
        }

        finished.sort_unstable_by_key(|(position, _)| *position);
        processed.extend(finished.into_iter().map(|(_, entry)| entry));
        Ok(())
    }
}

/// Splits `items` into consecutive batches of `batch_size`, the last one
/// possibly smaller.
pub fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    items
        .into_iter()
        .chunks(batch_size.max(1))
        .into_iter()
        .map(Iterator::collect)
        .collect()
}

async fn process_entry(state: Arc<BatchState>, entry: PendingEntry) -> FileOutcome {
    let target_path = path::sanitize(&entry.target_path);
    if path::is_skippable(&target_path) {
        debug!("skipped {} (no usable path)", entry.source_path);
        return FileOutcome::Skipped(entry.source_path);
    }

    let payload = match read_payload(&entry.content, state.config.max_file_size).await {
        Ok(payload) => payload,
        Err(err) => return FileOutcome::Failed(file_error(&entry.source_path, &err)),
    };

    let RepositoryRef { owner, name, .. } = &state.repo;
    let content = payload.content.as_str();
    let result = state
        .config
        .retry
        .run(
            || state.store.create_content_object(owner, name, content),
            classify_remote,
            |err, retry, wait| {
                warn!(
                    "retrying {target_path} in {} (retry {retry}): {err}",
                    humantime::format_duration(wait)
                );
            },
        )
        .await;

    match result {
        Ok(object_id) => {
            let msg_style = AnsiColor::Blue.on_default();
            let size_style = AnsiColor::BrightBlack.on_default();
            debug!(
                "{msg_style}uploaded file{msg_style:#} {target_path} {size_style}({}){size_style:#}",
                format_size(payload.size)
            );

            FileOutcome::Processed(ProcessedEntry {
                target_path,
                mode: FILE_MODE.to_owned(),
                object_id,
                source_path: entry.source_path,
            })
        }
        Err(failure) => {
            let err = failure.into_object_creation_error(&target_path);
            FileOutcome::Failed(file_error(&entry.source_path, &err))
        }
    }
}

fn file_error(source_path: &str, err: &Error) -> FileError {
    let style = AnsiColor::Red.on_default();
    debug!("{style}failed{style:#} {source_path}: {err}");

    FileError {
        file_name: path::file_name(source_path).to_owned(),
        path: source_path.to_owned(),
        error: err.to_string(),
    }
}
