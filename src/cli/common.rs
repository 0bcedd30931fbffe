use std::sync::Arc;

use clap::builder::styling::AnsiColor;
use humantime::format_duration;
use log::{debug, info, warn};
use tokio::{signal, spawn, task::JoinHandle};

use crate::{
    batch::CancelFlag,
    commit::{AssemblyStage, StageObserver},
    conflict::{ConflictResolution, ConflictResolver, FixedResolver},
    consolidate::ConsolidationReport,
    error::{Error, Result},
    format::{format_eta, format_short_id, format_size},
    progress::{FileError, ProgressReceiver, UploadStatus},
    stats::CommandStats,
    store::BoxedStore,
};

use super::{
    args::{ConflictChoice, StatsType},
    print_stat, print_stats_json,
    prompt::PromptResolver,
};

pub fn conflict_resolver(choice: ConflictChoice) -> Arc<dyn ConflictResolver> {
    match choice {
        ConflictChoice::Ask => Arc::new(PromptResolver),
        ConflictChoice::Replace => Arc::new(FixedResolver(ConflictResolution::Replace)),
        ConflictChoice::Skip => Arc::new(FixedResolver(ConflictResolution::Skip)),
        ConflictChoice::Cancel => Arc::new(FixedResolver(ConflictResolution::Cancel)),
    }
}

/// Sets `cancel` on the first Ctrl-C. The batch in flight still finishes.
pub fn cancel_on_ctrl_c(cancel: CancelFlag) {
    spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("stopping after the current batch");
            cancel.cancel();
        }
    });
}

/// Logs progress snapshots until every sender is gone.
pub fn spawn_progress_logger(receiver: ProgressReceiver) -> JoinHandle<()> {
    spawn(async move {
        let mut current_batch = 0;
        while let Ok(progress) = receiver.recv().await {
            if progress.status == UploadStatus::Processing && progress.current_batch != current_batch {
                current_batch = progress.current_batch;
                let remaining = progress
                    .estimated_time_remaining_ms
                    .map(|ms| format!(", about {} left", format_eta(ms)))
                    .unwrap_or_default();

                let style = AnsiColor::Cyan.on_default();
                info!(
                    "{style}batch {current_batch}/{}{style:#} ({:.0}% done{remaining})",
                    progress.total_batches,
                    progress.percentage()
                );
            } else {
                debug!("{}", progress.current_message);
            }
        }
    })
}

pub fn stage_logger() -> StageObserver {
    Box::new(|stage: AssemblyStage, message: &str| {
        let style = AnsiColor::BrightBlack.on_default();
        debug!("{style}[{stage}]{style:#} {message}");
    })
}

fn warn_file_errors(errors: &[FileError]) {
    for error in errors {
        warn!("{}: {}", error.path, error.error);
    }
}

/// Reports the files that failed in a run that ended without a commit.
pub fn report_uncommitted(error: Error) -> Error {
    warn_file_errors(error.file_errors());
    error
}

/// Reports per-file failures and prints stats for a finished run.
pub fn finish_run(
    report: &ConsolidationReport,
    mut stats: CommandStats,
    store: &BoxedStore,
    stats_type: Option<StatsType>,
) -> Result<()> {
    warn_file_errors(&report.errors);

    let style = AnsiColor::Green.on_default();
    info!("{style}created commit{style:#} {}", format_short_id(&report.commit_id));

    stats.add_report(report);
    let full_stats = stats.finalize(store.stats());

    match stats_type {
        Some(StatsType::Basic) => {
            print_stat("files found", full_stats.files_total);
            print_stat("files uploaded", full_stats.files_uploaded);
            print_stat("files failed", full_stats.files_failed);
            print_stat("conflicts skipped", full_stats.conflicts_skipped);
            print_stat("bytes uploaded", format_size(full_stats.store.bytes_uploaded));
            print_stat("bytes downloaded", format_size(full_stats.store.bytes_downloaded));
            print_stat(
                "requests",
                full_stats.store.get_requests + full_stats.store.put_requests,
            );
            print_stat("failed requests", full_stats.store.failed_requests);
            print_stat("elapsed time", format_duration(full_stats.elapsed_time()));
        }
        Some(StatsType::Json) => {
            print_stats_json(&full_stats)?;
        }
        None => {}
    }

    Ok(())
}
