use itertools::Itertools;

use crate::{
    batch::CancelFlag,
    consolidate::Consolidator,
    content::collect_local,
    error::Result,
    format::format_path,
    progress::progress_channel,
    stats::CommandStats,
};

use super::{
    args::UploadArgs,
    common::{
        cancel_on_ctrl_c, conflict_resolver, finish_run, report_uncommitted, spawn_progress_logger,
        stage_logger,
    },
    storage::create_store,
};

pub async fn main(args: UploadArgs) -> Result<()> {
    let mut stats = CommandStats::new();
    let store = create_store(&args.global)?;

    let entries = collect_local(&args.paths, "", !args.keep_archives).await?;
    stats.files_total = entries.len() as u64;
    let descriptor = args.paths.iter().map(|path| format_path(path)).join(", ");

    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());
    let (sender, receiver) = progress_channel();
    let progress_logger = spawn_progress_logger(receiver);

    let result = Consolidator::new(
        store.clone(),
        args.repo,
        args.batch.config(),
        conflict_resolver(args.on_conflict),
    )
    .with_cancel(cancel)
    .with_progress(sender)
    .with_stage_observer(stage_logger())
    .upload(&descriptor, &args.prefix, entries, &args.message)
    .await;

    progress_logger.await?;
    let report = result.map_err(report_uncommitted)?;
    finish_run(&report, stats, &store, args.global.stats)
}
