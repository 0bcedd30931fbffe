use log::info;

use crate::{
    batch::CancelFlag,
    consolidate::{remote_source, Consolidator},
    error::Result,
    progress::progress_channel,
    stats::CommandStats,
};

use super::{
    args::ConsolidateArgs,
    common::{
        cancel_on_ctrl_c, conflict_resolver, finish_run, report_uncommitted, spawn_progress_logger,
        stage_logger,
    },
    storage::create_store,
};

pub async fn main(args: ConsolidateArgs) -> Result<()> {
    let mut stats = CommandStats::new();
    let store = create_store(&args.global)?;

    let mut sources = Vec::with_capacity(args.sources.len());
    for spec in &args.sources {
        let source = remote_source(store.clone(), &spec.repo, &spec.selections, &spec.prefix).await?;
        info!("found {} file(s) in {}", source.entries.len(), spec.repo);
        stats.files_total += source.entries.len() as u64;
        sources.push(source);
    }

    let cancel = CancelFlag::new();
    cancel_on_ctrl_c(cancel.clone());
    let (sender, receiver) = progress_channel();
    let progress_logger = spawn_progress_logger(receiver);

    let result = Consolidator::new(
        store.clone(),
        args.target,
        args.batch.config(),
        conflict_resolver(args.on_conflict),
    )
    .with_cancel(cancel)
    .with_progress(sender)
    .with_stage_observer(stage_logger())
    .run(sources, &args.message)
    .await;

    progress_logger.await?;
    let report = result.map_err(report_uncommitted)?;
    finish_run(&report, stats, &store, args.global.stats)
}
