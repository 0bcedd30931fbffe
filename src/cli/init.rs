use clap::builder::styling::AnsiColor;
use log::info;

use crate::{error::Result, format::format_short_id};

use super::{args::InitArgs, storage::create_local_store};

pub async fn main(args: InitArgs) -> Result<()> {
    let store = create_local_store(&args.global)?;
    let repo = args.repo;
    let commit_id = store
        .init_repository(&repo.owner, &repo.name, &repo.branch)
        .await?;

    let style = AnsiColor::Green.on_default();
    info!(
        "{style}created repository{style:#} {repo} at {}",
        format_short_id(&commit_id)
    );
    Ok(())
}
