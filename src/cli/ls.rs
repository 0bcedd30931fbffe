use crate::{error::Result, format::format_size};

use super::{
    args::{LsArgs, StatsType},
    print_stat, print_stats_json,
    storage::create_store,
};

pub async fn main(args: LsArgs) -> Result<()> {
    let store = create_store(&args.global)?;
    let repo = &args.repo;
    let mut entries = store
        .list_tree(&repo.owner, &repo.name, &repo.branch)
        .await?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));

    for entry in &entries {
        if args.long {
            let size = entry.size.map(format_size).unwrap_or_default();
            println!("{} {size:>10} {}", entry.object_id, entry.path);
        } else {
            println!("{}", entry.path);
        }
    }

    let stats = store.stats();
    match args.global.stats {
        Some(StatsType::Basic) => {
            print_stat("files", entries.len());
            print_stat("requests", stats.get_requests);
            print_stat("bytes downloaded", format_size(stats.bytes_downloaded));
        }
        Some(StatsType::Json) => {
            print_stats_json(&stats)?;
        }
        None => {}
    }

    Ok(())
}
