use std::path::{Path, PathBuf};

use clap::builder::styling::AnsiColor;
use log::{debug, warn};
use tokio::{fs, task::spawn_blocking};
use walkdir::WalkDir;

use crate::{
    error::{Error, Result},
    format::{format_path, format_size},
    path,
};

use super::{list_archive, ContentSource, PendingEntry};

const GIT_DIR: &str = ".git";
const ARCHIVE_EXTENSION: &str = "zip";

/// Turns local files and directories into pending entries under `prefix`.
///
/// A file lands at `prefix/<file name>`. A directory contributes its files
/// at their path relative to the directory, skipping `.git`. When
/// `expand_archives` is set, a `.zip` file given directly contributes its
/// entries instead of itself.
pub async fn collect_local<P: AsRef<Path>>(
    paths: &[P],
    prefix: &str,
    expand_archives: bool,
) -> Result<Vec<PendingEntry>> {
    let mut entries = vec![];

    for path in paths {
        let path = path.as_ref();
        let metadata = fs::metadata(path)
            .await
            .map_err(|err| Error::read(format_path(path), err))?;

        if metadata.is_dir() {
            let files = walk_dir(path.to_owned()).await?;
            for (local_path, relative, size) in files {
                entries.push(file_entry(local_path, &relative, prefix, size));
            }
        } else if expand_archives && is_archive(path) {
            let archive_entries = list_archive(path).await?;
            let style = AnsiColor::Magenta.on_default();
            debug!(
                "{style}expanded archive{style:#} {} ({} entries)",
                format_path(path),
                archive_entries.len()
            );

            for info in archive_entries {
                let content = ContentSource::ArchiveEntry {
                    archive: path.to_owned(),
                    name: info.name.clone(),
                };
                let source_path = format!("{}:{}", path.display(), info.name);
                let target_path = path::join(prefix, &info.name);
                entries.push(PendingEntry::new(source_path, target_path, info.size, content));
            }
        } else {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push(file_entry(path.to_owned(), &name, prefix, metadata.len()));
        }
    }

    let total_size: u64 = entries.iter().map(|entry| entry.size_bytes).sum();
    debug!(
        "collected {} file(s) ({})",
        entries.len(),
        format_size(total_size)
    );
    Ok(entries)
}

fn file_entry(local_path: PathBuf, relative: &str, prefix: &str, size: u64) -> PendingEntry {
    let source_path = local_path.to_string_lossy().into_owned();
    let target_path = path::join(prefix, relative);
    PendingEntry::new(source_path, target_path, size, ContentSource::File(local_path))
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

async fn walk_dir(root: PathBuf) -> Result<Vec<(PathBuf, String, u64)>> {
    spawn_blocking(move || walk_dir_blocking(&root)).await?
}

fn walk_dir_blocking(root: &Path) -> Result<Vec<(PathBuf, String, u64)>> {
    let mut files = vec![];
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != GIT_DIR);

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                handle_walkdir_error(err)?;
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                handle_walkdir_error(err)?;
                continue;
            }
        };

        let relative = entry
            .path()
            .strip_prefix(root)?
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((entry.path().to_owned(), relative, size));
    }

    Ok(files)
}

fn handle_walkdir_error(err: walkdir::Error) -> Result<()> {
    if let Some(io_err) = err.io_error() {
        if let Some(path) = err.path() {
            let formatted_path = format_path(path);
            warn!("skipped file {formatted_path} ({io_err})");
        } else {
            warn!("skipped file ({io_err})");
        }

        Ok(())
    } else {
        Err(err.into())
    }
}
