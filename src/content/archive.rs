use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
};

use tokio::task::spawn_blocking;
use zip::ZipArchive;

use crate::{
    error::{Error, Result, OK},
    format::format_path,
    path::is_git_internal,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntryInfo {
    pub name: String,
    pub size: u64,
}

/// Lists the file entries of a zip archive, leaving out directories and
/// anything inside a `.git` directory.
pub async fn list_archive(path: &Path) -> Result<Vec<ArchiveEntryInfo>> {
    let path = path.to_owned();
    spawn_blocking(move || list_archive_blocking(&path)).await?
}

fn list_archive_blocking(path: &Path) -> Result<Vec<ArchiveEntryInfo>> {
    let mut archive = open_archive(path)?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let file = archive
            .by_index_raw(index)
            .map_err(|err| Error::read(format_path(path), err))?;
        if file.is_dir() || is_git_internal(file.name()) {
            continue;
        }

        entries.push(ArchiveEntryInfo {
            name: file.name().to_owned(),
            size: file.size(),
        });
    }

    Ok(entries)
}

/// Reads a single entry, reopening the archive so that only this entry's
/// bytes are held in memory.
pub(super) async fn read_entry(archive: PathBuf, name: String, max_size: u64) -> Result<Vec<u8>> {
    spawn_blocking(move || read_entry_blocking(&archive, &name, max_size)).await?
}

fn read_entry_blocking(path: &Path, name: &str, max_size: u64) -> Result<Vec<u8>> {
    let label = format!("{}:{name}", path.display());
    let mut archive = open_archive(path)?;
    let mut file = archive
        .by_name(name)
        .map_err(|err| Error::read(&label, err))?;

    let declared = file.size();
    check_entry_size(&label, declared, max_size)?;

    let capacity = usize::try_from(declared).unwrap_or(0);
    let mut bytes = Vec::with_capacity(capacity);
    // the header may understate the size
    (&mut file)
        .take(max_size.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|err| Error::read(&label, err))?;
    check_entry_size(&label, bytes.len() as u64, max_size)?;
    Ok(bytes)
}

fn check_entry_size(label: &str, size: u64, max_size: u64) -> Result<()> {
    if size > max_size {
        return Err(Error::FileTooLarge {
            path: label.to_owned(),
            size,
            limit: max_size,
        });
    }

    OK
}

fn open_archive(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|err| Error::read(format_path(path), err))?;
    ZipArchive::new(BufReader::new(file)).map_err(|err| Error::read(format_path(path), err))
}
