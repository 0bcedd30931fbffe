mod archive;
mod local;


use std::{fmt, path::PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use tokio::{fs, task::spawn_blocking};

use crate::{
    error::{Error, Result},
    store::{BoxedStore, ObjectId},
};

pub use self::{
    archive::{list_archive, ArchiveEntryInfo},
    local::collect_local,
};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Where the bytes of a pending entry come from. Nothing is read until
/// [`read_payload`] is called.
#[derive(Clone)]
pub enum ContentSource {
    Memory(Vec<u8>),
    File(PathBuf),
    ArchiveEntry {
        archive: PathBuf,
        name: String,
    },
    RemoteObject {
        store: BoxedStore,
        owner: String,
        repo: String,
        object_id: ObjectId,
    },
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Memory(bytes) => write!(f, "<{} bytes in memory>", bytes.len()),
            ContentSource::File(path) => write!(f, "{}", path.display()),
            ContentSource::ArchiveEntry { archive, name } => {
                write!(f, "{}:{name}", archive.display())
            }
            ContentSource::RemoteObject {
                owner,
                repo,
                object_id,
                ..
            } => write!(f, "{owner}/{repo}:{object_id}"),
        }
    }
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentSource({self})")
    }
}

/// A file waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub source_path: String,
    pub target_path: String,
    pub size_bytes: u64,
    pub content: ContentSource,
}

impl PendingEntry {
    pub fn new<S: Into<String>, T: Into<String>>(
        source_path: S,
        target_path: T,
        size_bytes: u64,
        content: ContentSource,
    ) -> Self {
        PendingEntry {
            source_path: source_path.into(),
            target_path: target_path.into(),
            size_bytes,
            content,
        }
    }

    pub fn from_memory<S: Into<String>>(path: S, bytes: Vec<u8>) -> Self {
        let path = path.into();
        let size = bytes.len() as u64;
        PendingEntry::new(path.clone(), path, size, ContentSource::Memory(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Base64-encoded content
    pub content: String,
    /// Decoded size in bytes
    pub size: u64,
}

/// Reads and encodes the content of `source`, refusing anything larger
/// than `max_size` bytes. Files and archive entries are checked against
/// their declared size before being read.
pub async fn read_payload(source: &ContentSource, max_size: u64) -> Result<Payload> {
    match source {
        ContentSource::Memory(bytes) => {
            check_size(source, bytes.len() as u64, max_size)?;
            encode(bytes.clone()).await
        }
        ContentSource::File(path) => {
            let metadata = fs::metadata(path)
                .await
                .map_err(|err| Error::read(source, err))?;
            if !metadata.is_file() {
                return Err(Error::read(source, "not a regular file"));
            }

            check_size(source, metadata.len(), max_size)?;
            let bytes = fs::read(path).await.map_err(|err| Error::read(source, err))?;
            check_size(source, bytes.len() as u64, max_size)?;
            encode(bytes).await
        }
        ContentSource::ArchiveEntry { archive, name } => {
            let bytes = archive::read_entry(archive.clone(), name.clone(), max_size).await?;
            encode(bytes).await
        }
        ContentSource::RemoteObject {
            store,
            owner,
            repo,
            object_id,
        } => {
            let content = store
                .get_content_object(owner, repo, object_id)
                .await
                .map_err(|err| Error::read(source, err))?;
            let size = decoded_size(source, content.clone()).await?;
            check_size(source, size, max_size)?;
            Ok(Payload { content, size })
        }
    }
}

fn check_size(source: &ContentSource, size: u64, limit: u64) -> Result<()> {
    if size > limit {
        Err(Error::FileTooLarge {
            path: source.to_string(),
            size,
            limit,
        })
    } else {
        Ok(())
    }
}

async fn encode(bytes: Vec<u8>) -> Result<Payload> {
    let size = bytes.len() as u64;
    let content = spawn_blocking(move || BASE64_STANDARD.encode(bytes)).await?;
    Ok(Payload { content, size })
}

async fn decoded_size(source: &ContentSource, content: String) -> Result<u64> {
    let decoded = spawn_blocking(move || BASE64_STANDARD.decode(content)).await?;
    let bytes = decoded.map_err(|err| Error::read(source, err))?;
    Ok(bytes.len() as u64)
}
