use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    fs,
    task::spawn_blocking,
    time::{sleep, Instant},
};

use crate::{
    error::{Error, Result, OK},
    path::is_legal_tree_path,
};

use super::{ObjectId, RemoteStore, StoreStats, TreeEntry, FILE_MODE};

const BLOBS_DIR: &str = "blobs";
const TREES_DIR: &str = "trees";
const COMMITS_DIR: &str = "commits";
const HEADS_DIR: &str = "refs/heads";

const ALLOWED_MODES: &[&str] = &[FILE_MODE, "100755"];
const INITIAL_COMMIT_MESSAGE: &str = "initial commit";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeRecord {
    mode: String,
    object_id: ObjectId,
}

type TreeMap = BTreeMap<String, TreeRecord>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitRecord {
    tree: ObjectId,
    parents: Vec<ObjectId>,
    message: String,
    created: DateTime<Utc>,
}

/// A content-addressed repository store kept in a local directory, laid out
/// as `OWNER/REPO/{blobs,trees,commits,refs/heads}`.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    latency: Option<Duration>,
    temp_counter: AtomicU64,
    stats: Arc<Mutex<StoreStats>>,
}

impl LocalStore {
    pub fn new<P: Into<PathBuf>>(path: P, latency: Option<Duration>) -> Self {
        LocalStore {
            path: path.into(),
            latency,
            temp_counter: AtomicU64::new(0),
            stats: Arc::new(Mutex::new(StoreStats::new())),
        }
    }

    /// Creates an empty repository whose `branch` points at a root commit
    /// with an empty tree.
    pub async fn init_repository(&self, owner: &str, repo: &str, branch: &str) -> Result<ObjectId> {
        let repo_path = self.repo_path(owner, repo)?;
        if fs::try_exists(&repo_path).await? {
            return Err(Error::RepositoryExists(format!("{owner}/{repo}")));
        }

        for dir in [BLOBS_DIR, TREES_DIR, COMMITS_DIR, HEADS_DIR] {
            fs::create_dir_all(repo_path.join(dir)).await?;
        }

        let tree_id = self.write_json(&repo_path, TREES_DIR, &TreeMap::new()).await?;
        let commit = CommitRecord {
            tree: tree_id,
            parents: vec![],
            message: INITIAL_COMMIT_MESSAGE.to_owned(),
            created: Utc::now(),
        };
        let commit_id = self.write_json(&repo_path, COMMITS_DIR, &commit).await?;
        self.write_ref(&repo_path, branch, &commit_id).await?;
        Ok(commit_id)
    }

    fn repo_path(&self, owner: &str, repo: &str) -> Result<PathBuf> {
        let is_valid = |part: &str| is_legal_tree_path(part) && !part.contains('/');
        if is_valid(owner) && is_valid(repo) {
            Ok(self.path.join(owner).join(repo))
        } else {
            Err(Error::InvalidRepository(format!("{owner}/{repo}")))
        }
    }

    async fn existing_repo_path(&self, owner: &str, repo: &str) -> Result<PathBuf> {
        let repo_path = self.repo_path(owner, repo)?;
        if fs::try_exists(&repo_path).await? {
            Ok(repo_path)
        } else {
            self.stats.lock().unwrap().add_failure();
            Err(Error::RemotePermanent {
                status: 404,
                message: format!("repository `{owner}/{repo}` not found"),
            })
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
    }

    async fn read_object(&self, repo_path: &Path, kind: &str, id: &ObjectId) -> Result<Vec<u8>> {
        if !is_object_id(id.as_str()) {
            return Err(Error::ItemNotFound(id.to_string()));
        }

        let start_time = Instant::now();
        let path = repo_path.join(kind).join(id.as_str());
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.stats.lock().unwrap().add_failure();
                return Err(Error::ItemNotFound(id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let end_time = Instant::now();
        let size = bytes.len() as u64;
        self.stats.lock().unwrap().add_get(start_time, end_time, size);
        Ok(bytes)
    }

    async fn write_object(&self, repo_path: &Path, kind: &str, bytes: Vec<u8>) -> Result<ObjectId> {
        let start_time = Instant::now();
        let size = bytes.len() as u64;
        let (id, bytes) = spawn_blocking(move || {
            let id = blake3::hash(&bytes).to_hex().to_string();
            (ObjectId::new(id), bytes)
        })
        .await?;

        let path = repo_path.join(kind).join(id.as_str());
        if !fs::try_exists(&path).await? {
            self.write_atomic(&path, &bytes).await?;
        }

        let end_time = Instant::now();
        self.stats.lock().unwrap().add_put(start_time, end_time, size);
        Ok(id)
    }

    /// Writes to a temporary file next to `path`, then renames it into place.
    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{file_name}.{n}.tmp"));

        fs::write(&temp_path, bytes).await?;
        fs::rename(&temp_path, path).await?;
        OK
    }

    async fn write_json<T: Serialize>(&self, repo_path: &Path, kind: &str, value: &T) -> Result<ObjectId> {
        let bytes = serde_json::to_vec(value)?;
        self.write_object(repo_path, kind, bytes).await
    }

    async fn read_tree(&self, repo_path: &Path, id: &ObjectId) -> Result<TreeMap> {
        let bytes = self.read_object(repo_path, TREES_DIR, id).await?;
        let tree = serde_json::from_slice(&bytes)?;
        Ok(tree)
    }

    async fn read_commit(&self, repo_path: &Path, id: &ObjectId) -> Result<CommitRecord> {
        let bytes = self.read_object(repo_path, COMMITS_DIR, id).await?;
        let commit = serde_json::from_slice(&bytes)?;
        Ok(commit)
    }

    async fn object_exists(&self, repo_path: &Path, kind: &str, id: &ObjectId) -> Result<bool> {
        if !is_object_id(id.as_str()) {
            return Ok(false);
        }

        let exists = fs::try_exists(repo_path.join(kind).join(id.as_str())).await?;
        Ok(exists)
    }

    fn ref_path(repo_path: &Path, branch: &str) -> Result<PathBuf> {
        if is_legal_tree_path(branch) {
            Ok(repo_path.join(HEADS_DIR).join(branch))
        } else {
            Err(Error::BranchNotFound(branch.to_owned()))
        }
    }

    async fn write_ref(&self, repo_path: &Path, branch: &str, commit_id: &ObjectId) -> Result<()> {
        let start_time = Instant::now();
        let path = Self::ref_path(repo_path, branch)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        self.write_atomic(&path, commit_id.as_str().as_bytes()).await?;
        let end_time = Instant::now();
        self.stats.lock().unwrap().add_put(start_time, end_time, 0);
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn create_content_object(&self, owner: &str, repo: &str, content: &str) -> Result<ObjectId> {
        self.simulate_latency().await;

        let repo_path = self.existing_repo_path(owner, repo).await?;
        let content = content.to_owned();
        let decoded = spawn_blocking(move || BASE64_STANDARD.decode(content)).await?;
        let bytes = decoded.map_err(|err| Error::RemotePermanent {
            status: 400,
            message: format!("content is not valid base64: {err}"),
        })?;

        self.write_object(&repo_path, BLOBS_DIR, bytes).await
    }

    async fn get_content_object(&self, owner: &str, repo: &str, object_id: &ObjectId) -> Result<String> {
        self.simulate_latency().await;

        let repo_path = self.existing_repo_path(owner, repo).await?;
        let bytes = self.read_object(&repo_path, BLOBS_DIR, object_id).await?;
        let content = spawn_blocking(move || BASE64_STANDARD.encode(bytes)).await?;
        Ok(content)
    }

    async fn get_branch_tip(&self, owner: &str, repo: &str, branch: &str) -> Result<ObjectId> {
        self.simulate_latency().await;

        let repo_path = self.existing_repo_path(owner, repo).await?;
        let start_time = Instant::now();
        let path = Self::ref_path(&repo_path, branch)?;
        let tip = match fs::read_to_string(path).await {
            Ok(tip) => tip,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.stats.lock().unwrap().add_failure();
                return Err(Error::BranchNotFound(branch.to_owned()));
            }
            Err(err) => return Err(err.into()),
        };

        let end_time = Instant::now();
        self.stats
            .lock()
            .unwrap()
            .add_get(start_time, end_time, tip.len() as u64);
        Ok(ObjectId::new(tip.trim()))
    }

    async fn get_commit_tree(&self, owner: &str, repo: &str, commit_id: &ObjectId) -> Result<ObjectId> {
        self.simulate_latency().await;

        let repo_path = self.existing_repo_path(owner, repo).await?;
        let commit = self.read_commit(&repo_path, commit_id).await?;
        Ok(commit.tree)
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree_id: &ObjectId,
        entries: &[TreeEntry],
    ) -> Result<ObjectId> {
        self.simulate_latency().await;

        let repo_path = self.existing_repo_path(owner, repo).await?;
        let mut tree = self.read_tree(&repo_path, base_tree_id).await?;

        for entry in entries {
            if !is_legal_tree_path(&entry.path) {
                self.stats.lock().unwrap().add_failure();
                return Err(Error::RemotePermanent {
                    status: 422,
                    message: format!("tree entry path `{}` is invalid", entry.path),
                });
            }

            if !ALLOWED_MODES.contains(&entry.mode.as_str()) {
                return Err(Error::RemotePermanent {
                    status: 422,
                    message: format!("tree entry mode `{}` is invalid", entry.mode),
                });
            }

            if !self.object_exists(&repo_path, BLOBS_DIR, &entry.object_id).await? {
                return Err(Error::RemotePermanent {
                    status: 422,
                    message: format!("object `{}` does not exist", entry.object_id),
                });
            }

            let record = TreeRecord {
                mode: entry.mode.clone(),
                object_id: entry.object_id.clone(),
            };
            tree.insert(entry.path.clone(), record);
        }

        self.write_json(&repo_path, TREES_DIR, &tree).await
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_id: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId> {
        self.simulate_latency().await;

        let repo_path = self.existing_repo_path(owner, repo).await?;
        if !self.object_exists(&repo_path, TREES_DIR, tree_id).await? {
            return Err(Error::RemotePermanent {
                status: 422,
                message: format!("tree `{tree_id}` does not exist"),
            });
        }

        for parent in parents {
            if !self.object_exists(&repo_path, COMMITS_DIR, parent).await? {
                return Err(Error::RemotePermanent {
                    status: 422,
                    message: format!("parent commit `{parent}` does not exist"),
                });
            }
        }

        let commit = CommitRecord {
            tree: tree_id.clone(),
            parents: parents.to_vec(),
            message: message.to_owned(),
            created: Utc::now(),
        };
        self.write_json(&repo_path, COMMITS_DIR, &commit).await
    }

    async fn update_branch_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_id: &ObjectId,
    ) -> Result<()> {
        self.simulate_latency().await;

        let repo_path = self.existing_repo_path(owner, repo).await?;
        if !self.object_exists(&repo_path, COMMITS_DIR, commit_id).await? {
            return Err(Error::RemotePermanent {
                status: 422,
                message: format!("commit `{commit_id}` does not exist"),
            });
        }

        self.write_ref(&repo_path, branch, commit_id).await
    }

    async fn list_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<TreeEntry>> {
        let tip = self.get_branch_tip(owner, repo, branch).await?;
        let tree_id = self.get_commit_tree(owner, repo, &tip).await?;

        self.simulate_latency().await;
        let repo_path = self.existing_repo_path(owner, repo).await?;
        let tree = self.read_tree(&repo_path, &tree_id).await?;

        let mut entries = Vec::with_capacity(tree.len());
        for (path, record) in tree {
            let blob_path = repo_path.join(BLOBS_DIR).join(record.object_id.as_str());
            let size = fs::metadata(blob_path).await.ok().map(|metadata| metadata.len());
            entries.push(TreeEntry {
                path,
                mode: record.mode,
                object_id: record.object_id,
                size,
            });
        }

        Ok(entries)
    }

    fn stats(&self) -> StoreStats {
        self.stats.lock().unwrap().clone()
    }
}

fn is_object_id(s: &str) -> bool {
    s.len() == blake3::OUT_LEN * 2 && s.chars().all(|c| c.is_ascii_hexdigit())
}
