use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use tempfile::{tempdir, TempDir};

use crate::{
    error::{Error, Result},
    store::{LocalStore, ObjectId, RemoteStore, RepositoryRef, StoreStats, TreeEntry},
};

/// A local store that fails selected calls on demand.
#[derive(Debug)]
pub struct FaultyStore {
    inner: LocalStore,
    content_faults: Mutex<HashMap<String, VecDeque<Error>>>,
    panicking_content: Mutex<HashSet<String>>,
    rejected_paths: Mutex<HashSet<String>>,
    reject_combined: AtomicBool,
    commit_faults: Mutex<VecDeque<Error>>,
    ref_faults: Mutex<VecDeque<Error>>,
    content_calls: AtomicU32,
    tree_calls: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: LocalStore) -> Self {
        FaultyStore {
            inner,
            content_faults: Mutex::new(HashMap::new()),
            panicking_content: Mutex::new(HashSet::new()),
            rejected_paths: Mutex::new(HashSet::new()),
            reject_combined: AtomicBool::new(false),
            commit_faults: Mutex::new(VecDeque::new()),
            ref_faults: Mutex::new(VecDeque::new()),
            content_calls: AtomicU32::new(0),
            tree_calls: AtomicU32::new(0),
        }
    }

    /// Makes uploads of `bytes` fail with `errors`, one per call, before
    /// succeeding.
    pub fn fail_content(&self, bytes: &[u8], errors: Vec<Error>) {
        let key = BASE64_STANDARD.encode(bytes);
        self.content_faults
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .extend(errors);
    }

    /// Makes the task uploading `bytes` panic.
    pub fn panic_on_content(&self, bytes: &[u8]) {
        let key = BASE64_STANDARD.encode(bytes);
        self.panicking_content.lock().unwrap().insert(key);
    }

    /// Makes every tree containing `path` fail as malformed.
    pub fn reject_tree_path(&self, path: &str) {
        self.rejected_paths.lock().unwrap().insert(path.to_owned());
    }

    /// Makes every tree with more than one entry fail as malformed while
    /// single-entry trees succeed.
    pub fn reject_combined_trees(&self) {
        self.reject_combined.store(true, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, error: Error) {
        self.commit_faults.lock().unwrap().push_back(error);
    }

    pub fn fail_ref_update(&self, error: Error) {
        self.ref_faults.lock().unwrap().push_back(error);
    }

    pub async fn init_repository(&self, repo: &RepositoryRef) {
        self.inner
            .init_repository(&repo.owner, &repo.name, &repo.branch)
            .await
            .unwrap();
    }

    pub fn content_calls(&self) -> u32 {
        self.content_calls.load(Ordering::SeqCst)
    }

    pub fn tree_calls(&self) -> u32 {
        self.tree_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for FaultyStore {
    async fn create_content_object(&self, owner: &str, repo: &str, content: &str) -> Result<ObjectId> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking_content.lock().unwrap().contains(content) {
            panic!("injected panic");
        }

        let fault = self
            .content_faults
            .lock()
            .unwrap()
            .get_mut(content)
            .and_then(VecDeque::pop_front);
        match fault {
            Some(error) => Err(error),
            None => self.inner.create_content_object(owner, repo, content).await,
        }
    }

    async fn get_content_object(&self, owner: &str, repo: &str, object_id: &ObjectId) -> Result<String> {
        self.inner.get_content_object(owner, repo, object_id).await
    }

    async fn get_branch_tip(&self, owner: &str, repo: &str, branch: &str) -> Result<ObjectId> {
        self.inner.get_branch_tip(owner, repo, branch).await
    }

    async fn get_commit_tree(&self, owner: &str, repo: &str, commit_id: &ObjectId) -> Result<ObjectId> {
        self.inner.get_commit_tree(owner, repo, commit_id).await
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree_id: &ObjectId,
        entries: &[TreeEntry],
    ) -> Result<ObjectId> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        let combined = entries.len() > 1 && self.reject_combined.load(Ordering::SeqCst);
        let rejected = combined || {
            let rejected_paths = self.rejected_paths.lock().unwrap();
            entries
                .iter()
                .any(|entry| rejected_paths.contains(&entry.path))
        };

        if rejected {
            return Err(Error::RemotePermanent {
                status: 422,
                message: "tree contains a malformed path component".to_owned(),
            });
        }

        self.inner.create_tree(owner, repo, base_tree_id, entries).await
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_id: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId> {
        let fault = self.commit_faults.lock().unwrap().pop_front();
        match fault {
            Some(error) => Err(error),
            None => {
                self.inner
                    .create_commit(owner, repo, message, tree_id, parents)
                    .await
            }
        }
    }

    async fn update_branch_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_id: &ObjectId,
    ) -> Result<()> {
        let fault = self.ref_faults.lock().unwrap().pop_front();
        match fault {
            Some(error) => Err(error),
            None => {
                self.inner
                    .update_branch_ref(owner, repo, branch, commit_id)
                    .await
            }
        }
    }

    async fn list_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<TreeEntry>> {
        self.inner.list_tree(owner, repo, branch).await
    }

    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }
}

/// A freshly initialized `octo/site@main` repository in a temporary
/// directory. The directory lives as long as the returned guard.
pub async fn faulty_repo() -> (TempDir, Arc<FaultyStore>, RepositoryRef) {
    let dir = tempdir().unwrap();
    let local = LocalStore::new(dir.path(), None);
    let repo = RepositoryRef::new("octo", "site", "main");
    local
        .init_repository(&repo.owner, &repo.name, &repo.branch)
        .await
        .unwrap();

    (dir, Arc::new(FaultyStore::new(local)), repo)
}

/// Reads a file's content at the tip of `repo`.
pub async fn read_file(store: &dyn RemoteStore, repo: &RepositoryRef, path: &str) -> Option<Vec<u8>> {
    let entries = store
        .list_tree(&repo.owner, &repo.name, &repo.branch)
        .await
        .unwrap();
    let entry = entries.into_iter().find(|entry| entry.path == path)?;
    let content = store
        .get_content_object(&repo.owner, &repo.name, &entry.object_id)
        .await
        .unwrap();
    Some(BASE64_STANDARD.decode(content).unwrap())
}
