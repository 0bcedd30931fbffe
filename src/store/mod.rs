mod github;
mod local;
mod stats;
mod url;


use std::{collections::HashSet, fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use {
    github::{classify_response, GithubStore},
    local::LocalStore,
    stats::StoreStats,
    url::StoreUrl,
};

/// Mode of a regular, non-executable file in a tree.
pub const FILE_MODE: &str = "100644";

pub const DEFAULT_BRANCH: &str = "main";

pub type BoxedStore = Arc<dyn RemoteStore>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        ObjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A branch of a remote repository, written as `OWNER/NAME[@BRANCH]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl RepositoryRef {
    pub fn new<O: Into<String>, N: Into<String>, B: Into<String>>(
        owner: O,
        name: N,
        branch: B,
    ) -> Self {
        RepositoryRef {
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
        }
    }
}

impl FromStr for RepositoryRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (repo, branch) = match s.split_once('@') {
            Some((repo, branch)) => (repo, branch),
            None => (s, DEFAULT_BRANCH),
        };

        let (owner, name) = repo
            .split_once('/')
            .ok_or_else(|| Error::InvalidRepository(s.to_owned()))?;

        let is_valid_part = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_.".contains(c))
        };

        if !is_valid_part(owner) || !is_valid_part(name) || branch.is_empty() {
            return Err(Error::InvalidRepository(s.to_owned()));
        }

        Ok(RepositoryRef::new(owner, name, branch))
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.branch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    pub object_id: ObjectId,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn file<P: Into<String>>(path: P, object_id: ObjectId) -> Self {
        TreeEntry {
            path: path.into(),
            mode: FILE_MODE.to_owned(),
            object_id,
            size: None,
        }
    }
}

/// The subset of a tree-and-blob versioning API needed to upload files and
/// fold them into a single commit.
#[async_trait]
pub trait RemoteStore: fmt::Debug + Send + Sync {
    /// Stores base64-encoded `content` and returns its object id.
    async fn create_content_object(&self, owner: &str, repo: &str, content: &str)
        -> Result<ObjectId>;

    /// Returns the base64-encoded content of an existing object.
    async fn get_content_object(&self, owner: &str, repo: &str, object_id: &ObjectId)
        -> Result<String>;

    async fn get_branch_tip(&self, owner: &str, repo: &str, branch: &str) -> Result<ObjectId>;

    async fn get_commit_tree(&self, owner: &str, repo: &str, commit_id: &ObjectId)
        -> Result<ObjectId>;

    /// Creates a tree that overlays `entries` on top of `base_tree_id`.
    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree_id: &ObjectId,
        entries: &[TreeEntry],
    ) -> Result<ObjectId>;

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_id: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId>;

    async fn update_branch_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_id: &ObjectId,
    ) -> Result<()>;

    /// Lists every file reachable from the tip of `branch`.
    async fn list_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<TreeEntry>>;

    fn stats(&self) -> StoreStats;

    async fn list_existing_paths(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<HashSet<String>> {
        let entries = self.list_tree(owner, repo, branch).await?;
        let paths = entries.into_iter().map(|entry| entry.path).collect();
        Ok(paths)
    }
}
