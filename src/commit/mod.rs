
use std::{collections::BTreeMap, fmt};

use clap::builder::styling::AnsiColor;
use log::debug;
use serde::Serialize;

use crate::{
    error::{Error, Result},
    path::is_legal_tree_path,
    store::{BoxedStore, ObjectId, RepositoryRef, TreeEntry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStage {
    ResolveBase,
    BuildTree,
    CreateCommit,
    UpdateRef,
}

impl fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssemblyStage::ResolveBase => "resolving base revision",
            AssemblyStage::BuildTree => "building tree",
            AssemblyStage::CreateCommit => "creating commit",
            AssemblyStage::UpdateRef => "updating branch reference",
        };
        write!(f, "{name}")
    }
}

/// A file whose content object exists remotely and is ready to be placed
/// in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedEntry {
    pub target_path: String,
    pub mode: String,
    pub object_id: ObjectId,
    pub source_path: String,
}

impl ProcessedEntry {
    fn tree_entry(&self) -> TreeEntry {
        TreeEntry {
            path: self.target_path.clone(),
            mode: self.mode.clone(),
            object_id: self.object_id.clone(),
            size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRevision {
    pub commit_id: ObjectId,
    pub tree_id: ObjectId,
}

pub type StageObserver = Box<dyn Fn(AssemblyStage, &str) + Send + Sync>;

/// Folds processed entries into one tree and one commit on top of a branch,
/// then moves the branch. The branch only moves if every earlier stage
/// succeeded.
pub struct CommitAssembler {
    store: BoxedStore,
    repo: RepositoryRef,
    observer: Option<StageObserver>,
}

impl CommitAssembler {
    pub fn new(store: BoxedStore, repo: RepositoryRef) -> Self {
        CommitAssembler {
            store,
            repo,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub async fn resolve_base(&self) -> Result<BaseRevision> {
        let stage = AssemblyStage::ResolveBase;
        let RepositoryRef {
            owner,
            name,
            branch,
        } = &self.repo;

        self.notify(stage, &format!("resolving {}", self.repo));
        let commit_id = self
            .store
            .get_branch_tip(owner, name, branch)
            .await
            .map_err(|err| assembly_error(stage, err))?;
        let tree_id = self
            .store
            .get_commit_tree(owner, name, &commit_id)
            .await
            .map_err(|err| assembly_error(stage, err))?;

        Ok(BaseRevision { commit_id, tree_id })
    }

    /// Creates a commit with `entries` overlaid on `base` and points the
    /// branch at it. Later entries win over earlier ones at the same path.
    pub async fn assemble(
        &self,
        base: &BaseRevision,
        entries: Vec<ProcessedEntry>,
        message: &str,
    ) -> Result<ObjectId> {
        if entries.is_empty() {
            return Err(Error::NothingToCommit);
        }

        let mut by_path = BTreeMap::new();
        for entry in entries {
            if !is_legal_tree_path(&entry.target_path) {
                return Err(Error::PathMalformed(entry.target_path));
            }

            by_path.insert(entry.target_path.clone(), entry);
        }

        let tree_entries: Vec<TreeEntry> = by_path.values().map(ProcessedEntry::tree_entry).collect();
        let tree_id = self.build_tree(base, &tree_entries).await?;
        let commit_id = self.create_commit(base, &tree_id, message).await?;
        self.update_ref(&commit_id).await?;

        let style = AnsiColor::Green.on_default();
        debug!(
            "{style}committed{style:#} {} file(s) to {} as {commit_id}",
            tree_entries.len(),
            self.repo
        );
        Ok(commit_id)
    }

    async fn build_tree(&self, base: &BaseRevision, entries: &[TreeEntry]) -> Result<ObjectId> {
        let stage = AssemblyStage::BuildTree;
        let RepositoryRef { owner, name, .. } = &self.repo;

        self.notify(stage, &format!("building tree with {} file(s)", entries.len()));
        match self
            .store
            .create_tree(owner, name, &base.tree_id, entries)
            .await
        {
            Ok(tree_id) => Ok(tree_id),
            Err(err) if err.is_malformed_tree() && entries.len() > 1 => {
                self.notify(stage, "tree was rejected, checking entries one at a time");
                match self.find_malformed_entry(base, entries).await? {
                    Some(path) => Err(Error::PathMalformed(path)),
                    None => Err(assembly_error(stage, err)),
                }
            }
            Err(err) if err.is_malformed_tree() => match entries.first() {
                Some(entry) => Err(Error::PathMalformed(entry.path.clone())),
                None => Err(assembly_error(stage, err)),
            },
            Err(err) => Err(assembly_error(stage, err)),
        }
    }

    async fn find_malformed_entry(
        &self,
        base: &BaseRevision,
        entries: &[TreeEntry],
    ) -> Result<Option<String>> {
        let RepositoryRef { owner, name, .. } = &self.repo;

        for entry in entries {
            let single = std::slice::from_ref(entry);
            match self.store.create_tree(owner, name, &base.tree_id, single).await {
                Ok(_) => {}
                Err(err) if err.is_malformed_tree() => return Ok(Some(entry.path.clone())),
                Err(err) => return Err(assembly_error(AssemblyStage::BuildTree, err)),
            }
        }

        Ok(None)
    }

    async fn create_commit(
        &self,
        base: &BaseRevision,
        tree_id: &ObjectId,
        message: &str,
    ) -> Result<ObjectId> {
        let stage = AssemblyStage::CreateCommit;
        let RepositoryRef { owner, name, .. } = &self.repo;

        self.notify(stage, "creating commit");
        let parents = [base.commit_id.clone()];
        self.store
            .create_commit(owner, name, message, tree_id, &parents)
            .await
            .map_err(|err| assembly_error(stage, err))
    }

    async fn update_ref(&self, commit_id: &ObjectId) -> Result<()> {
        let stage = AssemblyStage::UpdateRef;
        let RepositoryRef {
            owner,
            name,
            branch,
        } = &self.repo;

        self.notify(stage, &format!("moving {branch} to {commit_id}"));
        self.store
            .update_branch_ref(owner, name, branch, commit_id)
            .await
            .map_err(|err| assembly_error(stage, err))
    }

    fn notify(&self, stage: AssemblyStage, message: &str) {
        if let Some(observer) = &self.observer {
            observer(stage, message);
        }
    }
}

fn assembly_error(stage: AssemblyStage, source: Error) -> Error {
    Error::Assembly {
        stage,
        source: Box::new(source),
    }
}
