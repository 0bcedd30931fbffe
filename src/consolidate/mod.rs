
use std::{collections::HashSet, sync::Arc};

use clap::builder::styling::AnsiColor;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    batch::{BatchConfig, BatchProcessor, CancelFlag},
    commit::{CommitAssembler, ProcessedEntry, StageObserver},
    conflict::{detect_conflicts, ConflictRecord, ConflictResolution, ConflictResolver},
    content::{ContentSource, PendingEntry},
    error::{Error, Result},
    path,
    progress::{FileError, ProgressSender},
    store::{BoxedStore, ObjectId, RepositoryRef, TreeEntry},
};

/// One origin of files for a run. Entry target paths are relative to the
/// source and land under `prefix` in the target repository.
#[derive(Debug, Clone)]
pub struct Source {
    pub descriptor: String,
    pub prefix: String,
    pub entries: Vec<PendingEntry>,
}

impl Source {
    pub fn new<D: Into<String>, P: Into<String>>(descriptor: D, prefix: P, entries: Vec<PendingEntry>) -> Self {
        Source {
            descriptor: descriptor.into(),
            prefix: prefix.into(),
            entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidationReport {
    pub commit_id: ObjectId,
    pub processed: Vec<ProcessedEntry>,
    pub errors: Vec<FileError>,
    pub conflicts: Vec<ConflictRecord>,
    /// Paths left out because of a skip decision
    pub skipped_conflicts: Vec<String>,
}

/// Lists the files of another repository as a source.
///
/// With no selections the whole tree is taken at its own paths. A selected
/// file lands at its file name; a selected directory contributes its files
/// relative to the directory.
pub async fn remote_source(
    store: BoxedStore,
    repo: &RepositoryRef,
    selections: &[String],
    prefix: &str,
) -> Result<Source> {
    let RepositoryRef {
        owner,
        name,
        branch,
    } = repo;
    let tree = store.list_tree(owner, name, branch).await?;

    let mut selected: Vec<(String, TreeEntry)> = vec![];
    if selections.is_empty() {
        selected.extend(tree.into_iter().map(|entry| (entry.path.clone(), entry)));
    } else {
        for selection in selections {
            let selection = selection.trim_matches(path::SEPARATOR);
            let before = selected.len();

            if let Some(entry) = tree.iter().find(|entry| entry.path == selection) {
                selected.push((path::file_name(selection).to_owned(), entry.clone()));
            } else {
                let dir = format!("{selection}/");
                selected.extend(tree.iter().filter_map(|entry| {
                    let relative = entry.path.strip_prefix(&dir)?;
                    Some((relative.to_owned(), entry.clone()))
                }));
            }

            if selected.len() == before {
                return Err(Error::ItemNotFound(format!("{repo}:{selection}")));
            }
        }
    }

    let entries = selected
        .into_iter()
        .map(|(relative, entry)| {
            let content = ContentSource::RemoteObject {
                store: store.clone(),
                owner: owner.clone(),
                repo: name.clone(),
                object_id: entry.object_id,
            };
            let source_path = format!("{owner}/{name}:{}", entry.path);
            PendingEntry::new(source_path, relative, entry.size.unwrap_or(0), content)
        })
        .collect::<Vec<_>>();

    debug!("listed {} file(s) from {repo}", entries.len());
    Ok(Source::new(repo.to_string(), prefix, entries))
}

/// Copies files from any number of sources into one target branch with a
/// single commit.
pub struct Consolidator {
    store: BoxedStore,
    target: RepositoryRef,
    config: BatchConfig,
    resolver: Arc<dyn ConflictResolver>,
    cancel: CancelFlag,
    progress: Option<ProgressSender>,
    observer: Option<StageObserver>,
}

impl Consolidator {
    pub fn new(
        store: BoxedStore,
        target: RepositoryRef,
        config: BatchConfig,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        Consolidator {
            store,
            target,
            config,
            resolver,
            cancel: CancelFlag::new(),
            progress: None,
            observer: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Progress snapshots of every source's batch run go to `sender`, one
    /// run after another.
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_stage_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Uploads one set of entries under `prefix`.
    pub async fn upload(
        self,
        descriptor: &str,
        prefix: &str,
        entries: Vec<PendingEntry>,
        message: &str,
    ) -> Result<ConsolidationReport> {
        self.run(vec![Source::new(descriptor, prefix, entries)], message)
            .await
    }

    /// Processes every source in order, then commits everything at once.
    /// When sources overlap, the later one wins.
    pub async fn run(mut self, mut sources: Vec<Source>, message: &str) -> Result<ConsolidationReport> {
        let mut assembler = CommitAssembler::new(self.store.clone(), self.target.clone());
        if let Some(observer) = self.observer.take() {
            assembler = assembler.with_observer(observer);
        }

        let base = assembler.resolve_base().await?;
        let RepositoryRef {
            owner,
            name,
            branch,
        } = &self.target;
        let existing = self.store.list_existing_paths(owner, name, branch).await?;
        debug!("{} has {} existing file(s)", self.target, existing.len());

        for source in &mut sources {
            // targets are sanitized from here on
            for entry in &mut source.entries {
                entry.target_path = path::join(&source.prefix, &entry.target_path);
            }
        }

        let conflicts = find_conflicts(&sources, existing);
        let skipped_conflicts = self.resolve_conflicts(&conflicts, &mut sources).await?;

        let mut processed = vec![];
        let mut errors = vec![];
        for source in sources {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            info!("processing {} file(s) from {}", source.entries.len(), source.descriptor);
            let mut processor =
                BatchProcessor::new(self.store.clone(), self.target.clone(), self.config.clone())
                    .with_cancel(self.cancel.clone());
            if let Some(sender) = &self.progress {
                processor = processor.with_progress(sender.clone());
            }

            let report = processor.run(source.entries).await?;
            processed.extend(report.processed);
            errors.extend(report.progress.errors);
        }

        let commit_id = match assembler.assemble(&base, processed.clone(), message).await {
            Ok(commit_id) => commit_id,
            Err(err) if errors.is_empty() => return Err(err),
            Err(err) => {
                return Err(Error::Uncommitted {
                    source: Box::new(err),
                    errors,
                })
            }
        };

        let style = AnsiColor::Green.on_default();
        info!(
            "{style}committed{style:#} {} file(s) to {} ({} error(s))",
            processed.len(),
            self.target,
            errors.len()
        );

        Ok(ConsolidationReport {
            commit_id,
            processed,
            errors,
            conflicts,
            skipped_conflicts,
        })
    }

    async fn resolve_conflicts(
        &self,
        conflicts: &[ConflictRecord],
        sources: &mut [Source],
    ) -> Result<Vec<String>> {
        if conflicts.is_empty() {
            return Ok(vec![]);
        }

        warn!("{} path(s) already exist in {}", conflicts.len(), self.target);
        match self.resolver.resolve(conflicts).await? {
            ConflictResolution::Replace => {
                info!("replacing {} conflicting path(s)", conflicts.len());
                Ok(vec![])
            }
            ConflictResolution::Skip => {
                let skipped: HashSet<&str> = conflicts
                    .iter()
                    .map(|conflict| conflict.target_path.as_str())
                    .collect();
                for source in sources.iter_mut() {
                    source
                        .entries
                        .retain(|entry| !skipped.contains(entry.target_path.as_str()));
                }

                info!("skipping {} conflicting path(s)", skipped.len());
                let mut paths: Vec<String> = skipped.into_iter().map(str::to_owned).collect();
                paths.sort_unstable();
                Ok(paths)
            }
            ConflictResolution::Cancel => Err(Error::ConflictsDeclined(conflicts.len())),
        }
    }
}

/// Conflicts of each source against the existing files plus everything
/// earlier sources will write. A path is reported once.
fn find_conflicts(sources: &[Source], existing: HashSet<String>) -> Vec<ConflictRecord> {
    let mut known = existing;
    let mut reported = HashSet::new();
    let mut conflicts = vec![];

    for source in sources {
        let targets: Vec<&str> = source
            .entries
            .iter()
            .map(|entry| entry.target_path.as_str())
            .filter(|target| !path::is_skippable(target))
            .collect();

        for target in targets.iter().duplicates() {
            warn!("{target} appears more than once in {}, the last one wins", source.descriptor);
        }

        let found = detect_conflicts(targets.iter().copied(), &known, &source.descriptor);
        conflicts.extend(
            found
                .into_iter()
                .filter(|conflict| reported.insert(conflict.target_path.clone())),
        );
        known.extend(targets.into_iter().map(str::to_owned));
    }

    conflicts
}
