
use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub target_path: String,
    pub source_descriptor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Upload everything, overwriting existing paths
    Replace,
    /// Leave every conflicting path out of the upload
    Skip,
    /// Abort without uploading anything
    Cancel,
}

/// Decides what happens to a set of conflicting paths. One decision covers
/// the whole set.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn resolve(&self, conflicts: &[ConflictRecord]) -> Result<ConflictResolution>;
}

/// Always returns the same decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedResolver(pub ConflictResolution);

#[async_trait]
impl ConflictResolver for FixedResolver {
    async fn resolve(&self, _conflicts: &[ConflictRecord]) -> Result<ConflictResolution> {
        Ok(self.0)
    }
}

/// Returns the candidates that already exist, in candidate order and each
/// path at most once.
pub fn detect_conflicts<'a, I>(
    candidates: I,
    existing: &HashSet<String>,
    source_descriptor: &str,
) -> Vec<ConflictRecord>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|path| existing.contains(*path) && seen.insert(*path))
        .map(|path| ConflictRecord {
            target_path: path.to_owned(),
            source_descriptor: source_descriptor.to_owned(),
        })
        .collect()
}
