use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tokio::task::spawn_blocking;

use crate::{
    conflict::{ConflictRecord, ConflictResolution, ConflictResolver},
    error::Result,
};

const MAX_LISTED_CONFLICTS: usize = 20;

/// Asks on the terminal what to do with conflicting paths.
#[derive(Debug, Clone, Copy)]
pub struct PromptResolver;

#[async_trait]
impl ConflictResolver for PromptResolver {
    async fn resolve(&self, conflicts: &[ConflictRecord]) -> Result<ConflictResolution> {
        let listing = describe_conflicts(conflicts);
        spawn_blocking(move || ask(&listing)).await?
    }
}

fn describe_conflicts(conflicts: &[ConflictRecord]) -> String {
    let mut lines = vec![format!("{} file(s) already exist:", conflicts.len())];
    lines.extend(
        conflicts
            .iter()
            .take(MAX_LISTED_CONFLICTS)
            .map(|conflict| format!("  {} (from {})", conflict.target_path, conflict.source_descriptor)),
    );

    if conflicts.len() > MAX_LISTED_CONFLICTS {
        lines.push(format!("  ... and {} more", conflicts.len() - MAX_LISTED_CONFLICTS));
    }

    lines.join("\n")
}

fn ask(listing: &str) -> Result<ConflictResolution> {
    let mut stderr = io::stderr();
    writeln!(stderr, "{listing}")?;

    let mut line = String::new();
    loop {
        write!(stderr, "replace, skip or cancel? [r/s/c] ")?;
        stderr.flush()?;

        line.clear();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            // no terminal to ask
            return Ok(ConflictResolution::Cancel);
        }

        if let Some(resolution) = parse_answer(&line) {
            return Ok(resolution);
        }
    }
}

pub fn parse_answer(answer: &str) -> Option<ConflictResolution> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "r" | "replace" => Some(ConflictResolution::Replace),
        "s" | "skip" => Some(ConflictResolution::Skip),
        "c" | "cancel" => Some(ConflictResolution::Cancel),
        _ => None,
    }
}
