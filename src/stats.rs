use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{consolidate::ConsolidationReport, store::StoreStats};

/// Counters for one CLI command, filled in as the command runs.
#[derive(Debug)]
pub struct CommandStats {
    pub start_time: DateTime<Utc>,
    pub files_total: u64,
    pub files_uploaded: u64,
    pub files_failed: u64,
    pub conflicts_skipped: u64,
}

impl CommandStats {
    pub fn new() -> Self {
        CommandStats {
            start_time: Utc::now(),
            files_total: 0,
            files_uploaded: 0,
            files_failed: 0,
            conflicts_skipped: 0,
        }
    }

    pub fn add_report(&mut self, report: &ConsolidationReport) {
        self.files_uploaded += report.processed.len() as u64;
        self.files_failed += report.errors.len() as u64;
        self.conflicts_skipped += report.skipped_conflicts.len() as u64;
    }

    pub fn finalize(self, store: StoreStats) -> FullStats {
        let end_time = Utc::now();
        FullStats {
            start_time: self.start_time,
            end_time,
            files_total: self.files_total,
            files_uploaded: self.files_uploaded,
            files_failed: self.files_failed,
            conflicts_skipped: self.conflicts_skipped,
            store,
        }
    }
}

impl Default for CommandStats {
    fn default() -> Self {
        CommandStats::new()
    }
}

#[derive(Debug, Serialize)]
pub struct FullStats {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub files_total: u64,
    pub files_uploaded: u64,
    pub files_failed: u64,
    pub conflicts_skipped: u64,
    pub store: StoreStats,
}

impl FullStats {
    pub fn elapsed_time(&self) -> Duration {
        (self.end_time - self.start_time)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
