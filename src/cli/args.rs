use std::{ops::RangeInclusive, path::PathBuf, time::Duration};

use clap::{ArgAction, Args, ColorChoice, ValueEnum};
use humantime::parse_duration;

use crate::{
    batch::{BatchConfig, DEFAULT_BATCH_SIZE},
    content::DEFAULT_MAX_FILE_SIZE,
    retry::{RetryPolicy, DEFAULT_MAX_RETRIES},
    store::{RepositoryRef, StoreUrl},
};

use super::parse::{parse_range_inclusive, SourceSpec};

const BATCH_SIZE_RANGE: RangeInclusive<usize> = 1..=100;
const RETRY_COUNT_RANGE: RangeInclusive<u32> = 0..=10;
const MAX_FILE_SIZE_RANGE: RangeInclusive<u64> = 1..=DEFAULT_MAX_FILE_SIZE;

const DEFAULT_COMMIT_MESSAGE: &str = "Upload files via gitdrop";
const DEFAULT_CONSOLIDATE_MESSAGE: &str = "Consolidate repositories via gitdrop";

fn parse_batch_size(s: &str) -> Result<usize, String> {
    parse_range_inclusive(s, BATCH_SIZE_RANGE)
}

fn parse_retry_count(s: &str) -> Result<u32, String> {
    parse_range_inclusive(s, RETRY_COUNT_RANGE)
}

fn parse_max_file_size(s: &str) -> Result<u64, String> {
    parse_range_inclusive(s, MAX_FILE_SIZE_RANGE)
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsType {
    Basic,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Ask on the terminal
    Ask,
    /// Overwrite existing files
    Replace,
    /// Leave conflicting files out
    Skip,
    /// Abort the whole run
    Cancel,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Repository to create (OWNER/NAME[@BRANCH])
    pub repo: RepositoryRef,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Files, directories or zip archives to upload
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Repository to upload to (OWNER/NAME[@BRANCH])
    #[arg(short = 'r', long, value_name = "REPO")]
    pub repo: RepositoryRef,

    /// Directory in the repository to upload into
    #[arg(short = 'p', long, value_name = "PATH", default_value = "")]
    pub prefix: String,

    /// Commit message
    #[arg(short = 'm', long, default_value = DEFAULT_COMMIT_MESSAGE)]
    pub message: String,

    /// Upload zip archives as files instead of expanding them
    #[arg(long, default_value_t = false)]
    pub keep_archives: bool,

    /// What to do with files that already exist
    #[arg(long, value_name = "ACTION", default_value = "ask")]
    pub on_conflict: ConflictChoice,

    #[command(flatten)]
    pub batch: BatchArgs,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug)]
pub struct ConsolidateArgs {
    /// Repository to copy into (OWNER/NAME[@BRANCH])
    #[arg(short = 't', long, value_name = "REPO")]
    pub target: RepositoryRef,

    /// Repository to copy from (OWNER/NAME[@BRANCH][:PATH,...][=PREFIX])
    #[arg(short = 's', long = "source", value_name = "SOURCE", required = true)]
    pub sources: Vec<SourceSpec>,

    /// Commit message
    #[arg(short = 'm', long, default_value = DEFAULT_CONSOLIDATE_MESSAGE)]
    pub message: String,

    /// What to do with files that already exist or that several sources
    /// provide
    #[arg(long, value_name = "ACTION", default_value = "ask")]
    pub on_conflict: ConflictChoice,

    #[command(flatten)]
    pub batch: BatchArgs,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Repository to list (OWNER/NAME[@BRANCH])
    pub repo: RepositoryRef,

    /// Print sizes and object IDs
    #[arg(short = 'l', long, default_value_t = false)]
    pub long: bool,

    #[command(flatten)]
    pub global: GlobalArgs,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Number of files uploaded at once
    #[arg(
        short = 'b',
        long,
        value_name = "NUM",
        default_value_t = DEFAULT_BATCH_SIZE,
        value_parser = parse_batch_size,
    )]
    pub batch_size: usize,

    /// Pause between batches
    #[arg(long, value_name = "DURATION", default_value = "1s", value_parser = parse_duration)]
    pub delay: Duration,

    /// Retries per file after a failed upload
    #[arg(
        long,
        value_name = "NUM",
        default_value_t = DEFAULT_MAX_RETRIES,
        value_parser = parse_retry_count,
    )]
    pub retries: u32,

    /// Largest file to upload, in bytes
    #[arg(
        long,
        value_name = "BYTES",
        default_value_t = DEFAULT_MAX_FILE_SIZE,
        value_parser = parse_max_file_size,
    )]
    pub max_file_size: u64,
}

impl BatchArgs {
    pub fn config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            inter_batch_delay: self.delay,
            max_file_size: self.max_file_size,
            retry: RetryPolicy {
                max_retries: self.retries,
                ..RetryPolicy::default()
            },
        }
    }
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Remote store (e.g. 'github://', 'github://<host>' or 'file://<path>')
    #[arg(short = 'S', long, value_name = "URL")]
    pub store: Option<StoreUrl>,

    /// Access token for the remote store
    #[arg(long, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Add latency when using a local store
    #[arg(short = 'L', long, value_parser = parse_duration)]
    pub latency: Option<Duration>,

    /// Print stats after completion
    #[arg(long, value_name = "FORMAT", num_args = 0..=1, default_missing_value = "basic")]
    pub stats: Option<StatsType>,

    #[command(flatten)]
    pub logger: LoggerArgs,
}

#[derive(Args, Debug)]
pub struct LoggerArgs {
    /// When to use color in output
    #[arg(short, long, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Print more output
    #[arg(short, long, action = ArgAction::Count, group = "verbosity")]
    pub verbose: u8,

    /// Print less output
    #[arg(short, long, action = ArgAction::Count, group = "verbosity")]
    pub quiet: u8,
}
