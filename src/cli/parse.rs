use std::{fmt::Display, ops::RangeInclusive, str::FromStr};

use crate::{error::Error, store::RepositoryRef};

pub fn parse_range_inclusive<N: PartialEq + PartialOrd + FromStr + Display>(
    s: &str,
    range: RangeInclusive<N>,
) -> Result<N, String> {
    let value: N = s.parse().map_err(|_| "invalid numeric value")?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(format!(
            "{} is not in range {}-{}",
            value,
            range.start(),
            range.end(),
        ))
    }
}

/// A repository to copy from, written as
/// `OWNER/NAME[@BRANCH][:PATH,...][=PREFIX]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub repo: RepositoryRef,
    /// Files or directories to copy, or everything if empty
    pub selections: Vec<String>,
    pub prefix: String,
}

impl FromStr for SourceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rest, prefix) = s.rsplit_once('=').unwrap_or((s, ""));
        let (repo, selections) = rest.split_once(':').unwrap_or((rest, ""));

        let repo = repo
            .parse()
            .map_err(|_| Error::InvalidSource(s.to_owned()))?;
        let selections = selections
            .split(',')
            .map(str::trim)
            .filter(|selection| !selection.is_empty())
            .map(str::to_owned)
            .collect();

        Ok(SourceSpec {
            repo,
            selections,
            prefix: prefix.trim().to_owned(),
        })
    }
}
