use std::{path::PathBuf, str::FromStr};

use crate::error::Error;

pub const GITHUB_PREFIX: &str = "github://";
pub const HTTPS_PREFIX: &str = "https://";
pub const LOCAL_PREFIX: &str = "file://";

pub const GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    /// Base URL of a GitHub-compatible REST API
    Github(String),
    Local(PathBuf),
}

impl FromStr for StoreUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(host) = s.strip_prefix(GITHUB_PREFIX) {
            let host = host.trim_end_matches('/');
            if host.is_empty() || host == "github.com" {
                Ok(StoreUrl::Github(GITHUB_API_URL.to_owned()))
            } else {
                Ok(StoreUrl::Github(format!("{HTTPS_PREFIX}{host}/api/v3")))
            }
        } else if s.starts_with(HTTPS_PREFIX) && s.len() > HTTPS_PREFIX.len() {
            Ok(StoreUrl::Github(s.trim_end_matches('/').to_owned()))
        } else if let Some(path_str) = s.strip_prefix(LOCAL_PREFIX) {
            if path_str.is_empty() {
                return Err(Error::InvalidStoreUrl(s.to_owned()));
            }

            Ok(StoreUrl::Local(path_str.into()))
        } else {
            Err(Error::InvalidStoreUrl(s.to_owned()))
        }
    }
}

impl Default for StoreUrl {
    fn default() -> Self {
        StoreUrl::Github(GITHUB_API_URL.to_owned())
    }
}
