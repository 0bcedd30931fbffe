use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use log::warn;
use reqwest::{
    header::{HeaderMap, ACCEPT},
    Client, Method, RequestBuilder,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{Error, Result};

use super::{ObjectId, RemoteStore, StoreStats, TreeEntry};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const ACCEPT_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const RATELIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RATELIMIT_RESET_HEADER: &str = "x-ratelimit-reset";
const RETRY_AFTER_HEADER: &str = "retry-after";

const BLOB_ENCODING: &str = "base64";
const BLOB_TYPE: &str = "blob";

#[derive(Serialize)]
struct CreateBlobRequest<'a> {
    content: &'a str,
    encoding: &'a str,
}

#[derive(Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: Vec<TreeItem<'a>>,
}

#[derive(Serialize)]
struct TreeItem<'a> {
    path: &'a str,
    mode: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    sha: &'a str,
}

#[derive(Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeResponseItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeResponseItem {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Client for the git data endpoints of the GitHub REST API.
pub struct GithubStore {
    client: Client,
    api_url: String,
    token: Option<String>,
    stats: Arc<Mutex<StoreStats>>,
}

impl fmt::Debug for GithubStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubStore")
            .field("api_url", &self.api_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl GithubStore {
    pub fn new(api_url: String, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let stats = Arc::new(Mutex::new(StoreStats::new()));

        Ok(GithubStore {
            client,
            api_url,
            token,
            stats,
        })
    }

    fn git_url(&self, owner: &str, repo: &str, path: &str) -> String {
        format!("{}/repos/{owner}/{repo}/git/{path}", self.api_url)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(ACCEPT, ACCEPT_JSON)
            .header(API_VERSION_HEADER, API_VERSION);

        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends a request and decodes its JSON body. `upload_size` is the size
    /// of the payload for requests that create something.
    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        upload_size: Option<u64>,
    ) -> Result<T> {
        let start_time = Instant::now();
        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                self.stats.lock().unwrap().add_failure();
                return Err(err.into());
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        let end_time = Instant::now();

        if !status.is_success() {
            self.stats.lock().unwrap().add_failure();
            let text = String::from_utf8_lossy(&body);
            return Err(classify_response(status.as_u16(), &headers, &text, Utc::now()));
        }

        {
            let mut stats = self.stats.lock().unwrap();
            match upload_size {
                Some(size) => stats.add_put(start_time, end_time, size),
                None => stats.add_get(start_time, end_time, body.len() as u64),
            }
        }

        let value = serde_json::from_slice(&body)?;
        Ok(value)
    }
}

#[async_trait]
impl RemoteStore for GithubStore {
    async fn create_content_object(&self, owner: &str, repo: &str, content: &str) -> Result<ObjectId> {
        let url = self.git_url(owner, repo, "blobs");
        let body = CreateBlobRequest {
            content,
            encoding: BLOB_ENCODING,
        };
        let builder = self.request(Method::POST, &url).json(&body);
        let response: ShaResponse = self.send(builder, Some(content.len() as u64)).await?;
        Ok(ObjectId::new(response.sha))
    }

    async fn get_content_object(&self, owner: &str, repo: &str, object_id: &ObjectId) -> Result<String> {
        let url = self.git_url(owner, repo, &format!("blobs/{object_id}"));
        let builder = self.request(Method::GET, &url);
        let response: BlobResponse = match self.send(builder, None).await {
            Err(Error::RemotePermanent { status: 404, .. }) => {
                return Err(Error::ItemNotFound(object_id.to_string()))
            }
            result => result?,
        };

        if response.encoding != BLOB_ENCODING {
            return Err(Error::RemotePermanent {
                status: 200,
                message: format!("unexpected blob encoding `{}`", response.encoding),
            });
        }

        let content = response
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        Ok(content)
    }

    async fn get_branch_tip(&self, owner: &str, repo: &str, branch: &str) -> Result<ObjectId> {
        let url = self.git_url(owner, repo, &format!("ref/heads/{branch}"));
        let builder = self.request(Method::GET, &url);
        match self.send::<RefResponse>(builder, None).await {
            Ok(response) => Ok(ObjectId::new(response.object.sha)),
            Err(Error::RemotePermanent { status: 404, .. }) => {
                Err(Error::BranchNotFound(branch.to_owned()))
            }
            Err(err) => Err(err),
        }
    }

    async fn get_commit_tree(&self, owner: &str, repo: &str, commit_id: &ObjectId) -> Result<ObjectId> {
        let url = self.git_url(owner, repo, &format!("commits/{commit_id}"));
        let builder = self.request(Method::GET, &url);
        let response: CommitResponse = self.send(builder, None).await?;
        Ok(ObjectId::new(response.tree.sha))
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        base_tree_id: &ObjectId,
        entries: &[TreeEntry],
    ) -> Result<ObjectId> {
        let url = self.git_url(owner, repo, "trees");
        let tree = entries
            .iter()
            .map(|entry| TreeItem {
                path: &entry.path,
                mode: &entry.mode,
                kind: BLOB_TYPE,
                sha: entry.object_id.as_str(),
            })
            .collect();
        let body = CreateTreeRequest {
            base_tree: base_tree_id.as_str(),
            tree,
        };
        let builder = self.request(Method::POST, &url).json(&body);
        let response: ShaResponse = self.send(builder, Some(0)).await?;
        Ok(ObjectId::new(response.sha))
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        message: &str,
        tree_id: &ObjectId,
        parents: &[ObjectId],
    ) -> Result<ObjectId> {
        let url = self.git_url(owner, repo, "commits");
        let body = CreateCommitRequest {
            message,
            tree: tree_id.as_str(),
            parents: parents.iter().map(ObjectId::as_str).collect(),
        };
        let builder = self.request(Method::POST, &url).json(&body);
        let response: ShaResponse = self.send(builder, Some(0)).await?;
        Ok(ObjectId::new(response.sha))
    }

    async fn update_branch_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_id: &ObjectId,
    ) -> Result<()> {
        let url = self.git_url(owner, repo, &format!("refs/heads/{branch}"));
        let body = UpdateRefRequest {
            sha: commit_id.as_str(),
            force: false,
        };
        let builder = self.request(Method::PATCH, &url).json(&body);
        let _: serde_json::Value = self.send(builder, Some(0)).await?;
        Ok(())
    }

    async fn list_tree(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<TreeEntry>> {
        let tip = self.get_branch_tip(owner, repo, branch).await?;
        let tree_id = self.get_commit_tree(owner, repo, &tip).await?;

        let url = self.git_url(owner, repo, &format!("trees/{tree_id}"));
        let builder = self
            .request(Method::GET, &url)
            .query(&[("recursive", "1")]);
        let response: TreeResponse = self.send(builder, None).await?;

        if response.truncated {
            warn!("tree listing for {owner}/{repo}@{branch} was truncated");
        }

        let entries = response
            .tree
            .into_iter()
            .filter(|item| item.kind == BLOB_TYPE)
            .map(|item| TreeEntry {
                path: item.path,
                mode: item.mode,
                object_id: ObjectId::new(item.sha),
                size: item.size,
            })
            .collect();
        Ok(entries)
    }

    fn stats(&self) -> StoreStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Maps an unsuccessful response to an error, distinguishing rate limits
/// and server faults (worth retrying) from rejections.
pub fn classify_response(status: u16, headers: &HeaderMap, body: &str, now: DateTime<Utc>) -> Error {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|response| response.message)
        .unwrap_or_else(|_| body.trim().to_owned());
    let message = if message.is_empty() {
        format!("status {status}")
    } else {
        message
    };

    if status == 403 || status == 429 {
        let exhausted = header_value(headers, RATELIMIT_REMAINING_HEADER) == Some("0");
        let reset_at = header_value(headers, RATELIMIT_RESET_HEADER)
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        if let (true, Some(reset_at)) = (exhausted, reset_at) {
            return Error::RateLimited { reset_at };
        }

        let retry_after = header_value(headers, RETRY_AFTER_HEADER)
            .and_then(|value| value.parse::<i64>().ok())
            .and_then(TimeDelta::try_seconds);
        if let Some(delay) = retry_after {
            return Error::RateLimited {
                reset_at: now + delay,
            };
        }

        if status == 429 {
            return Error::RemoteTransient {
                status: Some(status),
                message,
            };
        }
    }

    if status >= 500 {
        Error::RemoteTransient {
            status: Some(status),
            message,
        }
    } else {
        Error::RemotePermanent { status, message }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}
