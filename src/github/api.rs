//! Trait-based gateway for the GitHub pull request REST API.
//!
//! The trait-based design enables mocking in tests while the Octocrab
//! implementation handles real HTTP requests.

use async_trait::async_trait;
use http::Uri;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};

use super::error::{GitHubApiError, map_octocrab_error};

/// One side of a pull request, a branch name with its head commit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestSide {
    /// Branch name, without the `refs/heads/` prefix.
    #[serde(rename = "ref")]
    pub reference: String,
    /// Commit the branch points at.
    pub sha: String,
}

/// A pull request as returned by the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    /// Number of the pull request within its repository.
    pub number: u64,
    /// `open` or `closed`.
    pub state: String,
    /// Pull request title.
    pub title: Option<String>,
    /// Pull request description.
    pub body: Option<String>,
    /// Browser URL of the pull request.
    pub html_url: String,
    /// The proposed branch.
    pub head: PullRequestSide,
    /// The branch the pull request targets.
    pub base: PullRequestSide,
    /// Whether GitHub considers the pull request mergeable. Only
    /// populated when a single pull request is fetched directly.
    pub mergeable: Option<bool>,
    /// Merge-state detail such as `clean`, `dirty` or `behind`. Not a
    /// stable API field, so it may be absent.
    pub mergeable_state: Option<String>,
}

impl PullRequest {
    /// Whether the pull request is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

/// Payload for creating a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatePullRequest {
    /// Pull request title.
    pub title: String,
    /// Pull request description.
    pub body: String,
    /// Source branch name.
    pub head: String,
    /// Target branch name.
    pub base: String,
}

/// Payload for updating an existing pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatePullRequest {
    /// New title, when changing it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description, when changing it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
struct ListParams<'a> {
    head: &'a str,
    per_page: u8,
}

/// Gateway for pull request operations on one GitHub host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Lists open pull requests whose head matches `head`, given as
    /// `owner:branch`.
    async fn list_pull_requests(
        &self,
        project: &str,
        head: &str,
    ) -> Result<Vec<PullRequest>, GitHubApiError>;

    /// Fetches one pull request, including its merge status fields.
    async fn get_pull_request(
        &self,
        project: &str,
        number: u64,
    ) -> Result<PullRequest, GitHubApiError>;

    /// Opens a new pull request.
    async fn create_pull_request(
        &self,
        project: &str,
        request: &CreatePullRequest,
    ) -> Result<PullRequest, GitHubApiError>;

    /// Updates the title and body of an existing pull request.
    async fn update_pull_request(
        &self,
        project: &str,
        number: u64,
        update: &UpdatePullRequest,
    ) -> Result<PullRequest, GitHubApiError>;
}

/// Octocrab-backed gateway.
pub struct OctocrabApi {
    client: Octocrab,
}

impl OctocrabApi {
    /// Creates a gateway from an existing Octocrab client.
    #[must_use]
    pub const fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Builds an authenticated gateway against `api_base`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubApiError::Network`] when the base URI cannot be
    /// parsed or the client cannot be constructed.
    pub fn for_token(token: &str, api_base: &str) -> Result<Self, GitHubApiError> {
        let base_uri: Uri = api_base.parse::<Uri>().map_err(|error| {
            GitHubApiError::Network {
                operation: "build client".to_owned(),
                message: format!("invalid API base '{api_base}': {error}"),
            }
        })?;

        let client = Octocrab::builder()
            .personal_token(token)
            .base_uri(base_uri)
            .map_err(|error| GitHubApiError::Network {
                operation: "build client".to_owned(),
                message: format!("build client failed: {error}"),
            })?
            .build()
            .map_err(|error| map_octocrab_error("build client", &error))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl GitHubApi for OctocrabApi {
    async fn list_pull_requests(
        &self,
        project: &str,
        head: &str,
    ) -> Result<Vec<PullRequest>, GitHubApiError> {
        self.client
            .get(
                format!("/repos/{project}/pulls"),
                Some(&ListParams { head, per_page: 100 }),
            )
            .await
            .map_err(|error| map_octocrab_error("list pull requests", &error))
    }

    async fn get_pull_request(
        &self,
        project: &str,
        number: u64,
    ) -> Result<PullRequest, GitHubApiError> {
        self.client
            .get(format!("/repos/{project}/pulls/{number}"), None::<&()>)
            .await
            .map_err(|error| map_octocrab_error("get pull request", &error))
    }

    async fn create_pull_request(
        &self,
        project: &str,
        request: &CreatePullRequest,
    ) -> Result<PullRequest, GitHubApiError> {
        self.client
            .post(format!("/repos/{project}/pulls"), Some(request))
            .await
            .map_err(|error| map_octocrab_error("create pull request", &error))
    }

    async fn update_pull_request(
        &self,
        project: &str,
        number: u64,
        update: &UpdatePullRequest,
    ) -> Result<PullRequest, GitHubApiError> {
        self.client
            .patch(format!("/repos/{project}/pulls/{number}"), Some(update))
            .await
            .map_err(|error| map_octocrab_error("update pull request", &error))
    }
}

/// Extracts the `owner/repo` project slug from a GitHub repository URL.
///
/// Accepts `https://`, `ssh://` and scp-style `git@github.com:` forms,
/// with or without a trailing `.git`.
///
/// # Errors
///
/// Returns [`GitHubApiError::ProjectNotFound`] when the URL does not
/// name a `github.com` project.
pub fn project_from_url(url: &str) -> Result<String, GitHubApiError> {
    let not_found = || GitHubApiError::ProjectNotFound {
        url: url.to_owned(),
    };
    let (_, after_host) = url.split_once("github.com").ok_or_else(not_found)?;
    let trimmed = after_host
        .strip_prefix(['/', ':'])
        .ok_or_else(not_found)?
        .trim_end_matches('/');
    let slug = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let mut segments = slug.split('/');
    let owner = segments.next().filter(|s| !s.is_empty());
    let repo = segments.next().filter(|s| !s.is_empty());
    match (owner, repo, segments.next()) {
        (Some(owner_name), Some(repo_name), None) => Ok(format!("{owner_name}/{repo_name}")),
        _ => Err(not_found()),
    }
}

/// The owner half of an `owner/repo` project slug.
#[must_use]
pub fn project_owner(project: &str) -> &str {
    project.split('/').next().unwrap_or(project)
}
