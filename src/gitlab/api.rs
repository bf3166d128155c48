//! Trait-based gateway for the GitLab merge request REST API.

use async_trait::async_trait;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::GitLabApiError;

const PER_PAGE: u32 = 100;
const MAX_PAGES: u32 = 60_000;

/// State of a merge request as reported by GitLab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeRequestState {
    /// The merge request is open.
    Opened,
    /// The merge request was closed without merging.
    Closed,
    /// The merge request was merged.
    Merged,
    /// The merge request is locked.
    Locked,
}

/// A merge request as returned by the GitLab API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MergeRequest {
    /// Project-scoped id, stable across updates.
    pub iid: u64,
    /// Current state.
    pub state: MergeRequestState,
    /// Head commit of the source branch.
    pub sha: Option<String>,
    /// Branch proposed for merging.
    pub source_branch: String,
    /// Branch the merge request targets.
    pub target_branch: String,
    /// Merge request title.
    pub title: Option<String>,
    /// Merge request description.
    pub description: Option<String>,
    /// Browser URL of the merge request.
    pub web_url: String,
    /// Fine-grained merge status such as `mergeable` or `conflict`.
    pub detailed_merge_status: Option<String>,
}

/// A project as returned by the GitLab API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Project {
    /// Numeric project id used by all other endpoints.
    pub id: u64,
    /// Full namespaced path, e.g. `group/subgroup/repo`.
    pub path_with_namespace: String,
}

/// A user as returned by the GitLab API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    /// Numeric user id.
    pub id: u64,
    /// Login name.
    pub username: String,
}

/// Payload for creating a merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateMergeRequest {
    /// Branch proposed for merging.
    pub source_branch: String,
    /// Branch to merge into.
    pub target_branch: String,
    /// Merge request title.
    pub title: String,
    /// Merge request description.
    pub description: String,
    /// Numeric ids of the assignees.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignee_ids: Vec<u64>,
}

/// Payload for updating a merge request. Only the populated fields are
/// sent, so an unchanged title or description is not re-submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateMergeRequest {
    /// New title, when it changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description, when it changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New assignees, when they changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_ids: Option<Vec<u64>>,
    /// `reopen` or `close`, when transitioning the state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_event: Option<String>,
}

impl UpdateMergeRequest {
    /// Whether the update carries any field at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.assignee_ids.is_none()
            && self.state_event.is_none()
    }
}

/// Gateway for merge request operations on one GitLab host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// Looks a project up by its namespaced path.
    async fn get_project(&self, path: &str) -> Result<Project, GitLabApiError>;

    /// Lists merge requests of `project_id` whose source branch is
    /// `source_branch`.
    async fn list_merge_requests(
        &self,
        project_id: u64,
        source_branch: &str,
    ) -> Result<Vec<MergeRequest>, GitLabApiError>;

    /// Opens a new merge request.
    async fn create_merge_request(
        &self,
        project_id: u64,
        request: &CreateMergeRequest,
    ) -> Result<MergeRequest, GitLabApiError>;

    /// Updates an existing merge request, keyed by its iid.
    async fn update_merge_request(
        &self,
        project_id: u64,
        iid: u64,
        update: &UpdateMergeRequest,
    ) -> Result<MergeRequest, GitLabApiError>;

    /// Looks users up by their exact username.
    async fn list_users(&self, username: &str) -> Result<Vec<User>, GitLabApiError>;
}

/// Reqwest-backed gateway speaking the GitLab v4 REST API.
pub struct RestGitLabApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl std::fmt::Debug for RestGitLabApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGitLabApi")
            .field("base_url", &self.base_url)
            .field("token", &"(hidden)")
            .finish()
    }
}

impl RestGitLabApi {
    /// A gateway for `base_url` (e.g. `https://gitlab.com/api/v4`)
    /// authenticating with a private token.
    ///
    /// # Errors
    ///
    /// Returns [`GitLabApiError::Network`] when the HTTP client cannot
    /// be constructed.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GitLabApiError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| GitLabApiError::Network {
                operation: "build client".to_owned(),
                message: format!("failed to configure HTTP client: {error}"),
            })?;
        let base_url = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GitLabApiError> {
        let response = request
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|error| GitLabApiError::Network {
                operation: operation.to_owned(),
                message: error.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GitLabApiError::Api {
                operation: operation.to_owned(),
                status,
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|error| GitLabApiError::Network {
                operation: operation.to_owned(),
                message: format!("response JSON decoding failed: {error}"),
            })
    }

    async fn paginated_get<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>, GitLabApiError> {
        let mut results = Vec::new();
        for page in 1..=MAX_PAGES {
            let request = self
                .client
                .get(self.endpoint(path))
                .query(params)
                .query(&[("page", page.to_string()), ("per_page", PER_PAGE.to_string())]);
            let batch: Vec<T> = self.execute(operation, request).await?;
            let done = batch.len() < PER_PAGE as usize;
            results.extend(batch);
            if done {
                break;
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl GitLabApi for RestGitLabApi {
    async fn get_project(&self, path: &str) -> Result<Project, GitLabApiError> {
        let request = self
            .client
            .get(self.endpoint(&format!("projects/{}", encode_project_path(path))));
        match self.execute("get project", request).await {
            Err(GitLabApiError::Api { status, .. }) if status == StatusCode::NOT_FOUND => {
                Err(GitLabApiError::ProjectNotFound {
                    path: path.to_owned(),
                })
            }
            other => other,
        }
    }

    async fn list_merge_requests(
        &self,
        project_id: u64,
        source_branch: &str,
    ) -> Result<Vec<MergeRequest>, GitLabApiError> {
        self.paginated_get(
            "list merge requests",
            &format!("projects/{project_id}/merge_requests"),
            &[("source_branch", source_branch)],
        )
        .await
    }

    async fn create_merge_request(
        &self,
        project_id: u64,
        request: &CreateMergeRequest,
    ) -> Result<MergeRequest, GitLabApiError> {
        let builder = self
            .client
            .post(self.endpoint(&format!("projects/{project_id}/merge_requests")))
            .json(request);
        self.execute("create merge request", builder).await
    }

    async fn update_merge_request(
        &self,
        project_id: u64,
        iid: u64,
        update: &UpdateMergeRequest,
    ) -> Result<MergeRequest, GitLabApiError> {
        let builder = self
            .client
            .put(self.endpoint(&format!("projects/{project_id}/merge_requests/{iid}")))
            .json(update);
        self.execute("update merge request", builder).await
    }

    async fn list_users(&self, username: &str) -> Result<Vec<User>, GitLabApiError> {
        self.paginated_get("list users", "users", &[("username", username)])
            .await
    }
}

/// Escapes a namespaced project path for use as a URL path segment.
#[must_use]
pub fn encode_project_path(path: &str) -> String {
    path.replace('/', "%2F")
}
