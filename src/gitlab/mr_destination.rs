//! Destination that maps every push onto a GitLab merge request.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use super::api::{
    CreateMergeRequest, GitLabApi, MergeRequest, MergeRequestState, Project, UpdateMergeRequest,
};
use crate::credentials::CredentialFileHandler;
use crate::destination::{
    DestinationEffect, DestinationRef, EffectType, GitDestination, GitDestinationWriter, Glob,
    TransformResult, WriteHook, expand_labels, same_git_tree,
};
use crate::git::{GitEnvironment, GitError, GitRepository};

const CONTEXT_REFERENCE_LABEL: &str = "CONTEXT_REFERENCE";

/// The default source branch template, naming the branch after the
/// change's origin context.
const DEFAULT_BRANCH_TEMPLATE: &str = "${CONTEXT_REFERENCE}";

/// A destination that pushes to a per-change branch and opens or
/// updates the merge request proposing it.
#[derive(Clone)]
pub struct GitLabMrDestination {
    url: String,
    project_path: String,
    target_branch: String,
    source_branch_template: String,
    title_template: Option<String>,
    body_template: Option<String>,
    assignees: Vec<String>,
    allow_empty_diff: bool,
    allow_empty_diff_merge_statuses: BTreeSet<String>,
    committer: Option<(String, String)>,
    credentials: Option<Arc<CredentialFileHandler>>,
    env: GitEnvironment,
    force: bool,
    api: Arc<dyn GitLabApi>,
}

impl fmt::Debug for GitLabMrDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLabMrDestination")
            .field("url", &self.url)
            .field("project_path", &self.project_path)
            .field("target_branch", &self.target_branch)
            .field("source_branch_template", &self.source_branch_template)
            .finish_non_exhaustive()
    }
}

impl GitLabMrDestination {
    /// A merge request destination for `url`, targeting `target_branch`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the project path cannot be
    /// derived from `url`.
    pub fn new(
        url: impl Into<String>,
        target_branch: impl Into<String>,
        api: Arc<dyn GitLabApi>,
    ) -> Result<Self, GitError> {
        let url = url.into();
        let project_path = project_path_from_url(&url)?;
        Ok(Self::with_project_path(url, project_path, target_branch, api))
    }

    /// Same as [`GitLabMrDestination::new`] but with an explicit
    /// namespaced project path, for URLs it cannot be derived from.
    #[must_use]
    pub fn with_project_path(
        url: impl Into<String>,
        project_path: impl Into<String>,
        target_branch: impl Into<String>,
        api: Arc<dyn GitLabApi>,
    ) -> Self {
        Self {
            url: url.into(),
            project_path: project_path.into(),
            target_branch: target_branch.into(),
            source_branch_template: DEFAULT_BRANCH_TEMPLATE.to_owned(),
            title_template: None,
            body_template: None,
            assignees: Vec::new(),
            allow_empty_diff: false,
            allow_empty_diff_merge_statuses: BTreeSet::new(),
            committer: None,
            credentials: None,
            env: GitEnvironment::default(),
            force: false,
            api,
        }
    }

    /// Overrides the source branch template. `${CONTEXT_REFERENCE}` and
    /// the change labels are available for expansion.
    #[must_use]
    pub fn with_source_branch_template(mut self, template: impl Into<String>) -> Self {
        self.source_branch_template = template.into();
        self
    }

    /// Sets the title template instead of the change summary's first
    /// line. Labels are available for expansion.
    #[must_use]
    pub fn with_title(mut self, template: impl Into<String>) -> Self {
        self.title_template = Some(template.into());
        self
    }

    /// Sets the description template instead of the change summary.
    #[must_use]
    pub fn with_body(mut self, template: impl Into<String>) -> Self {
        self.body_template = Some(template.into());
        self
    }

    /// Usernames to assign to the merge request. Each one must resolve
    /// to exactly one GitLab user.
    #[must_use]
    pub fn with_assignees(mut self, assignees: impl IntoIterator<Item = String>) -> Self {
        self.assignees = assignees.into_iter().collect();
        self
    }

    /// Allows pushing even when the tree matches the existing merge
    /// request's head tree.
    #[must_use]
    pub const fn with_allow_empty_diff(mut self, allow: bool) -> Self {
        self.allow_empty_diff = allow;
        self
    }

    /// Merge statuses (upper-cased, e.g. `CONFLICT`) for which an
    /// otherwise-redundant push is still uploaded.
    #[must_use]
    pub fn with_allow_empty_diff_merge_statuses(
        mut self,
        statuses: impl IntoIterator<Item = String>,
    ) -> Self {
        self.allow_empty_diff_merge_statuses = statuses.into_iter().collect();
        self
    }

    /// Sets the committer identity configured in the scratch clone.
    #[must_use]
    pub fn with_committer(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.committer = Some((name.into(), email.into()));
        self
    }

    /// Installs issuer-backed credentials into the scratch clone.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<CredentialFileHandler>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the environment passed to git subprocesses.
    #[must_use]
    pub fn with_environment(mut self, env: GitEnvironment) -> Self {
        self.env = env;
        self
    }

    /// Allows writing to a destination whose target ref does not exist
    /// yet.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// The repository URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The namespaced project path.
    #[must_use]
    pub fn project_path(&self) -> &str {
        &self.project_path
    }

    /// Creates a writer for paths matched by `destination_files`.
    #[must_use]
    pub fn writer(&self, destination_files: Glob) -> GitLabMrWriter {
        GitLabMrWriter {
            destination: self.clone(),
            destination_files,
            branch: None,
            inner: None,
            project: None,
            mr_iid: None,
        }
    }

    fn expansion_labels(&self, transform: &TransformResult) -> BTreeMap<String, Vec<String>> {
        let mut labels = transform.labels().clone();
        if let Some(context) = transform.context_reference() {
            labels
                .entry(CONTEXT_REFERENCE_LABEL.to_owned())
                .or_insert_with(|| vec![context.to_owned()]);
        }
        labels
    }

    fn source_branch(&self, transform: &TransformResult) -> Result<String, GitError> {
        let labels = self.expansion_labels(transform);
        let expanded = expand_labels(&self.source_branch_template, &labels)?;
        Ok(sanitize_branch(&expanded))
    }

    fn title_and_body(&self, transform: &TransformResult) -> Result<(String, String), GitError> {
        let labels = self.expansion_labels(transform);
        let summary = transform.summary().trim();
        let title = match &self.title_template {
            Some(template) => expand_labels(template, &labels)?,
            None => summary.lines().next().unwrap_or("").to_owned(),
        };
        if title.is_empty() {
            return Err(GitError::validation("Merge request title can not be empty."));
        }
        let body = match &self.body_template {
            Some(template) => expand_labels(template, &labels)?,
            None => summary.to_owned(),
        };
        Ok((title, body))
    }

    fn git_destination(&self, branch: &str) -> GitDestination {
        let mut destination = GitDestination::new(
            &self.url,
            &self.target_branch,
            format!("refs/heads/{branch}"),
        )
        .with_environment(self.env.clone())
        .with_force(self.force);
        if let Some((name, email)) = &self.committer {
            destination = destination.with_committer(name, email);
        }
        if let Some(credentials) = &self.credentials {
            destination = destination.with_credentials(Arc::clone(credentials));
        }
        destination
    }
}

fn sanitize_branch(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Derives the namespaced project path from a GitLab repository URL.
fn project_path_from_url(url: &str) -> Result<String, GitError> {
    let path = if let Ok(parsed) = Url::parse(url) {
        parsed.path().trim_matches('/').to_owned()
    } else if let Some((_, after_colon)) = url.split_once(':') {
        after_colon.trim_matches('/').to_owned()
    } else {
        String::new()
    };
    let project = path.strip_suffix(".git").unwrap_or(&path);
    if project.is_empty() || !project.contains('/') {
        return Err(GitError::validation(format!(
            "Cannot derive a GitLab project path from url: {url}"
        )));
    }
    Ok(project.to_owned())
}

/// Writer that pushes through a [`GitDestinationWriter`] and then
/// discovers, creates, or updates the matching merge request.
#[derive(Debug)]
pub struct GitLabMrWriter {
    destination: GitLabMrDestination,
    destination_files: Glob,
    branch: Option<String>,
    inner: Option<GitDestinationWriter>,
    project: Option<Project>,
    mr_iid: Option<u64>,
}

impl GitLabMrWriter {
    /// Pushes the transformed tree to the per-change branch and ensures
    /// a merge request exists for it.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::RedundantChange`] when the tree matches the
    /// existing merge request's head, [`GitError::Validation`] for an
    /// empty title, a failing template, or an unresolvable assignee,
    /// and the push and API errors of the underlying writer.
    pub async fn write(
        &mut self,
        transform: &TransformResult,
    ) -> Result<Vec<DestinationEffect>, GitError> {
        let branch = self.destination.source_branch(transform)?;
        let project_id = self.project_id().await?;
        if self.branch.as_deref() != Some(branch.as_str()) {
            let git_destination = self.destination.git_destination(&branch);
            let hook = GitLabMrWriteHook::new(
                Arc::clone(&self.destination.api),
                &self.destination.url,
                &branch,
            )
            .with_project_id(project_id)
            .with_allow_empty_diff(self.destination.allow_empty_diff)
            .with_allow_empty_diff_merge_statuses(
                self.destination.allow_empty_diff_merge_statuses.clone(),
            );
            self.inner = Some(
                git_destination.writer_with_hook(self.destination_files.clone(), Arc::new(hook)),
            );
            self.branch = Some(branch.clone());
            self.mr_iid = None;
        }
        let writer = self
            .inner
            .as_mut()
            .ok_or_else(|| GitError::repo("merge request writer was not initialised"))?;

        let mut effects = writer.write(transform).await?;
        let effect = self.ensure_merge_request(&branch, transform).await?;
        effects.push(effect);
        Ok(effects)
    }

    /// Iid of the merge request created or updated by the last write.
    #[must_use]
    pub const fn merge_request_iid(&self) -> Option<u64> {
        self.mr_iid
    }

    async fn project_id(&mut self) -> Result<u64, GitError> {
        if let Some(project) = &self.project {
            return Ok(project.id);
        }
        let project = self
            .destination
            .api
            .get_project(&self.destination.project_path)
            .await
            .map_err(|error| match error {
                super::error::GitLabApiError::ProjectNotFound { path } => {
                    GitError::validation(format!(
                        "Cannot find the GitLab project '{path}' for url: {}",
                        self.destination.url
                    ))
                }
                other => other.into(),
            })?;
        let id = project.id;
        self.project = Some(project);
        Ok(id)
    }

    async fn assignee_ids(&self) -> Result<Vec<u64>, GitError> {
        let mut ids = Vec::new();
        for assignee in &self.destination.assignees {
            let users = self.destination.api.list_users(assignee).await?;
            match users.as_slice() {
                [user] => ids.push(user.id),
                [] => {
                    return Err(GitError::validation(format!(
                        "Cannot find a GitLab user for the username '{assignee}'"
                    )));
                }
                _ => {
                    return Err(GitError::validation(format!(
                        "Found more than one GitLab user for the username '{assignee}'"
                    )));
                }
            }
        }
        Ok(ids)
    }

    async fn ensure_merge_request(
        &mut self,
        branch: &str,
        transform: &TransformResult,
    ) -> Result<DestinationEffect, GitError> {
        let project_id = self.project_id().await?;
        let (title, body) = self.destination.title_and_body(transform)?;
        let assignee_ids = self.assignee_ids().await?;

        let existing = self
            .destination
            .api
            .list_merge_requests(project_id, branch)
            .await?;
        let Some(merge_request) = existing.first() else {
            return self
                .create_merge_request(project_id, branch, title, body, assignee_ids)
                .await;
        };

        if existing.len() > 1 {
            let iids: Vec<String> = existing.iter().map(|mr| mr.iid.to_string()).collect();
            tracing::warn!(
                branch = %branch,
                iids = %iids.join(", "),
                "multiple merge requests match the source branch, updating the first",
            );
        }
        self.update_merge_request(project_id, merge_request, title, body, assignee_ids)
            .await
    }

    async fn create_merge_request(
        &mut self,
        project_id: u64,
        branch: &str,
        title: String,
        body: String,
        assignee_ids: Vec<u64>,
    ) -> Result<DestinationEffect, GitError> {
        let created = self
            .destination
            .api
            .create_merge_request(
                project_id,
                &CreateMergeRequest {
                    source_branch: branch.to_owned(),
                    target_branch: self.destination.target_branch.clone(),
                    title,
                    description: body,
                    assignee_ids,
                },
            )
            .await?;
        tracing::info!(iid = created.iid, url = %created.web_url, "merge request created");
        self.mr_iid = Some(created.iid);
        Ok(DestinationEffect::new(
            EffectType::Created,
            format!("Merge Request {} created", created.web_url),
            DestinationRef::review_request(
                "merge_request",
                created.iid.to_string(),
                &created.web_url,
            ),
        ))
    }

    async fn update_merge_request(
        &mut self,
        project_id: u64,
        merge_request: &MergeRequest,
        title: String,
        body: String,
        assignee_ids: Vec<u64>,
    ) -> Result<DestinationEffect, GitError> {
        if merge_request.target_branch != self.destination.target_branch {
            tracing::warn!(
                current = %self.destination.target_branch,
                existing = %merge_request.target_branch,
                "target branch differs from the existing merge request's",
            );
        }
        let mut update = UpdateMergeRequest {
            title: (merge_request.title.as_deref() != Some(title.as_str())).then_some(title),
            description: (merge_request.description.as_deref() != Some(body.as_str()))
                .then_some(body),
            assignee_ids: (!assignee_ids.is_empty()).then_some(assignee_ids),
            state_event: None,
        };
        if merge_request.state == MergeRequestState::Closed {
            tracing::warn!(iid = merge_request.iid, "existing merge request is closed, reopening");
            update.state_event = Some("reopen".to_owned());
        }

        let (iid, web_url) = if update.is_empty() {
            (merge_request.iid, merge_request.web_url.clone())
        } else {
            let updated = self
                .destination
                .api
                .update_merge_request(project_id, merge_request.iid, &update)
                .await?;
            (updated.iid, updated.web_url)
        };
        self.mr_iid = Some(iid);
        Ok(DestinationEffect::new(
            EffectType::Updated,
            format!("Merge Request {web_url} updated"),
            DestinationRef::review_request("merge_request", iid.to_string(), &web_url),
        ))
    }
}

/// Hook that aborts a push whose tree is already the head of the merge
/// request for the same source branch.
pub struct GitLabMrWriteHook {
    api: Arc<dyn GitLabApi>,
    url: String,
    branch: String,
    allow_empty_diff: bool,
    allow_empty_diff_merge_statuses: BTreeSet<String>,
    project_id: Option<u64>,
}

impl fmt::Debug for GitLabMrWriteHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLabMrWriteHook")
            .field("url", &self.url)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl GitLabMrWriteHook {
    /// A hook checking the merge request whose source branch is
    /// `branch`.
    #[must_use]
    pub fn new(api: Arc<dyn GitLabApi>, url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            api,
            url: url.into(),
            branch: branch.into(),
            allow_empty_diff: false,
            allow_empty_diff_merge_statuses: BTreeSet::new(),
            project_id: None,
        }
    }

    /// Disables the redundant-push check entirely.
    #[must_use]
    pub const fn with_allow_empty_diff(mut self, allow: bool) -> Self {
        self.allow_empty_diff = allow;
        self
    }

    /// Merge statuses for which a redundant push is still uploaded.
    #[must_use]
    pub fn with_allow_empty_diff_merge_statuses(mut self, statuses: BTreeSet<String>) -> Self {
        self.allow_empty_diff_merge_statuses = statuses;
        self
    }

    /// Uses an already-resolved project id instead of looking the
    /// project up by URL-derived path.
    #[must_use]
    pub const fn with_project_id(mut self, project_id: u64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    async fn resolve_project_id(&self) -> Result<u64, GitError> {
        if let Some(id) = self.project_id {
            return Ok(id);
        }
        let path = project_path_from_url(&self.url)?;
        Ok(self.api.get_project(&path).await?.id)
    }
}

#[async_trait]
impl WriteHook for GitLabMrWriteHook {
    async fn before_push(
        &self,
        repo: &GitRepository,
        transform: &TransformResult,
    ) -> Result<(), GitError> {
        if self.allow_empty_diff {
            return Ok(());
        }
        let project_id = self.resolve_project_id().await?;
        let merge_requests = self
            .api
            .list_merge_requests(project_id, &self.branch)
            .await?;
        let [merge_request] = merge_requests.as_slice() else {
            if merge_requests.len() > 1 {
                let iids: Vec<String> =
                    merge_requests.iter().map(|mr| mr.iid.to_string()).collect();
                tracing::warn!(
                    branch = %self.branch,
                    iids = %iids.join(", "),
                    "multiple merge requests match the branch, skipping the empty-diff check",
                );
            }
            return Ok(());
        };
        let Some(sha) = merge_request.sha.as_deref() else {
            return Ok(());
        };
        if !same_git_tree(repo, "HEAD", &self.url, sha).await? {
            return Ok(());
        }
        if let Some(status) = merge_request.detailed_merge_status.as_deref() {
            let status_upper = status.to_uppercase();
            if self.allow_empty_diff_merge_statuses.contains(&status_upper) {
                tracing::info!(
                    iid = merge_request.iid,
                    status = %status_upper,
                    "uploading despite the identical tree, merge status is in the upload list",
                );
                return Ok(());
            }
        }
        let reference = transform.context_reference().unwrap_or("HEAD");
        Err(GitError::RedundantChange {
            message: format!(
                "Skipping push to the existing mr {}/-/merge_requests/{} as the change {} is empty.",
                self.url, merge_request.iid, reference,
            ),
            sha: sha.to_owned(),
        })
    }

    async fn after_push(
        &self,
        _sha1: &str,
        _transform: &TransformResult,
    ) -> Result<Vec<DestinationEffect>, GitError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "tests panic on failure")]

    use rstest::rstest;

    use super::{project_path_from_url, sanitize_branch};

    #[rstest]
    #[case("https://gitlab.com/group/repo.git", "group/repo")]
    #[case("https://gitlab.example.com/group/sub/repo", "group/sub/repo")]
    #[case("git@gitlab.com:group/repo.git", "group/repo")]
    fn project_path_is_derived_from_the_url(#[case] url: &str, #[case] expected: &str) {
        assert_eq!(project_path_from_url(url).unwrap(), expected);
    }

    #[rstest]
    #[case("https://gitlab.com/repo")]
    #[case("nonsense")]
    fn underivable_project_paths_are_rejected(#[case] url: &str) {
        assert!(project_path_from_url(url).is_err());
    }

    #[rstest]
    fn branch_names_are_sanitized() {
        assert_eq!(sanitize_branch("feature/x y"), "feature_x_y");
    }
}
