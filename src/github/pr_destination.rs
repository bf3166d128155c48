//! Destination that maps every push onto a GitHub pull request.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;

use super::api::{CreatePullRequest, GitHubApi, UpdatePullRequest};
use super::api::{project_from_url, project_owner};
use crate::credentials::CredentialFileHandler;
use crate::destination::{
    DestinationEffect, DestinationRef, EffectType, GitDestination, GitDestinationWriter, Glob,
    TransformResult, WriteHook, expand_labels, same_git_tree,
};
use crate::git::{GitEnvironment, GitError, GitRepository};

/// Label always available to the branch template, carrying the change's
/// origin context (branch name, review id).
const CONTEXT_REFERENCE_LABEL: &str = "CONTEXT_REFERENCE";

/// A destination that pushes to a per-change branch and opens or updates
/// a pull request for it.
#[derive(Clone)]
pub struct GitHubPrDestination {
    url: String,
    project: String,
    destination_ref: String,
    pr_branch_template: String,
    title: Option<String>,
    body: Option<String>,
    allow_empty_diff: bool,
    allow_empty_diff_merge_statuses: BTreeSet<String>,
    committer: Option<(String, String)>,
    credentials: Option<Arc<CredentialFileHandler>>,
    env: GitEnvironment,
    force: bool,
    api: Arc<dyn GitHubApi>,
}

impl fmt::Debug for GitHubPrDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubPrDestination")
            .field("url", &self.url)
            .field("project", &self.project)
            .field("destination_ref", &self.destination_ref)
            .field("pr_branch_template", &self.pr_branch_template)
            .finish_non_exhaustive()
    }
}

impl GitHubPrDestination {
    /// A pull request destination for `url`, targeting `destination_ref`
    /// and naming the source branch by expanding `pr_branch_template`
    /// over the change labels.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `url` does not name a GitHub
    /// project.
    pub fn new(
        url: impl Into<String>,
        destination_ref: impl Into<String>,
        pr_branch_template: impl Into<String>,
        api: Arc<dyn GitHubApi>,
    ) -> Result<Self, GitError> {
        let url = url.into();
        let project = project_from_url(&url)?;
        Ok(Self::with_project_slug(
            url,
            project,
            destination_ref,
            pr_branch_template,
            api,
        ))
    }

    /// Same as [`GitHubPrDestination::new`] but with an explicit
    /// `owner/repo` slug, for mirrors and enterprise hosts whose URL
    /// does not contain `github.com`.
    #[must_use]
    pub fn with_project_slug(
        url: impl Into<String>,
        project: impl Into<String>,
        destination_ref: impl Into<String>,
        pr_branch_template: impl Into<String>,
        api: Arc<dyn GitHubApi>,
    ) -> Self {
        Self {
            url: url.into(),
            project: project.into(),
            destination_ref: destination_ref.into(),
            pr_branch_template: pr_branch_template.into(),
            title: None,
            body: None,
            allow_empty_diff: false,
            allow_empty_diff_merge_statuses: BTreeSet::new(),
            committer: None,
            credentials: None,
            env: GitEnvironment::default(),
            force: false,
            api,
        }
    }

    /// Sets an explicit pull request title instead of the change
    /// summary's first line.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets an explicit pull request body instead of the change summary.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Allows pushing even when the tree matches the existing pull
    /// request's head tree.
    #[must_use]
    pub const fn with_allow_empty_diff(mut self, allow: bool) -> Self {
        self.allow_empty_diff = allow;
        self
    }

    /// Merge statuses (upper-cased, e.g. `DIRTY`) for which an
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

    /// The `owner/repo` project slug.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Creates a writer for paths matched by `destination_files`.
    #[must_use]
    pub fn writer(&self, destination_files: Glob) -> GitHubPrWriter {
        GitHubPrWriter {
            destination: self.clone(),
            destination_files,
            branch: None,
            inner: None,
            pr_number: None,
        }
    }

    fn source_branch(&self, transform: &TransformResult) -> Result<String, GitError> {
        let mut labels = transform.labels().clone();
        if let Some(context) = transform.context_reference() {
            labels
                .entry(CONTEXT_REFERENCE_LABEL.to_owned())
                .or_insert_with(|| vec![context.to_owned()]);
        }
        let expanded = expand_labels(&self.pr_branch_template, &labels)?;
        Ok(sanitize_branch(&expanded))
    }

    fn git_destination(&self, branch: &str) -> GitDestination {
        let mut destination = GitDestination::new(
            &self.url,
            &self.destination_ref,
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

/// Branch names keep only `[A-Za-z0-9_-]`; anything else becomes `_`.
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

/// Writer that pushes through a [`GitDestinationWriter`] and then
/// discovers, creates, or updates the matching pull request.
#[derive(Debug)]
pub struct GitHubPrWriter {
    destination: GitHubPrDestination,
    destination_files: Glob,
    branch: Option<String>,
    inner: Option<GitDestinationWriter>,
    pr_number: Option<u64>,
}

impl GitHubPrWriter {
    /// Pushes the transformed tree to the per-change branch and ensures
    /// a pull request exists for it.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::RedundantChange`] when the tree matches the
    /// existing pull request's head, [`GitError::Validation`] for an
    /// empty title or a failing branch template, and the push and API
    /// errors of the underlying writer.
    pub async fn write(
        &mut self,
        transform: &TransformResult,
    ) -> Result<Vec<DestinationEffect>, GitError> {
        let branch = self.destination.source_branch(transform)?;
        if self.branch.as_deref() != Some(branch.as_str()) {
            let git_destination = self.destination.git_destination(&branch);
            let hook = GitHubPrWriteHook::new(
                Arc::clone(&self.destination.api),
                &self.destination.url,
                &self.destination.project,
                &branch,
            )
            .with_allow_empty_diff(self.destination.allow_empty_diff)
            .with_allow_empty_diff_merge_statuses(
                self.destination.allow_empty_diff_merge_statuses.clone(),
            );
            self.inner = Some(
                git_destination.writer_with_hook(self.destination_files.clone(), Arc::new(hook)),
            );
            self.branch = Some(branch.clone());
            self.pr_number = None;
        }
        let writer = self
            .inner
            .as_mut()
            .ok_or_else(|| GitError::repo("pull request writer was not initialised"))?;

        let mut effects = writer.write(transform).await?;
        let effect = self.ensure_pull_request(&branch, transform).await?;
        effects.push(effect);
        Ok(effects)
    }

    /// Number of the pull request created or updated by the last write.
    #[must_use]
    pub const fn pull_request_number(&self) -> Option<u64> {
        self.pr_number
    }

    async fn ensure_pull_request(
        &mut self,
        branch: &str,
        transform: &TransformResult,
    ) -> Result<DestinationEffect, GitError> {
        let destination = &self.destination;
        let head = format!("{}:{branch}", project_owner(&destination.project));
        let existing = destination
            .api
            .list_pull_requests(&destination.project, &head)
            .await?;

        if let Some(pr) = existing.iter().find(|pr| pr.is_open()) {
            if pr.base.reference != destination.destination_ref {
                tracing::warn!(
                    current = %destination.destination_ref,
                    existing = %pr.base.reference,
                    "target branch differs from the existing pull request's base",
                );
            }
            let (title, body) = titled(
                transform,
                destination.title.as_deref(),
                destination.body.as_deref(),
            )?;
            let update = UpdatePullRequest {
                title: Some(title),
                body: Some(body),
            };
            let updated = destination
                .api
                .update_pull_request(&destination.project, pr.number, &update)
                .await?;
            self.pr_number = Some(updated.number);
            return Ok(DestinationEffect::new(
                EffectType::Updated,
                format!("Pull Request {} updated", updated.html_url),
                DestinationRef::review_request(
                    "pull_request",
                    updated.number.to_string(),
                    &updated.html_url,
                ),
            ));
        }

        let (title, body) = titled(transform, destination.title.as_deref(), destination.body.as_deref())?;
        let created = destination
            .api
            .create_pull_request(
                &destination.project,
                &CreatePullRequest {
                    title,
                    body,
                    head: branch.to_owned(),
                    base: destination.destination_ref.clone(),
                },
            )
            .await?;
        tracing::info!(
            number = created.number,
            branch = %branch,
            "pull request created",
        );
        self.pr_number = Some(created.number);
        Ok(DestinationEffect::new(
            EffectType::Created,
            format!("Pull Request {} created", created.html_url),
            DestinationRef::review_request(
                "pull_request",
                created.number.to_string(),
                &created.html_url,
            ),
        ))
    }
}

/// Title and body for a new pull request, from explicit overrides or
/// from the change summary.
fn titled(
    transform: &TransformResult,
    title: Option<&str>,
    body: Option<&str>,
) -> Result<(String, String), GitError> {
    let summary = transform.summary().trim();
    let derived_title = title.unwrap_or_else(|| summary.lines().next().unwrap_or(""));
    if derived_title.is_empty() {
        return Err(GitError::validation(
            "Pull Request title cannot be empty. Either configure an explicit title or \
             make the change summary non-empty",
        ));
    }
    let derived_body = body.unwrap_or(summary);
    Ok((derived_title.to_owned(), derived_body.to_owned()))
}

/// Hook that aborts a push whose tree is already the head of the open
/// pull request for the same branch.
pub struct GitHubPrWriteHook {
    api: Arc<dyn GitHubApi>,
    url: String,
    project: String,
    branch: String,
    allow_empty_diff: bool,
    allow_empty_diff_merge_statuses: BTreeSet<String>,
}

impl fmt::Debug for GitHubPrWriteHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubPrWriteHook")
            .field("project", &self.project)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl GitHubPrWriteHook {
    /// A hook checking the open pull request whose head is `branch` in
    /// the `owner/repo` slug `project`.
    #[must_use]
    pub fn new(
        api: Arc<dyn GitHubApi>,
        url: impl Into<String>,
        project: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            api,
            url: url.into(),
            project: project.into(),
            branch: branch.into(),
            allow_empty_diff: false,
            allow_empty_diff_merge_statuses: BTreeSet::new(),
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

    async fn skip_upload_for_pr_status(&self, number: u64) -> Result<bool, GitError> {
        // The list endpoint omits merge status fields, so the pull
        // request has to be fetched again individually.
        let pr = self.api.get_pull_request(&self.project, number).await?;
        if !pr.mergeable.unwrap_or(false) {
            tracing::debug!(
                number,
                mergeable = ?pr.mergeable,
                "not skipping upload, pull request is not mergeable",
            );
            return Ok(false);
        }
        if self.allow_empty_diff_merge_statuses.is_empty() {
            return Ok(true);
        }
        let Some(state) = pr.mergeable_state.as_deref() else {
            tracing::warn!(number, "not skipping upload, merge status is unknown");
            return Ok(false);
        };
        let status = state.to_uppercase();
        if self.allow_empty_diff_merge_statuses.contains(&status) {
            tracing::info!(
                number,
                %status,
                "uploading despite the identical tree, merge status is in the upload list",
            );
            Ok(false)
        } else {
            tracing::info!(number, %status, "skipping upload, merge status allows it");
            Ok(true)
        }
    }
}

#[async_trait]
impl WriteHook for GitHubPrWriteHook {
    async fn before_push(
        &self,
        repo: &GitRepository,
        transform: &TransformResult,
    ) -> Result<(), GitError> {
        if self.allow_empty_diff {
            return Ok(());
        }
        let head = format!("{}:{}", project_owner(&self.project), self.branch);
        let pull_requests = match self.api.list_pull_requests(&self.project, &head).await {
            Ok(prs) => prs,
            Err(error)
                if matches!(
                    error.status(),
                    Some(StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY)
                ) =>
            {
                tracing::debug!(branch = %self.branch, "Branch does not exist");
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };
        match pull_requests.as_slice() {
            [] => Ok(()),
            [pr] => {
                let identical = same_git_tree(repo, "HEAD", &self.url, &pr.head.sha).await?;
                if identical && self.skip_upload_for_pr_status(pr.number).await? {
                    let reference = transform.context_reference().unwrap_or("HEAD");
                    return Err(GitError::RedundantChange {
                        message: format!(
                            "Skipping push to the existing pr {}/pull/{} as the change {} is empty.",
                            self.url, pr.number, reference,
                        ),
                        sha: pr.head.sha.clone(),
                    });
                }
                Ok(())
            }
            many => {
                let numbers: Vec<String> =
                    many.iter().map(|pr| pr.number.to_string()).collect();
                tracing::warn!(
                    branch = %self.branch,
                    ids = %numbers.join(", "),
                    "multiple pull requests match the branch, skipping the empty-diff check",
                );
                Ok(())
            }
        }
    }

    async fn after_push(
        &self,
        _sha1: &str,
        _transform: &TransformResult,
    ) -> Result<Vec<DestinationEffect>, GitError> {
        Ok(Vec::new())
    }
}
