//! Error taxonomy for the Git transport and destination-write layers.
//!
//! The taxonomy deliberately separates user/config mistakes (`Validation`),
//! resolution failures callers may want to retry differently
//! (`CannotResolveRevision`), transport failures (`Repo`, `Timeout`),
//! semantic no-ops (`EmptyChange`, `RedundantChange`), and recoverable
//! conflicts (`RebaseConflict`). Secrets never appear in any message.

use thiserror::Error;

use crate::credentials::CredentialError;

/// Errors surfaced by Git operations and the destination writer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitError {
    /// A user or configuration mistake; non-retryable, names the offending
    /// value.
    #[error("{message}")]
    Validation {
        /// What was wrong, naming the offending value.
        message: String,
    },

    /// A ref, SHA-1, or revision could not be resolved. Distinct from
    /// [`GitError::Repo`] so callers can fall back to a different
    /// resolution strategy.
    #[error("{message}")]
    CannotResolveRevision {
        /// Which reference could not be found and where.
        message: String,
    },

    /// A git invocation failed; carries stderr/stdout context.
    #[error("{message}")]
    Repo {
        /// Failure description including command output.
        message: String,
    },

    /// A git invocation exceeded the configured timeout.
    #[error("git command timed out after {seconds}s: {command}")]
    Timeout {
        /// The argv that was being executed.
        command: String,
        /// The configured timeout in whole seconds.
        seconds: u64,
    },

    /// The migration produced no change against the baseline. A signal to
    /// the workflow driver, not a failure of this layer.
    #[error("empty change: {message}")]
    EmptyChange {
        /// Details about the baseline the change was empty against.
        message: String,
    },

    /// The tree to push is identical to the existing review request's head
    /// tree. A signal, not a failure.
    #[error("{message}")]
    RedundantChange {
        /// Which existing request made the push redundant.
        message: String,
        /// Head commit SHA of the existing request.
        sha: String,
    },

    /// Rebasing onto the moved destination produced conflicts.
    #[error("rebase conflict in: {}", paths.join(", "))]
    RebaseConflict {
        /// Paths left in conflicted state.
        paths: Vec<String>,
    },

    /// Credential issuance or storage failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// A GitHub API call failed; the HTTP status is preserved.
    #[error(transparent)]
    GitHubApi(#[from] crate::github::GitHubApiError),

    /// A GitLab API call failed; the HTTP status is preserved.
    #[error(transparent)]
    GitLabApi(#[from] crate::gitlab::GitLabApiError),
}

impl GitError {
    /// Builds a [`GitError::Validation`] from a message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Builds a [`GitError::Repo`] from a message.
    #[must_use]
    pub fn repo(message: impl Into<String>) -> Self {
        Self::Repo {
            message: message.into(),
        }
    }

    /// Builds a [`GitError::CannotResolveRevision`] from a message.
    #[must_use]
    pub fn cannot_resolve(message: impl Into<String>) -> Self {
        Self::CannotResolveRevision {
            message: message.into(),
        }
    }
}
