//! Error mapping for the GitHub API gateway.

use http::StatusCode;
use thiserror::Error;

/// Errors from GitHub API calls, preserving the HTTP status where one
/// was returned so callers can branch on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitHubApiError {
    /// GitHub answered with a non-success status.
    #[error("{operation} failed with status {status}: {message}")]
    Api {
        /// What was being attempted.
        operation: String,
        /// The HTTP status GitHub returned.
        status: StatusCode,
        /// GitHub's error message.
        message: String,
    },

    /// The request never produced a GitHub response.
    #[error("{operation} failed: {message}")]
    Network {
        /// What was being attempted.
        operation: String,
        /// Transport-level failure description.
        message: String,
    },

    /// The repository URL does not name a GitHub project.
    #[error("cannot find GitHub project for url: {url}")]
    ProjectNotFound {
        /// The offending URL.
        url: String,
    },
}

impl GitHubApiError {
    /// The HTTP status of the failure, when GitHub returned one.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Network { .. } | Self::ProjectNotFound { .. } => None,
        }
    }
}

pub(super) fn map_octocrab_error(operation: &str, error: &octocrab::Error) -> GitHubApiError {
    if let octocrab::Error::GitHub { source, .. } = error {
        return GitHubApiError::Api {
            operation: operation.to_owned(),
            status: source.status_code,
            message: source.message.clone(),
        };
    }
    GitHubApiError::Network {
        operation: operation.to_owned(),
        message: error.to_string(),
    }
}
