//! Error mapping for the GitLab API gateway.

use http::StatusCode;
use thiserror::Error;

/// Errors from GitLab API calls, preserving the HTTP status where one
/// was returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GitLabApiError {
    /// GitLab answered with a non-success status.
    #[error("{operation} failed with status {status}: {message}")]
    Api {
        /// What was being attempted.
        operation: String,
        /// The HTTP status GitLab returned.
        status: StatusCode,
        /// GitLab's error message.
        message: String,
    },

    /// The request never produced a GitLab response.
    #[error("{operation} failed: {message}")]
    Network {
        /// What was being attempted.
        operation: String,
        /// Transport-level failure description.
        message: String,
    },

    /// The project path does not exist on the GitLab host.
    #[error("cannot find GitLab project: {path}")]
    ProjectNotFound {
        /// The project path that was looked up.
        path: String,
    },
}

impl GitLabApiError {
    /// The HTTP status of the failure, when GitLab returned one.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Network { .. } | Self::ProjectNotFound { .. } => None,
        }
    }
}
