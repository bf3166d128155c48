//! GitLab merge request lifecycle on top of the destination writer.
//!
//! [`GitLabMrDestination`] pushes each change to a per-change branch and
//! then discovers, creates, or updates the merge request proposing that
//! branch, reopening it when it was closed in the meantime.

mod api;
mod error;
mod mr_destination;

pub use api::{
    CreateMergeRequest, GitLabApi, MergeRequest, MergeRequestState, Project, RestGitLabApi,
    UpdateMergeRequest, User, encode_project_path,
};
pub use error::GitLabApiError;
pub use mr_destination::{GitLabMrDestination, GitLabMrWriteHook, GitLabMrWriter};

#[cfg(test)]
mod api_tests;
#[cfg(test)]
mod mr_destination_tests;
