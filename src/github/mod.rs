//! GitHub pull request lifecycle on top of the destination writer.
//!
//! [`GitHubPrDestination`] pushes each change to a per-change branch and
//! then discovers, creates, or updates the pull request proposing that
//! branch. [`GitHubPrWriteHook`] aborts pushes whose tree is already the
//! head of the open pull request, so repeated migrations of an unchanged
//! revision do not churn the review.

mod api;
mod error;
mod pr_destination;

pub use api::{
    CreatePullRequest, GitHubApi, OctocrabApi, PullRequest, PullRequestSide, UpdatePullRequest,
    project_from_url, project_owner,
};
pub use error::GitHubApiError;
pub use pr_destination::{GitHubPrDestination, GitHubPrWriter, GitHubPrWriteHook};

#[cfg(test)]
mod pr_destination_tests;
