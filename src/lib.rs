//! Credential-scoped Git transport and destination-write engine.
//!
//! Gitferry migrates transformed source trees into Git destinations. It
//! resolves short-lived credentials and injects them into Git network
//! operations without leaking secrets, drives the destination-side
//! commit/push protocol (empty-change detection, smart pruning of paths
//! outside the destination glob, baseline rebases), and manages the
//! pull/merge request lifecycle against GitHub and GitLab.
//!
//! The Git CLI is treated as an external collaborator behind the typed
//! [`git::GitRepository`] façade; review hosts sit behind the
//! [`github::GitHubApi`] and [`gitlab::GitLabApi`] gateway traits so the
//! destination logic is testable without a network.

pub mod credentials;
pub mod destination;
pub mod git;
pub mod github;
pub mod gitlab;

pub use credentials::{CredentialFileHandler, CredentialIssuer, TtlSecret};
pub use destination::{DestinationEffect, GitDestination, Glob, TransformResult};
pub use git::{GitEnvironment, GitError, GitRepository, GitRevision, Refspec};
pub use github::GitHubPrDestination;
pub use gitlab::GitLabMrDestination;
