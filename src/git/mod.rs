//! Typed façade over the external `git` binary.
//!
//! The git CLI is treated as an external collaborator: every operation is a
//! subprocess invocation with an explicit argv, an explicit environment map,
//! and a per-invocation timeout. Protocol-level parsing (ref diffing, log
//! entries, porcelain status) lives here so it can be unit tested against
//! captured output as well as a real binary.

pub mod credential_fill;
pub mod env;
pub mod error;
pub mod refspec;
pub mod repository;
pub mod revision;

pub use credential_fill::{GitCredential, UserPassword};
pub use env::GitEnvironment;
pub use error::GitError;
pub use refspec::Refspec;
pub use repository::{CommandOutput, FetchResult, GitLogEntry, GitRepository, StatusFile};
pub use revision::GitRevision;

#[cfg(test)]
mod refspec_tests;
