//! Hooks around the destination push.

use std::fmt;

use async_trait::async_trait;

use super::effect::DestinationEffect;
use super::transform::TransformResult;
use crate::git::{GitError, GitRepository};

/// Extension point run around the push of a destination write.
///
/// Review-host destinations use it to discover existing pull/merge
/// requests before the push and to create or update them afterwards.
#[async_trait]
pub trait WriteHook: Send + Sync + fmt::Debug {
    /// Runs before the push, with the local commit already created.
    ///
    /// May fail with [`GitError::RedundantChange`] to signal that the
    /// push would not change the review request it targets.
    ///
    /// # Errors
    ///
    /// Implementations surface API and transport failures as
    /// [`GitError`] values.
    async fn before_push(
        &self,
        repo: &GitRepository,
        transform: &TransformResult,
    ) -> Result<(), GitError>;

    /// Runs after a successful push; returns effects beyond the commit
    /// itself.
    ///
    /// # Errors
    ///
    /// Implementations surface API and transport failures as
    /// [`GitError`] values.
    async fn after_push(
        &self,
        sha1: &str,
        transform: &TransformResult,
    ) -> Result<Vec<DestinationEffect>, GitError>;
}

/// Hook for plain branch destinations: does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWriteHook;

#[async_trait]
impl WriteHook for DefaultWriteHook {
    async fn before_push(
        &self,
        _repo: &GitRepository,
        _transform: &TransformResult,
    ) -> Result<(), GitError> {
        Ok(())
    }

    async fn after_push(
        &self,
        _sha1: &str,
        _transform: &TransformResult,
    ) -> Result<Vec<DestinationEffect>, GitError> {
        Ok(Vec::new())
    }
}
