//! Tree-level comparison between a local commit and a remote ref.

use crate::git::{GitError, GitRepository};

/// Whether the local commit and the remote ref point at byte-identical
/// trees.
///
/// Fetches the remote ref into `repo` and compares tree hashes, so the
/// result is independent of commit metadata such as dates or messages.
///
/// # Errors
///
/// Returns [`GitError::CannotResolveRevision`] when the remote ref does
/// not exist and [`GitError::Repo`] for transport failures.
pub async fn same_git_tree(
    repo: &GitRepository,
    local_sha: &str,
    url: &str,
    remote_ref: &str,
) -> Result<bool, GitError> {
    let local_tree = repo.tree_hash(local_sha).await?;
    let fetched = repo.fetch_single_ref(url, remote_ref).await?;
    let remote_tree = repo.tree_hash(fetched.sha1()).await?;
    Ok(local_tree == remote_tree)
}
