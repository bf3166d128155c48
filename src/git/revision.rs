//! Resolved git revisions.

use std::collections::BTreeMap;
use std::fmt;

use super::error::GitError;

/// Length of a full SHA-1 hex string.
pub const SHA1_HEX_LEN: usize = 40;

/// Returns true when `value` is a complete 40-character SHA-1 hex string.
#[must_use]
pub fn is_complete_sha1(value: &str) -> bool {
    value.len() == SHA1_HEX_LEN && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// A fully resolved revision in a git repository.
///
/// Always carries a complete SHA-1; optionally records the ref it was
/// resolved from, a human-friendly context reference, associated labels,
/// and the remote URL it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRevision {
    sha1: String,
    reference: Option<String>,
    context_reference: Option<String>,
    labels: BTreeMap<String, Vec<String>>,
    url: Option<String>,
}

impl GitRevision {
    /// Creates a revision from a complete SHA-1.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Validation`] when `sha1` is not a 40-character
    /// hex string.
    pub fn new(sha1: impl Into<String>) -> Result<Self, GitError> {
        let sha1 = sha1.into();
        if !is_complete_sha1(&sha1) {
            return Err(GitError::validation(format!(
                "Invalid SHA-1 reference: {sha1}"
            )));
        }
        Ok(Self {
            sha1,
            reference: None,
            context_reference: None,
            labels: BTreeMap::new(),
            url: None,
        })
    }

    /// Records the ref this revision was resolved from.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Records a human-friendly context reference (for example a PR head
    /// branch).
    #[must_use]
    pub fn with_context_reference(mut self, context: impl Into<String>) -> Self {
        self.context_reference = Some(context.into());
        self
    }

    /// Attaches labels usable in message and branch templates.
    #[must_use]
    pub fn with_labels(mut self, labels: BTreeMap<String, Vec<String>>) -> Self {
        self.labels = labels;
        self
    }

    /// Records the remote URL this revision was fetched from.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// The complete SHA-1.
    #[must_use]
    pub fn sha1(&self) -> &str {
        self.sha1.as_str()
    }

    /// The ref this revision was resolved from, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    /// The context reference, falling back to the resolved ref.
    #[must_use]
    pub fn context_reference(&self) -> Option<&str> {
        self.context_reference.as_deref().or(self.reference())
    }

    /// Labels attached to this revision.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, Vec<String>> {
        &self.labels
    }

    /// The remote URL this revision was fetched from, if known.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

impl fmt::Display for GitRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sha1)
    }
}
