//! Input to a destination write.

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};

/// The transformed tree and change metadata handed to a writer.
///
/// Produced by the workflow driver after origin fetch and transformation;
/// the write engine only reads it.
#[derive(Debug, Clone)]
pub struct TransformResult {
    workdir: Utf8PathBuf,
    summary: String,
    author: Option<String>,
    timestamp: DateTime<FixedOffset>,
    baseline: Option<String>,
    ask_for_confirmation: bool,
    labels: BTreeMap<String, Vec<String>>,
    context_reference: Option<String>,
    changed_files: Option<Vec<String>>,
}

impl TransformResult {
    /// A result for the tree rooted at `workdir` with commit message
    /// `summary`.
    #[must_use]
    pub fn new(
        workdir: Utf8PathBuf,
        summary: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            workdir,
            summary: summary.into(),
            author: None,
            timestamp,
            baseline: None,
            ask_for_confirmation: false,
            labels: BTreeMap::new(),
            context_reference: None,
            changed_files: None,
        }
    }

    /// Overrides the commit author (`Name <email>` form).
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Supplies a destination baseline commit to rebase onto.
    #[must_use]
    pub fn with_baseline(mut self, baseline: impl Into<String>) -> Self {
        self.baseline = Some(baseline.into());
        self
    }

    /// Requests interactive confirmation before the push.
    #[must_use]
    pub const fn with_confirmation(mut self) -> Self {
        self.ask_for_confirmation = true;
        self
    }

    /// Attaches change labels used for branch and message templating.
    #[must_use]
    pub fn with_labels(mut self, labels: BTreeMap<String, Vec<String>>) -> Self {
        self.labels = labels;
        self
    }

    /// Restricts staging to the files the transformation actually
    /// touched, relative to the workdir root. Destination files absent
    /// from the workdir but not listed here are left at their baseline
    /// content instead of being deleted.
    #[must_use]
    pub fn with_changed_files(mut self, files: Vec<String>) -> Self {
        self.changed_files = Some(files);
        self
    }

    /// Records the logical change-group reference (e.g. origin branch).
    #[must_use]
    pub fn with_context_reference(mut self, context: impl Into<String>) -> Self {
        self.context_reference = Some(context.into());
        self
    }

    /// Root of the transformed tree.
    #[must_use]
    pub fn workdir(&self) -> &Utf8Path {
        self.workdir.as_path()
    }

    /// The commit message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.summary.as_str()
    }

    /// The author override, when the origin author is carried over.
    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Commit timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// The baseline commit, when this write rebases onto one.
    #[must_use]
    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    /// Whether the user must confirm the diff before pushing.
    #[must_use]
    pub const fn ask_for_confirmation(&self) -> bool {
        self.ask_for_confirmation
    }

    /// Change labels.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, Vec<String>> {
        &self.labels
    }

    /// The logical change-group reference, when known.
    #[must_use]
    pub fn context_reference(&self) -> Option<&str> {
        self.context_reference.as_deref()
    }

    /// The files touched by the transformation, when tracked.
    #[must_use]
    pub fn changed_files(&self) -> Option<&[String]> {
        self.changed_files.as_deref()
    }
}
