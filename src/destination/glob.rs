//! Include/exclude path matching for destination files.
//!
//! Patterns are `/`-separated. Within a segment `*` matches any run of
//! characters and `?` matches one character; a whole segment of `**`
//! matches zero or more path segments.

use std::collections::BTreeSet;

/// Set of destination paths a migration owns.
///
/// A path belongs to the glob when it matches at least one include
/// pattern and no exclude pattern. Everything outside the glob is left
/// untouched by a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Glob {
    /// A glob from include patterns.
    #[must_use]
    pub fn new(include: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
        }
    }

    /// The glob matching every path.
    #[must_use]
    pub fn all_files() -> Self {
        Self::new(["**"])
    }

    /// Adds exclude patterns.
    #[must_use]
    pub fn with_exclude(mut self, exclude: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude
            .extend(exclude.into_iter().map(Into::into));
        self
    }

    /// Whether `path` (relative, `/`-separated) belongs to this glob.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('/').collect();
        self.include
            .iter()
            .any(|pattern| match_pattern(pattern, &segments))
            && !self
                .exclude
                .iter()
                .any(|pattern| match_pattern(pattern, &segments))
    }

    /// The minimal set of directory roots covering the include patterns.
    ///
    /// An empty-string root means the whole tree.
    #[must_use]
    pub fn roots(&self) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();
        for pattern in &self.include {
            let mut literal = Vec::new();
            for segment in pattern.split('/') {
                if segment.contains('*') || segment.contains('?') {
                    break;
                }
                literal.push(segment);
            }
            candidates.insert(literal.join("/"));
        }
        if candidates.contains("") {
            return BTreeSet::from([String::new()]);
        }
        let nested: Vec<String> = candidates
            .iter()
            .filter(|root| {
                candidates
                    .iter()
                    .any(|other| *root != other && root.starts_with(&format!("{other}/")))
            })
            .cloned()
            .collect();
        for root in nested {
            candidates.remove(&root);
        }
        candidates
    }
}

fn match_pattern(pattern: &str, path: &[&str]) -> bool {
    let segments: Vec<&str> = pattern.split('/').collect();
    match_segments(&segments, path)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len())
            .any(|skip| path.get(skip..).is_some_and(|tail| match_segments(rest, tail))),
        Some((&head, rest)) => path
            .split_first()
            .is_some_and(|(&first, tail)| match_segment(head, first) && match_segments(rest, tail)),
    }
}

fn match_segment(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();
    match_chars(&pattern_chars, &text_chars)
}

fn match_chars(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((&'*', rest)) => (0..=text.len())
            .any(|skip| text.get(skip..).is_some_and(|tail| match_chars(rest, tail))),
        Some((&'?', rest)) => text
            .split_first()
            .is_some_and(|(_, tail)| match_chars(rest, tail)),
        Some((&expected, rest)) => text
            .split_first()
            .is_some_and(|(&first, tail)| first == expected && match_chars(rest, tail)),
    }
}
