//! Parsing and conversion of git refspecs.

use std::fmt;

use super::error::GitError;

/// A parsed git refspec: `[+]<origin>[:<destination>]`.
///
/// At most one `*` wildcard is allowed, and when present it must appear in
/// both halves. All derived operations are pure functions over the two
/// patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refspec {
    origin: String,
    destination: String,
    allow_no_fast_forward: bool,
}

impl Refspec {
    /// Parses a refspec string.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Validation`] for an empty refspec, multiple
    /// `:` separators ("Multiple ':' found"), a wildcard in only one half
    /// ("Wildcard only used in one part of the refspec"), or malformed ref
    /// syntax ("Invalid refspec: ...").
    pub fn parse(refspec: &str) -> Result<Self, GitError> {
        if refspec.is_empty() {
            return Err(GitError::validation("Empty refspec is not allowed"));
        }
        let (allow_no_fast_forward, remainder) = match refspec.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, refspec),
        };

        let mut elements = remainder.split(':');
        let origin = elements.next().unwrap_or_default().to_owned();
        let destination = elements.next().map_or_else(|| origin.clone(), str::to_owned);
        if elements.next().is_some() {
            return Err(GitError::validation(format!(
                "Invalid refspec. Multiple ':' found: '{refspec}'"
            )));
        }

        validate_ref_syntax(&origin, refspec)?;
        validate_ref_syntax(&destination, refspec)?;
        if origin.contains('*') != destination.contains('*') {
            return Err(GitError::validation(format!(
                "Wildcard only used in one part of the refspec: {refspec}"
            )));
        }

        Ok(Self {
            origin,
            destination,
            allow_no_fast_forward,
        })
    }

    /// The origin ref pattern.
    #[must_use]
    pub fn origin(&self) -> &str {
        self.origin.as_str()
    }

    /// The destination ref pattern.
    #[must_use]
    pub fn destination(&self) -> &str {
        self.destination.as_str()
    }

    /// Whether non-fast-forward updates are allowed (leading `+`).
    #[must_use]
    pub const fn is_allow_no_fast_forward(&self) -> bool {
        self.allow_no_fast_forward
    }

    /// Returns a copy with non-fast-forward updates allowed.
    #[must_use]
    pub fn with_allow_no_fast_forward(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            allow_no_fast_forward: true,
        }
    }

    /// A refspec mapping the origin pattern onto itself.
    #[must_use]
    pub fn origin_to_origin(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            destination: self.origin.clone(),
            allow_no_fast_forward: self.allow_no_fast_forward,
        }
    }

    /// A refspec mapping the destination pattern onto itself.
    #[must_use]
    pub fn destination_to_destination(&self) -> Self {
        Self {
            origin: self.destination.clone(),
            destination: self.destination.clone(),
            allow_no_fast_forward: self.allow_no_fast_forward,
        }
    }

    /// Swaps origin and destination.
    #[must_use]
    pub fn invert(&self) -> Self {
        Self {
            origin: self.destination.clone(),
            destination: self.origin.clone(),
            allow_no_fast_forward: self.allow_no_fast_forward,
        }
    }

    /// Converts a concrete origin ref to the destination ref.
    ///
    /// Without a wildcard the destination pattern is returned unchanged.
    /// With a wildcard, the part of `origin_ref` matched by `*` is
    /// substituted into the destination pattern.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Validation`] when `origin_ref` does not match
    /// the origin pattern.
    pub fn convert(&self, origin_ref: &str) -> Result<String, GitError> {
        let Some((from_prefix, from_suffix)) = self.origin.split_once('*') else {
            if origin_ref != self.origin {
                return Err(GitError::validation(format!(
                    "ref '{origin_ref}' does not match refspec origin '{origin}'",
                    origin = self.origin
                )));
            }
            return Ok(self.destination.clone());
        };

        let middle = origin_ref
            .strip_prefix(from_prefix)
            .and_then(|rest| rest.strip_suffix(from_suffix))
            .ok_or_else(|| {
                GitError::validation(format!(
                    "ref '{origin_ref}' does not match refspec origin '{origin}'",
                    origin = self.origin
                ))
            })?;

        let Some((to_prefix, to_suffix)) = self.destination.split_once('*') else {
            return Err(GitError::validation(format!(
                "refspec destination '{destination}' has no wildcard",
                destination = self.destination
            )));
        };
        Ok(format!("{to_prefix}{middle}{to_suffix}"))
    }

    /// Whether a concrete ref matches the origin pattern.
    #[must_use]
    pub fn matches_origin(&self, origin_ref: &str) -> bool {
        self.origin.split_once('*').map_or_else(
            || origin_ref == self.origin,
            |(prefix, suffix)| {
                origin_ref
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.ends_with(suffix))
            },
        )
    }
}

impl fmt::Display for Refspec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let force = if self.allow_no_fast_forward { "+" } else { "" };
        write!(
            f,
            "{force}{origin}:{destination}",
            origin = self.origin,
            destination = self.destination
        )
    }
}

/// Syntactic validation of one refspec half.
///
/// This intentionally avoids shelling out to `git check-ref-format`:
/// the accepted grammar is components of `[A-Za-z0-9_.-]` separated by
/// `/`, with at most one `*` component, no `..`, and no `.lock` suffix.
/// Purely numeric single-component names are rejected as ambiguous with
/// revision numbers.
fn validate_ref_syntax(half: &str, full_refspec: &str) -> Result<(), GitError> {
    let invalid = || GitError::validation(format!("Invalid refspec: {full_refspec}"));

    if half.is_empty()
        || half.ends_with('.')
        || half.ends_with(".lock")
        || half.contains("..")
        || half.starts_with('/')
        || half.ends_with('/')
    {
        return Err(invalid());
    }
    let mut wildcard_seen = false;
    for component in half.split('/') {
        if component == "*" {
            if wildcard_seen {
                return Err(invalid());
            }
            wildcard_seen = true;
            continue;
        }
        // A wildcard may also appear glued to a component edge
        // (e.g. `refs/heads/release-*`).
        let stripped = component.replace('*', "");
        if component.matches('*').count() > 1 || (component.contains('*') && wildcard_seen) {
            return Err(invalid());
        }
        if component.contains('*') {
            wildcard_seen = true;
        }
        if stripped.is_empty() && !component.contains('*') {
            return Err(invalid());
        }
        if !stripped
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            || stripped.starts_with('.')
        {
            return Err(invalid());
        }
    }
    // `1234` style names are ambiguous with revision numbers.
    if !half.contains('/') && !half.is_empty() && half.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    // Multiple wildcards across components.
    if half.matches('*').count() > 1 {
        return Err(invalid());
    }
    Ok(())
}
