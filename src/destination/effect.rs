//! Records of what a write did in the destination.

/// Kind of change a write produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectType {
    /// A new destination object was created.
    Created,
    /// An existing destination object was updated.
    Updated,
    /// Nothing changed.
    Noop,
    /// The write failed after producing partial state.
    Error,
}

/// A reference to an object created or updated in the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRef {
    id: String,
    ref_type: String,
    url: Option<String>,
}

impl DestinationRef {
    /// A reference to a commit by SHA-1.
    #[must_use]
    pub fn commit(sha1: impl Into<String>) -> Self {
        Self {
            id: sha1.into(),
            ref_type: "commit".to_owned(),
            url: None,
        }
    }

    /// A reference to a review request (pull or merge request).
    #[must_use]
    pub fn review_request(
        ref_type: impl Into<String>,
        id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            ref_type: ref_type.into(),
            url: Some(url.into()),
        }
    }

    /// Identifier of the referenced object (SHA-1, PR number, MR iid).
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// The kind of object referenced, e.g. `commit` or `merge_request`.
    #[must_use]
    pub fn ref_type(&self) -> &str {
        self.ref_type.as_str()
    }

    /// Web URL of the referenced object, when it has one.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }
}

/// One observable outcome of a write invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationEffect {
    effect_type: EffectType,
    summary: String,
    destination_ref: Option<DestinationRef>,
    errors: Vec<String>,
}

impl DestinationEffect {
    /// An effect describing a created or updated destination object.
    #[must_use]
    pub fn new(
        effect_type: EffectType,
        summary: impl Into<String>,
        destination_ref: DestinationRef,
    ) -> Self {
        Self {
            effect_type,
            summary: summary.into(),
            destination_ref: Some(destination_ref),
            errors: Vec::new(),
        }
    }

    /// An effect recording that nothing happened.
    #[must_use]
    pub fn noop(summary: impl Into<String>) -> Self {
        Self {
            effect_type: EffectType::Noop,
            summary: summary.into(),
            destination_ref: None,
            errors: Vec::new(),
        }
    }

    /// The kind of change.
    #[must_use]
    pub const fn effect_type(&self) -> EffectType {
        self.effect_type
    }

    /// Human-readable description of the effect.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.summary.as_str()
    }

    /// The destination object this effect refers to.
    #[must_use]
    pub const fn destination_ref(&self) -> Option<&DestinationRef> {
        self.destination_ref.as_ref()
    }

    /// Errors recorded alongside a partial effect.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        self.errors.as_slice()
    }
}
