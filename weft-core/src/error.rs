//! Error Taxonomy
//!
//! Two classes of failure exist in the runtime:
//!
//! - Structural errors: the host subtree handed to the builder does not have
//!   the shape the generators describe. These are recoverable if an enclosing
//!   component boundary absorbs them; otherwise they abort the build.
//!
//! - Usage errors: an API precondition was violated (a hook registered outside
//!   a component's construction phase, an observe-flagged generator built
//!   twice). These are never routed through error boundaries, because they
//!   signal a programming mistake rather than a runtime data failure.

use thiserror::Error;

/// All errors surfaced by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The host subtree has a different number of children than the
    /// generators describe. Raised during hydration.
    #[error("host child count mismatch during hydration: expected {expected}, found {found}")]
    ChildCountMismatch {
        /// Children the generators expected to attach to.
        expected: usize,
        /// Children actually present on the host node.
        found: usize,
    },

    /// An existing host element's tag does not match the generator's tag.
    /// Raised during hydration.
    #[error("host tag mismatch during hydration: expected <{expected}>, found <{found}>")]
    TagMismatch {
        /// Tag the generator declares.
        expected: String,
        /// Tag of the host element found in its place.
        found: String,
    },

    /// An API precondition was violated. Never absorbed by error boundaries.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),
}

impl Error {
    /// Whether this error belongs to the structural class, i.e. whether an
    /// enclosing component boundary is allowed to absorb it.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::ChildCountMismatch { .. } | Error::TagMismatch { .. }
        )
    }

    pub(crate) fn invalid_usage(msg: impl Into<String>) -> Self {
        Error::InvalidUsage(msg.into())
    }
}
