//! Error types for the reactivity core.
//!
//! Most failure modes in this crate are deliberately non-fatal: wrapping an
//! invalid target returns it unchanged, writes through a readonly handle are
//! ignored, and self-triggering effects are skipped. The errors below cover
//! the remaining cases where a caller asked for something the value cannot do.

use thiserror::Error;

/// Errors surfaced by the reactivity core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A sequence-only operation (push, splice, index_of, ...) was invoked on
    /// a value that is not an ordered sequence.
    #[error("`{method}` requires a sequence, found {found}")]
    NotASequence {
        method: &'static str,
        found: &'static str,
    },

    /// A collection-only operation (add, clear, ...) was invoked on a value
    /// that is not a map or set.
    #[error("`{method}` requires a map or set, found {found}")]
    NotACollection {
        method: &'static str,
        found: &'static str,
    },

    /// A snapshot was requested for a value graph that contains a cycle.
    #[error("cannot snapshot a cyclic structure")]
    CyclicValue,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
