//! Error types for the chain engine.
//!
//! Misuse faults (caller bugs) fail fast at the call site as [`ChainError`]
//! values. Unexpected faults raised by a link while executing are contained
//! at the engine's invocation boundary and surfaced as a [`ChainFault`]
//! through the registered fault callback.

/// Caller-bug errors, raised at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The chain was started with zero links.
    #[error("chain has no links")]
    Empty,

    /// The chain was started a second time.
    #[error("chain already started")]
    AlreadyStarted,

    /// A link was added after the chain left the `Built` state.
    #[error("cannot add link after start")]
    LinkAfterStart,
}

/// An unexpected fault raised by a link while executing.
///
/// The chain aborts after the fault is reported; the remaining links never
/// run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainFault {
    /// Index of the faulting link in insertion order.
    pub link_index: usize,
    /// Human-readable fault description.
    pub message: String,
}

impl std::fmt::Display for ChainFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link {} faulted: {}", self.link_index, self.message)
    }
}
