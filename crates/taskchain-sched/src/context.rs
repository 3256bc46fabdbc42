//! Execution contexts and the unit of schedulable work.
//!
//! The host application owns exactly two contexts: a single primary thread
//! (where certain host state may only be touched) and a pool of secondary
//! worker threads for blocking or expensive work. Scheduler implementations
//! mark the running thread so callers and tests can observe placement.

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::marker::PhantomData;

/// A zero-argument unit of work handed to a scheduler.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// One of the two execution contexts work can be submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextKind {
    /// The single designated host thread.
    Primary,
    /// A worker thread; blocking is allowed here.
    Secondary,
}

impl ContextKind {
    /// Check whether this is the primary context.
    #[inline]
    #[must_use]
    pub fn is_primary(self) -> bool {
        matches!(self, Self::Primary)
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<ContextKind>> = const { Cell::new(None) };
}

/// The context the calling thread is currently marked as, if any.
///
/// Threads not managed by a scheduler implementation report `None`.
#[inline]
#[must_use]
pub fn current_context() -> Option<ContextKind> {
    CURRENT_CONTEXT.with(Cell::get)
}

/// Marks the current thread as belonging to a context for the guard's
/// lifetime. Scheduler implementations enter a guard around each work unit.
#[derive(Debug)]
pub struct ContextGuard {
    previous: Option<ContextKind>,
    // Restoring another thread's marker would be wrong; keep the guard !Send.
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Mark the current thread as `kind` until the guard is dropped.
    #[must_use]
    pub fn enter(kind: ContextKind) -> Self {
        let previous = CURRENT_CONTEXT.with(|current| current.replace(Some(kind)));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|current| current.set(self.previous));
    }
}
