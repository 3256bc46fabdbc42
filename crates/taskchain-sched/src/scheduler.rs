//! Scheduler contract consumed by the chain engine.
//!
//! The engine never creates, owns, or manages threads itself; it only asks a
//! [`ContextScheduler`] to run a work unit on one of the two contexts, now or
//! after a delay. Anything satisfying this trait can drive a chain — the
//! production shim, or a deterministic test double.

use crate::context::{ContextKind, Work};
use std::time::Duration;

/// Submission primitives for the two host execution contexts.
///
/// # Contract
/// - Work submitted to the primary context runs on the single primary thread,
///   in submission order.
/// - Work submitted to the secondary context may run on any worker thread;
///   no cross-submission ordering is guaranteed.
/// - The `_later` variants run the work no earlier than `delay` from the
///   point of submission.
/// - Submission never blocks the calling thread.
pub trait ContextScheduler: Send + Sync + std::fmt::Debug {
    /// Run `work` on the primary thread.
    fn run_on_primary(&self, work: Work);

    /// Run `work` on a secondary worker thread.
    fn run_on_secondary(&self, work: Work);

    /// Run `work` on the primary thread no earlier than `delay` from now.
    fn run_on_primary_later(&self, work: Work, delay: Duration);

    /// Run `work` on a secondary worker thread no earlier than `delay` from
    /// now.
    fn run_on_secondary_later(&self, work: Work, delay: Duration);

    /// Dispatch `work` to `context`.
    fn submit(&self, context: ContextKind, work: Work) {
        match context {
            ContextKind::Primary => self.run_on_primary(work),
            ContextKind::Secondary => self.run_on_secondary(work),
        }
    }

    /// Dispatch `work` to `context` no earlier than `delay` from now.
    fn submit_later(&self, context: ContextKind, work: Work, delay: Duration) {
        match context {
            ContextKind::Primary => self.run_on_primary_later(work, delay),
            ContextKind::Secondary => self.run_on_secondary_later(work, delay),
        }
    }
}

/// Best-effort extraction of a human-readable message from a panic payload.
///
/// Scheduler implementations and the chain engine catch panicking work at
/// their invocation boundaries and report it through this.
#[must_use]
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
