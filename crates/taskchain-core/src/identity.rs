//! Identity-resolving convenience chains.
//!
//! A chain often acts on behalf of some host-owned identity (a connected
//! command sender, a session) that can disappear while the chain is queued.
//! These factories prepend a primary-context resolver link, so every
//! caller-supplied link receives a live handle and never re-checks liveness.
//! Composition replaces the subclass-the-first-link pattern.

use crate::builder::ChainBuilder;
use crate::link::LinkContext;
use crate::outcome::Outcome;
use std::sync::{Arc, Weak};
use taskchain_sched::ContextScheduler;

/// Lookup-only reference to a host-owned identity.
///
/// Holds a [`Weak`] back reference: an `IdentityRef` never extends the
/// target's lifetime.
pub struct IdentityRef<S> {
    target: Weak<S>,
}

impl<S> IdentityRef<S> {
    /// Create a reference to `handle`.
    #[must_use]
    pub fn new(handle: &Arc<S>) -> Self {
        Self {
            target: Arc::downgrade(handle),
        }
    }

    /// Wrap an existing weak reference.
    #[must_use]
    pub fn from_weak(target: Weak<S>) -> Self {
        Self { target }
    }

    /// A reference that never resolves.
    #[must_use]
    pub fn dangling() -> Self {
        Self { target: Weak::new() }
    }

    /// Resolve to a live handle, if the target still exists.
    #[must_use]
    pub fn resolve(&self) -> Option<Arc<S>> {
        self.target.upgrade()
    }

    /// Check whether the target is still live. A `true` result is already
    /// stale by the time the caller observes it; use [`resolve`](Self::resolve)
    /// to act on the handle.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl<S> Clone for IdentityRef<S> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
        }
    }
}

impl<S> std::fmt::Debug for IdentityRef<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRef")
            .field("live", &self.is_live())
            .finish()
    }
}

impl ChainBuilder<()> {
    /// Chain whose first link resolves `identity` on the primary context,
    /// aborting immediately if the handle is no longer live.
    #[must_use]
    pub fn for_identity<S>(
        scheduler: Arc<dyn ContextScheduler>,
        identity: IdentityRef<S>,
    ) -> ChainBuilder<Arc<S>>
    where
        S: Send + Sync + 'static,
    {
        Self::for_lookup(scheduler, move || identity.resolve())
    }

    /// Chain whose first link runs `lookup` on the primary context, aborting
    /// when it returns `None`. Generalizes [`for_identity`](Self::for_identity)
    /// to any host-specific resolution.
    #[must_use]
    pub fn for_lookup<S, F>(scheduler: Arc<dyn ContextScheduler>, mut lookup: F) -> ChainBuilder<S>
    where
        S: Send + 'static,
        F: FnMut() -> Option<S> + Send + 'static,
    {
        ChainBuilder::new(scheduler).then(LinkContext::Primary, move |()| match lookup() {
            Some(handle) => Outcome::Continue(handle),
            None => {
                tracing::debug!("identity no longer live; aborting chain");
                Outcome::Abort
            }
        })
    }
}
