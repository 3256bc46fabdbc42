//! Named identity registry.
//!
//! Host-side registry of live handles keyed by name, for chains constructed
//! from a name rather than a captured reference. Stores only weak
//! references: registration never extends a handle's lifetime.

use crate::builder::ChainBuilder;
use crate::identity::IdentityRef;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use taskchain_sched::ContextScheduler;

/// Concurrent name-to-handle registry.
pub struct IdentityRegistry<S> {
    entries: DashMap<String, Weak<S>>,
}

impl<S> IdentityRegistry<S>
where
    S: Send + Sync + 'static,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register `handle` under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, handle: &Arc<S>) {
        self.entries.insert(name.into(), Arc::downgrade(handle));
    }

    /// Remove the entry for `name`. Returns whether an entry existed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Resolve `name` to a live handle.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<S>> {
        self.entries.get(name).and_then(|entry| entry.upgrade())
    }

    /// Get a lookup-only reference for `name`, if registered. The reference
    /// stays bound to the handle registered at call time.
    #[must_use]
    pub fn identity(&self, name: &str) -> Option<IdentityRef<S>> {
        self.entries
            .get(name)
            .map(|entry| IdentityRef::from_weak(entry.value().clone()))
    }

    /// Drop entries whose handles are gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, target| target.strong_count() > 0);
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S> Default for IdentityRegistry<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for IdentityRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ChainBuilder<()> {
    /// Chain whose first link resolves `name` through `registry` on the
    /// primary context, aborting when the name is unregistered or stale.
    #[must_use]
    pub fn for_name<S>(
        scheduler: Arc<dyn ContextScheduler>,
        registry: Arc<IdentityRegistry<S>>,
        name: impl Into<String>,
    ) -> ChainBuilder<Arc<S>>
    where
        S: Send + Sync + 'static,
    {
        let name = name.into();
        Self::for_lookup(scheduler, move || registry.resolve(&name))
    }
}
