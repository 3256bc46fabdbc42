//! Typed, fluent chain construction.
//!
//! `ChainBuilder<T>` tracks the threaded value's type across links: each
//! [`then`](ChainBuilder::then) call ties its closure's input to the previous
//! link's output, so adjacent-pair type errors surface at build time instead
//! of at a runtime hand-off.

use crate::chain::{ChainHandle, TaskChain};
use crate::error::{ChainError, ChainFault};
use crate::link::{Link, LinkContext};
use crate::outcome::Outcome;
use std::marker::PhantomData;
use std::sync::Arc;
use taskchain_sched::ContextScheduler;

type Callback = Box<dyn FnOnce() + Send + 'static>;
type FaultCallback = Box<dyn FnOnce(ChainFault) + Send + 'static>;

/// Fluent builder for a chain whose threaded value currently has type `T`.
pub struct ChainBuilder<T> {
    scheduler: Arc<dyn ContextScheduler>,
    links: Vec<Link>,
    on_completed: Option<Callback>,
    on_aborted: Option<Callback>,
    on_fault: Option<FaultCallback>,
    _value: PhantomData<fn() -> T>,
}

impl ChainBuilder<()> {
    /// Create a builder for a new chain driven by `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn ContextScheduler>) -> Self {
        Self {
            scheduler,
            links: Vec::new(),
            on_completed: None,
            on_aborted: None,
            on_fault: None,
            _value: PhantomData,
        }
    }
}

impl<T: Send + 'static> ChainBuilder<T> {
    /// Append a link running in `context`. The closure receives the current
    /// threaded value and returns the [`Outcome`] carrying the next one.
    #[must_use]
    pub fn then<O, F>(mut self, context: LinkContext, work: F) -> ChainBuilder<O>
    where
        O: Send + 'static,
        F: FnMut(T) -> Outcome<T, O> + Send + 'static,
    {
        self.links.push(Link::new(context, work));
        ChainBuilder {
            scheduler: self.scheduler,
            links: self.links,
            on_completed: self.on_completed,
            on_aborted: self.on_aborted,
            on_fault: self.on_fault,
            _value: PhantomData,
        }
    }

    /// Append a terminal side effect running in `context`. Sugar for a link
    /// that always continues with `()`.
    #[must_use]
    pub fn finally<F>(self, context: LinkContext, mut work: F) -> ChainBuilder<()>
    where
        F: FnMut(T) + Send + 'static,
    {
        self.then(context, move |value| {
            work(value);
            Outcome::Continue(())
        })
    }

    /// Register a completion callback.
    #[must_use]
    pub fn on_completed(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_completed = Some(Box::new(callback));
        self
    }

    /// Register an abort callback.
    #[must_use]
    pub fn on_aborted(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_aborted = Some(Box::new(callback));
        self
    }

    /// Register a fault callback.
    #[must_use]
    pub fn on_fault(mut self, callback: impl FnOnce(ChainFault) + Send + 'static) -> Self {
        self.on_fault = Some(Box::new(callback));
        self
    }

    /// Build the untyped chain without starting it.
    #[must_use]
    pub fn into_chain(self) -> TaskChain {
        let chain = TaskChain::new(self.scheduler);
        for link in self.links {
            chain.push_link(link);
        }
        if let Some(callback) = self.on_completed {
            chain.on_completed(callback);
        }
        if let Some(callback) = self.on_aborted {
            chain.on_aborted(callback);
        }
        if let Some(callback) = self.on_fault {
            chain.on_fault(callback);
        }
        chain
    }

    /// Build and start the chain.
    ///
    /// # Errors
    /// [`ChainError::Empty`] when no links were added.
    pub fn start(self) -> Result<ChainHandle, ChainError> {
        self.into_chain().start()
    }
}

impl<T> std::fmt::Debug for ChainBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainBuilder")
            .field("links", &self.links.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainState;
    use taskchain_test_utils::ManualScheduler;

    #[test]
    fn empty_builder_fails_to_start() {
        let scheduler = ManualScheduler::new();
        let result = ChainBuilder::new(scheduler).start();
        assert_eq!(result.unwrap_err(), ChainError::Empty);
    }

    #[test]
    fn builder_threads_types_across_links() {
        let scheduler = ManualScheduler::new();

        let handle = ChainBuilder::new(scheduler.clone())
            .then(LinkContext::Any, |()| Outcome::Continue(2_u32))
            .then(LinkContext::Any, |n: u32| Outcome::Continue(n.to_string()))
            .finally(LinkContext::Any, |text: String| {
                assert_eq!(text, "2");
            })
            .start()
            .unwrap();

        scheduler.run_until_idle();
        assert_eq!(handle.wait_blocking(), ChainState::Completed);
    }

    #[test]
    fn into_chain_preserves_link_order() {
        let scheduler = ManualScheduler::new();
        let chain = ChainBuilder::new(scheduler)
            .then(LinkContext::Primary, |()| Outcome::Continue(1_u8))
            .then(LinkContext::Secondary, |n: u8| Outcome::Continue(n))
            .into_chain();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.state(), ChainState::Built);
    }
}
