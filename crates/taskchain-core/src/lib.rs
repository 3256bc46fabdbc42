//! Taskchain Core - context-switching task-chain engine
//!
//! Sequences operations that must alternate between the host's primary
//! thread and its background workers:
//! - Links declare the context they require; the engine switches contexts
//!   between links and never runs two links of one chain concurrently.
//! - A single threaded value is handed from link to link, typed per adjacent
//!   pair by the builder.
//! - Control flow is a value: every link returns `Continue`, `Abort`, or
//!   `Delay`.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskchain_core::{ChainBuilder, LinkContext, Outcome};
//!
//! let handle = ChainBuilder::new(scheduler)
//!     .then(LinkContext::Primary, |()| Outcome::Continue(lookup_host_state()))
//!     .then(LinkContext::Secondary, |state| Outcome::Continue(expensive(state)))
//!     .finally(LinkContext::Primary, |result| apply_to_host(result))
//!     .start()?;
//!
//! let state = handle.wait().await;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod builder;
pub mod chain;
pub mod error;
pub mod identity;
pub mod link;
pub mod outcome;
pub mod registry;

// Re-exports for convenience
pub use builder::ChainBuilder;
pub use chain::{ChainHandle, ChainId, ChainState, TaskChain};
pub use error::{ChainError, ChainFault};
pub use identity::IdentityRef;
pub use link::{Link, LinkContext};
pub use outcome::Outcome;
pub use registry::IdentityRegistry;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with taskchain
    pub use crate::{
        ChainBuilder, ChainError, ChainHandle, ChainState, IdentityRef, Link, LinkContext,
        Outcome, TaskChain,
    };
    pub use taskchain_sched::{ContextKind, ContextScheduler};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use std::sync::Arc;
    use taskchain_test_utils::ManualScheduler;

    #[test]
    fn full_flow_through_the_prelude() {
        let scheduler = ManualScheduler::new();

        let handle = ChainBuilder::new(scheduler.clone())
            .then(LinkContext::Primary, |()| Outcome::Continue(2_u32))
            .then(LinkContext::Secondary, |n: u32| Outcome::Continue(n * 3))
            .finally(LinkContext::Primary, |n: u32| assert_eq!(n, 6))
            .start()
            .unwrap();

        scheduler.run_until_idle();
        assert_eq!(handle.wait_blocking(), ChainState::Completed);
    }

    #[test]
    fn types_integration() {
        assert_eq!(LinkContext::from(ContextKind::Primary), LinkContext::Primary);
        assert_eq!(
            LinkContext::from(ContextKind::Secondary),
            LinkContext::Secondary
        );
        assert!(ChainState::Completed.is_terminal());
        assert!(!ChainState::Running.is_terminal());
    }
}
