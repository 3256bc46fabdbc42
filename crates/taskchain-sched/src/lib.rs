//! Taskchain Scheduler - execution-context contract and Tokio shim
//!
//! The chain engine alternates work between two host execution contexts:
//! - The **primary context**: one designated thread where certain host state
//!   may be safely touched. Work there must be fast and non-blocking.
//! - The **secondary context**: worker threads for blocking or expensive
//!   work.
//!
//! This crate defines the [`ContextScheduler`] contract the engine consumes
//! and provides [`TokioContextScheduler`], the production shim.
//!
//! # Example
//!
//! ```rust,ignore
//! use taskchain_sched::{ContextScheduler, TokioContextScheduler};
//!
//! let scheduler = TokioContextScheduler::start(tokio::runtime::Handle::current())?;
//! scheduler.run_on_primary(Box::new(|| {
//!     // touch host state
//! }));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod context;
mod error;
mod scheduler;
mod tokio_scheduler;

pub use context::{current_context, ContextGuard, ContextKind, Work};
pub use error::SchedulerError;
pub use scheduler::{panic_message, ContextScheduler};
pub use tokio_scheduler::{SchedulerConfig, TokioContextScheduler};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
