//! Tokio-backed scheduler shim.
//!
//! The primary context is one dedicated OS thread looping on an unbounded
//! channel, so primary work runs strictly in submission order. The secondary
//! context is the Tokio blocking pool (work there may block). Delayed
//! submission rides the Tokio timer.

use crate::context::{ContextGuard, ContextKind, Work};
use crate::error::SchedulerError;
use crate::scheduler::{panic_message, ContextScheduler};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

/// Configuration for [`TokioContextScheduler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// OS-level name given to the dedicated primary thread.
    pub primary_thread_name: String,
}

impl SchedulerConfig {
    /// Create default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a primary thread name.
    #[inline]
    #[must_use]
    pub fn with_primary_thread_name(mut self, name: impl Into<String>) -> Self {
        self.primary_thread_name = name.into();
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            primary_thread_name: "taskchain-primary".to_string(),
        }
    }
}

enum PrimaryMessage {
    Run(Work),
    Shutdown,
}

/// Production [`ContextScheduler`] backed by a host Tokio runtime.
///
/// Owns the primary thread; everything else belongs to the runtime handed in
/// at construction. Work submitted after [`shutdown`](Self::shutdown) is
/// dropped with a warning.
pub struct TokioContextScheduler {
    primary_tx: mpsc::UnboundedSender<PrimaryMessage>,
    runtime: tokio::runtime::Handle,
    primary_thread: Mutex<Option<thread::JoinHandle<()>>>,
    config: SchedulerConfig,
}

impl TokioContextScheduler {
    /// Start a scheduler with default configuration.
    ///
    /// # Errors
    /// Returns [`SchedulerError::PrimarySpawn`] if the primary thread cannot
    /// be created.
    pub fn start(runtime: tokio::runtime::Handle) -> Result<Self, SchedulerError> {
        Self::with_config(runtime, SchedulerConfig::default())
    }

    /// Start a scheduler with the given configuration.
    ///
    /// # Errors
    /// Returns [`SchedulerError::PrimarySpawn`] if the primary thread cannot
    /// be created.
    pub fn with_config(
        runtime: tokio::runtime::Handle,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        let (primary_tx, mut primary_rx) = mpsc::unbounded_channel::<PrimaryMessage>();

        let primary_thread = thread::Builder::new()
            .name(config.primary_thread_name.clone())
            .spawn(move || {
                let _guard = ContextGuard::enter(ContextKind::Primary);
                while let Some(message) = primary_rx.blocking_recv() {
                    match message {
                        PrimaryMessage::Run(work) => {
                            if let Err(payload) = catch_unwind(AssertUnwindSafe(work)) {
                                tracing::error!(
                                    context = %ContextKind::Primary,
                                    "scheduled work panicked: {}",
                                    panic_message(payload.as_ref())
                                );
                            }
                        }
                        PrimaryMessage::Shutdown => break,
                    }
                }
            })?;

        Ok(Self {
            primary_tx,
            runtime,
            primary_thread: Mutex::new(Some(primary_thread)),
            config,
        })
    }

    /// Get configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Stop the primary loop once all currently queued primary work has run,
    /// then join the primary thread. Safe to call more than once.
    pub fn shutdown(&self) {
        let _ = self.primary_tx.send(PrimaryMessage::Shutdown);

        let handle = self.primary_thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Shutdown requested from inside primary work; the loop exits
                // once this unit returns, so joining here would deadlock.
                tracing::debug!("shutdown from primary context; detaching primary thread");
                return;
            }
            if handle.join().is_err() {
                tracing::error!("primary context thread panicked");
            }
        }
    }
}

impl ContextScheduler for TokioContextScheduler {
    fn run_on_primary(&self, work: Work) {
        if self.primary_tx.send(PrimaryMessage::Run(work)).is_err() {
            tracing::warn!("primary context is shut down; dropping submitted work");
        }
    }

    fn run_on_secondary(&self, work: Work) {
        self.runtime.spawn_blocking(move || run_secondary_work(work));
    }

    fn run_on_primary_later(&self, work: Work, delay: Duration) {
        let primary_tx = self.primary_tx.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if primary_tx.send(PrimaryMessage::Run(work)).is_err() {
                tracing::warn!("primary context is shut down; dropping delayed work");
            }
        });
    }

    fn run_on_secondary_later(&self, work: Work, delay: Duration) {
        let runtime = self.runtime.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            runtime.spawn_blocking(move || run_secondary_work(work));
        });
    }
}

impl std::fmt::Debug for TokioContextScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioContextScheduler")
            .field("primary_thread_name", &self.config.primary_thread_name)
            .finish_non_exhaustive()
    }
}

impl Drop for TokioContextScheduler {
    fn drop(&mut self) {
        // Let the primary loop wind down; joining here could deadlock if the
        // scheduler is dropped from primary work.
        let _ = self.primary_tx.send(PrimaryMessage::Shutdown);
    }
}

fn run_secondary_work(work: Work) {
    let _guard = ContextGuard::enter(ContextKind::Secondary);
    if let Err(payload) = catch_unwind(AssertUnwindSafe(work)) {
        tracing::error!(
            context = %ContextKind::Secondary,
            "scheduled work panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}
