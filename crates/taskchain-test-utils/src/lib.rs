//! Testing utilities for the taskchain workspace
//!
//! Shared test helpers: a deterministic scheduler with a virtual clock, and
//! a trace recorder for asserting where work ran.

#![allow(missing_docs)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use taskchain_sched::{current_context, ContextGuard, ContextKind, ContextScheduler, Work};

struct DelayedWork {
    due: Duration,
    context: ContextKind,
    work: Work,
}

#[derive(Default)]
struct Queues {
    primary: VecDeque<Work>,
    secondary: VecDeque<Work>,
    delayed: Vec<DelayedWork>,
    now: Duration,
}

/// Deterministic, single-threaded [`ContextScheduler`] double.
///
/// Nothing runs until the test drains the queues: [`run_until_idle`]
/// executes queued work on the calling thread under the matching context
/// marker (primary queue first), and [`advance`] moves the virtual clock,
/// releasing delayed work that has come due.
///
/// [`run_until_idle`]: ManualScheduler::run_until_idle
/// [`advance`]: ManualScheduler::advance
pub struct ManualScheduler {
    queues: Mutex<Queues>,
}

impl ManualScheduler {
    /// Create a scheduler. Returns an `Arc` since chains share their
    /// scheduler.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queues: Mutex::new(Queues::default()),
        })
    }

    /// Execute queued work until both queues are empty, primary queue first.
    /// Returns how many work units ran. Delayed work stays parked until
    /// [`advance`](Self::advance) releases it.
    pub fn run_until_idle(&self) -> usize {
        let mut executed = 0;
        loop {
            let next = {
                let mut queues = self.queues.lock();
                if let Some(work) = queues.primary.pop_front() {
                    Some((ContextKind::Primary, work))
                } else if let Some(work) = queues.secondary.pop_front() {
                    Some((ContextKind::Secondary, work))
                } else {
                    None
                }
            };
            // Run outside the lock: work re-enters the scheduler to submit
            // continuations.
            match next {
                Some((context, work)) => {
                    let _guard = ContextGuard::enter(context);
                    work();
                    executed += 1;
                }
                None => return executed,
            }
        }
    }

    /// Move the virtual clock forward, releasing due delayed work into its
    /// context queue. Does not execute anything.
    pub fn advance(&self, delta: Duration) {
        let mut queues = self.queues.lock();
        queues.now += delta;
        let now = queues.now;

        let (due, parked): (Vec<_>, Vec<_>) = queues
            .delayed
            .drain(..)
            .partition(|entry| entry.due <= now);
        queues.delayed = parked;
        for entry in due {
            match entry.context {
                ContextKind::Primary => queues.primary.push_back(entry.work),
                ContextKind::Secondary => queues.secondary.push_back(entry.work),
            }
        }
    }

    /// [`advance`](Self::advance) followed by [`run_until_idle`](Self::run_until_idle).
    pub fn advance_and_run(&self, delta: Duration) -> usize {
        self.advance(delta);
        self.run_until_idle()
    }

    /// Work units queued for immediate execution.
    #[must_use]
    pub fn pending(&self) -> usize {
        let queues = self.queues.lock();
        queues.primary.len() + queues.secondary.len()
    }

    /// Work units parked behind the virtual clock.
    #[must_use]
    pub fn pending_delayed(&self) -> usize {
        self.queues.lock().delayed.len()
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.queues.lock().now
    }
}

impl ContextScheduler for ManualScheduler {
    fn run_on_primary(&self, work: Work) {
        self.queues.lock().primary.push_back(work);
    }

    fn run_on_secondary(&self, work: Work) {
        self.queues.lock().secondary.push_back(work);
    }

    fn run_on_primary_later(&self, work: Work, delay: Duration) {
        let mut queues = self.queues.lock();
        let due = queues.now + delay;
        queues.delayed.push(DelayedWork {
            due,
            context: ContextKind::Primary,
            work,
        });
    }

    fn run_on_secondary_later(&self, work: Work, delay: Duration) {
        let mut queues = self.queues.lock();
        let due = queues.now + delay;
        queues.delayed.push(DelayedWork {
            due,
            context: ContextKind::Secondary,
            work,
        });
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queues = self.queues.lock();
        f.debug_struct("ManualScheduler")
            .field("primary", &queues.primary.len())
            .field("secondary", &queues.secondary.len())
            .field("delayed", &queues.delayed.len())
            .field("now", &queues.now)
            .finish()
    }
}

/// One recorded observation: a label plus the context the recording thread
/// was marked as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub label: String,
    pub context: Option<ContextKind>,
}

/// Thread-safe recorder for asserting execution order and placement.
#[derive(Debug, Clone, Default)]
pub struct ContextTrace {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl ContextTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `label` together with the current thread's context marker.
    pub fn record(&self, label: impl Into<String>) {
        self.events.lock().push(TraceEvent {
            label: label.into(),
            context: current_context(),
        });
    }

    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|event| event.label.clone())
            .collect()
    }

    #[must_use]
    pub fn contexts(&self) -> Vec<Option<ContextKind>> {
        self.events.lock().iter().map(|event| event.context).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}
