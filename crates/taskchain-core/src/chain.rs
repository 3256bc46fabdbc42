//! Task chain engine.
//!
//! A chain owns an ordered sequence of links and threads a single value
//! through them, switching execution context whenever the next link demands
//! one the engine is not currently in. The engine never runs two links of
//! the same chain concurrently and owns no threads: context switches and
//! delayed re-invocations are handed to the [`ContextScheduler`].
//!
//! State machine: `Built -> Running -> {Completed | Aborted}`. Terminal
//! states are final; a chain is not restartable.

use crate::error::{ChainError, ChainFault};
use crate::link::{BoxedValue, DynOutcome, Link};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use taskchain_sched::{panic_message, ContextKind, ContextScheduler};
use tokio::sync::oneshot;
use ulid::Ulid;

/// Unique chain identifier (ULID for sortability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub Ulid);

impl ChainId {
    /// Generate new chain ID.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution state of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainState {
    /// Links may still be added; execution has not begun.
    Built,
    /// Execution is in progress.
    Running,
    /// Every link ran and returned `Continue`.
    Completed,
    /// A link aborted or faulted; remaining links were skipped.
    Aborted,
}

impl ChainState {
    /// Check whether this state is final.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

type Callback = Box<dyn FnOnce() + Send + 'static>;
type FaultCallback = Box<dyn FnOnce(ChainFault) + Send + 'static>;

struct ChainBody {
    // Slots are `None` only while their link is in flight.
    links: Vec<Option<Link>>,
    cursor: usize,
    value: Option<BoxedValue>,
    state: ChainState,
    current: Option<ContextKind>,
    on_completed: Option<Callback>,
    on_aborted: Option<Callback>,
    on_fault: Option<FaultCallback>,
    done_tx: Option<oneshot::Sender<ChainState>>,
}

struct ChainShared {
    id: ChainId,
    scheduler: Arc<dyn ContextScheduler>,
    body: Mutex<ChainBody>,
}

/// Everything needed to report a terminal transition, extracted under the
/// lock and fired after it is released.
struct FinishSet {
    id: ChainId,
    terminal: ChainState,
    callback: Option<Callback>,
    on_fault: Option<FaultCallback>,
    fault: Option<ChainFault>,
    done_tx: Option<oneshot::Sender<ChainState>>,
}

impl FinishSet {
    fn fire(self) {
        match (self.fault, self.on_fault) {
            (Some(fault), Some(on_fault)) => {
                tracing::warn!(chain = %self.id, link = fault.link_index, "chain aborted by fault: {}", fault.message);
                on_fault(fault);
            }
            (Some(fault), None) => {
                tracing::error!(chain = %self.id, link = fault.link_index, "unhandled link fault: {}", fault.message);
            }
            (None, _) => {
                tracing::debug!(chain = %self.id, state = ?self.terminal, "chain finished");
            }
        }
        if let Some(callback) = self.callback {
            callback();
        }
        if let Some(done_tx) = self.done_tx {
            let _ = done_tx.send(self.terminal);
        }
    }
}

enum Dispatch {
    /// The next link runs in the context the engine is already in.
    Inline,
    /// The next link was handed to the scheduler.
    Handed,
    /// The chain reached a terminal state (or was already terminal).
    Finished,
}

enum AfterLink {
    Advance,
    Stop,
}

impl ChainShared {
    fn take_finish(
        &self,
        body: &mut ChainBody,
        terminal: ChainState,
        fault: Option<ChainFault>,
    ) -> FinishSet {
        body.state = terminal;
        body.value = None;
        let callback = match terminal {
            ChainState::Completed => {
                body.on_aborted = None;
                body.on_completed.take()
            }
            _ => {
                body.on_completed = None;
                body.on_aborted.take()
            }
        };
        FinishSet {
            id: self.id,
            terminal,
            callback,
            on_fault: body.on_fault.take(),
            fault,
            done_tx: body.done_tx.take(),
        }
    }

    /// Decide where the link at the cursor runs, or finish the chain when the
    /// cursor is past the last link.
    fn dispatch(this: &Arc<Self>) -> Dispatch {
        enum Decision {
            Finish(FinishSet),
            Inline,
            Submit(ContextKind),
            Idle,
        }

        let decision = {
            let mut body = this.body.lock();
            if body.state != ChainState::Running {
                Decision::Idle
            } else if body.cursor >= body.links.len() {
                Decision::Finish(this.take_finish(&mut body, ChainState::Completed, None))
            } else {
                match body.links[body.cursor].as_ref().map(Link::context) {
                    None => {
                        // Protocol violation: a second continuation raced the
                        // in-flight link. Fail fast instead of double-running.
                        let fault = ChainFault {
                            link_index: body.cursor,
                            message: "link already in flight".to_string(),
                        };
                        Decision::Finish(this.take_finish(&mut body, ChainState::Aborted, Some(fault)))
                    }
                    Some(required) => match required.demand() {
                        None => {
                            if body.current.is_some() {
                                Decision::Inline
                            } else {
                                // Undefined context at start: an `Any` first
                                // link goes to the secondary context.
                                body.current = Some(ContextKind::Secondary);
                                Decision::Submit(ContextKind::Secondary)
                            }
                        }
                        Some(target) if body.current == Some(target) => Decision::Inline,
                        Some(target) => {
                            body.current = Some(target);
                            Decision::Submit(target)
                        }
                    },
                }
            }
        };

        match decision {
            Decision::Idle => Dispatch::Finished,
            Decision::Finish(finish) => {
                finish.fire();
                Dispatch::Finished
            }
            Decision::Inline => Dispatch::Inline,
            Decision::Submit(target) => {
                let chain = Arc::clone(this);
                this.scheduler
                    .submit(target, Box::new(move || Self::run_loop(chain)));
                Dispatch::Handed
            }
        }
    }

    /// Run links starting at the cursor until the chain hands off to another
    /// context, delays, or reaches a terminal state.
    fn run_loop(this: Arc<Self>) {
        loop {
            match Self::run_at_cursor(&this) {
                AfterLink::Advance => match Self::dispatch(&this) {
                    Dispatch::Inline => {}
                    Dispatch::Handed | Dispatch::Finished => return,
                },
                AfterLink::Stop => return,
            }
        }
    }

    /// Invoke the link at the cursor with the threaded value and apply its
    /// outcome. The link runs without the engine lock held.
    fn run_at_cursor(this: &Arc<Self>) -> AfterLink {
        let (index, mut link, input) = {
            let mut body = this.body.lock();
            if body.state != ChainState::Running || body.cursor >= body.links.len() {
                return AfterLink::Stop;
            }
            let index = body.cursor;
            let link = body.links[index].take();
            let input = body.value.take();
            match (link, input) {
                (Some(link), Some(input)) => (index, link, input),
                (link, _) => {
                    body.links[index] = link;
                    let fault = ChainFault {
                        link_index: index,
                        message: "threaded value missing".to_string(),
                    };
                    let finish = this.take_finish(&mut body, ChainState::Aborted, Some(fault));
                    drop(body);
                    finish.fire();
                    return AfterLink::Stop;
                }
            }
        };

        tracing::trace!(chain = %this.id, link = index, "running link");
        let outcome = catch_unwind(AssertUnwindSafe(|| link.invoke(input)));

        let mut finish = None;
        let mut delayed = None;
        let after = {
            let mut body = this.body.lock();
            body.links[index] = Some(link);
            match outcome {
                Err(payload) => {
                    let fault = ChainFault {
                        link_index: index,
                        message: panic_message(payload.as_ref()),
                    };
                    finish = Some(this.take_finish(&mut body, ChainState::Aborted, Some(fault)));
                    AfterLink::Stop
                }
                Ok(DynOutcome::Continue(value)) => {
                    body.value = Some(value);
                    body.cursor += 1;
                    AfterLink::Advance
                }
                Ok(DynOutcome::Abort) => {
                    tracing::debug!(chain = %this.id, link = index, "link aborted chain");
                    finish = Some(this.take_finish(&mut body, ChainState::Aborted, None));
                    AfterLink::Stop
                }
                Ok(DynOutcome::Delay(value, delay)) => {
                    body.value = Some(value);
                    delayed = Some((body.current.unwrap_or(ContextKind::Secondary), delay));
                    AfterLink::Stop
                }
                Ok(DynOutcome::TypeMismatch { expected }) => {
                    let fault = ChainFault {
                        link_index: index,
                        message: format!("threaded value type mismatch: link expected {expected}"),
                    };
                    finish = Some(this.take_finish(&mut body, ChainState::Aborted, Some(fault)));
                    AfterLink::Stop
                }
            }
        };

        if let Some((context, delay)) = delayed {
            tracing::trace!(chain = %this.id, link = index, ?delay, "link delayed");
            let chain = Arc::clone(this);
            this.scheduler
                .submit_later(context, Box::new(move || Self::run_loop(chain)), delay);
        }
        if let Some(finish) = finish {
            finish.fire();
        }
        after
    }
}

/// An ordered sequence of links sharing one threaded value.
///
/// `TaskChain` is a cloneable handle to shared execution state; clones refer
/// to the same chain. Build with [`add_link`](Self::add_link) (or the typed
/// [`ChainBuilder`](crate::ChainBuilder)), then call
/// [`start`](Self::start) once.
#[derive(Clone)]
pub struct TaskChain {
    shared: Arc<ChainShared>,
}

impl TaskChain {
    /// Create an empty chain driven by `scheduler`.
    #[must_use]
    pub fn new(scheduler: Arc<dyn ContextScheduler>) -> Self {
        Self {
            shared: Arc::new(ChainShared {
                id: ChainId::new(),
                scheduler,
                body: Mutex::new(ChainBody {
                    links: Vec::new(),
                    cursor: 0,
                    value: None,
                    state: ChainState::Built,
                    current: None,
                    on_completed: None,
                    on_aborted: None,
                    on_fault: None,
                    done_tx: None,
                }),
            }),
        }
    }

    /// Get chain ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ChainId {
        self.shared.id
    }

    /// Current execution state.
    #[must_use]
    pub fn state(&self) -> ChainState {
        self.shared.body.lock().state
    }

    /// Number of links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.body.lock().links.len()
    }

    /// Check whether the chain has no links.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a link. Links execute in insertion order.
    ///
    /// # Errors
    /// [`ChainError::LinkAfterStart`] once the chain has left `Built`.
    pub fn add_link(&self, link: Link) -> Result<&Self, ChainError> {
        let mut body = self.shared.body.lock();
        if body.state != ChainState::Built {
            return Err(ChainError::LinkAfterStart);
        }
        body.links.push(Some(link));
        Ok(self)
    }

    pub(crate) fn push_link(&self, link: Link) {
        let mut body = self.shared.body.lock();
        debug_assert_eq!(body.state, ChainState::Built);
        body.links.push(Some(link));
    }

    /// Register a callback fired when the chain completes. Register before
    /// `start`; a callback registered after a terminal state never fires.
    pub fn on_completed(&self, callback: impl FnOnce() + Send + 'static) -> &Self {
        self.shared.body.lock().on_completed = Some(Box::new(callback));
        self
    }

    /// Register a callback fired when the chain aborts.
    pub fn on_aborted(&self, callback: impl FnOnce() + Send + 'static) -> &Self {
        self.shared.body.lock().on_aborted = Some(Box::new(callback));
        self
    }

    /// Register a callback receiving the fault when a link panics or the
    /// threaded value fails its type check. Without one, faults are logged.
    pub fn on_fault(&self, callback: impl FnOnce(ChainFault) + Send + 'static) -> &Self {
        self.shared.body.lock().on_fault = Some(Box::new(callback));
        self
    }

    /// Begin execution. Returns immediately; the chain runs asynchronously
    /// relative to the caller, resumed by continuations the engine hands to
    /// the scheduler.
    ///
    /// # Errors
    /// [`ChainError::Empty`] when no links were added,
    /// [`ChainError::AlreadyStarted`] on a second start.
    pub fn start(&self) -> Result<ChainHandle, ChainError> {
        let (done_tx, done_rx) = oneshot::channel();
        let links = {
            let mut body = self.shared.body.lock();
            if body.state != ChainState::Built {
                return Err(ChainError::AlreadyStarted);
            }
            if body.links.is_empty() {
                return Err(ChainError::Empty);
            }
            body.state = ChainState::Running;
            body.done_tx = Some(done_tx);
            body.value = Some(Box::new(()));
            body.links.len()
        };
        tracing::debug!(chain = %self.shared.id, links, "chain started");

        // The engine's context is undefined here, so dispatch always hands
        // the first link to the scheduler and Inline cannot come back.
        if matches!(ChainShared::dispatch(&self.shared), Dispatch::Inline) {
            ChainShared::run_loop(Arc::clone(&self.shared));
        }

        Ok(ChainHandle {
            id: self.shared.id,
            done_rx,
        })
    }
}

impl std::fmt::Debug for TaskChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskChain")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Observer for a started chain. Resolves once the chain reaches a terminal
/// state.
pub struct ChainHandle {
    id: ChainId,
    done_rx: oneshot::Receiver<ChainState>,
}

impl ChainHandle {
    /// Get chain ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ChainId {
        self.id
    }

    /// Wait for the terminal state. Resolves to `Aborted` if the scheduler
    /// dropped the chain's pending work (for example at shutdown).
    pub async fn wait(self) -> ChainState {
        self.done_rx.await.unwrap_or(ChainState::Aborted)
    }

    /// Blocking variant of [`wait`](Self::wait) for threads outside the
    /// async runtime. Do not call from the primary context.
    #[must_use]
    pub fn wait_blocking(self) -> ChainState {
        self.done_rx.blocking_recv().unwrap_or(ChainState::Aborted)
    }
}

impl std::fmt::Debug for ChainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainHandle").field("id", &self.id).finish()
    }
}
