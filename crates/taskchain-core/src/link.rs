//! Chain links: the atomic units of work in a chain.
//!
//! Links are strongly typed at construction ([`Link::new`] ties the input and
//! output types of the closure) and type-erased for the engine, which threads
//! a `Box<dyn Any + Send>` value between them. A downcast mismatch at a
//! hand-off fails fast instead of continuing with a wrong value.

use crate::outcome::Outcome;
use serde::{Deserialize, Serialize};
use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::time::Duration;
use taskchain_sched::ContextKind;

/// The execution context a link requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkContext {
    /// Must run on the primary thread; must be fast and non-blocking.
    Primary,
    /// Must run on a secondary worker thread; may block.
    Secondary,
    /// Runs in whichever context the engine is currently in.
    Any,
}

impl LinkContext {
    /// The concrete context this requirement demands, if any.
    #[inline]
    #[must_use]
    pub fn demand(self) -> Option<ContextKind> {
        match self {
            Self::Primary => Some(ContextKind::Primary),
            Self::Secondary => Some(ContextKind::Secondary),
            Self::Any => None,
        }
    }
}

impl From<ContextKind> for LinkContext {
    fn from(kind: ContextKind) -> Self {
        match kind {
            ContextKind::Primary => Self::Primary,
            ContextKind::Secondary => Self::Secondary,
        }
    }
}

/// Type-erased threaded value handed from link to link.
pub(crate) type BoxedValue = Box<dyn Any + Send>;

/// Engine-level outcome after type erasure.
pub(crate) enum DynOutcome {
    Continue(BoxedValue),
    Abort,
    Delay(BoxedValue, Duration),
    /// The threaded value did not downcast to the link's input type.
    TypeMismatch {
        expected: &'static str,
    },
}

trait DynLink: Send {
    fn invoke(&mut self, input: BoxedValue) -> DynOutcome;
}

/// One step of a task chain.
///
/// Created by the caller when building the chain and immutable once added.
/// A link belongs to exactly one chain and is invoked at most once per
/// execution (a `Delay` outcome re-enters the same invocation point).
pub struct Link {
    context: LinkContext,
    work: Box<dyn DynLink>,
}

impl Link {
    /// Create a link from a typed closure.
    ///
    /// The closure receives the threaded value of type `I` and returns an
    /// [`Outcome`] carrying the next value of type `O`.
    pub fn new<I, O, F>(context: LinkContext, work: F) -> Self
    where
        I: Send + 'static,
        O: Send + 'static,
        F: FnMut(I) -> Outcome<I, O> + Send + 'static,
    {
        Self {
            context,
            work: Box::new(FnLink {
                work,
                _types: PhantomData,
            }),
        }
    }

    /// Create an initial link: the first in a chain, receiving no input.
    pub fn initial<O, F>(context: LinkContext, mut work: F) -> Self
    where
        O: Send + 'static,
        F: FnMut() -> Outcome<(), O> + Send + 'static,
    {
        Self::new(context, move |()| work())
    }

    /// Create a terminal link: the last in a chain. Its result is discarded
    /// by the engine; the side effect is the chain's purpose.
    pub fn terminal<I, F>(context: LinkContext, mut work: F) -> Self
    where
        I: Send + 'static,
        F: FnMut(I) + Send + 'static,
    {
        Self::new(context, move |input: I| {
            work(input);
            Outcome::Continue(())
        })
    }

    /// The context this link requires.
    #[inline]
    #[must_use]
    pub fn context(&self) -> LinkContext {
        self.context
    }

    pub(crate) fn invoke(&mut self, input: BoxedValue) -> DynOutcome {
        self.work.invoke(input)
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

struct FnLink<I, O, F> {
    work: F,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O, F> DynLink for FnLink<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: FnMut(I) -> Outcome<I, O> + Send + 'static,
{
    fn invoke(&mut self, input: BoxedValue) -> DynOutcome {
        let input = match input.downcast::<I>() {
            Ok(input) => *input,
            Err(_) => {
                return DynOutcome::TypeMismatch {
                    expected: type_name::<I>(),
                }
            }
        };
        match (self.work)(input) {
            Outcome::Continue(value) => DynOutcome::Continue(Box::new(value)),
            Outcome::Abort => DynOutcome::Abort,
            Outcome::Delay(value, delay) => DynOutcome::Delay(Box::new(value), delay),
        }
    }
}
