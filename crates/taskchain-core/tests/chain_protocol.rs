//! Execution-protocol tests against the deterministic scheduler.
//!
//! Everything here is single-threaded: work runs only when the test drains
//! the `ManualScheduler`, so ordering and placement assertions are exact.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskchain_core::prelude::*;
use taskchain_core::{ChainFault, IdentityRegistry};
use taskchain_test_utils::{ContextTrace, ManualScheduler, TraceEvent};

fn event(label: &str, context: ContextKind) -> TraceEvent {
    TraceEvent {
        label: label.to_string(),
        context: Some(context),
    }
}

#[test]
fn links_run_in_insertion_order_exactly_once() {
    let scheduler = ManualScheduler::new();
    let trace = ContextTrace::new();

    let chain = TaskChain::new(scheduler.clone());
    for index in 0..5 {
        let trace = trace.clone();
        chain
            .add_link(Link::new(LinkContext::Any, move |value: ()| {
                trace.record(format!("link-{index}"));
                Outcome::Continue(value)
            }))
            .unwrap();
    }

    let handle = chain.start().unwrap();
    scheduler.run_until_idle();

    assert_eq!(
        trace.labels(),
        vec!["link-0", "link-1", "link-2", "link-3", "link-4"]
    );
    assert_eq!(chain.state(), ChainState::Completed);
    assert_eq!(handle.wait_blocking(), ChainState::Completed);
}

#[test]
fn threaded_value_crosses_contexts() {
    let scheduler = ManualScheduler::new();
    let trace = ContextTrace::new();
    let terminal_value = Arc::new(AtomicI32::new(0));

    let trace_a = trace.clone();
    let trace_b = trace.clone();
    let trace_c = trace.clone();
    let observed = Arc::clone(&terminal_value);

    let handle = ChainBuilder::new(scheduler.clone())
        .then(LinkContext::Primary, move |()| {
            trace_a.record("A");
            Outcome::Continue(5_i32)
        })
        .then(LinkContext::Secondary, move |received: i32| {
            assert_eq!(received, 5);
            trace_b.record("B");
            Outcome::Continue(10_i32)
        })
        .then(LinkContext::Primary, move |received: i32| {
            assert_eq!(received, 10);
            trace_c.record("C");
            observed.store(15, Ordering::SeqCst);
            Outcome::Continue(15_i32)
        })
        .start()
        .unwrap();

    scheduler.run_until_idle();

    assert_eq!(
        trace.events(),
        vec![
            event("A", ContextKind::Primary),
            event("B", ContextKind::Secondary),
            event("C", ContextKind::Primary),
        ]
    );
    assert_eq!(terminal_value.load(Ordering::SeqCst), 15);
    assert_eq!(handle.wait_blocking(), ChainState::Completed);
}

#[test]
fn abort_skips_every_remaining_link() {
    let scheduler = ManualScheduler::new();
    let trace = ContextTrace::new();
    let aborted = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let trace_a = trace.clone();
    let trace_b = trace.clone();
    let aborted_count = Arc::clone(&aborted);
    let completed_count = Arc::clone(&completed);

    let handle = ChainBuilder::new(scheduler.clone())
        .then(LinkContext::Primary, move |()| {
            trace_a.record("A");
            Outcome::<(), i32>::Abort
        })
        .finally(LinkContext::Secondary, move |_value: i32| {
            trace_b.record("B");
        })
        .on_aborted(move || {
            aborted_count.fetch_add(1, Ordering::SeqCst);
        })
        .on_completed(move || {
            completed_count.fetch_add(1, Ordering::SeqCst);
        })
        .start()
        .unwrap();

    scheduler.run_until_idle();

    assert_eq!(trace.labels(), vec!["A"]);
    assert_eq!(handle.wait_blocking(), ChainState::Aborted);
    assert_eq!(aborted.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[test]
fn any_links_stay_in_the_previous_context() {
    let scheduler = ManualScheduler::new();
    let trace = ContextTrace::new();

    let chain = TaskChain::new(scheduler.clone());
    for (index, context) in [
        LinkContext::Secondary,
        LinkContext::Any,
        LinkContext::Primary,
        LinkContext::Any,
    ]
    .into_iter()
    .enumerate()
    {
        let trace = trace.clone();
        chain
            .add_link(Link::new(context, move |value: ()| {
                trace.record(format!("link-{index}"));
                Outcome::Continue(value)
            }))
            .unwrap();
    }

    chain.start().unwrap();
    scheduler.run_until_idle();

    assert_eq!(
        trace.contexts(),
        vec![
            Some(ContextKind::Secondary),
            Some(ContextKind::Secondary),
            Some(ContextKind::Primary),
            Some(ContextKind::Primary),
        ]
    );
    assert_eq!(chain.state(), ChainState::Completed);
}

#[test]
fn any_first_link_runs_on_the_secondary_context() {
    let scheduler = ManualScheduler::new();
    let trace = ContextTrace::new();

    let recorder = trace.clone();
    ChainBuilder::new(scheduler.clone())
        .finally(LinkContext::Any, move |()| recorder.record("first"))
        .start()
        .unwrap();

    scheduler.run_until_idle();
    assert_eq!(trace.contexts(), vec![Some(ContextKind::Secondary)]);
}

#[test]
fn delay_reinvokes_the_same_link_with_the_same_value() {
    let scheduler = ManualScheduler::new();
    let attempts = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    let attempt_count = Arc::clone(&attempts);
    let finish_count = Arc::clone(&finished);

    let handle = ChainBuilder::new(scheduler.clone())
        .then(LinkContext::Secondary, |()| Outcome::Continue(7_u32))
        .then(LinkContext::Secondary, move |value: u32| {
            assert_eq!(value, 7);
            if attempt_count.fetch_add(1, Ordering::SeqCst) == 0 {
                Outcome::Delay(value, Duration::from_millis(25))
            } else {
                Outcome::Continue(value)
            }
        })
        .finally(LinkContext::Secondary, move |value: u32| {
            assert_eq!(value, 7);
            finish_count.fetch_add(1, Ordering::SeqCst);
        })
        .start()
        .unwrap();

    scheduler.run_until_idle();
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.pending_delayed(), 1);

    // Not due yet: nothing runs.
    scheduler.advance_and_run(Duration::from_millis(10));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    // Due: the same link runs again, then the chain finishes.
    scheduler.advance_and_run(Duration::from_millis(15));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(handle.wait_blocking(), ChainState::Completed);
}

#[test]
fn identity_chain_threads_the_resolved_handle() {
    let scheduler = ManualScheduler::new();
    let trace = ContextTrace::new();
    let sender = Arc::new("steve".to_string());

    let recorder = trace.clone();
    let handle = ChainBuilder::for_identity(
        scheduler.clone(),
        IdentityRef::new(&sender),
    )
    .finally(LinkContext::Secondary, move |resolved: Arc<String>| {
        recorder.record(format!("acting-for-{resolved}"));
    })
    .start()
    .unwrap();

    scheduler.run_until_idle();

    assert_eq!(
        trace.events(),
        vec![event("acting-for-steve", ContextKind::Secondary)]
    );
    assert_eq!(handle.wait_blocking(), ChainState::Completed);
}

#[test]
fn identity_chain_aborts_before_caller_links_when_stale() {
    let scheduler = ManualScheduler::new();
    let caller_ran = Arc::new(AtomicUsize::new(0));
    let aborted = Arc::new(AtomicUsize::new(0));

    let sender = Arc::new("steve".to_string());
    let identity = IdentityRef::new(&sender);

    let ran = Arc::clone(&caller_ran);
    let aborted_count = Arc::clone(&aborted);
    let handle = ChainBuilder::for_identity(scheduler.clone(), identity)
        .finally(LinkContext::Secondary, move |_resolved: Arc<String>| {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .on_aborted(move || {
            aborted_count.fetch_add(1, Ordering::SeqCst);
        })
        .start()
        .unwrap();

    // The sender disconnects while the chain is queued.
    drop(sender);
    scheduler.run_until_idle();

    assert_eq!(caller_ran.load(Ordering::SeqCst), 0);
    assert_eq!(aborted.load(Ordering::SeqCst), 1);
    assert_eq!(handle.wait_blocking(), ChainState::Aborted);
}

#[test]
fn named_chain_resolves_through_the_registry() {
    let scheduler = ManualScheduler::new();
    let registry = Arc::new(IdentityRegistry::new());
    let seen = Arc::new(AtomicUsize::new(0));

    let sender = Arc::new(11_u32);
    registry.register("sender-11", &sender);

    let seen_count = Arc::clone(&seen);
    let handle = ChainBuilder::for_name(
        scheduler.clone(),
        Arc::clone(&registry),
        "sender-11",
    )
    .finally(LinkContext::Primary, move |resolved: Arc<u32>| {
        seen_count.store(*resolved as usize, Ordering::SeqCst);
    })
    .start()
    .unwrap();

    scheduler.run_until_idle();
    assert_eq!(seen.load(Ordering::SeqCst), 11);
    assert_eq!(handle.wait_blocking(), ChainState::Completed);

    // An unregistered name aborts.
    let handle = ChainBuilder::for_name(scheduler.clone(), registry, "nobody")
        .finally(LinkContext::Primary, |_resolved: Arc<u32>| {})
        .start()
        .unwrap();
    scheduler.run_until_idle();
    assert_eq!(handle.wait_blocking(), ChainState::Aborted);
}

#[test]
fn panicking_link_faults_and_aborts() {
    let scheduler = ManualScheduler::new();
    let after_ran = Arc::new(AtomicUsize::new(0));
    let fault: Arc<parking_lot::Mutex<Option<ChainFault>>> =
        Arc::new(parking_lot::Mutex::new(None));

    let ran = Arc::clone(&after_ran);
    let fault_slot = Arc::clone(&fault);
    let handle = ChainBuilder::new(scheduler.clone())
        .then(LinkContext::Secondary, |()| Outcome::Continue(1_u32))
        .then(LinkContext::Secondary, |_value: u32| -> Outcome<u32, u32> {
            panic!("link exploded")
        })
        .finally(LinkContext::Primary, move |_value: u32| {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .on_fault(move |fault| {
            *fault_slot.lock() = Some(fault);
        })
        .start()
        .unwrap();

    scheduler.run_until_idle();

    assert_eq!(handle.wait_blocking(), ChainState::Aborted);
    assert_eq!(after_ran.load(Ordering::SeqCst), 0);
    let fault = fault.lock().take().unwrap();
    assert_eq!(fault.link_index, 1);
    assert!(fault.message.contains("link exploded"));
}

#[test]
fn mismatched_threaded_value_faults_instead_of_running() {
    let scheduler = ManualScheduler::new();
    let fault: Arc<parking_lot::Mutex<Option<ChainFault>>> =
        Arc::new(parking_lot::Mutex::new(None));

    // Built through the untyped interface with a first link that expects a
    // value no previous link produced.
    let chain = TaskChain::new(scheduler.clone());
    chain
        .add_link(Link::new(LinkContext::Secondary, |value: u32| {
            Outcome::Continue(value)
        }))
        .unwrap();
    let fault_slot = Arc::clone(&fault);
    chain.on_fault(move |fault| {
        *fault_slot.lock() = Some(fault);
    });

    let handle = chain.start().unwrap();
    scheduler.run_until_idle();

    assert_eq!(handle.wait_blocking(), ChainState::Aborted);
    let fault = fault.lock().take().unwrap();
    assert_eq!(fault.link_index, 0);
    assert!(fault.message.contains("type mismatch"));
}

proptest! {
    #[test]
    fn abort_at_any_position_skips_the_rest(len in 1_usize..8, position in 0_usize..8) {
        let abort_at = position % len;
        let scheduler = ManualScheduler::new();
        let ran: Arc<parking_lot::Mutex<Vec<usize>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let chain = TaskChain::new(scheduler.clone());
        for index in 0..len {
            let ran = Arc::clone(&ran);
            let context = if index % 2 == 0 {
                LinkContext::Primary
            } else {
                LinkContext::Secondary
            };
            chain
                .add_link(Link::new(context, move |value: ()| {
                    ran.lock().push(index);
                    if index == abort_at {
                        Outcome::Abort
                    } else {
                        Outcome::Continue(value)
                    }
                }))
                .unwrap();
        }

        chain.start().unwrap();
        scheduler.run_until_idle();

        prop_assert_eq!(ran.lock().clone(), (0..=abort_at).collect::<Vec<_>>());
        prop_assert_eq!(chain.state(), ChainState::Aborted);
    }
}
