//! Multi-threaded stress across all reclamation strategies.
//!
//! Every test here drives real `std::thread` concurrency. Memory
//! safety failures surface as pool double-free traps (debug builds),
//! torn payloads, or crashes; element accounting failures surface
//! through the `strata-verify` audits.

#![cfg(not(loom))]

use std::thread;

use strata::{ConcurrentStack, CountedStack, EpochStack, Error, HazardStack};
use strata_verify::{PropertyChecker, ReclamationAudit, StackAudit};

const THREADS: u64 = 8;
const VALUES_PER_THREAD: u64 = 1_000;

/// Tag values by producing thread so every pushed value is distinct.
fn value_for(thread: u64, i: u64) -> u64 {
    thread * 1_000_000 + i
}

/// N pushers race N poppers; afterwards every pushed value must have
/// surfaced exactly once, across pops and the final drain.
fn no_lost_updates<S: ConcurrentStack<u64>>(stack: &S) {
    let mut popped: Vec<Vec<u64>> = Vec::new();

    thread::scope(|scope| {
        for t in 0..THREADS {
            scope.spawn(move || {
                for i in 0..VALUES_PER_THREAD {
                    stack.push(value_for(t, i));
                }
            });
        }

        let poppers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(move || {
                    let mut got = Vec::new();
                    for _ in 0..2 * VALUES_PER_THREAD {
                        if let Ok(Some(v)) = stack.pop() {
                            got.push(v);
                        }
                    }
                    got
                })
            })
            .collect();

        popped = poppers.into_iter().map(|h| h.join().unwrap()).collect();
    });

    let mut audit = StackAudit::unordered();
    for t in 0..THREADS {
        for i in 0..VALUES_PER_THREAD {
            audit.record_push(t, value_for(t, i));
        }
    }
    for (t, thread_pops) in popped.iter().enumerate() {
        for &v in thread_pops {
            audit.record_pop(t as u64, Some(v));
        }
    }

    // Whatever the poppers missed must still be in the stack.
    let mut contents = Vec::new();
    while let Ok(Some(v)) = stack.pop() {
        contents.push(v);
    }

    let checker = audit.with_contents(contents);
    assert!(checker.all_hold(), "{}", checker.failure_report());
    assert_eq!(
        audit.pushed_count() as u64,
        THREADS * VALUES_PER_THREAD,
        "test generated colliding values"
    );
}

#[test]
fn test_no_lost_updates_hazard() {
    no_lost_updates(&HazardStack::new());
}

#[test]
fn test_no_lost_updates_counted() {
    no_lost_updates(&CountedStack::new());
}

#[test]
fn test_no_lost_updates_epoch() {
    no_lost_updates(&EpochStack::new());
}

/// Concurrent pops on an empty stack keep reporting empty with no side
/// effects and no allocations.
fn empty_idempotence<S: ConcurrentStack<u64>>(stack: &S) {
    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(move || {
                for _ in 0..1_000 {
                    assert_eq!(stack.pop(), Ok(None));
                }
            });
        }
    });
    assert!(stack.is_empty());
    assert_eq!(stack.len(), 0);
}

#[test]
fn test_empty_idempotence_hazard() {
    let stack = HazardStack::new();
    empty_idempotence(&stack);
    assert_eq!(stack.pool_stats().allocated, 0);
}

#[test]
fn test_empty_idempotence_counted() {
    let stack = CountedStack::new();
    empty_idempotence(&stack);
    assert_eq!(stack.pool_stats().allocated, 0);
}

#[test]
fn test_empty_idempotence_epoch() {
    empty_idempotence(&EpochStack::new());
}

/// With every hazard slot claimed elsewhere, concurrent pops observe
/// the exhaustion error: no crash, no hang, no silent None.
#[test]
fn test_saturated_registry_reports_exhaustion() {
    let stack = HazardStack::with_capacity(2);
    stack.push(1u64);

    let g1 = stack.registry().acquire().unwrap();
    let g2 = stack.registry().acquire().unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..100 {
                    assert_eq!(
                        stack.pop(),
                        Err(Error::RegistryExhausted { capacity: 2 })
                    );
                }
            });
        }
    });

    // Nothing was popped while saturated, and the element survives.
    assert_eq!(stack.len(), 1);
    drop(g1);
    drop(g2);
    assert_eq!(stack.pop(), Ok(Some(1)));
}

/// Mixed push/pop traffic from many threads, then a quiescent drain:
/// the hazard stack's pool must settle to freed == allocated once the
/// retire list is swept.
#[test]
fn test_reclamation_settles_hazard() {
    let stack = HazardStack::new();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let stack = &stack;
            scope.spawn(move || {
                for i in 0..10_000u64 {
                    if i % 3 == 2 {
                        let _ = stack.pop();
                    } else {
                        stack.push(value_for(t, i));
                    }
                }
            });
        }
    });

    while stack.pop().unwrap().is_some() {}
    stack.sweep();

    assert_eq!(stack.pending_reclaims(), 0);
    let stats = stack.pool_stats();
    let audit =
        ReclamationAudit::new(stats.allocated, stats.freed, stats.live).expect_all_reclaimed();
    assert!(audit.all_hold(), "{}", audit.failure_report());
}

/// Same traffic against the split-count stack: no retire list exists,
/// so the counters settle the instant the drain finishes.
#[test]
fn test_reclamation_settles_counted() {
    let stack = CountedStack::new();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let stack = &stack;
            scope.spawn(move || {
                for i in 0..10_000u64 {
                    if i % 3 == 2 {
                        let _ = stack.pop();
                    } else {
                        stack.push(value_for(t, i));
                    }
                }
            });
        }
    });

    while stack.pop().is_some() {}

    let stats = stack.pool_stats();
    let audit =
        ReclamationAudit::new(stats.allocated, stats.freed, stats.live).expect_all_reclaimed();
    assert!(audit.all_hold(), "{}", audit.failure_report());
}

/// Heavy mixed traffic on the epoch stack; correctness is covered by
/// the element audit, reclamation is the collector's business.
#[test]
fn test_stress_mixed_ops_epoch() {
    let stack = EpochStack::new();

    thread::scope(|scope| {
        for t in 0..THREADS {
            let stack = &stack;
            scope.spawn(move || {
                for i in 0..10_000u64 {
                    if i % 3 == 2 {
                        let _ = stack.pop();
                    } else {
                        stack.push(value_for(t, i));
                    }
                }
            });
        }
    });

    let mut drained = 0u64;
    while stack.pop().is_some() {
        drained += 1;
    }
    assert!(drained <= THREADS * 10_000);
    assert!(stack.is_empty());
}
