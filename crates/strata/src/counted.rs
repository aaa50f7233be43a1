//! The split reference-count stack.
//!
//! No registry, no retire list: claim counting is embedded in the head
//! word and the nodes themselves.
//!
//! # The compound head
//!
//! The head is one `AtomicU64` packing `{external_count, pointer}`:
//! the count in the top 16 bits, the node address in the low 48.
//! Packing both into a single word lets one CAS
//! compare the *entire* compound value, so a concurrent pusher that
//! changed the head's identity invalidates every in-flight claim on
//! the old value. This leans on 64-bit targets keeping heap addresses
//! within 48 bits; the crate compiles this module only for
//! `target_pointer_width = "64"` and debug-asserts the address range
//! at every pack.
//!
//! # Claim accounting
//!
//! Every thread that reads a head value referencing a node first bumps
//! that value's external count: "I may dereference this node". A
//! node's internal count absorbs claims as they are returned:
//!
//! - a pop that loses the head swing returns exactly its own claim,
//!   decrementing the internal count by one
//! - the pop that wins the swing returns two claims at once, the
//!   structural claim the pointer held while linked plus its own,
//!   by adding `external − 2` for the remaining in-flight claimants
//!
//! The node is freed by whichever operation observes the combined
//! count settle to zero: the winner when its fetch-add returns the
//! negated addend, a loser when its decrement returns one. The
//! arithmetic admits exactly one such observation, so the free happens
//! exactly once, with no scan and no deferred list.

use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use crossbeam_utils::CachePadded;

use crate::error::Error;
use crate::pool::{NodePool, PoolStats};
use crate::sync::{AtomicIsize, AtomicU64, AtomicUsize, Ordering};
use crate::ConcurrentStack;

/// Bits of the head word carrying the external claim count.
const COUNT_BITS: u32 = 16;
/// Bits of the head word carrying the node address.
const ADDR_BITS: u32 = 64 - COUNT_BITS;
const ADDR_MASK: u64 = (1 << ADDR_BITS) - 1;
/// One external claim, positioned in the count bits.
const ONE_CLAIM: u64 = 1 << ADDR_BITS;

fn pack<T>(external: u64, node: *mut Node<T>) -> u64 {
    let addr = node as u64;
    debug_assert_eq!(addr & !ADDR_MASK, 0, "node address exceeds {} bits", ADDR_BITS);
    debug_assert!(external < (1 << COUNT_BITS), "external claim count overflow");
    (external << ADDR_BITS) | addr
}

fn unpack_node<T>(word: u64) -> *mut Node<T> {
    (word & ADDR_MASK) as *mut Node<T>
}

fn unpack_count(word: u64) -> u64 {
    word >> ADDR_BITS
}

struct Node<T> {
    /// Uninitialized once the payload has been moved out by a pop.
    value: MaybeUninit<T>,
    /// Claims not yet returned; transiently negative while in-flight
    /// claimants still hold theirs.
    internal: AtomicIsize,
    /// Packed successor head value, immutable once linked.
    next: u64,
}

/// Lock-free LIFO stack reclaiming memory through split reference
/// counts.
///
/// See the [module docs](self) for the head layout and the claim
/// arithmetic. 64-bit targets only.
pub struct CountedStack<T> {
    head: CachePadded<AtomicU64>,
    pool: NodePool<Node<T>>,
    len: AtomicUsize,
}

unsafe impl<T: Send> Send for CountedStack<T> {}
unsafe impl<T: Send> Sync for CountedStack<T> {}

impl<T> CountedStack<T> {
    /// Empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicU64::new(0)),
            pool: NodePool::new(),
            len: AtomicUsize::new(0),
        }
    }

    /// Push a value. Lock-free; never fails.
    pub fn push(&self, value: T) {
        let node = self
            .pool
            .alloc(Node {
                value: MaybeUninit::new(value),
                internal: AtomicIsize::new(0),
                next: 0,
            })
            .as_ptr();

        // External count starts at one: the structural claim held by
        // the link itself.
        let new_head = pack(1, node);

        let mut current = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: the node is not linked yet; no other thread can
            // reach it.
            unsafe { (*node).next = current };
            match self
                .head
                .compare_exchange_weak(current, new_head, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Bump the external count on the current head, claiming the right
    /// to dereference its node. Returns the bumped word this thread
    /// now holds a claim on.
    fn claim_head(&self, mut current: u64) -> u64 {
        loop {
            debug_assert!(
                unpack_count(current) < (1 << COUNT_BITS) - 1,
                "external claim count overflow"
            );
            let claimed = current + ONE_CLAIM;
            match self
                .head
                .compare_exchange_weak(current, claimed, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return claimed,
                Err(observed) => current = observed,
            }
        }
    }

    /// Pop the most recently pushed value, `None` when the stack was
    /// observed empty.
    pub fn pop(&self) -> Option<T> {
        let mut current = self.head.load(Ordering::Relaxed);
        loop {
            let claimed = self.claim_head(current);
            let node = unpack_node::<T>(claimed);

            if node.is_null() {
                // Nothing to pop and no node to return the claim to;
                // the count on the empty head is overwritten whole by
                // the next push.
                return None;
            }

            // SAFETY: our external claim keeps the node alive; `next`
            // is immutable while linked.
            let next = unsafe { (*node).next };

            // Compare the whole compound value: any later claimant or
            // pusher changed it and must win instead of us.
            match self
                .head
                .compare_exchange(claimed, next, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => {
                    self.len.fetch_sub(1, Ordering::Relaxed);

                    // SAFETY: the swing had exactly one winner, making
                    // this thread the sole owner of the payload.
                    let value = unsafe { ptr::read((*node).value.as_ptr()) };

                    // The swing retired two claims at once: the
                    // structural claim the link held, and our own.
                    // Whatever remains belongs to in-flight claimants
                    // of the old head value.
                    let residue = unpack_count(claimed) as isize - 2;
                    // SAFETY: the shell stays alive until the combined
                    // count settles; only bookkeeping fields are
                    // touched from here on.
                    let prior = unsafe { (*node).internal.fetch_add(residue, Ordering::Release) };
                    if prior == -residue {
                        // Every other claimant already released.
                        unsafe {
                            (*node).internal.load(Ordering::Acquire);
                            self.pool.free(NonNull::new_unchecked(node));
                        }
                    }
                    return Some(value);
                }
                Err(observed) => {
                    // Our claim did not win the unlink; return it.
                    // SAFETY: the claim taken in `claim_head` keeps
                    // the shell alive until this release.
                    let prior = unsafe { (*node).internal.fetch_sub(1, Ordering::Release) };
                    if prior == 1 {
                        // Ours was the last outstanding claim.
                        unsafe {
                            (*node).internal.load(Ordering::Acquire);
                            self.pool.free(NonNull::new_unchecked(node));
                        }
                    }
                    current = observed;
                }
            }
        }
    }

    /// Approximate element count, for monitoring only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// True when the head was observed empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        unpack_node::<T>(self.head.load(Ordering::Acquire)).is_null()
    }

    /// Allocation/reclamation counters for this stack's nodes.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl<T> Default for CountedStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> ConcurrentStack<T> for CountedStack<T> {
    fn push(&self, value: T) {
        CountedStack::push(self, value);
    }

    fn pop(&self) -> Result<Option<T>, Error> {
        Ok(CountedStack::pop(self))
    }

    fn is_empty(&self) -> bool {
        CountedStack::is_empty(self)
    }

    fn len(&self) -> usize {
        CountedStack::len(self)
    }
}

impl<T> Drop for CountedStack<T> {
    fn drop(&mut self) {
        // Quiescent by &mut: popping frees every node through the
        // winner path with no competing claimants.
        while self.pop().is_some() {}
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use std::sync::atomic::{AtomicUsize as StdAtomicUsize, Ordering as StdOrdering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_basic_push_pop() {
        let stack = CountedStack::new();

        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_lifo_order() {
        let stack = CountedStack::new();

        for i in 1..=10 {
            stack.push(i);
        }
        for i in (1..=10).rev() {
            assert_eq!(stack.pop(), Some(i), "LIFO order violated");
        }
    }

    #[test]
    fn test_empty_pop_is_idempotent() {
        let stack = CountedStack::<u64>::new();

        for _ in 0..100 {
            assert_eq!(stack.pop(), None);
        }
        assert!(stack.is_empty());
        assert_eq!(stack.pool_stats().allocated, 0);
    }

    #[test]
    fn test_pack_roundtrip() {
        let node = Box::into_raw(Box::new(Node::<u64> {
            value: MaybeUninit::new(9),
            internal: AtomicIsize::new(0),
            next: 0,
        }));

        let word = pack(3, node);
        assert_eq!(unpack_count(word), 3);
        assert_eq!(unpack_node::<u64>(word), node);

        let empty = pack::<u64>(7, ptr::null_mut());
        assert_eq!(unpack_count(empty), 7);
        assert!(unpack_node::<u64>(empty).is_null());

        unsafe { drop(Box::from_raw(node)) };
    }

    #[test]
    fn test_uncontended_pop_frees_immediately() {
        let stack = CountedStack::new();
        for i in 0..10 {
            stack.push(i);
        }
        while stack.pop().is_some() {}

        let stats = stack.pool_stats();
        assert_eq!(stats.allocated, 10);
        assert_eq!(stats.freed, 10);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn test_outstanding_claim_defers_free() {
        let stack = CountedStack::new();
        stack.push(5u64);

        // Claim the head the way a stalled popper would, then let a
        // complete pop win the swing.
        let stalled = stack.claim_head(stack.head.load(Ordering::Relaxed));
        let node = unpack_node::<u64>(stalled);

        assert_eq!(stack.pop(), Some(5));
        // The winner saw external = 3 (link + stalled + winner) and
        // added 3 − 2 = 1: one claim still out, shell still live.
        assert_eq!(stack.pool_stats().freed, 0);

        // The stalled popper loses and releases its claim, which is
        // the last one: the shell is freed exactly here.
        let prior = unsafe { (*node).internal.fetch_sub(1, Ordering::Release) };
        assert_eq!(prior, 1);
        unsafe {
            (*node).internal.load(Ordering::Acquire);
            stack.pool.free(NonNull::new_unchecked(node));
        }
        assert_eq!(stack.pool_stats().freed, 1);
    }

    #[test]
    fn test_empty_claims_reset_by_push() {
        let stack = CountedStack::new();

        // Claims accumulate on the empty head word...
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), None);
        assert!(unpack_count(stack.head.load(Ordering::Relaxed)) >= 2);

        // ...and a push replaces the word wholesale.
        stack.push(1u64);
        assert_eq!(unpack_count(stack.head.load(Ordering::Relaxed)), 1);
        assert_eq!(stack.pop(), Some(1));
    }

    struct Droppable(Arc<StdAtomicUsize>);

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.0.fetch_add(1, StdOrdering::Relaxed);
        }
    }

    #[test]
    fn test_payloads_dropped_exactly_once() {
        let drops = Arc::new(StdAtomicUsize::new(0));

        let stack = CountedStack::new();
        for _ in 0..3 {
            stack.push(Droppable(Arc::clone(&drops)));
        }

        drop(stack.pop().unwrap());
        assert_eq!(drops.load(StdOrdering::Relaxed), 1);

        drop(stack);
        assert_eq!(drops.load(StdOrdering::Relaxed), 3);
    }
}
