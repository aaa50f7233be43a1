//! The epoch-based stack.
//!
//! Same push/pop protocol as the other variants, with reclamation
//! delegated to `crossbeam-epoch`: every operation pins the current
//! epoch, and an unlinked node is handed to `defer_destroy`, which
//! frees it once no pinned thread can still hold a reference. No
//! registry, no caller-visible failure mode; the trade is that
//! unreclaimed garbage can accumulate until the collector advances.

use std::mem::ManuallyDrop;
use std::ptr;

use crossbeam_epoch::{self as epoch, Atomic, Owned};

use crate::error::Error;
use crate::sync::{AtomicUsize, Ordering};
use crate::ConcurrentStack;

struct Node<T> {
    /// Manually managed: the winning pop moves the payload out and the
    /// deferred destructor must not drop it again.
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

/// Lock-free LIFO stack reclaiming memory through epoch pinning.
///
/// See the [module docs](self) for the trade-offs against the other
/// strategies.
pub struct EpochStack<T> {
    head: Atomic<Node<T>>,
    len: AtomicUsize,
}

unsafe impl<T: Send> Send for EpochStack<T> {}
unsafe impl<T: Send> Sync for EpochStack<T> {}

impl<T> EpochStack<T> {
    /// Empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: Atomic::null(),
            len: AtomicUsize::new(0),
        }
    }

    /// Push a value. Lock-free; never fails.
    pub fn push(&self, value: T) {
        let guard = epoch::pin();

        let mut node = Owned::new(Node {
            value: ManuallyDrop::new(value),
            next: Atomic::null(),
        });

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            node.next.store(head, Ordering::Relaxed);

            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => {
                    self.len.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    // CAS failed: retry with the same allocation.
                    node = e.new;
                }
            }
        }
    }

    /// Pop the most recently pushed value, `None` when the stack was
    /// observed empty.
    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let Some(head_ref) = (unsafe { head.as_ref() }) else {
                return None;
            };

            let next = head_ref.next.load(Ordering::Acquire, &guard);

            match self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => {
                    self.len.fetch_sub(1, Ordering::Relaxed);

                    // SAFETY: the CAS had exactly one winner, making
                    // this thread the sole owner of the payload; the
                    // deferred destructor leaves `value` alone because
                    // it is ManuallyDrop.
                    let value = unsafe { ptr::read(&*head_ref.value) };
                    // SAFETY: unlinked, and the epoch guard keeps it
                    // alive until every pinned thread moves on.
                    unsafe { guard.defer_destroy(head) };
                    return Some(value);
                }
                Err(_) => continue,
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
        let guard = epoch::pin();
        self.head.load(Ordering::Acquire, &guard).is_null()
    }
}

impl<T> Default for EpochStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> ConcurrentStack<T> for EpochStack<T> {
    fn push(&self, value: T) {
        EpochStack::push(self, value);
    }

    fn pop(&self) -> Result<Option<T>, Error> {
        Ok(EpochStack::pop(self))
    }

    fn is_empty(&self) -> bool {
        EpochStack::is_empty(self)
    }

    fn len(&self) -> usize {
        EpochStack::len(self)
    }
}

impl<T> Drop for EpochStack<T> {
    fn drop(&mut self) {
        // Exclusive access: walk the chain without pinning and drop
        // payloads in place.
        unsafe {
            let guard = epoch::unprotected();
            let mut cur = self.head.load(Ordering::Relaxed, guard);
            while !cur.is_null() {
                let mut node = cur.into_owned();
                ManuallyDrop::drop(&mut node.value);
                cur = node.next.load(Ordering::Relaxed, guard);
            }
        }
    }
}
