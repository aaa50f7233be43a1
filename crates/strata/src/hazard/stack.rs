//! The hazard-pointer stack.
//!
//! Push is the classic optimistic-retry CAS install. Pop is where the
//! reclamation protocol lives:
//!
//! 1. claim a hazard slot (fails with
//!    [`Error::RegistryExhausted`] when the table is full)
//! 2. publish the head snapshot, re-read the head, repeat until both
//!    reads agree; this closes the race where the snapshot is freed
//!    between read and publish
//! 3. CAS the head to the snapshot's successor, back to 2 on failure
//! 4. on success clear the slot and move the payload out
//! 5. free the shell immediately if no other slot protects it,
//!    otherwise queue it on the retire list; then sweep the list once,
//!    freeing whatever has become unprotected
//!
//! Step 5's sweep amortizes cleanup over callers; there is no
//! dedicated reclaimer thread.

use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use crossbeam_utils::CachePadded;

use crate::error::Error;
use crate::pool::{NodePool, PoolStats};
use crate::sync::{AtomicPtr, AtomicUsize, Ordering};
use crate::ConcurrentStack;

use super::registry::HazardRegistry;
use super::retire::RetireList;

pub(super) struct Node<T> {
    /// Uninitialized once the payload has been moved out by a pop.
    pub(super) value: MaybeUninit<T>,
    /// Successor while linked; retire-list link after unlinking.
    pub(super) next: *mut Node<T>,
}

/// Lock-free LIFO stack reclaiming memory through hazard pointers.
///
/// See the [module docs](self) for the protocol and
/// [`HazardRegistry`] for the slot table it leans on.
pub struct HazardStack<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    registry: HazardRegistry,
    retired: RetireList<T>,
    pool: NodePool<Node<T>>,
    len: AtomicUsize,
}

unsafe impl<T: Send> Send for HazardStack<T> {}
unsafe impl<T: Send> Sync for HazardStack<T> {}

impl<T> HazardStack<T> {
    /// Empty stack with the default hazard slot capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(HazardRegistry::new())
    }

    /// Empty stack with room for `slots` concurrently popping threads.
    ///
    /// # Panics
    ///
    /// Panics if `slots` is zero.
    #[must_use]
    pub fn with_capacity(slots: usize) -> Self {
        Self::with_registry(HazardRegistry::with_capacity(slots))
    }

    fn with_registry(registry: HazardRegistry) -> Self {
        Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            registry,
            retired: RetireList::new(),
            pool: NodePool::new(),
            len: AtomicUsize::new(0),
        }
    }

    /// The slot table backing this stack's pops.
    #[must_use]
    pub fn registry(&self) -> &HazardRegistry {
        &self.registry
    }

    /// Push a value. Lock-free; never fails.
    pub fn push(&self, value: T) {
        let node = self
            .pool
            .alloc(Node {
                value: MaybeUninit::new(value),
                next: ptr::null_mut(),
            })
            .as_ptr();

        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: the node is not linked yet; no other thread can
            // reach it.
            unsafe { (*node).next = head };
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => head = observed,
            }
        }
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop the most recently pushed value.
    ///
    /// `Ok(None)` when the stack was observed empty. Fails with
    /// [`Error::RegistryExhausted`] when every hazard slot is taken by
    /// another in-flight pop; the slot claimed here is released on
    /// every exit path, including unwinds.
    pub fn pop(&self) -> Result<Option<T>, Error> {
        let guard = self.registry.acquire()?;

        let claimed = loop {
            let mut observed = self.head.load(Ordering::Acquire);
            loop {
                guard.protect(observed.cast());
                // SeqCst pairs with the reclamation scan: if the node
                // was unlinked before our publish became visible, this
                // re-read sees the new head and we retry.
                let reread = self.head.load(Ordering::SeqCst);
                if reread == observed {
                    break;
                }
                observed = reread;
            }

            if observed.is_null() {
                return Ok(None);
            }

            // SAFETY: `observed` was the head after our publish, so it
            // is protected and cannot have been freed. `next` is
            // immutable while the node is linked.
            let next = unsafe { (*observed).next };

            match self
                .head
                .compare_exchange(observed, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => break observed,
                Err(_) => continue,
            }
        };

        guard.clear();
        self.len.fetch_sub(1, Ordering::Relaxed);

        // SAFETY: the CAS had exactly one winner, making this thread
        // the sole owner of the payload.
        let value = unsafe { ptr::read((*claimed).value.as_ptr()) };
        // SAFETY: `claimed` came from the non-null head.
        let claimed = unsafe { NonNull::new_unchecked(claimed) };

        if self.registry.is_protected(claimed.as_ptr().cast()) {
            // SAFETY: unlinked by our CAS, payload moved out, queued
            // exactly once.
            unsafe { self.retired.retire(claimed) };
        } else {
            // SAFETY: unlinked, and no slot protects it. A popper
            // still holding this address unprotected will re-read the
            // head and retry without dereferencing it.
            unsafe { self.pool.free(claimed) };
        }

        self.sweep();
        Ok(Some(value))
    }

    /// Sweep the retire list once: free every queued node no hazard
    /// slot protects, requeue the rest. Returns the number freed.
    ///
    /// Pops sweep automatically; this is public so a quiescent owner
    /// can settle accounts without popping.
    pub fn sweep(&self) -> usize {
        let mut freed = 0;
        let mut cur = self.retired.drain();
        while !cur.is_null() {
            // SAFETY: drain transferred ownership of the chain to us;
            // read the link before the node can be freed.
            let next = unsafe { (*cur).next };
            // SAFETY: non-null by the loop condition.
            let node = unsafe { NonNull::new_unchecked(cur) };
            if self.registry.is_protected(cur.cast()) {
                // SAFETY: we own it and queue it exactly once.
                unsafe { self.retired.retire(node) };
            } else {
                // SAFETY: unlinked long ago and unprotected now.
                unsafe { self.pool.free(node) };
                freed += 1;
            }
            cur = next;
        }
        freed
    }

    /// Nodes unlinked but still awaiting reclamation.
    #[must_use]
    pub fn pending_reclaims(&self) -> usize {
        self.retired.len()
    }

    /// Approximate element count, for monitoring only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// True when the head was observed empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Allocation/reclamation counters for this stack's nodes.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl<T> Default for HazardStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> ConcurrentStack<T> for HazardStack<T> {
    fn push(&self, value: T) {
        HazardStack::push(self, value);
    }

    fn pop(&self) -> Result<Option<T>, Error> {
        HazardStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        HazardStack::is_empty(self)
    }

    fn len(&self) -> usize {
        HazardStack::len(self)
    }
}

impl<T> Drop for HazardStack<T> {
    fn drop(&mut self) {
        // Exclusive access: no guard can outlive the registry borrow,
        // so nothing is protected and everything can be freed.
        let mut cur = self.head.load(Ordering::Relaxed);
        while !cur.is_null() {
            // SAFETY: linked nodes still own their payloads.
            unsafe {
                let next = (*cur).next;
                ptr::drop_in_place((*cur).value.as_mut_ptr());
                self.pool.free(NonNull::new_unchecked(cur));
                cur = next;
            }
        }

        let mut cur = self.retired.drain();
        while !cur.is_null() {
            // SAFETY: retired shells gave up their payloads at pop
            // time; only the allocation remains.
            unsafe {
                let next = (*cur).next;
                self.pool.free(NonNull::new_unchecked(cur));
                cur = next;
            }
        }
    }
}
