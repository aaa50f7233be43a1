//! The hazard slot table.
//!
//! A fixed-capacity array of `{owner, protected}` slots. A popping
//! thread claims a free slot for the duration of one operation and
//! publishes the pointer it may dereference into it; anyone about to
//! free a node scans the whole table first. Capacity is a hard limit:
//! when every slot is claimed, acquisition fails instead of blocking.
//!
//! Slot release is tied to [`HazardGuard`]'s `Drop`, so a slot cannot
//! leak on an early return or a panic unwinding through the caller.

use std::ptr;

use crossbeam_utils::CachePadded;

use crate::error::Error;
use crate::sync::{AtomicPtr, AtomicU64, Ordering};

/// Default slot capacity, enough for 32 concurrently popping threads.
pub const DEFAULT_SLOT_CAPACITY: usize = 32;

struct Slot {
    /// 0 = free, otherwise the claim token of the owning thread.
    owner: AtomicU64,
    /// The pointer the owner may currently dereference.
    protected: AtomicPtr<()>,
}

/// Fixed-capacity registry of hazard slots.
pub struct HazardRegistry {
    slots: Box<[CachePadded<Slot>]>,
    next_token: AtomicU64,
}

impl HazardRegistry {
    /// Registry with [`DEFAULT_SLOT_CAPACITY`] slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SLOT_CAPACITY)
    }

    /// Registry with `capacity` slots. Capacity must cover the peak
    /// number of concurrently popping threads.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "hazard registry needs at least one slot");
        let slots = (0..capacity)
            .map(|_| {
                CachePadded::new(Slot {
                    owner: AtomicU64::new(0),
                    protected: AtomicPtr::new(ptr::null_mut()),
                })
            })
            .collect();
        Self {
            slots,
            next_token: AtomicU64::new(1),
        }
    }

    /// Total number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of currently claimed slots.
    #[must_use]
    pub fn claimed(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.owner.load(Ordering::Relaxed) != 0)
            .count()
    }

    /// Claim a free slot for the calling thread.
    ///
    /// Scans linearly and CASes the first free owner field. Returns
    /// [`Error::RegistryExhausted`] when every slot is claimed; the
    /// caller decides whether that is retryable or fatal.
    pub fn acquire(&self) -> Result<HazardGuard<'_>, Error> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.owner.load(Ordering::Relaxed) != 0 {
                continue;
            }
            if slot
                .owner
                .compare_exchange(0, token, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(HazardGuard {
                    registry: self,
                    index,
                });
            }
        }
        Err(Error::RegistryExhausted {
            capacity: self.slots.len(),
        })
    }

    /// Does any slot currently protect `ptr`?
    ///
    /// SeqCst loads pair with the SeqCst publish in
    /// [`HazardGuard::protect`]: either this scan observes the
    /// protection, or the protecting thread's head re-read observes
    /// the unlink and retries without dereferencing.
    #[must_use]
    pub fn is_protected(&self, ptr: *mut ()) -> bool {
        if ptr.is_null() {
            return false;
        }
        self.slots
            .iter()
            .any(|s| s.protected.load(Ordering::SeqCst) == ptr)
    }
}

impl Default for HazardRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped claim on one hazard slot.
///
/// Dropping the guard clears the published pointer and releases the
/// slot, on every exit path including unwinds.
pub struct HazardGuard<'r> {
    registry: &'r HazardRegistry,
    index: usize,
}

impl HazardGuard<'_> {
    /// Publish `ptr` as in use by this thread. A null `ptr` protects
    /// nothing.
    pub fn protect(&self, ptr: *mut ()) {
        // SeqCst: the publish must be globally ordered before the head
        // re-read that validates it, or a reclaimer could miss it.
        self.registry.slots[self.index]
            .protected
            .store(ptr, Ordering::SeqCst);
    }

    /// Withdraw the published pointer without releasing the slot.
    pub fn clear(&self) {
        self.registry.slots[self.index]
            .protected
            .store(ptr::null_mut(), Ordering::Release);
    }
}

impl Drop for HazardGuard<'_> {
    fn drop(&mut self) {
        let slot = &self.registry.slots[self.index];
        slot.protected.store(ptr::null_mut(), Ordering::Release);
        slot.owner.store(0, Ordering::Release);
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_up_to_capacity() {
        let registry = HazardRegistry::with_capacity(3);
        let _a = registry.acquire().unwrap();
        let _b = registry.acquire().unwrap();
        let _c = registry.acquire().unwrap();
        assert_eq!(registry.claimed(), 3);

        match registry.acquire() {
            Err(Error::RegistryExhausted { capacity }) => assert_eq!(capacity, 3),
            other => panic!("expected exhaustion, got {:?}", other.is_ok()),
        };
    }

    #[test]
    fn test_drop_releases_slot() {
        let registry = HazardRegistry::with_capacity(1);
        let guard = registry.acquire().unwrap();
        assert!(registry.acquire().is_err());

        drop(guard);
        assert_eq!(registry.claimed(), 0);
        assert!(registry.acquire().is_ok());
    }

    #[test]
    fn test_protect_visible_to_scan() {
        let registry = HazardRegistry::with_capacity(2);
        let mut node = 42u64;
        let target = &mut node as *mut u64 as *mut ();

        let guard = registry.acquire().unwrap();
        assert!(!registry.is_protected(target));

        guard.protect(target);
        assert!(registry.is_protected(target));

        guard.clear();
        assert!(!registry.is_protected(target));
    }

    #[test]
    fn test_drop_withdraws_protection() {
        let registry = HazardRegistry::with_capacity(2);
        let mut node = 7u64;
        let target = &mut node as *mut u64 as *mut ();

        let guard = registry.acquire().unwrap();
        guard.protect(target);
        drop(guard);
        assert!(!registry.is_protected(target));
    }

    #[test]
    fn test_null_is_never_protected() {
        let registry = HazardRegistry::with_capacity(1);
        let guard = registry.acquire().unwrap();
        guard.protect(std::ptr::null_mut());
        assert!(!registry.is_protected(std::ptr::null_mut()));
    }

    #[test]
    fn test_release_under_unwind() {
        let registry = HazardRegistry::with_capacity(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut node = 1u64;
            let guard = registry.acquire().unwrap();
            guard.protect(&mut node as *mut u64 as *mut ());
            panic!("abandoned mid-operation");
        }));
        assert!(result.is_err());
        // The unwind ran the guard's Drop: slot free, nothing protected.
        assert_eq!(registry.claimed(), 0);
        assert!(registry.acquire().is_ok());
    }
}
