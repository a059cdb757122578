//! Caching for retired nodes until they can be safely dropped and
//! deallocated.
//!
//! # Retired and Retired Bags
//!
//! A retired pointer is stored together with the destructor that knows how to
//! drop and deallocate it (the concrete `T` of the originating
//! [`Queue<T>`](crate::Queue) is erased). These pairs are collected in a
//! participant's [`RetiredBag`] and removed – i.e. the destructor is invoked –
//! only once no hazard slot still protects the same address.
//!
//! # Abandoned Bags
//!
//! When a thread exits, its thread-local state is dropped and makes one final
//! attempt to reclaim everything it retired. Some of those records may still
//! be hazardous to other, still-running participants; in that case, the
//! exiting thread's remaining bag is abandoned onto a global, lock-free stack.
//! Other participants occasionally adopt and merge abandoned bags into their
//! own the next time they scan, taking over responsibility for reclaiming
//! them.

use std::cmp;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{
    AtomicPtr,
    Ordering::{Acquire, Relaxed, Release},
};

////////////////////////////////////////////////////////////////////////////////////////////////////
// Retired
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A type-erased retired pointer paired with the destructor that reclaims it.
#[derive(Debug)]
pub(crate) struct Retired {
    ptr: NonNull<()>,
    destroy: unsafe fn(NonNull<()>),
}

impl Retired {
    /// Creates a new `Retired` entry for `ptr`, to be reclaimed by `destroy`.
    ///
    /// # Safety
    ///
    /// `destroy` must be a valid destructor for the concrete type `ptr` was
    /// originally allocated as, and `ptr` must not be dereferenced again by
    /// anyone once this function is called other than via `destroy`.
    #[inline]
    pub(crate) unsafe fn new(ptr: NonNull<()>, destroy: unsafe fn(NonNull<()>)) -> Self {
        Self { ptr, destroy }
    }

    /// Returns the address of the retired pointer.
    #[inline]
    pub(crate) fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Compares `self`'s address against a currently hazardous pointer.
    ///
    /// Used as the comparator for `binary_search_by` over a slice of
    /// `Retired` entries sorted ascending by address, so this must return
    /// `self`'s ordering relative to `hazardous_addr`, not the reverse.
    #[inline]
    pub(crate) fn compare_with(&self, hazardous_addr: usize) -> cmp::Ordering {
        self.address().cmp(&hazardous_addr)
    }
}

impl Drop for Retired {
    #[inline]
    fn drop(&mut self) {
        // safe because `Retired` values are only ever dropped from within
        // `Local::reclaim_unprotected`, after `self.ptr` was confirmed to be
        // unprotected by every hazard slot.
        unsafe { (self.destroy)(self.ptr) };
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// RetiredBag
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A cache of retired entries awaiting reclamation.
///
/// This type doubles as a linked-list node for the global stack of
/// [`AbandonedBags`].
#[derive(Debug)]
pub(crate) struct RetiredBag {
    pub(crate) inner: Vec<Retired>,
    next: Option<NonNull<RetiredBag>>,
}

impl RetiredBag {
    const DEFAULT_CAPACITY: usize = 32;

    /// Creates a new, empty `RetiredBag`.
    #[inline]
    pub(crate) fn new() -> Self {
        Self { inner: Vec::with_capacity(Self::DEFAULT_CAPACITY), next: None }
    }

    /// Merges `self` with `other`, which is then dropped (deallocated).
    ///
    /// If `other` has substantially more free capacity than `self`, the two
    /// are swapped before merging, keeping the larger backing allocation
    /// around instead of discarding it.
    #[inline]
    pub(crate) fn merge(&mut self, mut other: Vec<Retired>) {
        if other.capacity().saturating_sub(other.len()) > self.inner.capacity() {
            mem::swap(&mut self.inner, &mut other);
        }
        self.inner.append(&mut other);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// AbandonedBags
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free stack of bags abandoned by threads that exited while still
/// holding unreclaimed retired records.
#[derive(Debug)]
pub(crate) struct AbandonedBags {
    head: AtomicPtr<RetiredBag>,
}

impl AbandonedBags {
    /// Creates a new, empty stack.
    #[inline]
    pub(crate) const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()) }
    }

    /// Pushes a non-empty abandoned bag onto the stack.
    #[inline]
    pub(crate) fn push(&self, abandoned: Box<RetiredBag>) {
        debug_assert!(!abandoned.inner.is_empty());
        let leaked = Box::leak(abandoned);

        loop {
            let head = self.head.load(Relaxed);
            leaked.next = NonNull::new(head);

            // (RET:1) this `Release` CAS synchronizes-with the `Acquire` swap in (RET:2)
            if self.head.compare_exchange_weak(head, leaked, Release, Relaxed).is_ok() {
                return;
            }
        }
    }

    /// Takes every bag currently on the stack and merges them into one.
    #[inline]
    pub(crate) fn take_and_merge(&self) -> Option<Box<RetiredBag>> {
        if self.head.load(Relaxed).is_null() {
            return None;
        }

        // (RET:2) this `Acquire` swap synchronizes-with the `Release` CAS in (RET:1)
        let head = unsafe { self.head.swap(ptr::null_mut(), Acquire).as_mut() };
        head.map(|bag| {
            let mut boxed = unsafe { Box::from_raw(bag) };
            let mut curr = boxed.next;
            while let Some(node) = curr {
                let RetiredBag { inner, next } = unsafe { *Box::from_raw(node.as_ptr()) };
                boxed.merge(inner);
                curr = next;
            }
            boxed
        })
    }
}

impl Drop for AbandonedBags {
    #[inline]
    fn drop(&mut self) {
        // only reachable at process teardown of the static `GLOBAL`, which
        // never actually happens; kept for completeness and for tests that
        // construct their own `AbandonedBags`.
        let _ = self.take_and_merge();
    }
}
