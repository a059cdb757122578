//! Data structures for temporarily protecting specific pointers (i.e. hazard
//! pointers) acquired by specific participants from concurrent reclamation.
//!
//! # Fixed Global Table
//!
//! Unlike a growable list of hazard records, the table here is a single
//! `static` array of [`HAZARD_CAPACITY`](crate::HAZARD_CAPACITY) slots,
//! entirely initialized at compile time. Acquisition that finds every slot
//! already owned surfaces [`QueueError::OutOfSlots`] rather than growing the
//! table, so capacity exhaustion is an observable, testable outcome instead
//! of something papered over by allocating more slots.
//!
//! # Hazard Pointers
//!
//! Whenever a participant reads a pointer to a node from shared memory, it
//! has to acquire a hazard slot and publish that pointer into it before the
//! pointer can be safely dereferenced. Reclamation consults every slot in the
//! table before destroying a retired node.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

const FREE: usize = 0;

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardSlot
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A single entry in the global hazard table.
///
/// `owner` is `0` when the slot is free, and otherwise holds the
/// [`ParticipantId`] of whichever participant currently owns it. `protected`
/// is the untyped pointer the owner is about to dereference, or null if the
/// owner has not yet published one.
#[derive(Debug)]
pub(crate) struct HazardSlot {
    owner: AtomicUsize,
    protected: AtomicPtr<()>,
}

impl HazardSlot {
    /// Creates a new, free slot.
    #[inline]
    const fn new() -> Self {
        Self { owner: AtomicUsize::new(FREE), protected: AtomicPtr::new(std::ptr::null_mut()) }
    }

    /// Attempts to claim this slot for `owner`.
    ///
    /// Succeeds only if the slot was free at the moment of the compare-and-swap.
    #[inline]
    pub(crate) fn try_claim(&self, owner: ParticipantId) -> bool {
        self.owner.compare_exchange(FREE, owner.0, Ordering::AcqRel, Ordering::Relaxed).is_ok()
    }

    /// Publishes `ptr` as the pointer this slot's owner is about to dereference.
    ///
    /// This intentionally uses `SeqCst` rather than `Release`: a release
    /// store only orders with respect to a matching acquire load, but a
    /// participant publishing a hazard must be ordered with respect to
    /// *every* concurrent scan, including ones that never load this specific
    /// slot's value with an acquire. `SeqCst` here, paired with the `SeqCst`
    /// fence in `Local::scan_hazards`, gives the publish-then-revalidate
    /// pattern in `Queue::pop` a total order to reason about.
    #[inline]
    pub(crate) fn set_protected(&self, ptr: NonNull<()>) {
        // (HAZ:1) this `SeqCst` store synchronizes-with the `SeqCst` fence in scan.
        self.protected.store(ptr.as_ptr(), Ordering::SeqCst);
    }

    /// Clears this slot's protected pointer.
    #[inline]
    pub(crate) fn clear_protected(&self) {
        // (HAZ:2) this `Release` store synchronizes-with the `Acquire` load in `is_hazard`.
        self.protected.store(std::ptr::null_mut(), Ordering::Release);
    }

    /// Returns the currently protected pointer, if any.
    #[inline]
    pub(crate) fn protected(&self, order: Ordering) -> Option<NonNull<()>> {
        NonNull::new(self.protected.load(order))
    }

    /// Returns this slot to the free pool.
    ///
    /// The caller must have already cleared the protected pointer and must
    /// not read from or write to the slot again until it re-acquires it.
    #[inline]
    pub(crate) fn release(&self) {
        debug_assert_ne!(self.owner.load(Ordering::Relaxed), FREE, "double release of a hazard slot");
        self.protected.store(std::ptr::null_mut(), Ordering::Release);
        self.owner.store(FREE, Ordering::Release);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ParticipantId
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A stable, non-zero identity for one thread's participation in the queue.
///
/// Identities are derived from the address of a thread-local cell, which is
/// unique among all live threads and stable for the lifetime of the thread –
/// this avoids depending on any unstable thread-id API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ParticipantId(usize);

impl ParticipantId {
    #[inline]
    pub(crate) fn from_addr(addr: usize) -> Self {
        debug_assert_ne!(addr, FREE, "a thread-local cell address must never be zero");
        Self(addr)
    }
}
